//! User and group permissions at global, project, portfolio and template level.

use std::collections::{BTreeMap, BTreeSet};

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::audit::{AuditSettings, Problem, ProblemType, RuleId, Severity};
use crate::client::ParamsBuf;
use crate::error::Result;
use crate::pagination::Paging;
use crate::platform::Platform;
use crate::util::{list_to_csv, value_to_list};

/// Global permissions and their display names.
pub const GLOBAL_PERMISSIONS: [(&str, &str); 6] = [
    ("admin", "Global Administration"),
    ("gateadmin", "Administer Quality Gates"),
    ("profileadmin", "Administer Quality Profiles"),
    ("provisioning", "Create Projects"),
    ("applicationcreator", "Create Applications"),
    ("portfoliocreator", "Create Portfolios"),
];

/// Project level permissions.
pub const PROJECT_PERMISSIONS: [&str; 6] = [
    "user",
    "codeviewer",
    "issueadmin",
    "securityhotspotadmin",
    "admin",
    "scan",
];

const PAGE_SIZE: u32 = 100;

/// Where a permission set lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionScope<'a> {
    Global,
    Project(&'a str),
    Portfolio(&'a str),
    Template { id: &'a str },
}

impl PermissionScope<'_> {
    fn is_template(&self) -> bool {
        matches!(self, PermissionScope::Template { .. })
    }

    fn scope_params(&self) -> ParamsBuf {
        match self {
            PermissionScope::Global => ParamsBuf::new(),
            PermissionScope::Project(key) | PermissionScope::Portfolio(key) => {
                ParamsBuf::new().with("projectKey", *key)
            }
            PermissionScope::Template { id } => ParamsBuf::new().with("templateId", *id),
        }
    }

    fn api(&self, principal: Principal, action: Action) -> String {
        let kind = match principal {
            Principal::User => "user",
            Principal::Group => "group",
        };
        match (self.is_template(), action) {
            (false, Action::Add) => format!("permissions/add_{kind}"),
            (false, Action::Remove) => format!("permissions/remove_{kind}"),
            (true, Action::Add) => format!("permissions/add_{kind}_to_template"),
            (true, Action::Remove) => format!("permissions/remove_{kind}_from_template"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Principal {
    User,
    Group,
}

#[derive(Debug, Clone, Copy)]
enum Action {
    Add,
    Remove,
}

/// Permissions granted to users (by login) and groups (by name).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionSet {
    pub users: BTreeMap<String, BTreeSet<String>>,
    pub groups: BTreeMap<String, BTreeSet<String>>,
}

#[derive(Debug, Deserialize)]
struct UserPermissions {
    login: String,
    #[serde(default)]
    permissions: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct GroupPermissions {
    name: String,
    #[serde(default)]
    permissions: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct UsersPage {
    #[serde(default)]
    users: Vec<UserPermissions>,
    #[serde(default)]
    paging: Paging,
}

#[derive(Debug, Deserialize)]
struct GroupsPage {
    #[serde(default)]
    groups: Vec<GroupPermissions>,
    #[serde(default)]
    paging: Paging,
}

impl PermissionSet {
    /// Read the current permissions of a scope.
    #[tracing::instrument(skip(platform))]
    pub async fn fetch(platform: &Platform, scope: PermissionScope<'_>) -> Result<Self> {
        let (users_api, groups_api) = if scope.is_template() {
            ("permissions/template_users", "permissions/template_groups")
        } else {
            ("permissions/users", "permissions/groups")
        };
        let mut set = Self::default();

        let mut page = 1;
        loop {
            let params = scope
                .scope_params()
                .with("ps", PAGE_SIZE.to_string())
                .with("p", page.to_string());
            let resp: UsersPage = platform.client().get_json(users_api, &params.as_params()).await?;
            let count = resp.users.len();
            for u in resp.users.into_iter().filter(|u| !u.permissions.is_empty()) {
                set.users.insert(u.login, u.permissions.into_iter().collect());
            }
            if count < PAGE_SIZE as usize || u64::from(page * PAGE_SIZE) >= resp.paging.total {
                break;
            }
            page += 1;
        }

        let mut page = 1;
        loop {
            let params = scope
                .scope_params()
                .with("ps", PAGE_SIZE.to_string())
                .with("p", page.to_string());
            let resp: GroupsPage = platform.client().get_json(groups_api, &params.as_params()).await?;
            let count = resp.groups.len();
            for g in resp.groups.into_iter().filter(|g| !g.permissions.is_empty()) {
                set.groups.insert(g.name, g.permissions.into_iter().collect());
            }
            if count < PAGE_SIZE as usize || u64::from(page * PAGE_SIZE) >= resp.paging.total {
                break;
            }
            page += 1;
        }
        Ok(set)
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty() && self.groups.is_empty()
    }

    /// Export form: `{"users": {"login": "perm1, perm2"}, "groups": {...}}`,
    /// empty sections omitted.
    pub fn to_json(&self) -> Value {
        let encode = |m: &BTreeMap<String, BTreeSet<String>>| -> Map<String, Value> {
            m.iter()
                .map(|(k, perms)| {
                    let perms: Vec<&String> = perms.iter().collect();
                    (k.clone(), Value::String(list_to_csv(&perms, ", ")))
                })
                .collect()
        };
        let mut out = Map::new();
        if !self.users.is_empty() {
            out.insert("users".to_string(), Value::Object(encode(&self.users)));
        }
        if !self.groups.is_empty() {
            out.insert("groups".to_string(), Value::Object(encode(&self.groups)));
        }
        Value::Object(out)
    }

    /// Decode the export form. Permissions may be a CSV string or an array.
    pub fn from_json(value: &Value) -> Self {
        let decode = |section: &str| -> BTreeMap<String, BTreeSet<String>> {
            value
                .get(section)
                .and_then(Value::as_object)
                .map(|m| {
                    m.iter()
                        .map(|(k, v)| (k.clone(), value_to_list(v).into_iter().collect()))
                        .collect()
                })
                .unwrap_or_default()
        };
        Self {
            users: decode("users"),
            groups: decode("groups"),
        }
    }

    pub fn count_users_with(&self, permission: &str) -> usize {
        self.users.values().filter(|p| p.contains(permission)).count()
    }

    pub fn count_groups_with(&self, permission: &str) -> usize {
        self.groups.values().filter(|p| p.contains(permission)).count()
    }

    /// Make the scope match `self` for every user and group named in `self`.
    ///
    /// Principals not named keep their current permissions.
    #[tracing::instrument(skip(self, platform))]
    pub async fn apply(&self, platform: &Platform, scope: PermissionScope<'_>) -> Result<()> {
        let current = Self::fetch(platform, scope).await?;
        for (login, wanted) in &self.users {
            let have = current.users.get(login).cloned().unwrap_or_default();
            Self::reconcile(platform, scope, Principal::User, login, &have, wanted).await?;
        }
        for (name, wanted) in &self.groups {
            let have = current.groups.get(name).cloned().unwrap_or_default();
            Self::reconcile(platform, scope, Principal::Group, name, &have, wanted).await?;
        }
        Ok(())
    }

    async fn reconcile(
        platform: &Platform,
        scope: PermissionScope<'_>,
        principal: Principal,
        name: &str,
        have: &BTreeSet<String>,
        wanted: &BTreeSet<String>,
    ) -> Result<()> {
        let name_param = match principal {
            Principal::User => "login",
            Principal::Group => "groupName",
        };
        for (perms, action) in [
            (wanted.difference(have), Action::Add),
            (have.difference(wanted), Action::Remove),
        ] {
            for perm in perms {
                let params = scope
                    .scope_params()
                    .with(name_param, name)
                    .with("permission", perm.as_str());
                tracing::debug!("{:?} permission {} for {}", action, perm, name);
                platform
                    .client()
                    .post(&scope.api(principal, action), &params.as_params())
                    .await?;
            }
        }
        Ok(())
    }

    /// Problems with a project permission set, per the project audit thresholds.
    pub fn audit_project(&self, settings: &AuditSettings, object: &str) -> Vec<Problem> {
        if !settings.get_bool("audit.projects.permissions", true) {
            tracing::debug!("Auditing project permissions is disabled, skipping...");
            return Vec::new();
        }
        let mut problems = Vec::new();
        let max_users = settings.get_u64("audit.projects.permissions.maxUsers", 5) as usize;
        if self.users.len() > max_users {
            problems.push(
                Problem::from_rule(RuleId::ProjPermMaxUsers, &[&object, &self.users.len()])
                    .with_object(object),
            );
        }
        let max_admins = settings.get_u64("audit.projects.permissions.maxAdminUsers", 2) as usize;
        let admins = self.count_users_with("admin");
        if admins > max_admins {
            problems.push(
                Problem::from_rule(RuleId::ProjPermMaxAdmUsers, &[&object, &admins]).with_object(object),
            );
        }
        let max_groups = settings.get_u64("audit.projects.permissions.maxGroups", 5) as usize;
        if self.groups.len() > max_groups {
            problems.push(
                Problem::from_rule(RuleId::ProjPermMaxGroups, &[&object, &self.groups.len()])
                    .with_object(object),
            );
        }
        if self.groups.contains_key("Anyone") {
            problems.push(Problem::from_rule(RuleId::ProjPermAnyone, &[&object]).with_object(object));
        }
        if let Some(perms) = self.groups.get("sonar-users") {
            if ["admin", "issueadmin", "securityhotspotadmin"]
                .iter()
                .any(|p| perms.contains(*p))
            {
                problems.push(
                    Problem::from_rule(RuleId::ProjPermSonarUsersElevatedPerms, &[&object])
                        .with_object(object),
                );
            }
        }
        problems
    }

    /// Problems with the global permission set.
    pub fn audit_global(&self) -> Vec<Problem> {
        let mut problems = Vec::new();
        if self.users.len() > 10 {
            problems.push(Problem::new(
                ProblemType::BadPractice,
                Severity::Medium,
                format!(
                    "Too many ({}) users with direct global permissions, use groups instead",
                    self.users.len()
                ),
            ));
        }
        for (perm, name) in GLOBAL_PERMISSIONS {
            if !["admin", "gateadmin", "profileadmin", "scan", "provisioning"].contains(&perm) {
                continue;
            }
            let count = self.count_users_with(perm);
            if count > 3 {
                problems.push(Problem::new(
                    ProblemType::BadPractice,
                    Severity::Medium,
                    format!("Too many ({count}) users with permission '{name}', use groups instead"),
                ));
            }
        }

        if self.groups.len() > 10 {
            problems.push(Problem::new(
                ProblemType::BadPractice,
                Severity::Medium,
                format!("Too many ({}) groups with global permissions", self.groups.len()),
            ));
        }
        if self.groups.contains_key("Anyone") {
            problems.push(Problem::new(
                ProblemType::Security,
                Severity::High,
                "Group 'Anyone' should not have any global permission",
            ));
        }
        if let Some(perms) = self.groups.get("sonar-users") {
            if ["admin", "gateadmin", "profileadmin", "provisioning"]
                .iter()
                .any(|p| perms.contains(*p))
            {
                problems.push(Problem::from_rule(RuleId::GlobalPermSonarUsersElevated, &[]));
            }
        }
        for (perm, max) in [
            ("admin", 2),
            ("gateadmin", 2),
            ("profileadmin", 2),
            ("scan", 2),
            ("provisioning", 3),
        ] {
            let count = self.count_groups_with(perm);
            if count > max {
                problems.push(Problem::new(
                    ProblemType::BadPractice,
                    Severity::Medium,
                    format!("Too many ({count}) groups with permission '{perm}', {max} max recommended"),
                ));
            }
        }
        problems
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> PermissionSet {
        PermissionSet::from_json(&json!({
            "users": {"admin": "admin, user", "olivier": ["user", "codeviewer"]},
            "groups": {"sonar-users": "user, issueadmin"}
        }))
    }

    #[test]
    fn test_json_encoding_is_sorted_csv() {
        let json = sample().to_json();
        assert_eq!(json["users"]["admin"], "admin, user");
        assert_eq!(json["users"]["olivier"], "codeviewer, user");
        assert_eq!(json["groups"]["sonar-users"], "issueadmin, user");
    }

    #[test]
    fn test_empty_sections_omitted() {
        assert_eq!(PermissionSet::default().to_json(), json!({}));
    }

    #[test]
    fn test_project_audit_flags_elevated_sonar_users() {
        let problems = sample().audit_project(&AuditSettings::default(), "proj");
        assert_eq!(problems.len(), 1);
        assert_eq!(problems[0].rule, Some(RuleId::ProjPermSonarUsersElevatedPerms));
    }

    #[test]
    fn test_project_audit_thresholds() {
        let mut set = PermissionSet::default();
        for i in 0..4 {
            set.users
                .insert(format!("u{i}"), ["admin".to_string()].into_iter().collect());
        }
        set.groups.insert("Anyone".to_string(), ["user".to_string()].into_iter().collect());
        let problems = set.audit_project(&AuditSettings::default(), "proj");
        let rules: Vec<_> = problems.iter().filter_map(|p| p.rule).collect();
        assert_eq!(rules, vec![RuleId::ProjPermMaxAdmUsers, RuleId::ProjPermAnyone]);
    }

    #[test]
    fn test_global_audit_counts_groups() {
        let mut set = PermissionSet::default();
        for name in ["a", "b", "c"] {
            set.groups
                .insert(name.to_string(), ["admin".to_string()].into_iter().collect());
        }
        let problems = set.audit_global();
        assert_eq!(problems.len(), 1);
        assert!(problems[0].message.contains("'admin', 2 max"));
    }
}
