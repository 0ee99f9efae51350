//! Mock server state management.
//!
//! Provides the in-memory data store for the mock SonarQube server.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;

/// Scope key of global permissions in [`MockState::permissions`].
pub const GLOBAL_SCOPE: &str = "";

/// Users and groups with their permissions, for one scope.
#[derive(Debug, Clone, Default)]
pub struct MockPermissions {
    pub users: BTreeMap<String, BTreeSet<String>>,
    pub groups: BTreeMap<String, BTreeSet<String>>,
}

impl MockPermissions {
    pub fn with_user(mut self, login: &str, perms: &[&str]) -> Self {
        self.users
            .entry(login.to_string())
            .or_default()
            .extend(perms.iter().map(|p| p.to_string()));
        self
    }

    pub fn with_group(mut self, name: &str, perms: &[&str]) -> Self {
        self.groups
            .entry(name.to_string())
            .or_default()
            .extend(perms.iter().map(|p| p.to_string()));
        self
    }
}

#[derive(Debug, Clone)]
pub struct MockBranch {
    pub name: String,
    pub is_main: bool,
    pub keep_when_inactive: bool,
    pub analysis_date: Option<String>,
    pub ncloc: u64,
}

#[derive(Debug, Clone)]
pub struct MockLink {
    pub id: String,
    pub link_type: String,
    pub name: Option<String>,
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct MockWebhook {
    pub key: String,
    pub name: String,
    pub url: String,
    /// `None` for a global webhook.
    pub project: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MockProject {
    pub key: String,
    pub name: String,
    pub visibility: String,
    pub last_analysis_date: Option<String>,
    pub tags: Vec<String>,
    pub branches: Vec<MockBranch>,
    pub links: Vec<MockLink>,
    /// `None` means the default gate.
    pub quality_gate: Option<String>,
    /// Non default profiles, language to profile name.
    pub profiles: BTreeMap<String, String>,
    pub settings: BTreeMap<String, Value>,
    /// New code period type and value, `None` when inherited.
    pub new_code: Option<(String, Option<String>)>,
    pub binding: Option<Value>,
    pub binding_valid: bool,
    /// `language=ncloc;...` as the platform reports it.
    pub language_distribution: Option<String>,
}

impl MockProject {
    /// Project with a never analyzed `main` branch.
    pub fn new(key: &str, name: &str) -> Self {
        Self {
            key: key.to_string(),
            name: name.to_string(),
            visibility: "public".to_string(),
            last_analysis_date: None,
            tags: Vec::new(),
            branches: vec![MockBranch {
                name: "main".to_string(),
                is_main: true,
                keep_when_inactive: true,
                analysis_date: None,
                ncloc: 0,
            }],
            links: Vec::new(),
            quality_gate: None,
            profiles: BTreeMap::new(),
            settings: BTreeMap::new(),
            new_code: None,
            binding: None,
            binding_valid: true,
            language_distribution: None,
        }
    }

    pub fn main_branch(&self) -> Option<&MockBranch> {
        self.branches.iter().find(|b| b.is_main)
    }

    /// Lines of code of a branch, the main branch when `branch` is `None`.
    pub fn ncloc(&self, branch: Option<&str>) -> u64 {
        match branch {
            Some(name) => self.branches.iter().find(|b| b.name == name).map_or(0, |b| b.ncloc),
            None => self.main_branch().map_or(0, |b| b.ncloc),
        }
    }
}

/// How a portfolio selects its projects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockSelection {
    /// Project key to selected branches, empty for the main branch.
    Manual(BTreeMap<String, Vec<String>>),
    Regexp { regexp: String, branch: Option<String> },
    Tags { tags: Vec<String>, branch: Option<String> },
    Rest { branch: Option<String> },
    None,
}

impl MockSelection {
    pub fn mode(&self) -> &'static str {
        match self {
            MockSelection::Manual(_) => "MANUAL",
            MockSelection::Regexp { .. } => "REGEXP",
            MockSelection::Tags { .. } => "TAGS",
            MockSelection::Rest { .. } => "REST",
            MockSelection::None => "NONE",
        }
    }
}

#[derive(Debug, Clone)]
pub struct MockPortfolio {
    pub key: String,
    pub name: String,
    pub description: Option<String>,
    pub visibility: String,
    /// Owning portfolio of a sub-portfolio.
    pub parent: Option<String>,
    pub selection: MockSelection,
    /// Top-level portfolios included by reference.
    pub references: Vec<String>,
}

impl MockPortfolio {
    pub fn new(key: &str, name: &str) -> Self {
        Self {
            key: key.to_string(),
            name: name.to_string(),
            description: None,
            visibility: "public".to_string(),
            parent: None,
            selection: MockSelection::None,
            references: Vec::new(),
        }
    }

    pub fn qualifier(&self) -> &'static str {
        if self.parent.is_some() {
            "SVW"
        } else {
            "VW"
        }
    }
}

#[derive(Debug, Clone)]
pub struct MockTemplate {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub pattern: Option<String>,
}

/// Shared state for the mock server.
///
/// This struct holds all the mock data that the server will serve.
/// It's wrapped in `Arc<RwLock<_>>` for concurrent access.
#[derive(Debug)]
pub struct MockState {
    /// Reported by `api/server/version`.
    pub version: String,
    /// Lowercase edition, e.g. `enterprise`.
    pub edition: String,
    pub server_id: String,

    /// Global settings; strings, string arrays or arrays of objects.
    pub settings: BTreeMap<String, Value>,
    /// Global new code period type and value.
    pub new_code: (String, Option<String>),

    /// Projects indexed by key.
    pub projects: BTreeMap<String, MockProject>,

    /// Portfolios and sub-portfolios indexed by key.
    pub portfolios: BTreeMap<String, MockPortfolio>,

    pub quality_gates: Vec<String>,
    pub default_gate: String,
    /// Profiles as `(language, name)`.
    pub quality_profiles: Vec<(String, String)>,
    /// Default profile name by language.
    pub default_profiles: BTreeMap<String, String>,

    pub webhooks: Vec<MockWebhook>,

    /// Permissions by scope: [`GLOBAL_SCOPE`], a project or portfolio key,
    /// or a template id.
    pub permissions: BTreeMap<String, MockPermissions>,
    pub templates: Vec<MockTemplate>,
    /// Default template id by qualifier.
    pub default_templates: BTreeMap<String, String>,

    /// DevOps platform definitions by type, as `alm_settings/list_definitions`
    /// returns them.
    pub devops_platforms: BTreeMap<String, Vec<Value>>,

    /// Background task statuses by id.
    pub tasks: BTreeMap<String, String>,
    /// Last task per component key.
    pub component_tasks: BTreeMap<String, String>,
    /// Status given to new project dump tasks.
    pub dump_task_status: String,
    /// Exported dump files by project key.
    pub dumps: BTreeMap<String, String>,

    /// Whether `admin`/`admin` still authenticates.
    pub default_admin_password: bool,

    next_id: u64,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            version: "9.9.0".to_string(),
            edition: "enterprise".to_string(),
            server_id: "243B8A4D-AX1Z2bMpkaD8pqX7g".to_string(),
            settings: BTreeMap::new(),
            new_code: ("PREVIOUS_VERSION".to_string(), None),
            projects: BTreeMap::new(),
            portfolios: BTreeMap::new(),
            quality_gates: vec!["Sonar way".to_string()],
            default_gate: "Sonar way".to_string(),
            quality_profiles: Vec::new(),
            default_profiles: BTreeMap::new(),
            webhooks: Vec::new(),
            permissions: BTreeMap::new(),
            templates: Vec::new(),
            default_templates: BTreeMap::new(),
            devops_platforms: BTreeMap::new(),
            tasks: BTreeMap::new(),
            component_tasks: BTreeMap::new(),
            dump_task_status: "SUCCESS".to_string(),
            dumps: BTreeMap::new(),
            default_admin_password: false,
            next_id: 1,
        }
    }
}

impl MockState {
    /// Create a new empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create state wrapped in Arc<RwLock> for sharing.
    pub fn shared(self) -> Arc<RwLock<Self>> {
        Arc::new(RwLock::new(self))
    }

    pub fn with_version(mut self, version: &str) -> Self {
        self.version = version.to_string();
        self
    }

    pub fn with_edition(mut self, edition: &str) -> Self {
        self.edition = edition.to_string();
        self
    }

    pub fn with_setting(mut self, key: &str, value: Value) -> Self {
        self.settings.insert(key.to_string(), value);
        self
    }

    pub fn with_project(mut self, project: MockProject) -> Self {
        self.projects.insert(project.key.clone(), project);
        self
    }

    pub fn with_portfolio(mut self, portfolio: MockPortfolio) -> Self {
        self.portfolios.insert(portfolio.key.clone(), portfolio);
        self
    }

    pub fn with_permissions(mut self, scope: &str, permissions: MockPermissions) -> Self {
        self.permissions.insert(scope.to_string(), permissions);
        self
    }

    pub fn with_devops_platform(mut self, alm: &str, definition: Value) -> Self {
        self.devops_platforms.entry(alm.to_string()).or_default().push(definition);
        self
    }

    /// Status given to project dump tasks, e.g. `IN_PROGRESS` to make
    /// exports time out.
    pub fn with_dump_task_status(mut self, status: &str) -> Self {
        self.dump_task_status = status.to_string();
        self
    }

    /// Next id for created objects, prefixed for readability.
    pub fn next_id(&mut self, prefix: &str) -> String {
        let id = format!("{prefix}{:04}", self.next_id);
        self.next_id += 1;
        id
    }

    pub fn get_project(&self, key: &str) -> Option<&MockProject> {
        self.projects.get(key)
    }

    pub fn get_portfolio(&self, key: &str) -> Option<&MockPortfolio> {
        self.portfolios.get(key)
    }

    /// Direct sub-portfolios of `key`.
    pub fn children(&self, key: &str) -> Vec<&MockPortfolio> {
        self.portfolios
            .values()
            .filter(|p| p.parent.as_deref() == Some(key))
            .collect()
    }

    /// Delete a portfolio with its sub-portfolios and references to it.
    pub fn remove_portfolio(&mut self, key: &str) -> bool {
        if self.portfolios.remove(key).is_none() {
            return false;
        }
        let children: Vec<String> = self.children(key).iter().map(|p| p.key.clone()).collect();
        for child in children {
            self.remove_portfolio(&child);
        }
        for p in self.portfolios.values_mut() {
            p.references.retain(|r| r != key);
        }
        self.permissions.remove(key);
        true
    }

    /// Keys of the projects a portfolio aggregates, sub-portfolios included.
    pub fn portfolio_projects(&self, key: &str) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.collect_projects(key, &mut BTreeSet::new(), &mut out);
        out
    }

    fn collect_projects(&self, key: &str, visited: &mut BTreeSet<String>, out: &mut BTreeSet<String>) {
        if !visited.insert(key.to_string()) {
            return;
        }
        let Some(portfolio) = self.portfolios.get(key) else {
            return;
        };
        match &portfolio.selection {
            MockSelection::Manual(projects) => out.extend(projects.keys().cloned()),
            MockSelection::Regexp { regexp, .. } => {
                if let Ok(re) = regex::Regex::new(regexp) {
                    out.extend(self.projects.keys().filter(|k| re.is_match(k)).cloned());
                }
            }
            MockSelection::Tags { tags, .. } => out.extend(
                self.projects
                    .values()
                    .filter(|p| p.tags.iter().any(|t| tags.contains(t)))
                    .map(|p| p.key.clone()),
            ),
            MockSelection::Rest { .. } | MockSelection::None => {}
        }
        let nested: Vec<String> = self
            .children(key)
            .iter()
            .map(|p| p.key.clone())
            .chain(portfolio.references.iter().cloned())
            .collect();
        for k in nested {
            self.collect_projects(&k, visited, out);
        }
    }

    /// Record a finished or running background task on `component`.
    pub fn add_task(&mut self, component: &str, status: &str) -> String {
        let id = self.next_id("AX");
        self.tasks.insert(id.clone(), status.to_string());
        self.component_tasks.insert(component.to_string(), id.clone());
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_portfolio_projects_follow_hierarchy() {
        let mut team = MockPortfolio::new("TEAM", "Team");
        team.parent = Some("ALL".to_string());
        team.selection = MockSelection::Regexp {
            regexp: "^web-.*".to_string(),
            branch: None,
        };
        let mut other = MockPortfolio::new("OTHER", "Other");
        other.selection = MockSelection::Manual(BTreeMap::from([("api".to_string(), Vec::new())]));
        let mut all = MockPortfolio::new("ALL", "All");
        all.references.push("OTHER".to_string());

        let state = MockState::new()
            .with_project(MockProject::new("web-front", "Front"))
            .with_project(MockProject::new("api", "API"))
            .with_project(MockProject::new("batch", "Batch"))
            .with_portfolio(all)
            .with_portfolio(team)
            .with_portfolio(other);

        let projects: Vec<String> = state.portfolio_projects("ALL").into_iter().collect();
        assert_eq!(projects, vec!["api".to_string(), "web-front".to_string()]);
        assert_eq!(state.get_portfolio("TEAM").unwrap().qualifier(), "SVW");
    }

    #[test]
    fn test_remove_portfolio_cascades() {
        let mut sub = MockPortfolio::new("SUB", "Sub");
        sub.parent = Some("TOP".to_string());
        let mut other = MockPortfolio::new("OTHER", "Other");
        other.references.push("TOP".to_string());
        let mut state = MockState::new()
            .with_portfolio(MockPortfolio::new("TOP", "Top"))
            .with_portfolio(sub)
            .with_portfolio(other);

        assert!(state.remove_portfolio("TOP"));
        assert!(state.get_portfolio("SUB").is_none());
        assert!(state.get_portfolio("OTHER").unwrap().references.is_empty());
        assert!(!state.remove_portfolio("TOP"));
    }
}
