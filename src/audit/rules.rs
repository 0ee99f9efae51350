//! Static catalog of audit rules.
//!
//! Each rule carries a category, a default severity and a message template
//! whose `{}` placeholders are filled positionally when a problem is raised.

use std::collections::HashMap;
use std::fmt::Display;
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

use super::severity::{ProblemType, Severity};

/// Identifier of a catalog rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleId {
    SettingProjDefaultVisibility,
    SettingNotSet,
    DefaultAdminPassword,
    BelowLts,
    BelowLatest,
    GlobalPermSonarUsersElevated,
    ProjNotAnalyzed,
    ProjLastAnalysis,
    ProjMainAndMaster,
    ProjVisibility,
    ProjUtilityLocs,
    ProjZeroLoc,
    ProjInvalidBinding,
    ProjDuplicateBinding,
    ProjDuplicate,
    ProjPermMaxUsers,
    ProjPermMaxAdmUsers,
    ProjPermMaxGroups,
    ProjPermAnyone,
    ProjPermSonarUsersElevatedPerms,
    ProjAnalysisWarning,
    BgTaskFailed,
    BranchLastAnalysis,
    BranchZeroLoc,
    PullRequestLastAnalysis,
    PortfolioEmpty,
    PortfolioSingleton,
}

/// A catalog entry.
#[derive(Debug, Clone)]
pub struct Rule {
    pub id: RuleId,
    pub problem_type: ProblemType,
    pub severity: Severity,
    pub message: &'static str,
}

impl Rule {
    const fn new(
        id: RuleId,
        problem_type: ProblemType,
        severity: Severity,
        message: &'static str,
    ) -> Self {
        Self {
            id,
            problem_type,
            severity,
            message,
        }
    }

    /// Fill the message template with positional arguments.
    ///
    /// Extra placeholders are left as is, extra arguments are ignored.
    pub fn format(&self, args: &[&dyn Display]) -> String {
        let mut out = String::with_capacity(self.message.len() + 32);
        let mut args = args.iter();
        let mut rest = self.message;
        while let Some(pos) = rest.find("{}") {
            out.push_str(&rest[..pos]);
            match args.next() {
                Some(arg) => out.push_str(&arg.to_string()),
                None => out.push_str("{}"),
            }
            rest = &rest[pos + 2..];
        }
        out.push_str(rest);
        out
    }
}

static RULES: LazyLock<HashMap<RuleId, Rule>> = LazyLock::new(|| {
    use ProblemType::*;
    use RuleId::*;
    use Severity::*;

    [
        Rule::new(
            SettingProjDefaultVisibility,
            Security,
            High,
            "Default project visibility is '{}', it should be 'private'",
        ),
        Rule::new(
            SettingNotSet,
            Configuration,
            Medium,
            "Setting {} is not set, although it should probably be",
        ),
        Rule::new(
            DefaultAdminPassword,
            Security,
            Critical,
            "User 'admin' still has the default password",
        ),
        Rule::new(
            BelowLts,
            Operations,
            High,
            "{} is below the LTS version, upgrade is recommended",
        ),
        Rule::new(
            BelowLatest,
            Operations,
            Low,
            "{} is below the latest version, upgrade is recommended",
        ),
        Rule::new(
            GlobalPermSonarUsersElevated,
            Security,
            High,
            "Group 'sonar-users' has elevated global permissions",
        ),
        Rule::new(
            ProjNotAnalyzed,
            Operations,
            Medium,
            "{} has been created but never been analyzed",
        ),
        Rule::new(
            ProjLastAnalysis,
            Operations,
            Medium,
            "{} with {} LoCs has not been analyzed since {} days, it could be deleted",
        ),
        Rule::new(
            ProjMainAndMaster,
            BadPractice,
            Low,
            "{} has both a 'main' and a 'master' branch",
        ),
        Rule::new(
            ProjVisibility,
            Security,
            High,
            "{} visibility is '{}', which can be a security risk",
        ),
        Rule::new(
            ProjUtilityLocs,
            BadPractice,
            Low,
            "{} has {} LoCs of utility languages (XML, JSON), this may be excessive",
        ),
        Rule::new(
            ProjZeroLoc,
            Operations,
            Medium,
            "{} has been analyzed but has 0 LoCs",
        ),
        Rule::new(
            ProjInvalidBinding,
            Configuration,
            High,
            "{} DevOps platform binding is invalid",
        ),
        Rule::new(
            ProjDuplicateBinding,
            Operations,
            High,
            "{} has the same DevOps binding as {}",
        ),
        Rule::new(
            ProjDuplicate,
            Operations,
            Medium,
            "{} may be a duplicate of project key '{}'",
        ),
        Rule::new(
            ProjPermMaxUsers,
            BadPractice,
            Medium,
            "{} has too many users ({}) with direct permissions, use groups instead",
        ),
        Rule::new(
            ProjPermMaxAdmUsers,
            Security,
            High,
            "{} has too many users ({}) with administration permission",
        ),
        Rule::new(
            ProjPermMaxGroups,
            BadPractice,
            Medium,
            "{} has too many groups ({}) with permissions",
        ),
        Rule::new(
            ProjPermAnyone,
            Security,
            High,
            "Group 'Anyone' has permissions on {}",
        ),
        Rule::new(
            ProjPermSonarUsersElevatedPerms,
            Security,
            High,
            "Group 'sonar-users' has elevated permissions on {}",
        ),
        Rule::new(
            ProjAnalysisWarning,
            Configuration,
            Low,
            "Last analysis of {} has warnings",
        ),
        Rule::new(
            BgTaskFailed,
            Operations,
            Medium,
            "Last background task of {} has failed",
        ),
        Rule::new(
            BranchLastAnalysis,
            Operations,
            Low,
            "{} has not been analyzed since {} days, it could be deleted",
        ),
        Rule::new(
            BranchZeroLoc,
            Operations,
            Low,
            "{} has been analyzed but has 0 LoCs",
        ),
        Rule::new(
            PullRequestLastAnalysis,
            Operations,
            Low,
            "{} has not been analyzed since {} days, it could be deleted",
        ),
        Rule::new(PortfolioEmpty, Configuration, Low, "{} is empty"),
        Rule::new(
            PortfolioSingleton,
            BadPractice,
            Low,
            "{} has a single project, this is not useful",
        ),
    ]
    .into_iter()
    .map(|r| (r.id, r))
    .collect()
});

impl RuleId {
    /// Catalog entry for this rule.
    pub fn rule(self) -> &'static Rule {
        // Every variant is registered above
        &RULES[&self]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_fills_placeholders_in_order() {
        let rule = RuleId::ProjLastAnalysis.rule();
        let msg = rule.format(&[&"project 'foo'", &1200, &400]);
        assert_eq!(
            msg,
            "project 'foo' with 1200 LoCs has not been analyzed since 400 days, it could be deleted"
        );
    }

    #[test]
    fn test_format_keeps_missing_placeholders() {
        let rule = RuleId::ProjVisibility.rule();
        assert_eq!(
            rule.format(&[&"project 'x'"]),
            "project 'x' visibility is '{}', which can be a security risk"
        );
    }

    #[test]
    fn test_rule_lookup_returns_catalog_entry() {
        let rule = RuleId::DefaultAdminPassword.rule();
        assert_eq!(rule.id, RuleId::DefaultAdminPassword);
        assert_eq!(rule.severity, Severity::Critical);
        assert_eq!(rule.problem_type, ProblemType::Security);
    }
}
