//! Test data fixtures for the mock server.
//!
//! Provides factory functions for creating realistic test data.

use std::collections::BTreeMap;

use chrono::{Duration, Utc};
use serde_json::json;

use super::state::{
    MockBranch, MockLink, MockPermissions, MockPortfolio, MockProject, MockSelection, MockState, MockTemplate,
    MockWebhook, GLOBAL_SCOPE,
};

/// Collection of fixture factories for test data.
pub struct Fixtures;

impl Fixtures {
    /// Platform timestamp `days` days in the past.
    pub fn days_ago(days: i64) -> String {
        (Utc::now() - Duration::days(days))
            .format("%Y-%m-%dT%H:%M:%S%z")
            .to_string()
    }

    // =========================================================================
    // Project Fixtures
    // =========================================================================

    /// Project whose main branch was analyzed `days` days ago.
    pub fn analyzed_project(key: &str, name: &str, days: i64, ncloc: u64) -> MockProject {
        let date = Self::days_ago(days);
        let mut project = MockProject::new(key, name);
        project.last_analysis_date = Some(date.clone());
        project.branches = vec![Self::branch("main", true, Some(&date), ncloc)];
        project
    }

    pub fn branch(name: &str, is_main: bool, analysis_date: Option<&str>, ncloc: u64) -> MockBranch {
        MockBranch {
            name: name.to_string(),
            is_main,
            keep_when_inactive: is_main,
            analysis_date: analysis_date.map(String::from),
            ncloc,
        }
    }

    /// Recently analyzed project with most of the configuration a project
    /// can carry: tags, links, gate, profile, settings, binding.
    pub fn configured_project(key: &str, name: &str) -> MockProject {
        let mut project = Self::analyzed_project(key, name, 2, 12_000);
        project.visibility = "private".to_string();
        project.tags = vec!["front".to_string(), "web".to_string()];
        let mut develop = Self::branch("develop", false, Some(&Self::days_ago(5)), 11_800);
        develop.keep_when_inactive = true;
        project.branches.push(develop);
        project.links.push(MockLink {
            id: "L0100".to_string(),
            link_type: "custom".to_string(),
            name: Some("ci".to_string()),
            url: format!("https://ci.acme.com/{key}"),
        });
        project.quality_gate = Some("Acme strict".to_string());
        project.profiles.insert("java".to_string(), "Acme Java".to_string());
        project
            .settings
            .insert("sonar.coverage.exclusions".to_string(), json!(["**/test/**"]));
        project.new_code = Some(("NUMBER_OF_DAYS".to_string(), Some("30".to_string())));
        project.binding = Some(json!({
            "key": "gh-acme",
            "alm": "github",
            "repository": format!("acme/{key}"),
            "url": "https://api.github.com",
            "monorepo": false,
            "summaryCommentEnabled": true,
        }));
        project.language_distribution = Some("java=11000;xml=1000".to_string());
        project
    }

    // =========================================================================
    // Portfolio Fixtures
    // =========================================================================

    pub fn portfolio(key: &str, name: &str, selection: MockSelection) -> MockPortfolio {
        let mut portfolio = MockPortfolio::new(key, name);
        portfolio.selection = selection;
        portfolio
    }

    pub fn sub_portfolio(key: &str, name: &str, parent: &str, selection: MockSelection) -> MockPortfolio {
        let mut portfolio = Self::portfolio(key, name, selection);
        portfolio.parent = Some(parent.to_string());
        portfolio
    }

    pub fn manual(projects: &[&str]) -> MockSelection {
        MockSelection::Manual(projects.iter().map(|p| (p.to_string(), Vec::new())).collect())
    }

    // =========================================================================
    // Scenario Fixtures
    // =========================================================================

    /// An enterprise 9.9 platform with three projects and a small portfolio
    /// hierarchy.
    ///
    /// - `acme-web`: recently analyzed, fully configured, bound to GitHub
    /// - `acme-api`: last analyzed 400 days ago, has `main` and `master`
    /// - `acme-legacy`: never analyzed
    /// - `ALL`: owns `TEAM_A` (regexp), which owns `TEAM_A_WEB` (manual),
    ///   and references `OTHER` (tags)
    /// - `EMPTY`: manual selection without projects
    pub fn default_scenario() -> MockState {
        let mut api = Self::analyzed_project("acme-api", "Acme API", 400, 5_000);
        api.tags = vec!["backend".to_string()];
        api.branches
            .push(Self::branch("master", false, Some(&Self::days_ago(420)), 4_900));
        let mut legacy = MockProject::new("acme-legacy", "Acme Legacy");
        legacy.visibility = "private".to_string();

        let mut all = Self::portfolio("ALL", "All projects", MockSelection::None);
        all.description = Some("Every team".to_string());
        all.references.push("OTHER".to_string());
        let team = Self::sub_portfolio(
            "TEAM_A",
            "Team A",
            "ALL",
            MockSelection::Regexp {
                regexp: "^acme-.*".to_string(),
                branch: None,
            },
        );
        let team_web = Self::sub_portfolio("TEAM_A_WEB", "Team A web", "TEAM_A", Self::manual(&["acme-web"]));
        let other = Self::portfolio(
            "OTHER",
            "Other",
            MockSelection::Tags {
                tags: vec!["front".to_string()],
                branch: None,
            },
        );
        let empty = Self::portfolio("EMPTY", "Empty", Self::manual(&[]));

        let mut state = MockState::new()
            .with_setting("sonar.core.serverBaseURL", json!("https://sonar.acme.com"))
            .with_setting("sonar.forceAuthentication", json!("true"))
            .with_setting("sonar.technicalDebt.ratingGrid", json!("0.05,0.1,0.2,0.5"))
            .with_setting("sonar.dbcleaner.daysBeforeDeletingClosedIssues", json!("30"))
            .with_setting("sonar.exclusions", json!(["**/vendor/**"]))
            .with_setting("sonar.java.file.suffixes", json!([".java", ".jav"]))
            .with_project(Self::configured_project("acme-web", "Acme Web"))
            .with_project(api)
            .with_project(legacy)
            .with_portfolio(all)
            .with_portfolio(team)
            .with_portfolio(team_web)
            .with_portfolio(other)
            .with_portfolio(empty)
            .with_permissions(
                GLOBAL_SCOPE,
                MockPermissions::default()
                    .with_user("admin", &["admin", "provisioning", "scan"])
                    .with_group("sonar-administrators", &["admin"])
                    .with_group("sonar-users", &["scan"]),
            )
            .with_permissions(
                "acme-web",
                MockPermissions::default()
                    .with_user("admin", &["admin", "user"])
                    .with_group("sonar-administrators", &["admin", "user"]),
            )
            .with_permissions(
                "default_template",
                MockPermissions::default().with_group("sonar-administrators", &["admin", "user"]),
            )
            .with_devops_platform(
                "github",
                json!({"key": "gh-acme", "url": "https://api.github.com", "appId": "1234", "clientId": "Iv1.acme"}),
            );

        state.quality_gates = vec!["Sonar way".to_string(), "Acme strict".to_string()];
        state.quality_profiles = vec![
            ("java".to_string(), "Sonar way".to_string()),
            ("java".to_string(), "Acme Java".to_string()),
            ("py".to_string(), "Sonar way".to_string()),
        ];
        state.default_profiles = BTreeMap::from([
            ("java".to_string(), "Sonar way".to_string()),
            ("py".to_string(), "Sonar way".to_string()),
        ]);
        state.templates.push(MockTemplate {
            id: "default_template".to_string(),
            name: "Default template".to_string(),
            description: Some("Applies to all projects".to_string()),
            pattern: None,
        });
        state
            .default_templates
            .insert("TRK".to_string(), "default_template".to_string());
        state.webhooks.push(MockWebhook {
            key: "WH0100".to_string(),
            name: "jenkins".to_string(),
            url: "https://jenkins.acme.com/sonarqube-webhook/".to_string(),
            project: None,
        });
        state.webhooks.push(MockWebhook {
            key: "WH0101".to_string(),
            name: "deploy".to_string(),
            url: "https://deploy.acme.com/hook".to_string(),
            project: Some("acme-web".to_string()),
        });
        state
    }

    /// A community edition platform: no branches, no portfolios.
    pub fn community_scenario() -> MockState {
        MockState::new()
            .with_edition("community")
            .with_project(Self::analyzed_project("solo", "Solo", 1, 800))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_scenario_is_consistent() {
        let state = Fixtures::default_scenario();
        for portfolio in state.portfolios.values() {
            if let Some(parent) = &portfolio.parent {
                assert!(state.portfolios.contains_key(parent), "{} has no parent", portfolio.key);
            }
            for reference in &portfolio.references {
                assert!(state.portfolios.contains_key(reference));
            }
        }
        assert_eq!(state.children("ALL").len(), 1);
        assert!(state.get_project("acme-legacy").unwrap().last_analysis_date.is_none());
        assert_eq!(state.portfolio_projects("ALL").len(), 3);
    }

    #[test]
    fn test_days_ago_parses_as_platform_date() {
        assert!(crate::util::parse_date(&Fixtures::days_ago(3)).is_some());
    }
}
