//! E2E tests using the mock SonarQube server.
//!
//! These tests exercise full workflows against the mock server,
//! testing realistic scenarios rather than individual endpoints.

#![cfg(feature = "test-server")]

use std::time::Duration;

use serde_json::{json, Value};
use sonar_config::mock_server::{Fixtures, MockSelection, MockServer, MockState};
use sonar_config::models::devops;
use sonar_config::models::task::TaskStatus;
use sonar_config::{
    audit_all, audit_projects, export_config, export_projects_zip, import_config, AuditSettings, ExportOptions,
    ExportStatus, Get, Platform, Portfolio, Problem, Project, RuleId, Severity, SonarError,
};

fn connect(server: &MockServer) -> Platform {
    Platform::connect(server.url(), "test-token").unwrap()
}

fn count(problems: &[Problem], rule: RuleId, key: &str) -> usize {
    problems
        .iter()
        .filter(|p| p.rule == Some(rule) && p.message.contains(&format!("'{key}'")))
        .count()
}

fn keys(keys: &[&str]) -> Vec<String> {
    keys.iter().map(|k| k.to_string()).collect()
}

// =============================================================================
// Server Lifecycle Tests
// =============================================================================

#[tokio::test]
async fn test_server_starts_on_random_port() {
    let server1 = MockServer::start().await;
    let server2 = MockServer::start().await;

    // Both servers should have different URLs
    assert_ne!(server1.url(), server2.url());

    server1.shutdown().await;
    server2.shutdown().await;
}

#[tokio::test]
async fn test_server_shutdown_is_clean() {
    let server = MockServer::start().await;
    let url = server.url().to_string();

    server.shutdown().await;

    // After shutdown, server should not respond
    let client = reqwest::Client::new();
    let result = client.get(format!("{}/health", url)).send().await;

    assert!(result.is_err());
}

// =============================================================================
// Export Tests
// =============================================================================

#[tokio::test]
async fn test_export_contains_all_sections() {
    let server = MockServer::start().await;
    let platform = connect(&server);

    let doc = export_config(&platform, &ExportOptions::default()).await.unwrap();

    assert_eq!(doc["platform"]["version"], "9.9.0");
    assert!(doc["projects"].get("acme-web").is_some());
    assert!(doc["projects"].get("acme-legacy").is_some());
    // Redundant key is dropped from each entry
    assert!(doc["projects"]["acme-web"].get("key").is_none());
    // Standard sub-portfolios only appear under their root
    let portfolios = doc["portfolios"].as_object().unwrap();
    assert!(portfolios.contains_key("ALL"));
    assert!(portfolios.contains_key("OTHER"));
    assert!(!portfolios.contains_key("TEAM_A"));
    assert!(doc["portfolios"]["ALL"]["subPortfolios"].get("TEAM_A").is_some());
    assert_eq!(doc["portfolios"]["ALL"]["subPortfolios"]["OTHER"]["byReference"], true);

    server.shutdown().await;
}

#[tokio::test]
async fn test_export_project_configuration() {
    let server = MockServer::start().await;
    let platform = connect(&server);

    let project = Project::get(&platform, "acme-web".to_string()).await.unwrap();
    let exported = project.export(None, false, false).await.unwrap();

    assert_eq!(exported["qualityGate"], "Acme strict");
    assert_eq!(exported["binding"]["repository"], "acme/acme-web");
    assert!(exported["tags"].as_str().unwrap().contains("front"));

    server.shutdown().await;
}

#[tokio::test]
async fn test_export_with_keys_skips_global_sections() {
    let server = MockServer::start().await;
    let platform = connect(&server);

    let options = ExportOptions {
        keys: Some(vec!["acme-api".to_string()]),
        ..Default::default()
    };
    let doc = export_config(&platform, &options).await.unwrap();

    assert!(doc.get("generalSettings").is_none());
    let projects = doc["projects"].as_object().unwrap();
    assert_eq!(projects.len(), 1);
    assert!(projects.contains_key("acme-api"));

    server.shutdown().await;
}

#[tokio::test]
async fn test_community_edition_has_no_portfolios_section() {
    let server = MockServer::with_state(Fixtures::community_scenario()).await;
    let platform = connect(&server);

    let doc = export_config(&platform, &ExportOptions::default()).await.unwrap();

    assert!(doc.get("portfolios").is_none());
    assert!(doc["projects"].get("solo").is_some());

    server.shutdown().await;
}

// =============================================================================
// Import Tests
// =============================================================================

#[tokio::test]
async fn test_export_import_export_is_stable() {
    let server = MockServer::start().await;

    let first = export_config(&connect(&server), &ExportOptions::default()).await.unwrap();
    import_config(&connect(&server), &first, None).await.unwrap();
    // Fresh platform: nothing served from the caches of the first export
    let second = export_config(&connect(&server), &ExportOptions::default()).await.unwrap();

    assert_eq!(first["projects"], second["projects"]);
    assert_eq!(first["portfolios"], second["portfolios"]);

    server.shutdown().await;
}

#[tokio::test]
async fn test_portfolios_reproduced_on_empty_platform() {
    let source = MockServer::start().await;
    let target = MockServer::start_empty().await;

    let doc = export_config(&connect(&source), &ExportOptions::default()).await.unwrap();
    import_config(&connect(&target), &doc, None).await.unwrap();
    let copy = export_config(&connect(&target), &ExportOptions::default()).await.unwrap();

    assert_eq!(doc["portfolios"], copy["portfolios"]);
    {
        let state = target.state();
        let state = state.read().await;
        assert_eq!(state.get_portfolio("TEAM_A").unwrap().parent.as_deref(), Some("ALL"));
        assert!(state.get_project("acme-web").is_some());
    }

    source.shutdown().await;
    target.shutdown().await;
}

#[tokio::test]
async fn test_import_leaves_referenced_portfolio_untouched() {
    let server = MockServer::start().await;
    let platform = connect(&server);

    let mut doc = export_config(&platform, &ExportOptions::default()).await.unwrap();
    // Configuration under a reference must not be applied to the target
    doc["portfolios"]["ALL"]["subPortfolios"]["OTHER"]["projectSelectionMode"] = json!("REGEXP");
    doc["portfolios"]["ALL"]["subPortfolios"]["OTHER"]["projectSelectionRegexp"] = json!(".*");

    let keys = vec!["ALL".to_string()];
    import_config(&connect(&server), &doc, Some(&keys)).await.unwrap();

    let state = server.state();
    let state = state.read().await;
    let other = state.get_portfolio("OTHER").unwrap();
    assert!(matches!(&other.selection, MockSelection::Tags { tags, .. } if tags == &["front".to_string()]));

    server.shutdown().await;
}

#[tokio::test]
async fn test_import_creates_missing_project() {
    let server = MockServer::start_empty().await;
    let platform = connect(&server);

    let doc = json!({
        "projects": {
            "new-app": {
                "name": "New App",
                "visibility": "private",
                "tags": "alpha,beta",
            }
        }
    });
    import_config(&platform, &doc, None).await.unwrap();

    let state = server.state();
    let state = state.read().await;
    let project = state.get_project("new-app").unwrap();
    assert_eq!(project.name, "New App");
    assert_eq!(project.visibility, "private");
    assert_eq!(project.tags, vec!["alpha".to_string(), "beta".to_string()]);

    server.shutdown().await;
}

#[tokio::test]
async fn test_import_skips_informational_fields() {
    let server = MockServer::start().await;
    let platform = connect(&server);

    let doc = json!({
        "projects": {
            "acme-web": {
                "_lastAnalysis": "2024-03-18T15:01:47+0100",
                "_ncloc": 12000,
                "sonar.cpd.exclusions": "**/generated/**",
            }
        }
    });
    import_config(&platform, &doc, None).await.unwrap();

    let state = server.state();
    let state = state.read().await;
    let settings = &state.get_project("acme-web").unwrap().settings;
    assert!(settings.contains_key("sonar.cpd.exclusions"));
    assert!(!settings.keys().any(|k| k.starts_with('_')));

    server.shutdown().await;
}

// =============================================================================
// Portfolio Workflow Tests
// =============================================================================

#[tokio::test]
async fn test_selection_mode_change_clears_previous_selection() {
    let server = MockServer::start().await;
    let platform = connect(&server);

    let other = Portfolio::get(&platform, "OTHER".to_string()).await.unwrap();
    other.set_regexp_mode("^acme-web$", None).await.unwrap();

    {
        let state = server.state();
        let state = state.read().await;
        match &state.get_portfolio("OTHER").unwrap().selection {
            MockSelection::Regexp { regexp, branch } => {
                assert_eq!(regexp, "^acme-web$");
                assert!(branch.is_none());
            }
            other => panic!("Expected regexp selection, got {other:?}"),
        }
    }

    let refreshed = Portfolio::get(&platform, "OTHER".to_string()).await.unwrap();
    refreshed.refresh().await.unwrap();
    assert!(refreshed.tags().is_none());
    assert_eq!(refreshed.regexp().as_deref(), Some("^acme-web$"));

    server.shutdown().await;
}

#[tokio::test]
async fn test_portfolio_counts_follow_selection() {
    let server = MockServer::start().await;
    let platform = connect(&server);

    let team = Portfolio::get(&platform, "TEAM_A".to_string()).await.unwrap();
    assert_eq!(team.nbr_projects().await.unwrap(), 3);
    let empty = Portfolio::get(&platform, "EMPTY".to_string()).await.unwrap();
    assert_eq!(empty.nbr_projects().await.unwrap(), 0);

    server.shutdown().await;
}

// =============================================================================
// Audit Workflow Tests
// =============================================================================

#[tokio::test]
async fn test_audit_finds_project_and_portfolio_problems() {
    let server = MockServer::start().await;
    let platform = connect(&server);

    let problems = audit_all(&platform, &AuditSettings::default(), None).await.unwrap();

    assert_eq!(count(&problems, RuleId::ProjNotAnalyzed, "acme-legacy"), 1);
    assert_eq!(count(&problems, RuleId::ProjMainAndMaster, "acme-api"), 1);
    assert_eq!(count(&problems, RuleId::PortfolioEmpty, "EMPTY"), 1);
    assert_eq!(count(&problems, RuleId::ProjNotAnalyzed, "acme-web"), 0);
    assert_eq!(count(&problems, RuleId::ProjMainAndMaster, "acme-web"), 0);
    // acme-web has a working binding
    assert_eq!(count(&problems, RuleId::ProjInvalidBinding, "acme-web"), 0);

    let stale = problems
        .iter()
        .find(|p| p.rule == Some(RuleId::ProjLastAnalysis) && p.message.contains("'acme-api'"))
        .expect("acme-api last analysis is over a year old");
    assert_eq!(stale.severity, Severity::High);

    server.shutdown().await;
}

#[tokio::test]
async fn test_audit_restricted_to_keys() {
    let server = MockServer::start().await;
    let platform = connect(&server);

    let keys = vec!["acme-legacy".to_string()];
    let problems = audit_all(&platform, &AuditSettings::default(), Some(&keys)).await.unwrap();

    assert!(problems.iter().any(|p| p.rule == Some(RuleId::ProjNotAnalyzed)));
    assert!(!problems.iter().any(|p| p.message.contains("'acme-api'")));

    server.shutdown().await;
}

#[tokio::test]
async fn test_audit_policy_disables_checks() {
    let server = MockServer::start().await;
    let platform = connect(&server);

    let settings = AuditSettings::default()
        .with("audit.projects.neverAnalyzed", "no")
        .with("audit.portfolios.empty", "no");
    let problems = audit_all(&platform, &settings, None).await.unwrap();

    assert!(!problems.iter().any(|p| p.rule == Some(RuleId::ProjNotAnalyzed)));
    assert!(!problems.iter().any(|p| p.rule == Some(RuleId::PortfolioEmpty)));

    server.shutdown().await;
}

#[tokio::test]
async fn test_zero_loc_reported_on_community_edition() {
    let state = Fixtures::community_scenario().with_project(Fixtures::analyzed_project("void", "Void", 1, 0));
    let server = MockServer::with_state(state).await;
    let platform = connect(&server);

    let problems = audit_projects(&platform, &AuditSettings::default(), None).await.unwrap();

    assert_eq!(count(&problems, RuleId::ProjZeroLoc, "void"), 1);
    assert_eq!(count(&problems, RuleId::ProjZeroLoc, "solo"), 0);

    server.shutdown().await;
}

#[tokio::test]
async fn test_zero_loc_left_to_branch_audit_when_enabled() {
    let state = Fixtures::default_scenario().with_project(Fixtures::analyzed_project("void", "Void", 1, 0));
    let server = MockServer::with_state(state).await;
    let platform = connect(&server);
    let void = keys(&["void"]);

    let problems = audit_projects(&platform, &AuditSettings::default(), Some(&void)).await.unwrap();
    assert_eq!(count(&problems, RuleId::ProjZeroLoc, "void"), 0);

    let settings = AuditSettings::default().with("audit.projects.branches", "false");
    let problems = audit_projects(&platform, &settings, Some(&void)).await.unwrap();
    assert_eq!(count(&problems, RuleId::ProjZeroLoc, "void"), 1);

    server.shutdown().await;
}

#[tokio::test]
async fn test_invalid_binding_is_reported() {
    let server = MockServer::start().await;
    server
        .state()
        .write()
        .await
        .projects
        .get_mut("acme-web")
        .unwrap()
        .binding_valid = false;
    let platform = connect(&server);

    let web = keys(&["acme-web"]);
    let problems = audit_projects(&platform, &AuditSettings::default(), Some(&web)).await.unwrap();
    assert_eq!(count(&problems, RuleId::ProjInvalidBinding, "acme-web"), 1);

    let settings = AuditSettings::default().with("audit.projects.bindings.validation", "no");
    let problems = audit_projects(&platform, &settings, Some(&web)).await.unwrap();
    assert_eq!(count(&problems, RuleId::ProjInvalidBinding, "acme-web"), 0);

    server.shutdown().await;
}

#[tokio::test]
async fn test_duplicate_binding_and_key_are_reported_once() {
    let mut copy = Fixtures::configured_project("acme-web-v2", "Acme Web v2");
    copy.binding = Fixtures::configured_project("acme-web", "Acme Web").binding;
    let state = Fixtures::default_scenario().with_project(copy);
    let server = MockServer::with_state(state).await;
    let platform = connect(&server);
    let web = keys(&["acme-web", "acme-web-v2"]);

    let problems = audit_projects(&platform, &AuditSettings::default(), Some(&web)).await.unwrap();
    let shared: Vec<&Problem> = problems
        .iter()
        .filter(|p| p.rule == Some(RuleId::ProjDuplicateBinding))
        .collect();
    assert_eq!(shared.len(), 1);
    assert!(shared[0].message.contains("'acme-web'"));
    assert!(shared[0].message.contains("'acme-web-v2'"));
    // Key duplicates are off by default
    assert!(!problems.iter().any(|p| p.rule == Some(RuleId::ProjDuplicate)));

    let settings = AuditSettings::default().with("audit.projects.duplicates", "yes");
    let problems = audit_projects(&platform, &settings, Some(&web)).await.unwrap();
    assert_eq!(count(&problems, RuleId::ProjDuplicate, "acme-web-v2"), 1);

    server.shutdown().await;
}

#[tokio::test]
async fn test_utility_locs_reported_when_enabled() {
    let mut config = Fixtures::analyzed_project("acme-config", "Acme Config", 1, 110_000);
    config.language_distribution = Some("xml=80000;json=10000;java=20000".to_string());
    let state = Fixtures::default_scenario().with_project(config);
    let server = MockServer::with_state(state).await;
    let platform = connect(&server);
    let only = keys(&["acme-config"]);

    let problems = audit_projects(&platform, &AuditSettings::default(), Some(&only)).await.unwrap();
    assert_eq!(count(&problems, RuleId::ProjUtilityLocs, "acme-config"), 0);

    let settings = AuditSettings::default().with("audit.projects.utilityLocs", "yes");
    let problems = audit_projects(&platform, &settings, Some(&only)).await.unwrap();
    let utility: Vec<&Problem> = problems
        .iter()
        .filter(|p| p.rule == Some(RuleId::ProjUtilityLocs))
        .collect();
    assert_eq!(utility.len(), 1);
    assert!(utility[0].message.contains("90000"));

    server.shutdown().await;
}

// =============================================================================
// Zip Export Tests
// =============================================================================

#[tokio::test]
async fn test_zip_export_reports_dump_file() {
    let server = MockServer::start().await;
    let platform = connect(&server);

    let keys = vec!["acme-web".to_string()];
    let report = export_projects_zip(&platform, Some(&keys), Duration::from_secs(5), 2)
        .await
        .unwrap();

    let entries = report["project_exports"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["status"], "SUCCESS");
    assert_eq!(entries[0]["file"], "acme-web.zip");
    assert_eq!(report["platform"]["version"], "9.9");

    server.shutdown().await;
}

#[tokio::test]
async fn test_zip_export_times_out() {
    let state: MockState = Fixtures::default_scenario().with_dump_task_status("IN_PROGRESS");
    let server = MockServer::with_state(state).await;
    let platform = connect(&server);

    let project = Project::get(&platform, "acme-api".to_string()).await.unwrap();
    let export = project.export_zip(Duration::from_secs(1)).await.unwrap();

    assert_eq!(export.status, ExportStatus::Done(TaskStatus::Timeout));
    assert!(export.file.is_none());
    assert!(!export.is_success());

    server.shutdown().await;
}

#[tokio::test]
async fn test_zip_export_of_missing_project_is_http_error() {
    let server = MockServer::start().await;
    let platform = connect(&server);

    let project = Project::get(&platform, "acme-web".to_string()).await.unwrap();
    server.state().write().await.projects.remove("acme-web");
    let export = project.export_zip(Duration::from_secs(1)).await.unwrap();

    assert!(matches!(export.status, ExportStatus::HttpError(404)));

    server.shutdown().await;
}

#[tokio::test]
async fn test_async_export_then_zip_import() {
    let server = MockServer::start().await;
    let platform = connect(&server);
    let project = Project::get(&platform, "acme-api".to_string()).await.unwrap();

    // No dump on the platform yet
    assert_eq!(project.import_zip().await.unwrap(), 400);

    let task_id = project.export_async().await.unwrap();
    assert_eq!(server.state().read().await.tasks.get(&task_id).map(String::as_str), Some("SUCCESS"));
    assert_eq!(project.import_zip().await.unwrap(), 200);

    server.shutdown().await;
}

#[tokio::test]
async fn test_zip_import_requires_enterprise_edition() {
    let server = MockServer::with_state(Fixtures::community_scenario()).await;
    let platform = connect(&server);
    let project = Project::get(&platform, "solo".to_string()).await.unwrap();

    let err = project.import_zip().await.unwrap_err();

    assert!(matches!(err, SonarError::UnsupportedOperation(_)));
    assert_eq!(err.exit_code(), 4);

    server.shutdown().await;
}

// =============================================================================
// Lookup Tests
// =============================================================================

#[tokio::test]
async fn test_portfolio_search_by_exact_name() {
    let server = MockServer::start().await;
    let platform = connect(&server);

    // "Team A" is also a prefix of "Team A web"
    let found = Portfolio::search_by_name(&platform, "Team A").await.unwrap().unwrap();
    assert_eq!(found["key"], "TEAM_A");
    assert!(Portfolio::search_by_name(&platform, "Team B").await.unwrap().is_none());

    server.shutdown().await;
}

#[tokio::test]
async fn test_devops_platform_exists() {
    let server = MockServer::start().await;
    let platform = connect(&server);

    assert!(devops::platform_exists(&platform, "gh-acme").await.unwrap());
    assert!(!devops::platform_exists(&platform, "gl-acme").await.unwrap());

    server.shutdown().await;
}

#[tokio::test]
async fn test_platform_database_from_system_info() {
    let server = MockServer::start().await;
    let platform = connect(&server);

    assert_eq!(platform.database().await.unwrap(), "PostgreSQL");

    server.shutdown().await;
}

#[tokio::test]
async fn test_basics_of_imported_document_are_ignored() {
    let server = MockServer::start().await;
    let platform = connect(&server);

    let doc: Value = json!({"platform": {"version": "8.9.0", "edition": "community"}});
    import_config(&platform, &doc, None).await.unwrap();

    assert_eq!(connect(&server).version_string(3).await.unwrap(), "9.9.0");

    server.shutdown().await;
}
