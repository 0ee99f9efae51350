//! Execution tests for batch project audits.
//!
//! Uses wiremock so that single endpoints can fail for single projects.

use sonar_config::{audit_projects, AuditSettings, Platform, RuleId};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mount_platform(server: &MockServer, edition: &str, keys: &[&str]) {
    Mock::given(method("GET"))
        .and(path("/api/system/info"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "System": {"Version": "9.9.0", "Server ID": "ABCD-1234"},
            "Statistics": {"edition": edition, "plugins": []}
        })))
        .mount(server)
        .await;

    let components: Vec<serde_json::Value> = keys
        .iter()
        .map(|key| serde_json::json!({"key": key, "name": key, "qualifier": "TRK", "visibility": "private"}))
        .collect();
    Mock::given(method("GET"))
        .and(path("/api/projects/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "paging": {"pageIndex": 1, "pageSize": 500, "total": keys.len()},
            "components": components,
        })))
        .mount(server)
        .await;
}

async fn mount_binding(server: &MockServer, key: &str, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path("/api/alm_settings/get_binding"))
        .and(query_param("project", key))
        .respond_with(response)
        .mount(server)
        .await;
}

fn github_binding(repository: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(serde_json::json!({
        "key": "gh-acme",
        "alm": "github",
        "repository": repository,
        "url": "https://api.github.com",
        "monorepo": false
    }))
}

#[tokio::test]
async fn test_binding_error_on_one_project_keeps_other_problems() {
    let mock_server = MockServer::start().await;
    mount_platform(&mock_server, "developer", &["bad", "good", "twin"]).await;
    mount_binding(&mock_server, "good", github_binding("acme/web")).await;
    mount_binding(&mock_server, "twin", github_binding("acme/web")).await;
    mount_binding(
        &mock_server,
        "bad",
        ResponseTemplate::new(500).set_body_json(serde_json::json!({"errors": [{"msg": "boom"}]})),
    )
    .await;

    let platform = Platform::connect(&mock_server.uri(), "test-token").unwrap();
    let problems = audit_projects(&platform, &AuditSettings::default(), None).await.unwrap();

    let duplicates: Vec<_> = problems
        .iter()
        .filter(|p| p.rule == Some(RuleId::ProjDuplicateBinding))
        .collect();
    assert_eq!(duplicates.len(), 1);
    assert!(duplicates[0].message.contains("'good'"));
    assert!(duplicates[0].message.contains("'twin'"));
}

#[tokio::test]
async fn test_monorepo_projects_may_share_a_repository() {
    let mock_server = MockServer::start().await;
    mount_platform(&mock_server, "enterprise", &["mono-a", "mono-b"]).await;
    for key in ["mono-a", "mono-b"] {
        mount_binding(
            &mock_server,
            key,
            ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "key": "gh-acme",
                "alm": "github",
                "repository": "acme/mono",
                "monorepo": true
            })),
        )
        .await;
    }

    let platform = Platform::connect(&mock_server.uri(), "test-token").unwrap();
    let problems = audit_projects(&platform, &AuditSettings::default(), None).await.unwrap();

    assert!(!problems.iter().any(|p| p.rule == Some(RuleId::ProjDuplicateBinding)));
}

#[tokio::test]
async fn test_bindings_not_audited_on_community_edition() {
    let mock_server = MockServer::start().await;
    mount_platform(&mock_server, "community", &["good", "twin"]).await;

    Mock::given(method("GET"))
        .and(path("/api/alm_settings/get_binding"))
        .respond_with(github_binding("acme/web"))
        .expect(0)
        .mount(&mock_server)
        .await;

    let platform = Platform::connect(&mock_server.uri(), "test-token").unwrap();
    let problems = audit_projects(&platform, &AuditSettings::default(), None).await.unwrap();

    assert!(!problems.iter().any(|p| p.rule == Some(RuleId::ProjDuplicateBinding)));
}
