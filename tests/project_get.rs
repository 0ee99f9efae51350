//! Execution tests for reading projects.
//!
//! Uses wiremock to mock the SonarQube web API and test actual execution flow.

use sonar_config::{Get, Platform, Project, SonarError};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn search_body(key: &str, name: &str, last_analysis: Option<&str>) -> serde_json::Value {
    let mut component = serde_json::json!({
        "key": key,
        "name": name,
        "qualifier": "TRK",
        "visibility": "private",
    });
    if let Some(date) = last_analysis {
        component["lastAnalysisDate"] = serde_json::json!(date);
    }
    serde_json::json!({
        "paging": {"pageIndex": 1, "pageSize": 100, "total": 1},
        "components": [component],
    })
}

async fn mount_project(server: &MockServer, key: &str) {
    Mock::given(method("GET"))
        .and(path("/api/projects/search"))
        .and(query_param("projects", key))
        .respond_with(ResponseTemplate::new(200).set_body_json(search_body(key, "My Project", None)))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_get_project_returns_data() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/projects/search"))
        .and(query_param("projects", "my-project"))
        .respond_with(ResponseTemplate::new(200).set_body_json(search_body(
            "my-project",
            "My Project",
            Some("2024-03-18T15:01:47+0100"),
        )))
        .expect(1)
        .mount(&mock_server)
        .await;

    let platform = Platform::connect(&mock_server.uri(), "test-token").unwrap();
    let project = Project::get(&platform, "my-project".to_string()).await.unwrap();

    assert_eq!(project.key(), "my-project");
    assert_eq!(project.name(), "My Project");
    assert_eq!(project.visibility(), "private");
    assert!(project.last_analysis().await.unwrap().is_some());

    // Second read is served from the platform cache
    let again = Project::get(&platform, "my-project".to_string()).await.unwrap();
    assert!(std::sync::Arc::ptr_eq(&project, &again));
}

#[tokio::test]
async fn test_get_missing_project_is_not_found() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/projects/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "paging": {"pageIndex": 1, "pageSize": 100, "total": 0},
            "components": []
        })))
        .mount(&mock_server)
        .await;

    let platform = Platform::connect(&mock_server.uri(), "test-token").unwrap();
    let err = Project::get(&platform, "ghost".to_string()).await.unwrap_err();

    assert!(err.is_not_found());
    assert_eq!(err.exit_code(), 3);
}

#[tokio::test]
async fn test_api_error_message_is_extracted() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/projects/search"))
        .respond_with(ResponseTemplate::new(403).set_body_json(serde_json::json!({
            "errors": [{"msg": "Insufficient privileges"}]
        })))
        .mount(&mock_server)
        .await;

    let platform = Platform::connect(&mock_server.uri(), "test-token").unwrap();
    let err = Project::get(&platform, "secret".to_string()).await.unwrap_err();

    match &err {
        SonarError::ApiError { message, status_code } => {
            assert_eq!(message, "Insufficient privileges");
            assert_eq!(*status_code, Some(403));
        }
        other => panic!("Expected ApiError, got {other:?}"),
    }
    assert_eq!(err.exit_code(), 1);
}

#[tokio::test]
async fn test_rate_limit_reports_retry_after() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/projects/search"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "30"))
        .mount(&mock_server)
        .await;

    let platform = Platform::connect(&mock_server.uri(), "test-token").unwrap();
    let err = Project::get(&platform, "busy".to_string()).await.unwrap_err();

    assert!(matches!(err, SonarError::RateLimited { retry_after_secs: Some(30) }));
}

#[tokio::test]
async fn test_unbound_project_has_no_binding() {
    let mock_server = MockServer::start().await;
    mount_project(&mock_server, "my-project").await;

    Mock::given(method("GET"))
        .and(path("/api/alm_settings/get_binding"))
        .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
            "errors": [{"msg": "Project 'my-project' is not bound to any DevOps Platform"}]
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let platform = Platform::connect(&mock_server.uri(), "test-token").unwrap();
    let project = Project::get(&platform, "my-project".to_string()).await.unwrap();

    assert!(project.binding().await.unwrap().is_none());
    // Absence is cached too
    assert!(!project.has_binding().await.unwrap());
}

#[tokio::test]
async fn test_binding_unsupported_by_edition_is_none() {
    let mock_server = MockServer::start().await;
    mount_project(&mock_server, "my-project").await;

    Mock::given(method("GET"))
        .and(path("/api/alm_settings/get_binding"))
        .respond_with(ResponseTemplate::new(400))
        .mount(&mock_server)
        .await;

    let platform = Platform::connect(&mock_server.uri(), "test-token").unwrap();
    let project = Project::get(&platform, "my-project".to_string()).await.unwrap();

    assert!(project.binding().await.unwrap().is_none());
}

#[tokio::test]
async fn test_github_binding_key() {
    let mock_server = MockServer::start().await;
    mount_project(&mock_server, "my-project").await;

    Mock::given(method("GET"))
        .and(path("/api/alm_settings/get_binding"))
        .and(query_param("project", "my-project"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "key": "gh-acme",
            "alm": "github",
            "repository": "acme/my-project",
            "url": "https://api.github.com",
            "monorepo": false,
            "summaryCommentEnabled": true
        })))
        .mount(&mock_server)
        .await;

    let platform = Platform::connect(&mock_server.uri(), "test-token").unwrap();
    let project = Project::get(&platform, "my-project".to_string()).await.unwrap();

    let binding = project.binding().await.unwrap().unwrap();
    assert_eq!(binding.repository.as_deref(), Some("acme/my-project"));
    assert_eq!(
        project.binding_key().await.unwrap().as_deref(),
        Some("gh-acme:::acme/my-project")
    );
    assert!(!project.is_part_of_monorepo().await.unwrap());
}

#[tokio::test]
async fn test_validate_credentials_does_not_use_token() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/authentication/validate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"valid": true})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let platform = Platform::connect(&mock_server.uri(), "test-token").unwrap();
    assert!(platform.client().validate_credentials("admin", "admin").await.unwrap());
}

#[test]
fn test_unreachable_platform_is_transport_error() {
    let platform = Platform::connect("http://127.0.0.1:1", "test-token").unwrap();

    let err = tokio_test::block_on(platform.version()).unwrap_err();

    assert!(matches!(err, SonarError::HttpError(_)));
    assert_eq!(err.exit_code(), 1);
}
