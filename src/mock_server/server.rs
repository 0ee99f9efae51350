//! Mock SonarQube server.
//!
//! Provides an axum-based HTTP server that simulates the SonarQube web API.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use super::fixtures::Fixtures;
use super::handlers;
use super::state::MockState;

/// A mock SonarQube server for testing.
///
/// The server runs in the background and can be used to test the client
/// against a stateful implementation of the web API: what an import writes
/// is what the next export reads.
pub struct MockServer {
    /// The URL where the server is listening.
    url: String,
    /// Handle to the server task.
    handle: JoinHandle<()>,
    /// Shared state that can be modified during tests.
    state: Arc<RwLock<MockState>>,
}

impl MockServer {
    /// Start a new mock server with default fixtures.
    ///
    /// The server listens on a random available port and returns immediately.
    /// Use `url()` to get the server's base URL.
    pub async fn start() -> Self {
        Self::with_state(Fixtures::default_scenario()).await
    }

    /// Start a mock server with empty state.
    ///
    /// Useful when you want to control exactly what data is available.
    pub async fn start_empty() -> Self {
        Self::with_state(MockState::new()).await
    }

    /// Start a mock server with custom state.
    pub async fn with_state(state: MockState) -> Self {
        let shared_state = state.shared();
        let app = Self::create_router(shared_state.clone());

        // Bind to a random available port
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to address");
        let addr = listener.local_addr().expect("Failed to get local address");

        let handle = tokio::spawn(async move {
            axum::serve(listener, app)
                .await
                .expect("Server error");
        });

        Self {
            url: format!("http://{}", addr),
            handle,
            state: shared_state,
        }
    }

    /// Get the base URL of the mock server.
    ///
    /// Use this URL when connecting a `Platform` for testing.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Get access to the server's shared state.
    ///
    /// This allows modifying the mock data during a test.
    pub fn state(&self) -> Arc<RwLock<MockState>> {
        self.state.clone()
    }

    /// Shutdown the server.
    ///
    /// This aborts the server task. It's safe to call multiple times.
    pub async fn shutdown(self) {
        self.handle.abort();
        let _ = self.handle.await;
    }

    /// Create the axum router with all routes.
    fn create_router(state: Arc<RwLock<MockState>>) -> Router {
        Router::new()
            // Server
            .route("/api/server/version", get(handlers::server_version))
            .route("/api/system/info", get(handlers::system_info))
            .route("/api/system/status", get(handlers::system_status))
            .route("/api/authentication/validate", get(handlers::validate_credentials))
            // Settings
            .route("/api/settings/values", get(handlers::settings_values))
            .route("/api/settings/list_definitions", get(handlers::settings_definitions))
            .route("/api/settings/set", post(handlers::settings_set))
            .route("/api/settings/reset", post(handlers::settings_reset))
            .route("/api/new_code_periods/show", get(handlers::new_code_show))
            .route("/api/new_code_periods/set", post(handlers::new_code_set))
            // Webhooks
            .route("/api/webhooks/list", get(handlers::webhooks_list))
            .route("/api/webhooks/create", post(handlers::webhooks_create))
            .route("/api/webhooks/update", post(handlers::webhooks_update))
            // Permissions
            .route("/api/permissions/users", get(handlers::permission_users))
            .route("/api/permissions/groups", get(handlers::permission_groups))
            .route("/api/permissions/template_users", get(handlers::permission_users))
            .route("/api/permissions/template_groups", get(handlers::permission_groups))
            .route("/api/permissions/search_templates", get(handlers::search_templates))
            .route("/api/permissions/create_template", post(handlers::create_template))
            .route("/api/permissions/update_template", post(handlers::update_template))
            .route("/api/permissions/set_default_template", post(handlers::set_default_template))
            .route("/api/permissions/:action", post(handlers::permission_change))
            // DevOps platforms
            .route("/api/alm_settings/list_definitions", get(handlers::alm_definitions))
            .route("/api/alm_settings/get_binding", get(handlers::alm_get_binding))
            .route("/api/alm_settings/validate_binding", get(handlers::alm_validate_binding))
            .route("/api/alm_settings/:action", post(handlers::alm_action))
            // Projects
            .route("/api/projects/search", get(handlers::projects_search))
            .route("/api/projects/create", post(handlers::projects_create))
            .route("/api/projects/delete", post(handlers::projects_delete))
            .route("/api/projects/update_visibility", post(handlers::projects_update_visibility))
            .route("/api/components/show", get(handlers::components_show))
            .route("/api/project_tags/set", post(handlers::project_tags_set))
            .route("/api/project_links/search", get(handlers::project_links_search))
            .route("/api/project_links/create", post(handlers::project_links_create))
            .route("/api/project_branches/list", get(handlers::branches_list))
            .route("/api/project_branches/rename", post(handlers::branches_rename))
            .route("/api/project_pull_requests/list", get(handlers::pull_requests_list))
            .route("/api/qualitygates/get_by_project", get(handlers::gates_get_by_project))
            .route("/api/qualitygates/list", get(handlers::gates_list))
            .route("/api/qualitygates/select", post(handlers::gates_select))
            .route("/api/qualityprofiles/search", get(handlers::profiles_search))
            .route("/api/qualityprofiles/add_project", post(handlers::profiles_add_project))
            .route("/api/measures/component", get(handlers::measures_component))
            // Background tasks and dumps
            .route("/api/ce/task", get(handlers::ce_task))
            .route("/api/ce/component", get(handlers::ce_component))
            .route("/api/project_dump/export", post(handlers::dump_export))
            .route("/api/project_dump/status", get(handlers::dump_status))
            .route("/api/project_dump/import", post(handlers::dump_import))
            // Portfolios
            .route("/api/views/search", get(handlers::views_search))
            .route("/api/views/show", get(handlers::views_show))
            .route("/api/views/create", post(handlers::views_create))
            .route("/api/views/delete", post(handlers::views_delete))
            .route("/api/views/refresh", post(handlers::views_refresh))
            .route("/api/views/mode", post(handlers::views_mode))
            .route("/api/views/add_project", post(handlers::views_add_project))
            .route("/api/views/add_project_branch", post(handlers::views_add_project))
            .route("/api/views/add_portfolio", post(handlers::views_add_portfolio))
            .route("/api/views/add_local_view", post(handlers::views_add_local_view))
            .route("/api/views/add_sub_view", post(handlers::views_add_sub_view))
            .route("/api/views/:action", post(handlers::views_set_mode))
            // Health check
            .route("/health", get(health_check))
            .with_state(state)
    }
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "ok"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock_server::state::MockProject;
    use crate::{Get, List, Platform, Portfolio, Project};

    #[tokio::test]
    async fn test_server_starts_and_responds() {
        let server = MockServer::start().await;

        // Server should be accessible
        let client = reqwest::Client::new();
        let response = client
            .get(format!("{}/health", server.url()))
            .send()
            .await
            .expect("Failed to send request");

        assert!(response.status().is_success());
        assert_eq!(response.text().await.unwrap(), "ok");

        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_platform_basics() {
        let server = MockServer::start().await;
        let platform = Platform::connect(server.url(), "test-token").unwrap();

        assert_eq!(platform.version_string(3).await.unwrap(), "9.9.0");
        assert!(platform.edition().await.unwrap().is_enterprise_or_above());
        assert!(!platform.server_id().await.unwrap().is_empty());

        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_get_project() {
        let server = MockServer::start().await;
        let platform = Platform::connect(server.url(), "test-token").unwrap();

        let project = Project::get(&platform, "acme-web".to_string())
            .await
            .expect("Failed to get project");

        assert_eq!(project.name(), "Acme Web");
        assert!(project.last_analysis().await.unwrap().is_some());

        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_list_projects() {
        let server = MockServer::start().await;
        let platform = Platform::connect(server.url(), "test-token").unwrap();

        let page = Project::list_page(&platform, &Default::default(), 1, 2)
            .await
            .expect("Failed to list projects");

        assert_eq!(page.items.len(), 2);
        assert!(page.has_more);

        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_get_portfolio_loads_hierarchy() {
        let server = MockServer::start().await;
        let platform = Platform::connect(server.url(), "test-token").unwrap();

        let all = Portfolio::get(&platform, "ALL".to_string()).await.unwrap();
        assert_eq!(all.sub_portfolios().len(), 2);
        let team = Portfolio::get(&platform, "TEAM_A".to_string()).await.unwrap();
        assert!(team.is_sub_portfolio());
        assert_eq!(team.root_portfolio().unwrap().key(), "ALL");

        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_empty_server() {
        let server = MockServer::start_empty().await;
        let platform = Platform::connect(server.url(), "test-token").unwrap();

        let result = Project::get(&platform, "nonexistent".to_string()).await;

        assert!(result.unwrap_err().is_not_found());

        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_custom_state() {
        let state = MockState::new().with_project(MockProject::new("my-project", "My Custom Project"));

        let server = MockServer::with_state(state).await;
        let platform = Platform::connect(server.url(), "test-token").unwrap();

        let project = Project::get(&platform, "my-project".to_string())
            .await
            .expect("Failed to get project");

        assert_eq!(project.name(), "My Custom Project");
        assert_eq!(project.last_analysis().await.unwrap(), None);

        server.shutdown().await;
    }
}
