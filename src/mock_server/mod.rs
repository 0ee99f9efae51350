//! Mock SonarQube server for E2E testing.
//!
//! This module provides an in-memory mock server that simulates the SonarQube
//! web API for integration and end-to-end testing. Unlike wiremock which mocks
//! at the HTTP level per-test, this server maintains state across requests,
//! so an import followed by an export reads back what was written.
//!
//! # Example
//!
//! ```ignore
//! use sonar_config::mock_server::MockServer;
//! use sonar_config::{Get, Platform, Project};
//!
//! #[tokio::test]
//! async fn test_workflow() {
//!     let server = MockServer::start().await;
//!     let platform = Platform::connect(server.url(), "test-token").unwrap();
//!
//!     // Server comes with default fixtures
//!     let project = Project::get(&platform, "acme-web".to_string()).await.unwrap();
//!     assert_eq!(project.name(), "Acme Web");
//!
//!     server.shutdown().await;
//! }
//! ```

mod fixtures;
mod handlers;
mod server;
mod state;

pub use fixtures::Fixtures;
pub use server::MockServer;
pub use state::{
    MockBranch, MockLink, MockPermissions, MockPortfolio, MockProject, MockSelection, MockState, MockTemplate,
    MockWebhook, GLOBAL_SCOPE,
};
