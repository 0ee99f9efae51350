//! SonarQube configuration client library.
//!
//! Export a platform configuration (global settings, permissions, templates,
//! DevOps platforms, projects and portfolios) to one JSON document, replay
//! such a document on another platform, and audit a platform against a
//! policy of thresholds and expected settings.
//!
//! # Quick Start
//!
//! ```no_run
//! use sonar_config::{AuditSettings, ExportOptions, Get, Platform, Project};
//!
//! #[tokio::main]
//! async fn main() -> sonar_config::Result<()> {
//!     // Connect using SONAR_HOST_URL and SONAR_TOKEN
//!     let platform = Platform::from_env()?;
//!     println!("SonarQube {}", platform.version().await?);
//!
//!     // Read one project
//!     let project = Project::get(&platform, "my-project".to_string()).await?;
//!     println!("{} last analyzed {:?}", project, project.last_analysis().await?);
//!
//!     // Export the whole configuration
//!     let doc = sonar_config::export_config(&platform, &ExportOptions::default()).await?;
//!     println!("{}", serde_json::to_string_pretty(&doc)?);
//!
//!     // Audit with the built-in policy
//!     let problems = sonar_config::audit_all(&platform, &AuditSettings::default(), None).await?;
//!     println!("{} problems", problems.len());
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! Objects are read through a [`Platform`], which caches one instance per
//! key for projects and portfolios. The operations objects support are
//! traits:
//!
//! - [`Get`] - Fetch a single object by key
//! - [`List`] - Fetch paginated collections of objects
//! - [`Update`] - Apply a configuration document to an object
//! - [`Audit`] - Check an object against an [`AuditSettings`] policy
//!
//! # Configuration
//!
//! - `SONAR_TOKEN` (required) - A user token
//! - `SONAR_HOST_URL` (optional) - Base URL (defaults to `http://localhost:9000`)

pub mod audit;
pub mod cli;
mod client;
mod config;
mod error;
pub mod models;
pub mod output;
mod pagination;
pub mod platform;
mod registry;
mod traits;
pub mod util;

#[cfg(feature = "test-server")]
pub mod mock_server;

// Re-export core types
pub use client::{normalize_api, SonarClient};
pub use error::{Result, SonarError};
pub use pagination::{Page, Paging};
pub use platform::{Edition, Platform, Version};

// Re-export traits
pub use traits::{Audit, Get, List, Update};

// Re-export the audit engine
pub use audit::{AuditSettings, Problem, ProblemType, RuleId, Severity};

// Re-export models
pub use models::portfolio::{PortfolioQuery, Selection, SelectionMode, SubPortfolio};
pub use models::project::{Binding, ExportStatus, ProjectQuery, ZipExport};
pub use models::{KeyRef, Portfolio, Project};

// Re-export whole-document operations
pub use config::{audit_all, export_config, import_config, ExportOptions};
pub use models::portfolio::{audit_portfolios, export_portfolios, import_portfolios};
pub use models::project::{audit_projects, export_projects, export_projects_zip, import_projects};
