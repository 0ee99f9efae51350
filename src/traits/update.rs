//! Update trait for applying configuration to an existing object.

use async_trait::async_trait;

use crate::error::Result;

/// Apply configuration to an existing object.
///
/// Objects are shared, so updates go through `&self` and refresh any state
/// they change.
///
/// # Example
///
/// ```ignore
/// use serde_json::json;
/// use sonar_config::{Platform, Project, Get, Update};
///
/// let platform = Platform::from_env()?;
/// let project = Project::get(&platform, "my_project".to_string()).await?;
/// project.update(&json!({"tags": "backend, java"})).await?;
/// ```
#[async_trait]
pub trait Update {
    /// Configuration document type.
    type Params: Sync;

    /// Apply `params` to the object.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is malformed or a request fails.
    async fn update(&self, params: &Self::Params) -> Result<()>;
}
