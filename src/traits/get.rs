//! Get trait for fetching single objects.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::platform::Platform;

/// Fetch a single object by key.
///
/// Implementations go through the platform identity cache, so two lookups
/// of the same key return the same `Arc`.
///
/// # Example
///
/// ```ignore
/// use sonar_config::{Platform, Project, Get};
///
/// let platform = Platform::from_env()?;
/// let project = Project::get(&platform, "my_project".to_string()).await?;
/// ```
#[async_trait]
pub trait Get: Sized {
    /// The key type for this object.
    type Id;

    /// Fetch the object by key.
    ///
    /// # Errors
    ///
    /// [`crate::SonarError::NotFound`] if the object does not exist, or the
    /// error of the failed request.
    async fn get(platform: &Platform, id: Self::Id) -> Result<Arc<Self>>;
}
