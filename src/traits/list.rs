//! List trait for fetching collections of objects.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::pagination::Page;
use crate::platform::Platform;

/// Default page size for list operations.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Maximum pages to fetch (safety limit).
const MAX_PAGES: u32 = 1000;

/// List objects with pagination support.
///
/// # Example
///
/// ```ignore
/// use sonar_config::{Platform, Project, List};
///
/// let platform = Platform::from_env()?;
/// let page = Project::list_page(&platform, &Default::default(), 1, 50).await?;
/// let all_projects = Project::list_all(&platform, &Default::default()).await?;
/// ```
#[async_trait]
pub trait List: Sized + Send + Sync {
    /// Query parameters for filtering.
    type Query: Default + Send + Sync;

    /// List objects matching the query (single page).
    ///
    /// * `page` - Page number (1-indexed)
    /// * `count` - Number of items per page
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    async fn list_page(
        platform: &Platform,
        query: &Self::Query,
        page: u32,
        count: u32,
    ) -> Result<Page<Arc<Self>>>;

    /// List all objects matching the query, fetching every page.
    ///
    /// # Errors
    ///
    /// Returns an error if any page request fails.
    async fn list_all(platform: &Platform, query: &Self::Query) -> Result<Vec<Arc<Self>>> {
        let mut all_items = Vec::new();
        let mut page = 1;

        loop {
            let result = Self::list_page(platform, query, page, DEFAULT_PAGE_SIZE).await?;
            let items_count = result.items.len();
            all_items.extend(result.items);

            if !result.has_more || items_count < DEFAULT_PAGE_SIZE as usize {
                break;
            }
            page += 1;

            if page > MAX_PAGES {
                tracing::warn!("Reached pagination limit of {} pages, stopping", MAX_PAGES);
                break;
            }
        }

        Ok(all_items)
    }
}
