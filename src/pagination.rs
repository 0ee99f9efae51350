//! Pagination utilities for SonarQube API responses.

use serde::{Deserialize, Serialize};

/// Largest page size accepted by the search endpoints.
pub const MAX_PAGE_SIZE: u32 = 500;

/// A page of results from the SonarQube API.
#[derive(Debug, Clone, Serialize)]
#[serde(bound = "T: Serialize")]
pub struct Page<T> {
    /// The items on this page.
    pub items: Vec<T>,
    /// Total number of items across all pages (if known).
    pub total: Option<u64>,
    /// Current page number (1-indexed).
    pub page: u32,
    /// Number of items per page.
    pub page_size: u32,
    /// Whether there are more pages.
    pub has_more: bool,
}

impl<T> Page<T> {
    /// Create a new page from items and pagination info.
    #[must_use]
    pub fn new(items: Vec<T>, page: u32, page_size: u32, total: Option<u64>) -> Self {
        let has_more = match total {
            Some(t) => (u64::from(page) * u64::from(page_size)) < t,
            None => items.len() >= page_size as usize,
        };
        Self {
            items,
            total,
            page,
            page_size,
            has_more,
        }
    }

    /// Map the items to a different type.
    #[must_use]
    pub fn map<U, F: FnMut(T) -> U>(self, f: F) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            page_size: self.page_size,
            has_more: self.has_more,
        }
    }

    /// Returns true if this page has no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns the number of items on this page.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns an iterator over the items in this page.
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }
}

impl<T> IntoIterator for Page<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a, T> IntoIterator for &'a Page<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// The `paging` block returned by search endpoints.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Paging {
    #[serde(default)]
    pub page_index: u32,
    #[serde(default)]
    pub page_size: u32,
    #[serde(default)]
    pub total: u64,
}

impl Paging {
    /// Build a page from the items returned alongside this paging block.
    pub fn into_page<T>(self, items: Vec<T>, page: u32, page_size: u32) -> Page<T> {
        Page::new(items, page, page_size, Some(self.total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_has_more_with_total() {
        // Page 1 of 3 (total 1100, 500 per page)
        let page: Page<i32> = Page::new(vec![1; 500], 1, 500, Some(1100));
        assert!(page.has_more);

        // Page 3 of 3
        let page: Page<i32> = Page::new(vec![1; 100], 3, 500, Some(1100));
        assert!(!page.has_more);
    }

    #[test]
    fn test_page_has_more_without_total() {
        let page: Page<i32> = Page::new(vec![1; 100], 1, 100, None);
        assert!(page.has_more);

        let page: Page<i32> = Page::new(vec![1; 50], 1, 100, None);
        assert!(!page.has_more);
    }

    #[test]
    fn test_paging_deserializes_platform_envelope() {
        let paging: Paging =
            serde_json::from_str(r#"{"pageIndex": 2, "pageSize": 50, "total": 120}"#).unwrap();
        let page = paging.into_page(vec![0; 50], 2, 50);
        assert_eq!(page.total, Some(120));
        assert!(page.has_more);
    }
}
