//! Per-platform identity cache for configuration objects, and resettable
//! lazy values.

use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;

use crate::error::Result;

/// Identity cache mapping an object key to its shared instance.
///
/// Lookups by the same key return the same `Arc`. Insertion is atomic, so
/// two tasks creating the same key concurrently end up sharing one instance.
/// Entries are only evicted by [`ObjectCache::remove`].
#[derive(Debug)]
pub struct ObjectCache<T> {
    objects: DashMap<String, Arc<T>>,
}

impl<T> Default for ObjectCache<T> {
    fn default() -> Self {
        Self {
            objects: DashMap::new(),
        }
    }
}

impl<T> ObjectCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Arc<T>> {
        self.objects.get(key).map(|entry| Arc::clone(entry.value()))
    }

    /// Return the cached instance for `key`, building and inserting it if absent.
    pub fn get_or_insert_with(&self, key: &str, build: impl FnOnce() -> T) -> Arc<T> {
        let entry = self
            .objects
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(build()));
        Arc::clone(entry.value())
    }

    pub fn remove(&self, key: &str) -> Option<Arc<T>> {
        self.objects.remove(key).map(|(_, v)| v)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Keys currently cached, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }
}

/// A lazily loaded value that can be reset.
///
/// Two tasks loading concurrently may both hit the platform; the last one
/// to finish wins, and both loads see the same remote state.
#[derive(Debug)]
pub struct Cached<T> {
    slot: RwLock<Option<T>>,
}

impl<T> Default for Cached<T> {
    fn default() -> Self {
        Self {
            slot: RwLock::new(None),
        }
    }
}

impl<T: Clone> Cached<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn peek(&self) -> Option<T> {
        self.slot.read().clone()
    }

    pub fn set(&self, value: T) {
        *self.slot.write() = Some(value);
    }

    pub fn clear(&self) {
        *self.slot.write() = None;
    }

    /// The cached value, loading it first if needed.
    pub async fn get_or_load<F, Fut>(&self, load: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let cached = self.peek();
        if let Some(value) = cached {
            return Ok(value);
        }
        let value = load().await?;
        self.set(value.clone());
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_key_returns_same_instance() {
        let cache: ObjectCache<String> = ObjectCache::new();
        let a = cache.get_or_insert_with("k", || "first".to_string());
        let b = cache.get_or_insert_with("k", || "second".to_string());
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(*b, "first");
    }

    #[test]
    fn test_remove_evicts() {
        let cache: ObjectCache<u32> = ObjectCache::new();
        cache.get_or_insert_with("k", || 1);
        assert!(cache.remove("k").is_some());
        assert!(cache.get("k").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_concurrent_inserts_share_one_instance() {
        let cache: Arc<ObjectCache<usize>> = Arc::new(ObjectCache::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || cache.get_or_insert_with("shared", || i))
            })
            .collect();
        let instances: Vec<Arc<usize>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(instances.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_cached_loads_once_until_cleared() {
        let cached: Cached<u32> = Cached::new();
        let v = cached.get_or_load(|| async { Ok(1) }).await.unwrap();
        assert_eq!(v, 1);
        let v = cached.get_or_load(|| async { Ok(2) }).await.unwrap();
        assert_eq!(v, 1);
        cached.clear();
        assert_eq!(cached.peek(), None);
        let v = cached.get_or_load(|| async { Ok(3) }).await.unwrap();
        assert_eq!(v, 3);
    }
}
