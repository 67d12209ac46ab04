//! Per-repository, append-only caches keyed by canonical object id.
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// A reader-dominated cache of objects keyed by their 40-char hex id.
/// Entries are inserted once and never removed or overwritten: once a
/// `Commit`/`Tree`/`Tag` has been parsed, the parsed value is final and
/// safe to hand out from multiple readers without re-validating it.
pub struct ObjectCache<T> {
    inner: RwLock<HashMap<String, Arc<T>>>,
}

impl<T> Default for ObjectCache<T> {
    fn default() -> Self {
        ObjectCache {
            inner: RwLock::new(HashMap::new()),
        }
    }
}

impl<T> ObjectCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a previously cached value for `key`, if any.
    pub fn get(&self, key: &str) -> Option<Arc<T>> {
        self.inner
            .read()
            .expect("object cache lock poisoned")
            .get(key)
            .cloned()
    }

    /// Inserts `value` under `key` if nothing is cached for it yet, then
    /// returns the now-cached value (either the one just inserted, or one
    /// a racing writer inserted first).
    pub fn get_or_insert_with(&self, key: &str, make: impl FnOnce() -> T) -> Arc<T> {
        if let Some(existing) = self.get(key) {
            return existing;
        }
        let value = Arc::new(make());
        let mut guard = self.inner.write().expect("object cache lock poisoned");
        guard.entry(key.to_string()).or_insert_with(|| value).clone()
    }

    pub fn len(&self) -> usize {
        self.inner.read().expect("object cache lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caches_on_first_insert() {
        let cache: ObjectCache<String> = ObjectCache::new();
        let v1 = cache.get_or_insert_with("abc", || "first".to_string());
        let v2 = cache.get_or_insert_with("abc", || "second".to_string());
        assert_eq!(*v1, "first");
        assert_eq!(*v2, "first");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn missing_key_returns_none() {
        let cache: ObjectCache<String> = ObjectCache::new();
        assert!(cache.get("missing").is_none());
    }
}
