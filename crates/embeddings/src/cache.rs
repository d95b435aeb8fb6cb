//! Memo of the most recent distinct embedding inputs.
//!
//! Keyed by exact string match. Entries are only evicted by newer inputs;
//! nothing else invalidates them for the life of the process.

use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, PoisonError};

/// Smallest capacity the cache will run with.
pub const MIN_CACHE_ENTRIES: usize = 8;

/// Least-recently-used cache of `text → vector`.
pub struct EmbeddingCache {
    entries: Mutex<LruCache<String, Arc<[f32]>>>,
}

impl EmbeddingCache {
    /// Create a cache holding at least [`MIN_CACHE_ENTRIES`] entries.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(MIN_CACHE_ENTRIES)).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).cap().get()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up `key`, marking it most recently used.
    pub fn get(&self, key: &str) -> Option<Arc<[f32]>> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Insert or refresh `key`, evicting the least recently used entry when full.
    pub fn insert(&self, key: &str, vector: Arc<[f32]>) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .put(key.to_string(), vector);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vec_of(x: f32) -> Arc<[f32]> {
        Arc::from(vec![x, x])
    }

    #[test]
    fn capacity_has_a_floor() {
        assert_eq!(EmbeddingCache::new(1).capacity(), MIN_CACHE_ENTRIES);
        assert_eq!(EmbeddingCache::new(32).capacity(), 32);
    }

    #[test]
    fn hit_returns_stored_vector() {
        let cache = EmbeddingCache::new(8);
        cache.insert("I feel stressed", vec_of(1.0));
        assert_eq!(cache.get("I feel stressed").as_deref(), Some(&[1.0, 1.0][..]));
        assert!(cache.get("i feel stressed").is_none(), "keys are exact");
    }

    #[test]
    fn evicts_least_recently_used() {
        let cache = EmbeddingCache::new(8);
        for i in 0..8 {
            cache.insert(&format!("text {i}"), vec_of(i as f32));
        }
        // Touch the oldest so "text 1" becomes the eviction target.
        assert!(cache.get("text 0").is_some());
        cache.insert("text 8", vec_of(8.0));

        assert_eq!(cache.len(), 8);
        assert!(cache.get("text 0").is_some());
        assert!(cache.get("text 1").is_none());
        assert!(cache.get("text 8").is_some());
    }

    #[test]
    fn reinsert_does_not_duplicate() {
        let cache = EmbeddingCache::new(8);
        cache.insert("same", vec_of(1.0));
        cache.insert("same", vec_of(2.0));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("same").as_deref(), Some(&[2.0, 2.0][..]));
    }
}
