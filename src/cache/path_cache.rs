use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::graph::{PathType, TracePath};

/// Memoization key: (from key, to key, strategy).
pub type PathCacheKey = (String, String, PathType);

/// Thread-safe LRU cache for traceability path results
///
/// Entries are created lazily by the path finder and are never invalidated by
/// relationship inserts; callers clear the cache when the store is reloaded.
/// An empty result (no path) is cached like any other.
pub struct PathCache {
    cache: Mutex<LruCache<PathCacheKey, Vec<TracePath>>>,
}

impl PathCache {
    /// Create a new path cache with the specified capacity
    ///
    /// A capacity of 0 is treated as 1.
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: Mutex::new(LruCache::new(cap)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<PathCacheKey, Vec<TracePath>>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get cached paths, refreshing the entry's recency
    pub fn get(&self, key: &PathCacheKey) -> Option<Vec<TracePath>> {
        self.lock().get(key).cloned()
    }

    pub fn put(&self, key: PathCacheKey, paths: Vec<TracePath>) {
        self.lock().put(key, paths);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}
