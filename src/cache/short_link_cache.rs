use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::entity::EntityReference;

/// LRU map from short-link identifier to the entity it was generated for.
pub struct ShortLinkCache {
    cache: Mutex<LruCache<String, EntityReference>>,
}

impl ShortLinkCache {
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: Mutex::new(LruCache::new(cap)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<String, EntityReference>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, short_id: &str) -> Option<EntityReference> {
        self.lock().get(short_id).cloned()
    }

    /// Store a mapping, returning the previous entity when the identifier was
    /// already taken by a *different* entity (a truncation collision).
    /// The new mapping always wins.
    pub fn insert(&self, short_id: String, entity: EntityReference) -> Option<EntityReference> {
        let previous = self.lock().put(short_id, entity.clone());
        previous.filter(|prev| *prev != entity)
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
