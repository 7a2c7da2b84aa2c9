//! Composition Cache
//!
//! Memo table from the raw request (type set plus per-entity roles) to the
//! composite type it produced. Lookups take a read lock; a miss composes
//! outside any lock and then inserts only if no other thread got there
//! first, so each key retains exactly one type.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::composite::CompositeType;
use crate::sync;
use crate::types::{RoleSet, TypeSet};

/// Cache key: the raw, unnormalized request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub types: TypeSet,
    pub individual: RoleSet,
}

impl CacheKey {
    pub fn new(types: TypeSet, individual: RoleSet) -> Self {
        Self { types, individual }
    }
}

impl From<TypeSet> for CacheKey {
    fn from(types: TypeSet) -> Self {
        Self::new(types, RoleSet::new())
    }
}

/// Insert-if-absent map of composite types. Entries are never evicted and
/// failures are never stored.
#[derive(Default)]
pub struct CompositionCache {
    entries: RwLock<HashMap<CacheKey, Arc<CompositeType>>>,
}

impl CompositionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &CacheKey) -> Option<Arc<CompositeType>> {
        sync::read(&self.entries).get(key).cloned()
    }

    /// Return the cached type for `key`, composing it on a miss.
    ///
    /// `compose` may run on several threads at once for the same key; only
    /// the first result inserted is retained and every caller gets it.
    pub fn get_or_compose<E, F>(&self, key: &CacheKey, compose: F) -> Result<Arc<CompositeType>, E>
    where
        F: FnOnce() -> Result<Arc<CompositeType>, E>,
    {
        if let Some(hit) = self.get(key) {
            return Ok(hit);
        }

        let composed = compose()?;
        let mut entries = sync::write(&self.entries);
        let retained = entries.entry(key.clone()).or_insert(composed);
        Ok(Arc::clone(retained))
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        sync::read(&self.entries).contains_key(key)
    }

    pub fn len(&self) -> usize {
        sync::read(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
