//! Attach/detach-aware cache service
//!
//! [`CubeCache`] is the process-wide cache handle. It is constructed once at
//! startup, cloned into every evaluation, and dropped at shutdown. Member
//! sets are detached on the way in and re-attached against the current
//! connection's levels on the way out, so no cube-connection-scoped object
//! ever outlives its connection inside the cache.

use crate::keys::KeyBuilder;
use crate::options::CacheOptions;
use crate::store::{InMemoryCache, MemberSetCache};
use qube_core::{ContainerId, LevelMap, MemberSet, SchemaId};
use std::sync::Arc;
use tracing::{debug, info};

/// Process-wide member-set cache
#[derive(Clone)]
pub struct CubeCache {
    store: Arc<dyn MemberSetCache>,
}

impl CubeCache {
    /// Wrap an existing store
    pub fn new(store: Arc<dyn MemberSetCache>) -> Self {
        Self { store }
    }

    /// Create a cache backed by an [`InMemoryCache`]
    pub fn in_memory(options: CacheOptions) -> Self {
        Self::new(Arc::new(InMemoryCache::new(options)))
    }

    /// Get the underlying store
    pub fn store(&self) -> &Arc<dyn MemberSetCache> {
        &self.store
    }

    /// A handle that keys every entry by container and schema
    pub fn scope(&self, container: ContainerId, schema: SchemaId) -> CacheScope {
        CacheScope {
            store: Arc::clone(&self.store),
            container,
            schema,
        }
    }

    /// Remove every entry belonging to a container
    pub fn invalidate_container(&self, container: &ContainerId) -> usize {
        let removed = self
            .store
            .remove_by_prefix(&KeyBuilder::container_prefix(container));
        info!("Invalidated {} cached member sets for container {}", removed, container);
        removed
    }

    /// Invalidate every entry built from a schema
    ///
    /// Keys do not index by schema alone, so this clears the whole cache.
    pub fn invalidate_schema(&self, schema: &SchemaId) {
        self.store.clear();
        info!("Cleared member-set cache after change to schema {}", schema);
    }

    /// Remove every entry
    pub fn invalidate_all(&self) {
        self.store.clear();
        info!("Cleared member-set cache");
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

impl Default for CubeCache {
    fn default() -> Self {
        Self::in_memory(CacheOptions::default())
    }
}

/// Cache handle scoped to one container and schema
#[derive(Clone)]
pub struct CacheScope {
    store: Arc<dyn MemberSetCache>,
    container: ContainerId,
    schema: SchemaId,
}

impl CacheScope {
    pub fn container(&self) -> &ContainerId {
        &self.container
    }

    pub fn schema(&self) -> &SchemaId {
        &self.schema
    }

    /// Full cache key for a query text
    pub fn key(&self, query: &str) -> String {
        KeyBuilder::member_set(&self.container, &self.schema, query)
    }

    /// Whether a query's result is cached and still attaches to `levels`
    ///
    /// Not counted as a lookup. A stale entry is dropped.
    pub fn contains(&self, query: &str, levels: &LevelMap) -> bool {
        let key = self.key(query);
        match self.store.peek(&key) {
            Some(detached) if detached.attaches_to(levels) => true,
            Some(_) => {
                debug!("Dropping stale cache entry {}", key);
                self.store.remove(&key);
                false
            }
            None => false,
        }
    }

    /// Look up a query's result and attach it to the given levels
    ///
    /// An entry that no longer attaches (its level vanished or shrank) is
    /// dropped and reported as a miss.
    pub fn get(&self, query: &str, levels: &LevelMap) -> Option<MemberSet> {
        let key = self.key(query);
        let detached = self.store.get(&key)?;
        match detached.attach(levels) {
            Ok(set) => Some(set),
            Err(e) => {
                debug!("Dropping stale cache entry {}: {}", key, e);
                self.store.remove(&key);
                None
            }
        }
    }

    /// Store a query's result in detached form
    pub fn put(&self, query: &str, set: &MemberSet) {
        self.store.put(self.key(query), set.detach());
    }
}
