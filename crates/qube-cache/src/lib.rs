//! Qube Member-Set Cache
//!
//! Caches the member sets produced by cube reachability queries across
//! cube-connection lifetimes.
//!
//! # Architecture
//!
//! - `store` - The [`MemberSetCache`] store trait and the TTL'd in-memory store
//! - `keys` - `containerId/schemaId/<query-text>` key encoding
//! - `options` - TTL and entry-cap configuration
//! - `cube_cache` - The process-wide service that detaches on write and
//!   re-attaches on read
//!
//! # Invalidation
//!
//! - by container: removes every key prefixed by the container id
//! - by schema: clears the whole cache
//! - globally: clears the whole cache

pub mod cube_cache;
pub mod keys;
pub mod options;
pub mod store;

pub use cube_cache::{CacheScope, CubeCache};
pub use keys::KeyBuilder;
pub use options::CacheOptions;
pub use store::{CacheStats, CacheStatsSnapshot, InMemoryCache, MemberSetCache};
