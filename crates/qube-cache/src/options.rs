//! Cache configuration options

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default time-to-live of a cached member set: one hour
pub const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);

/// Default overall cap on cached member sets
pub const DEFAULT_MAX_ENTRIES: usize = 100_000;

/// Options for configuring the member-set cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CacheOptions {
    /// Whether caching is enabled at all
    pub enabled: bool,

    /// Time-to-live of every entry
    #[serde(with = "duration_secs")]
    pub ttl: Duration,

    /// Maximum number of entries; the oldest entries are evicted beyond it
    pub max_entries: usize,
}

impl CacheOptions {
    /// Create default options
    pub fn new() -> Self {
        Self::default()
    }

    /// Create options optimized for development/testing
    pub fn for_testing() -> Self {
        Self {
            enabled: true,
            ttl: Duration::from_secs(60),
            max_entries: 1_000,
        }
    }

    /// Create options optimized for production
    pub fn for_production() -> Self {
        Self {
            enabled: true,
            ttl: DEFAULT_TTL,
            max_entries: 1_000_000,
        }
    }

    /// Options that cache nothing
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    /// Set the time-to-live
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the entry cap
    pub fn max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl: DEFAULT_TTL,
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}
