//! Identifier types for Qube
//!
//! Provides strongly-typed identifiers for cube levels and for the
//! container/schema pair that scopes every cached member set.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Numeric member position within its level
pub type Ordinal = u32;

/// Identifier for a level, derived from its unique name
///
/// Two levels with the same unique name in two different cube connections
/// share a `LevelId`, which is what lets a detached member set be attached
/// to a later connection.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LevelId(u64);

impl LevelId {
    /// Create a level ID from a level unique name
    pub fn from_unique_name(unique_name: &str) -> Self {
        Self(xxhash_rust::xxh3::xxh3_64(unique_name.as_bytes()))
    }

    /// Get the raw hash value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Debug for LevelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LevelId({:016x})", self.0)
    }
}

impl fmt::Display for LevelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

fn check_segment(what: &str, id: &str) -> Result<()> {
    if id.is_empty() || id.contains('/') {
        return Err(Error::InvalidId(format!(
            "{} id '{}' must be non-empty and contain no '/'",
            what, id
        )));
    }
    Ok(())
}

/// Identifier of the container (project/folder) a query runs in
///
/// Must be non-empty and free of `/`, which separates cache key segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContainerId(String);

impl ContainerId {
    pub fn new<S: Into<String>>(id: S) -> Result<Self> {
        let id = id.into();
        check_segment("container", &id)?;
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ContainerId {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::new(s)
    }
}

impl From<ContainerId> for String {
    fn from(id: ContainerId) -> Self {
        id.0
    }
}

/// Identifier of the cube schema a query runs against
///
/// Must be non-empty and free of `/`, which separates cache key segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SchemaId(String);

impl SchemaId {
    pub fn new<S: Into<String>>(id: S) -> Result<Self> {
        let id = id.into();
        check_segment("schema", &id)?;
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SchemaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for SchemaId {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::new(s)
    }
}

impl From<SchemaId> for String {
    fn from(id: SchemaId) -> Self {
        id.0
    }
}
