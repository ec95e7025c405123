//! Cube connection interface
//!
//! The evaluator talks to a cube engine only through [`CubeConnection`]: it
//! reads the connection's metadata and sends it query text. Everything a
//! connection hands back is plain data, so nothing returned here holds on to
//! the connection.

use qube_core::{Cube, MemberRef, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A live connection to a cube engine
pub trait CubeConnection: Send + Sync {
    /// Metadata of the connected cube, valid for the lifetime of the connection
    fn cube(&self) -> &Arc<Cube>;

    /// Execute a query and return its positions
    ///
    /// Engine failures are reported as cube errors and are not retried.
    fn execute(&self, query: &str) -> Result<CellSet>;
}

impl<C: CubeConnection + ?Sized> CubeConnection for Arc<C> {
    fn cube(&self) -> &Arc<Cube> {
        (**self).cube()
    }

    fn execute(&self, query: &str) -> Result<CellSet> {
        (**self).execute(query)
    }
}

/// A member as it appears on a result axis
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellMember {
    /// Unique name of the member's level
    pub level: String,
    pub unique_name: String,
    pub name: String,
}

impl From<&MemberRef> for CellMember {
    fn from(member: &MemberRef) -> Self {
        Self {
            level: member.level().unique_name().to_string(),
            unique_name: member.unique_name().to_string(),
            name: member.name().to_string(),
        }
    }
}

/// One tuple on an axis
pub type Position = Vec<CellMember>;

/// The axes of an executed query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CellSet {
    pub columns: Vec<Position>,
    pub rows: Vec<Position>,
}

impl CellSet {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
