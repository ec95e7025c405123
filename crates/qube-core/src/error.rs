//! Error types for Qube
//!
//! Provides the error hierarchy shared by every Qube crate. Variants are
//! grouped by the layer that raises them so callers can tell a malformed
//! query apart from a failing cube engine.

use thiserror::Error;

/// The main error type for Qube operations
#[derive(Error, Debug)]
pub enum Error {
    // ========== Metadata Errors ==========
    #[error("Hierarchy not found: {0}")]
    HierarchyNotFound(String),

    #[error("Level not found: {0}")]
    LevelNotFound(String),

    #[error("Member not found: {0}")]
    MemberNotFound(String),

    #[error("Measure not found: {0}")]
    MeasureNotFound(String),

    #[error("Invalid cube metadata: {0}")]
    InvalidMetadata(String),

    #[error("Invalid identifier: {0}")]
    InvalidId(String),

    // ========== Member Set Errors ==========
    #[error("Level mismatch: expected {expected}, found {found}")]
    LevelMismatch { expected: String, found: String },

    // ========== Query Usage Errors ==========
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Missing argument: {0}")]
    MissingArgument(String),

    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("No count-distinct measure configured")]
    NoCountDistinctMeasure,

    // ========== Cube Engine Errors ==========
    #[error("Cube query parse error: {0}")]
    QueryParse(String),

    #[error("Cube query failed: {0}")]
    CubeQuery(String),

    #[error("Cube connection error: {0}")]
    CubeConnection(String),

    // ========== Cache Errors ==========
    #[error("Cache error: {0}")]
    Cache(String),

    // ========== Serialization Errors ==========
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    // ========== IO Errors ==========
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // ========== Configuration Errors ==========
    #[error("Configuration error: {0}")]
    Configuration(String),

    // ========== Internal Errors ==========
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for Qube operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns true if the error was caused by a malformed or ambiguous query.
    ///
    /// Usage errors fail fast and must not be retried.
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidQuery(_)
                | Error::MissingArgument(_)
                | Error::TypeMismatch { .. }
                | Error::NoCountDistinctMeasure
                | Error::LevelMismatch { .. }
                | Error::HierarchyNotFound(_)
                | Error::LevelNotFound(_)
                | Error::MemberNotFound(_)
                | Error::MeasureNotFound(_)
                | Error::InvalidId(_)
        )
    }

    /// Returns true if the error came from the external cube layer
    pub fn is_cube_error(&self) -> bool {
        matches!(
            self,
            Error::QueryParse(_) | Error::CubeQuery(_) | Error::CubeConnection(_)
        )
    }

    /// Shorthand for a level mismatch between two level unique names
    pub fn level_mismatch(expected: impl Into<String>, found: impl Into<String>) -> Self {
        Error::LevelMismatch {
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// Shorthand for a type mismatch between two result kinds
    pub fn type_mismatch(expected: impl Into<String>, found: impl Into<String>) -> Self {
        Error::TypeMismatch {
            expected: expected.into(),
            found: found.into(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        if e.is_io() {
            Error::Io(e.into())
        } else {
            Error::Deserialization(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::LevelNotFound("[Subject].[Subject]".to_string());
        assert_eq!(err.to_string(), "Level not found: [Subject].[Subject]");

        let err = Error::level_mismatch("[A].[A]", "[B].[B]");
        assert_eq!(err.to_string(), "Level mismatch: expected [A].[A], found [B].[B]");
    }

    #[test]
    fn test_usage_errors() {
        assert!(Error::NoCountDistinctMeasure.is_usage_error());
        assert!(Error::MissingArgument("CROSSJOIN".to_string()).is_usage_error());
        assert!(Error::type_mismatch("member set", "crossjoin").is_usage_error());
        assert!(!Error::CubeQuery("timeout".to_string()).is_usage_error());
    }

    #[test]
    fn test_cube_errors() {
        assert!(Error::CubeConnection("refused".to_string()).is_cube_error());
        assert!(Error::QueryParse("unexpected token".to_string()).is_cube_error());
        assert!(!Error::Cache("poisoned".to_string()).is_cube_error());
    }
}
