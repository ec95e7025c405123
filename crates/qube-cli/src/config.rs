//! CLI configuration

use qube_cache::CacheOptions;
use qube_core::{ContainerId, Error, Result, SchemaId};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration for one `qube` run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CliConfig {
    /// Cube fixture: definition plus fact rows
    pub cube_path: PathBuf,

    /// JSON query request
    pub query_path: PathBuf,

    /// Container the cache entries are filed under
    pub container_id: String,

    /// Schema the cache entries are filed under
    pub schema_id: String,

    /// Log level used when `RUST_LOG` is not set
    pub log_level: String,

    /// Member-set cache settings
    pub cache: CacheOptions,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            cube_path: PathBuf::from("cube.json"),
            query_path: PathBuf::from("query.json"),
            container_id: "default".to_string(),
            schema_id: "default".to_string(),
            log_level: "info".to_string(),
            cache: CacheOptions::default(),
        }
    }
}

impl CliConfig {
    /// Create a configuration for a fixture and a query
    pub fn new<C: Into<PathBuf>, Q: Into<PathBuf>>(cube_path: C, query_path: Q) -> Self {
        Self {
            cube_path: cube_path.into(),
            query_path: query_path.into(),
            ..Default::default()
        }
    }

    /// Load a configuration file
    ///
    /// Relative fixture and query paths are taken relative to the file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let mut config: Self = serde_json::from_str(&text)
            .map_err(|e| Error::Configuration(format!("{}: {}", path.display(), e)))?;

        if let Some(dir) = path.parent() {
            if config.cube_path.is_relative() {
                config.cube_path = dir.join(&config.cube_path);
            }
            if config.query_path.is_relative() {
                config.query_path = dir.join(&config.query_path);
            }
        }
        config.validate()?;
        Ok(config)
    }

    /// Builder: set the container id
    pub fn container<S: Into<String>>(mut self, container: S) -> Self {
        self.container_id = container.into();
        self
    }

    /// Builder: set the schema id
    pub fn schema<S: Into<String>>(mut self, schema: S) -> Self {
        self.schema_id = schema.into();
        self
    }

    /// Builder: set log level
    pub fn log_level(mut self, level: &str) -> Self {
        self.log_level = level.to_string();
        self
    }

    pub fn container_id(&self) -> Result<ContainerId> {
        ContainerId::new(self.container_id.as_str())
    }

    pub fn schema_id(&self) -> Result<SchemaId> {
        SchemaId::new(self.schema_id.as_str())
    }

    /// Reject ids that would break cache key prefixes
    pub fn validate(&self) -> Result<()> {
        self.container_id()
            .and(self.schema_id())
            .map(|_| ())
            .map_err(|e| Error::Configuration(e.to_string()))
    }
}
