//! Command-line arguments

use crate::config::CliConfig;
use clap::Parser;
use qube_core::Result;
use std::path::PathBuf;

/// Evaluate a count-distinct grid query against a cube fixture
#[derive(Debug, Parser)]
#[command(name = "qube")]
#[command(about = "Evaluate a count-distinct grid query against a cube fixture")]
#[command(version)]
pub struct Args {
    /// JSON configuration file; flags given alongside it override its values
    #[arg(value_name = "CONFIG")]
    pub config: Option<PathBuf>,

    /// Cube fixture: definition plus fact rows
    #[arg(long, value_name = "PATH", required_unless_present = "config")]
    pub cube: Option<PathBuf>,

    /// JSON query request
    #[arg(long, value_name = "PATH", required_unless_present = "config")]
    pub query: Option<PathBuf>,

    /// Container the cache entries are filed under
    #[arg(long)]
    pub container: Option<String>,

    /// Schema the cache entries are filed under
    #[arg(long)]
    pub schema: Option<String>,

    /// Log level used when RUST_LOG is not set
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,
}

impl Args {
    /// Merge the flags into the configuration file, or into the defaults
    pub fn into_config(self) -> Result<CliConfig> {
        let mut config = match &self.config {
            Some(path) => CliConfig::from_path(path)?,
            None => CliConfig::default(),
        };
        if let Some(cube) = self.cube {
            config.cube_path = cube;
        }
        if let Some(query) = self.query {
            config.query_path = query;
        }
        if let Some(container) = self.container {
            config.container_id = container;
        }
        if let Some(schema) = self.schema {
            config.schema_id = schema;
        }
        if let Some(level) = self.log_level {
            config.log_level = level;
        }
        config.validate()?;
        Ok(config)
    }
}
