//! Qube CLI
//!
//! Loads a cube fixture and a JSON query request, evaluates the query once
//! against an in-memory cube and returns the count grid.

pub mod args;
pub mod config;

pub use args::Args;
pub use config::CliConfig;

use qube_cache::CubeCache;
use qube_core::Result;
use qube_cube::{CubeConnection, CubeFixture, MemoryCube};
use qube_query::{evaluate, CountGrid, ExecutionStats, QueryRequest};
use serde::Serialize;
use tracing::info;

/// What a run prints
#[derive(Debug, Clone, Serialize)]
pub struct CliOutput {
    pub grid: CountGrid,
    pub stats: ExecutionStats,
}

/// Run one evaluation as configured
pub fn run(config: &CliConfig) -> Result<CliOutput> {
    let fixture = CubeFixture::from_path(&config.cube_path)?;
    let cube = MemoryCube::from_fixture(fixture)?;
    info!("Opened cube {} from {}", cube.cube().name(), config.cube_path.display());

    let request = QueryRequest::from_path(&config.query_path)?;
    let query = request.resolve(cube.cube())?;

    let cache = CubeCache::in_memory(config.cache.clone());
    let scope = cache.scope(config.container_id()?, config.schema_id()?);
    let result = evaluate(&cube, scope, &query)?;

    Ok(CliOutput {
        grid: result.grid,
        stats: result.stats,
    })
}

/// Render an output as pretty JSON
pub fn render(output: &CliOutput) -> Result<String> {
    serde_json::to_string_pretty(output)
        .map_err(|e| qube_core::Error::Serialization(e.to_string()))
}
