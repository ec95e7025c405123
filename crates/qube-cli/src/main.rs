//! Qube command-line entry point

use anyhow::Context;
use clap::Parser;
use qube_cli::{render, run, Args, CliConfig};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() {
    let config = match Args::parse().into_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(2);
        }
    };

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("Qube v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = execute(&config) {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

fn execute(config: &CliConfig) -> anyhow::Result<()> {
    let output = run(config).with_context(|| {
        format!(
            "evaluating {} against {}",
            config.query_path.display(),
            config.cube_path.display()
        )
    })?;

    info!(
        "{} cube queries, {} cache hits, {} cells in {}ms",
        output.stats.cube_queries,
        output.stats.cache_hits,
        output.stats.cells_computed,
        output.stats.execution_time_ms
    );
    println!("{}", render(&output).context("rendering grid")?);
    Ok(())
}
