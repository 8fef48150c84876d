//! Task tree demonstration binary.
//!
//! Runs one of the demonstration trees on a worker pool bound to the current
//! runtime and prints the outcome.
//!
//! # Examples
//!
//! ```bash
//! # Patrol five laps with verbose engine logs
//! TASK_TREE_REPEATS=5 RUST_LOG=task_tree=debug cargo run -p task-tree-cli
//!
//! # Abort a running tree, then drain and restart the pool
//! cargo run -p task-tree-cli -- abort
//! ```

mod config;
mod scenarios;

use anyhow::Result;
use task_tree::WorkerPool;

use crate::config::CliConfig;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let config = CliConfig::from_env()?.with_args(std::env::args().skip(1))?;

    tracing::info!("Starting task tree demo");
    tracing::info!("Scenario: {}", config.scenario);
    tracing::info!("Poll interval: {:?}", config.engine.poll_interval);
    tracing::info!("Offload actions: {}", config.engine.offload_actions);

    let pool = WorkerPool::current_with(config.engine.clone())?;
    let outcome = scenarios::run(&pool, &config).await?;

    pool.drain().await;
    println!("{}: {:?} ({})", config.scenario, outcome.status, outcome.summary);
    Ok(())
}

/// Log to stderr so stdout carries only the outcome.
fn setup_logging() {
    let env_filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::INFO.into());

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}
