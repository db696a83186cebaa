//! Actor - chess self-play driver
//!
//! Plays games with the parallel MCTS and:
//! 1. Appends one JSON line per searched position to the sample file
//! 2. Writes running totals to `actor_stats.json` in the data directory
//! 3. Stops cleanly on Ctrl-C, interrupting the search in progress

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

mod actor;
mod config;
mod mcts_policy;
mod policy;
mod replay;
mod stats;

use crate::actor::Actor;
use crate::config::Config;

fn init_tracing(level: &str) -> Result<()> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();
    config.validate()?;

    init_tracing(&config.log_level)?;
    info!(log_level = %config.log_level, "Tracing initialized");
    info!(
        games = config.games,
        threads = config.num_threads,
        batch = config.eval_batch_size,
        budget = ?config.budget()?,
        evaluator = ?config.evaluator,
        opponent = ?config.opponent,
        "Actor configured"
    );

    let actor = Arc::new(Actor::new(config)?);

    // Setup graceful shutdown
    let shutdown_actor = Arc::clone(&actor);
    let shutdown_handle = tokio::spawn(async move {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for ctrl+c: {}", e);
            return;
        }
        info!("Shutdown signal received, stopping actor...");
        shutdown_actor.shutdown();
    });

    let run_result = actor.run().await;
    shutdown_handle.abort();

    match run_result {
        Ok(()) => {
            info!("Actor completed successfully");
            Ok(())
        }
        Err(e) => {
            error!("Actor failed: {:#}", e);
            Err(e)
        }
    }
}
