use std::time::Duration;

use anyhow::{Context as _, Result};
use clap::Parser;
use serde_json::json;
use tokio::time::sleep;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use squall_harness::{setup_complete, Deck};
use squall_stress::config::EngineConfig;
use squall_stress::context::EngineContext;
use squall_stress::vectors::{build_deck, ActionKind};

const SUMMARY_INTERVAL: u64 = 500;

#[derive(Parser)]
#[command(author, version, about = "Chain-level fault-injection stress engine")]
struct Cli {
    /// Stop after this many actions instead of running forever.
    #[arg(long)]
    iterations: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = EngineConfig::from_env();
    let default_filter = if config.debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    info!(target: "engine", "stress engine starting");

    let ctx = EngineContext::initialise(config).await?;
    let deck = build_deck().context("building action deck")?;

    setup_complete(json!({
        "nodes": ctx.pool.len(),
        "wallets": ctx.wallets.len(),
        "deck": deck.len(),
    }));
    info!(target: "engine", "entering main loop");

    run_loop(&ctx, &deck, cli.iterations).await;
    Ok(())
}

/// One action to completion per iteration; the deck and the RNG fully
/// determine the schedule.
async fn run_loop(ctx: &EngineContext, deck: &Deck<ActionKind>, limit: Option<u64>) {
    let rate = Duration::from_millis(ctx.config.rate_ms);
    let mut iteration: u64 = 0;

    loop {
        let entry = deck.draw(&ctx.rng);
        debug!(target: "engine", action = %entry.name, "running");
        entry.action.execute(ctx).await;

        iteration += 1;
        if iteration % SUMMARY_INTERVAL == 0 {
            deck.log_summary(iteration);
        }
        if let Some(limit) = limit {
            if iteration >= limit {
                info!(target: "engine", iteration, "iteration limit reached");
                return;
            }
        }
        if !rate.is_zero() {
            sleep(rate).await;
        }
    }
}
