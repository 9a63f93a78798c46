use std::time::Duration;

use anyhow::{bail, Context as _, Result};
use clap::Parser;
use serde_json::json;
use tokio::time::sleep;
use tracing::info;
use tracing_subscriber::EnvFilter;

use squall_fuzzer::config::FuzzerConfig;
use squall_fuzzer::context::FuzzerContext;
use squall_fuzzer::deck::{build_deck, AttackKind};
use squall_fuzzer::discovery;
use squall_fuzzer::identity::IdentityPool;
use squall_harness::{setup_complete, Deck, DeterministicRng};

const SUMMARY_INTERVAL: u64 = 100;

#[derive(Parser)]
#[command(author, version, about = "Malicious-peer protocol fuzzer")]
struct Cli {
    /// Stop after this many attacks instead of running forever.
    #[arg(long)]
    iterations: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = FuzzerConfig::from_env();
    let default_filter = if config.debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    info!(target: "fuzzer", "protocol fuzzer starting");

    if !config.enabled {
        info!(target: "fuzzer", "disabled via FUZZER_ENABLED=0, exiting");
        return Ok(());
    }

    info!(target: "fuzzer", "discovering libp2p targets");
    let Some(targets) = discovery::wait_for_targets(&config.nodes, &config.devgen_dir).await
    else {
        bail!("no targets discovered within the startup window");
    };

    let first_node = config.nodes.first().cloned().unwrap_or_default();
    let network_name = discovery::wait_for_network_name(&config.devgen_dir, &first_node)
        .await
        .context("network name never appeared")?;

    let rpc_url = format!("http://{first_node}:{}/rpc/v1", config.rpc_port);
    let genesis = discovery::discover_genesis_cid(&rpc_url).await;

    let pool = IdentityPool::new(config.identity_pool_size);
    let rng = DeterministicRng::seeded(config.rng_seed);
    let deck = build_deck().context("building attack deck")?;

    setup_complete(json!({
        "targets": targets.len(),
        "network_name": network_name,
        "genesis_known": genesis.is_some(),
        "deck_size": deck.len(),
    }));

    let ctx = FuzzerContext {
        config,
        targets,
        network_name,
        genesis,
        pool,
        rng,
    };

    info!(target: "fuzzer", "entering main loop");
    run_loop(&ctx, &deck, cli.iterations).await;

    ctx.pool.close_all();
    Ok(())
}

async fn run_loop(ctx: &FuzzerContext, deck: &Deck<AttackKind>, limit: Option<u64>) {
    let interval = Duration::from_millis(ctx.config.rate_ms);
    let mut iteration: u64 = 0;

    loop {
        let entry = deck.draw(&ctx.rng);
        info!(target: "fuzzer", attack = %entry.name, "starting");
        entry.action.execute(ctx).await;
        info!(target: "fuzzer", attack = %entry.name, "completed");

        iteration += 1;
        if iteration % SUMMARY_INTERVAL == 0 {
            deck.log_summary(iteration);
        }
        if let Some(limit) = limit {
            if iteration >= limit {
                info!(target: "fuzzer", iteration, "iteration limit reached");
                return;
            }
        }
        if !interval.is_zero() {
            sleep(interval).await;
        }
    }
}
