//! decksync-rs: keeps a Supabase deck cache in step with the league results.
//!
//! Each run asks Supabase which deck IDs are missing from the cache, pulls
//! the decklist text from MTGGoldfish with throttle-aware retries, parses it
//! into main deck and sideboard, attaches a Scryfall image URL to every card
//! and inserts one cache row per deck. Inserts are idempotent so overlapping
//! runs are harmless.

#![warn(clippy::all)]

mod cli;
mod config;
mod decklist;
mod fetch;
pub mod retry;
mod scryfall;
mod shutdown;
mod store;
mod sync;
mod types;

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use fetch::Fetcher;
use retry::TokioSleeper;
use store::SupabaseStore;
use sync::{SyncEngine, SyncReport};

const RULE: &str = "────────────────────────────────────────";

fn log_summary(report: &SyncReport) {
    let totals = &report.totals;
    tracing::info!("── Summary ──");
    tracing::info!("  Synced:     {}", totals.success);
    tracing::info!("  Failed:     {}", totals.failed);
    if totals.skipped > 0 {
        tracing::info!("  Skipped:    {}", totals.skipped);
    }
    tracing::info!("  Discovered: {}", report.discovered);
    tracing::info!("  Batches:    {}", report.batches);
    if let Some(rate) = report.success_rate() {
        tracing::info!("  Success:    {:.1}%", rate);
    }
    tracing::info!("  Elapsed:    {:.1}s", report.elapsed.as_secs_f64());
    tracing::info!("  Stopped:    {}", report.stop_reason.as_str());
    tracing::info!("{}", RULE);
}

async fn run(cli: cli::Cli) -> anyhow::Result<SyncReport> {
    let config = config::Config::from_cli(cli)?;
    tracing::debug!(?config, "Loaded configuration");

    tracing::info!("{}", RULE);
    tracing::info!("Deck cache sync");
    tracing::info!(
        "Started at {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    if config.limit == 0 {
        tracing::info!(
            batch_size = config.batch_size,
            "Draining the full backlog"
        );
    } else {
        tracing::info!("Max decks this run: {}", config.limit);
    }
    tracing::info!("{}", RULE);

    let shutdown_token = shutdown::install_signal_handler()?;
    let sleeper = Arc::new(TokioSleeper);

    let store = Arc::new(SupabaseStore::new(config.supabase(), config.timeout)?);
    let upstream = fetch::transport::build_client(&config.user_agent, config.timeout)?;
    let fetcher = Fetcher::new(Arc::new(upstream), sleeper.clone(), config.fetch());

    let engine = SyncEngine::new(
        store.clone(),
        store,
        fetcher,
        sleeper,
        config.sync(),
        shutdown_token,
    );
    Ok(engine.run().await?)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = cli::Cli::parse();

    // RUST_LOG takes precedence over --log-level when set.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(cli.log_level.as_filter())),
        )
        .init();

    match run(cli).await {
        Ok(report) => {
            log_summary(&report);
            if report.is_success() {
                ExitCode::SUCCESS
            } else {
                tracing::error!("No deck could be synced this run");
                ExitCode::FAILURE
            }
        }
        Err(e) => {
            tracing::error!("Fatal error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
