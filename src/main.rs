//! VERDICT — Adaptive probability fusion and staking engine.
//!
//! Entry point. Loads configuration, initialises structured logging,
//! wires the feed, ledger, and strategy components together, and runs
//! the externally-timed decision cycle with graceful shutdown.

use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use verdict::config::AppConfig;
use verdict::controller::PIController;
use verdict::engine::{CycleReport, Orchestrator};
use verdict::ledger::sqlite::SqliteLedger;
use verdict::ledger::Ledger;
use verdict::risk::RiskManager;
use verdict::sources::HttpFeed;
use verdict::voting::WeightedVoting;

const BANNER: &str = r#"
__     _______ ____  ____ ___ ____ _____
\ \   / / ____|  _ \|  _ \_ _/ ___|_   _|
 \ \ / /|  _| | |_) | | | | | |     | |
  \ V / | |___|  _ <| |_| | | |___  | |
   \_/  |_____|_| \_\____/___\____| |_|

  Voting Engine for Risk-bounded Draw-cycle Trading
  v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    // Load and validate configuration from TOML
    let cfg = AppConfig::load("config.toml")?;

    // Initialise structured logging
    init_logging();

    println!("{BANNER}");
    info!(
        agent_name = %cfg.agent.name,
        cycle_interval_secs = cfg.agent.cycle_interval_secs,
        run_mode = %cfg.controller.run_mode,
        "VERDICT starting up"
    );

    // -- Initialise components -------------------------------------------

    let api_token = cfg
        .feed
        .api_token_env
        .as_deref()
        .and_then(|env| std::env::var(env).ok());
    let feed = Arc::new(HttpFeed::new(cfg.feed.base_url.clone(), api_token)?);

    let store = SqliteLedger::connect(&cfg.ledger.database_url).await?;
    let ledger = Ledger::new(Arc::new(store));

    let mut orchestrator = Orchestrator::new(
        WeightedVoting::new(cfg.voting_config()),
        PIController::new(cfg.controller_config(), cfg.controller.run_mode),
        RiskManager::new(cfg.risk_config()),
        ledger,
        feed.clone(),
        feed,
        cfg.calibration,
        PathBuf::from(&cfg.agent.state_path),
        cfg.agent.order_tag.clone(),
    );

    // -- Main loop -------------------------------------------------------

    let mut interval = tokio::time::interval(Duration::from_secs(cfg.agent.cycle_interval_secs));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(
        interval_secs = cfg.agent.cycle_interval_secs,
        "Entering main loop. Press Ctrl+C to stop."
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {
                match orchestrator.run_cycle().await {
                    Ok(report) => log_cycle_report(&report),
                    Err(e) => {
                        // No in-cycle retry: the next scheduled cycle resumes
                        // from the last successfully persisted state.
                        error!(error = format!("{e:#}"), "Cycle failed — continuing to next");
                    }
                }
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received.");
                break;
            }
        }
    }

    info!("VERDICT shut down cleanly.");
    Ok(())
}

/// Log a human-readable cycle summary.
fn log_cycle_report(report: &CycleReport) {
    let decision = report.decision.as_ref().map(|d| d.to_string());
    info!(
        candidates = report.candidates_seen,
        decision = decision.as_deref(),
        order = report.order_id.as_deref(),
        settled = report.settlement.settled,
        pending = report.settlement.pending,
        min_accept = format!("{:.4}", report.min_accept),
        "Cycle complete"
    );
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("verdict=info"));

    let json_logging = std::env::var("VERDICT_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
