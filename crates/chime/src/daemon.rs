//! Daemon command: run the timer engine until interrupted.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use miette::{Result, miette};
use tracing::info;

use chime_engine::{ReminderService, TimerEngine};
use chime_sink::EchoSink;

use crate::data::{JsonLedger, load_source};

/// Configuration for the daemon and one-shot tick commands.
pub struct DaemonConfig {
    pub data_path: PathBuf,
    pub ledger_path: PathBuf,
    pub poll_interval: u64,
    pub lookahead: u64,
    pub catchup: u64,
    pub batch_limit: usize,
}

async fn build_service(config: &DaemonConfig) -> Result<ReminderService> {
    let source = load_source(&config.data_path)
        .await
        .map_err(|e| miette!("failed to load data file: {e}"))?;
    let ledger = JsonLedger::open(&config.ledger_path)
        .await
        .map_err(|e| miette!("failed to open ledger: {e}"))?;

    Ok(ReminderService::new(source, ledger, Arc::new(EchoSink::stdout()))
        .with_lookahead(chrono::Duration::seconds(config.lookahead as i64))
        .with_catchup(chrono::Duration::seconds(config.catchup as i64))
        .with_batch_limit(config.batch_limit))
}

/// Run the polling loop until ctrl-c.
pub async fn run(config: DaemonConfig) -> Result<()> {
    let poll_interval = Duration::from_secs(config.poll_interval);
    let service = build_service(&config).await?;

    let engine = Arc::new(
        TimerEngine::new(Arc::new(service)).with_poll_interval(poll_interval),
    );
    engine.start().await;
    info!(
        poll_interval_secs = config.poll_interval,
        "daemon running, press ctrl-c to stop"
    );

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| miette!("failed to listen for ctrl-c: {e}"))?;

    info!("shutting down");
    engine.stop(Duration::from_secs(5)).await;
    Ok(())
}

/// Run a single poll and print its stats. Suits cron-style operation.
pub async fn tick(config: DaemonConfig) -> Result<()> {
    let service = build_service(&config).await?;
    let stats = service
        .poll_once()
        .await
        .map_err(|e| miette!("poll failed: {e}"))?;
    println!(
        "candidates={} delivered={} skipped={} failed={}",
        stats.candidate_count, stats.delivered_count, stats.skipped_count, stats.failed_count
    );
    Ok(())
}
