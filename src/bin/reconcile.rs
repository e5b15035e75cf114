//! One-off reconciliation pass, for cron jobs or operators.

use clap::Parser;
use dealership_sales::{config, db, events, services::ReconciliationService};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Parser)]
#[command(
    name = "reconcile",
    about = "Release units left sold without a completed sale",
    version
)]
struct Cli {
    /// Overrides `reconciliation_grace_secs` from the configuration
    #[arg(long)]
    grace_secs: Option<u64>,

    /// Print the report as JSON instead of a log line
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config()?;
    config::init_tracing(cfg.log_level(), cfg.log_json);

    let pool = Arc::new(db::establish_connection_from_app_config(&cfg).await?);
    let (event_sender, event_rx) = events::channel(cfg.event_channel_capacity);
    let event_worker = tokio::spawn(events::process_events(event_rx));

    let grace = cli
        .grace_secs
        .map(Duration::from_secs)
        .unwrap_or_else(|| cfg.reconciliation_grace());

    let service = ReconciliationService::new(pool, event_sender, grace);
    let report = service.reconcile_once().await?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        info!(
            scanned = report.scanned,
            compensated = report.compensated,
            skipped = report.skipped,
            "Reconciliation finished"
        );
    }

    // Closing the last sender lets the event worker drain and exit
    drop(service);
    let _ = event_worker.await;

    Ok(())
}
