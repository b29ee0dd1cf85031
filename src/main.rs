use landmark_narrator::config::Configuration;
use landmark_narrator::error::AppError;
use landmark_narrator::simulated::demo_coordinator;
use std::path::PathBuf;
use std::str::FromStr;
use tokio_stream::StreamExt;
use tracing::{info, warn, Level};

fn init_logging(configuration: &Configuration) {
    let level = Level::from_str(&configuration.log_level).unwrap_or(Level::INFO);
    tracing_subscriber::fmt().with_max_level(level).init();
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let configuration = Configuration::load(config_path.as_deref())?;
    init_logging(&configuration);

    let (coordinator, monitor) = demo_coordinator(&configuration)?;

    if let Some(mut reports) = coordinator.asset_load_reports() {
        tokio::spawn(async move {
            while let Some(report) = reports.next().await {
                match &report.result {
                    Ok(()) => info!("Run {} attached {}", report.run_id, report.asset),
                    Err(reason) => warn!(
                        "Run {} could not load {}: {}",
                        report.run_id, report.asset, reason
                    ),
                }
            }
        });
    }

    let handle = coordinator
        .trigger()
        .into_handle()
        .ok_or_else(|| AppError::Pipeline("coordinator was already running".to_string()))?;
    if !coordinator.trigger().is_started() {
        info!("Second trigger ignored while run {} is active", handle.run_id());
    }

    let report = handle.wait().await;
    println!("{}", serde_json::to_string_pretty(&report)?);

    let stats = monitor.stats();
    info!(
        "Runs: {}, successes: {}, average run time: {:.0}ms",
        stats.runs, stats.successes, stats.avg_run_ms
    );

    coordinator.shutdown().await;
    Ok(())
}
