mod config;
mod db;
mod error;
mod export;
mod ingest;
mod key_hash;
mod types;
mod ws;

#[cfg(test)]
mod testutil;

use std::time::Duration;

use chrono::TimeDelta;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::db::Store;
use crate::error::{AppError, Result};
use crate::export::{Archiver, ExportPaths, StaleSeriesCollector};
use crate::ingest::Aggregator;
use crate::types::Feed;
use crate::ws::FeedClient;

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    // --- Database setup ---
    let store = Store::connect(&cfg.db_path).await?;
    info!("Database ready at {}", cfg.db_path);

    // --- Export directories ---
    let paths = ExportPaths::ensure(&cfg.export_dir)?;
    info!("Exports under {}", cfg.export_dir.display());

    let write_interval = Duration::from_secs(cfg.write_interval_secs);
    let export_interval = Duration::from_secs(cfg.export_interval_secs);
    let threshold = hours("OUTDATED_THRESHOLD_HOURS", cfg.outdated_threshold_hours)?;
    let archive_age = hours("ARCHIVE_AGE_HOURS", cfg.archive_age_hours)?;

    // --- Ingest: one socket and one aggregator per feed ---
    let (pinnacle_agg, pinnacle_handle) =
        Aggregator::new(Feed::Primary.to_string(), store.clone(), write_interval);
    let (analyzer_agg, analyzer_handle) =
        Aggregator::new(Feed::Analyzer.to_string(), store.clone(), write_interval);

    let pinnacle_client = FeedClient::new(
        Feed::Primary,
        cfg.ws_pinnacle_url.clone(),
        &cfg.filter_name,
        &cfg.sports,
        pinnacle_handle,
    );
    let analyzer_client = FeedClient::new(
        Feed::Analyzer,
        cfg.ws_analyzer_url.clone(),
        &cfg.filter_name,
        &cfg.sports,
        analyzer_handle,
    );

    // --- Stale-series export ---
    let pinnacle_collector = StaleSeriesCollector::new(
        Feed::Primary,
        store.clone(),
        paths.for_feed(Feed::Primary).to_path_buf(),
        threshold,
        export_interval,
    );
    let analyzer_collector = StaleSeriesCollector::new(
        Feed::Analyzer,
        store,
        paths.for_feed(Feed::Analyzer).to_path_buf(),
        threshold,
        export_interval,
    );

    // --- Rotation of finished exports ---
    let archiver = Archiver::new(&paths, archive_age, Duration::from_secs(cfg.archive_interval_secs));

    info!(
        sports = ?cfg.sports,
        write_every_secs = cfg.write_interval_secs,
        export_every_secs = cfg.export_interval_secs,
        threshold_hours = cfg.outdated_threshold_hours,
        archive_after_hours = cfg.archive_age_hours,
        "Recorder running"
    );

    // Any task failing ends the process.
    tokio::try_join!(
        pinnacle_client.run(),
        pinnacle_agg.run(),
        analyzer_client.run(),
        analyzer_agg.run(),
        pinnacle_collector.run(),
        analyzer_collector.run(),
        archiver.run(),
    )?;

    Ok(())
}

fn hours(key: &str, value: u64) -> Result<TimeDelta> {
    i64::try_from(value)
        .ok()
        .and_then(TimeDelta::try_hours)
        .ok_or_else(|| AppError::Config(format!("{key} out of range: {value}")))
}
