use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{AppError, Result};

/// Default flush interval for each aggregator (seconds).
pub const WRITE_INTERVAL_SECS: u64 = 60;

/// A series whose newest row is older than this is considered finished (hours).
pub const OUTDATED_THRESHOLD_HOURS: u64 = 3;

/// Stale-series scan interval (seconds).
pub const EXPORT_INTERVAL_SECS: u64 = 7200;

/// Exported CSVs older than this are zipped into `archives/` (hours).
pub const ARCHIVE_AGE_HOURS: u64 = 24;

/// Archive rotation interval (seconds).
pub const ARCHIVE_INTERVAL_SECS: u64 = 9000;

/// Heartbeat ping interval (seconds).
pub const WS_PING_INTERVAL_SECS: u64 = 30;

/// Reconnect backoff values in milliseconds.
pub const RECONNECT_BACKOFF_MS: &[u64] = &[500, 1_000, 2_000, 5_000, 10_000];

/// Number of drained payloads echoed to the debug log on every flush.
pub const SAMPLE_LOG_LIMIT: usize = 4;

/// Rows per multi-row INSERT statement. Keeps bind counts well under SQLite's limit.
pub const INSERT_CHUNK_ROWS: usize = 500;

/// Sports requested in the subscription filter when SPORTS is unset.
pub const DEFAULT_SPORTS: &[&str] = &["Soccer", "Tennis"];

#[derive(Debug, Clone)]
pub struct Config {
    pub ws_pinnacle_url: String,
    pub ws_analyzer_url: String,
    /// Bookmaker filter name sent on subscribe (FILTER_NAME)
    pub filter_name: String,
    /// Sports requested from both feeds (SPORTS, comma-separated)
    pub sports: Vec<String>,
    pub db_path: String,
    /// Root of the export tree (EXPORT_DIR)
    pub export_dir: PathBuf,
    pub log_level: String,
    pub write_interval_secs: u64,
    pub outdated_threshold_hours: u64,
    pub export_interval_secs: u64,
    pub archive_age_hours: u64,
    pub archive_interval_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let sports: Vec<String> = std::env::var("SPORTS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            ws_pinnacle_url: required("WS_PINNACLE_URL")?,
            ws_analyzer_url: required("WS_ANALYZER_URL")?,
            filter_name: std::env::var("FILTER_NAME").unwrap_or_else(|_| "default".to_string()),
            sports: if sports.is_empty() {
                DEFAULT_SPORTS.iter().map(|s| s.to_string()).collect()
            } else {
                sports
            },
            db_path: std::env::var("DB_PATH").unwrap_or_else(|_| "odds.db".to_string()),
            export_dir: std::env::var("EXPORT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("exports")),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            write_interval_secs: positive_or("WRITE_INTERVAL_SECS", WRITE_INTERVAL_SECS)?,
            outdated_threshold_hours: positive_or("OUTDATED_THRESHOLD_HOURS", OUTDATED_THRESHOLD_HOURS)?,
            export_interval_secs: positive_or("EXPORT_INTERVAL_SECS", EXPORT_INTERVAL_SECS)?,
            archive_age_hours: positive_or("ARCHIVE_AGE_HOURS", ARCHIVE_AGE_HOURS)?,
            archive_interval_secs: positive_or("ARCHIVE_INTERVAL_SECS", ARCHIVE_INTERVAL_SECS)?,
        })
    }
}

fn required(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| AppError::Config(format!("{key} must be set")))
}

fn parsed_or<T: FromStr>(key: &str, default: T) -> Result<T> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| AppError::Config(format!("{key} must be a non-negative integer, got {raw:?}"))),
        Err(_) => Ok(default),
    }
}

/// Like `parsed_or`, but zero is rejected. Used for periods and ages.
fn positive_or(key: &str, default: u64) -> Result<u64> {
    match parsed_or(key, default)? {
        0 => Err(AppError::Config(format!("{key} must be greater than zero"))),
        v => Ok(v),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parsed_or_falls_back_when_unset() {
        let v: u64 = parsed_or("ODDS_RECORDER_TEST_UNSET_VAR", 42).unwrap();
        assert_eq!(v, 42);
    }

    #[test]
    fn parsed_or_rejects_garbage() {
        std::env::set_var("ODDS_RECORDER_TEST_BAD_INTERVAL", "soon");
        let res: Result<u64> = parsed_or("ODDS_RECORDER_TEST_BAD_INTERVAL", 1);
        assert!(matches!(res, Err(AppError::Config(_))));
    }

    #[test]
    fn zero_interval_is_rejected() {
        std::env::set_var("ODDS_RECORDER_TEST_ZERO_INTERVAL", "0");
        let res = positive_or("ODDS_RECORDER_TEST_ZERO_INTERVAL", 60);
        assert!(matches!(res, Err(AppError::Config(msg)) if msg.contains("greater than zero")));

        std::env::set_var("ODDS_RECORDER_TEST_ONE_INTERVAL", " 1 ");
        assert_eq!(positive_or("ODDS_RECORDER_TEST_ONE_INTERVAL", 60).unwrap(), 1);
        assert_eq!(positive_or("ODDS_RECORDER_TEST_UNSET_PERIOD", 60).unwrap(), 60);
    }

    #[test]
    fn from_env_rejects_zero_write_interval() {
        std::env::set_var("WS_PINNACLE_URL", "ws://127.0.0.1:1/p");
        std::env::set_var("WS_ANALYZER_URL", "ws://127.0.0.1:1/a");
        std::env::set_var("WRITE_INTERVAL_SECS", "0");
        let res = Config::from_env();
        std::env::remove_var("WRITE_INTERVAL_SECS");
        assert!(matches!(res, Err(AppError::Config(msg)) if msg.starts_with("WRITE_INTERVAL_SECS")));
    }
}
