/// Database row types for the `live_odds` and `analyzer_odds` tables.
/// Timestamps are stored as microseconds since the Unix epoch.
use chrono::{DateTime, Utc};

use crate::error::{AppError, Result};
use crate::types::{ComparisonRow, LongRow};

#[derive(Debug, sqlx::FromRow)]
pub struct LiveOddsRecord {
    pub id: i64,
    pub match_id: i64,
    pub home_team: String,
    pub away_team: String,
    pub home_score: Option<i64>,
    pub away_score: Option<i64>,
    pub sport_name: String,
    pub period: String,
    pub market: String,
    pub outcome: String,
    pub line: String,
    pub value: Option<f64>,
    pub created_at: i64,
    pub key_hash: String,
}

#[derive(Debug, sqlx::FromRow)]
pub struct AnalyzerOddsRecord {
    pub id: i64,
    pub match_id_primary: i64,
    pub match_id_secondary: i64,
    pub home_team: String,
    pub away_team: String,
    pub home_score: Option<i64>,
    pub away_score: Option<i64>,
    pub sport_name: String,
    pub league_primary: Option<String>,
    pub league_secondary: Option<String>,
    pub market_type: i64,
    pub outcome: String,
    pub value_primary: Option<f64>,
    pub value_secondary: Option<f64>,
    pub roi: Option<f64>,
    pub margin: Option<f64>,
    pub created_at: i64,
    pub raw_created_at: String,
    pub key_hash: String,
}

pub fn to_micros(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_micros()
}

pub fn from_micros(us: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_micros(us)
        .ok_or_else(|| AppError::malformed(format!("stored timestamp out of range: {us}")))
}

impl TryFrom<LiveOddsRecord> for LongRow {
    type Error = AppError;

    fn try_from(r: LiveOddsRecord) -> Result<Self> {
        Ok(LongRow {
            match_id: r.match_id,
            home_team: r.home_team,
            away_team: r.away_team,
            home_score: r.home_score,
            away_score: r.away_score,
            sport_name: r.sport_name,
            period: r.period,
            market: r.market,
            outcome: r.outcome,
            line: r.line,
            value: r.value,
            created_at: from_micros(r.created_at)?,
            key_hash: r.key_hash,
        })
    }
}

impl TryFrom<AnalyzerOddsRecord> for ComparisonRow {
    type Error = AppError;

    fn try_from(r: AnalyzerOddsRecord) -> Result<Self> {
        Ok(ComparisonRow {
            match_id_primary: r.match_id_primary,
            match_id_secondary: r.match_id_secondary,
            home_team: r.home_team,
            away_team: r.away_team,
            home_score: r.home_score,
            away_score: r.away_score,
            sport_name: r.sport_name,
            league_primary: r.league_primary,
            league_secondary: r.league_secondary,
            market_type: r.market_type,
            outcome: r.outcome,
            value_primary: r.value_primary,
            value_secondary: r.value_secondary,
            roi: r.roi,
            margin: r.margin,
            created_at: from_micros(r.created_at)?,
            raw_created_at: r.raw_created_at,
            key_hash: r.key_hash,
        })
    }
}
