//! Row builders shared by store, export and collector tests.

use chrono::{DateTime, Utc};

use crate::ingest::fields::parse_timestamp;
use crate::key_hash::{comparison_key_hash, primary_key_hash};
use crate::types::{ComparisonRow, LongRow};

pub fn ts(raw: &str) -> DateTime<Utc> {
    parse_timestamp(raw).unwrap()
}

pub fn long_row(
    match_id: i64,
    period: &str,
    market: &str,
    line: &str,
    outcome: &str,
    value: f64,
    created_at: DateTime<Utc>,
) -> LongRow {
    LongRow {
        match_id,
        home_team: "Real Madrid".to_string(),
        away_team: "Barcelona".to_string(),
        home_score: Some(0),
        away_score: Some(1),
        sport_name: "Soccer".to_string(),
        period: period.to_string(),
        market: market.to_string(),
        outcome: outcome.to_string(),
        line: line.to_string(),
        value: Some(value),
        created_at,
        key_hash: primary_key_hash(match_id, period, market, outcome),
    }
}

pub fn comparison_row(match_id: i64, outcome: &str, created_at: DateTime<Utc>) -> ComparisonRow {
    ComparisonRow {
        match_id_primary: match_id,
        match_id_secondary: match_id + 100_000,
        home_team: "Alcaraz C.".to_string(),
        away_team: "Sinner J.".to_string(),
        home_score: Some(1),
        away_score: None,
        sport_name: "Tennis".to_string(),
        league_primary: Some("ATP Madrid".to_string()),
        league_secondary: None,
        market_type: 1,
        outcome: outcome.to_string(),
        value_primary: Some(1.91),
        value_secondary: Some(2.02),
        roi: Some(3.5),
        margin: None,
        created_at,
        raw_created_at: created_at.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string(),
        key_hash: comparison_key_hash(match_id, match_id + 100_000, 1, outcome),
    }
}
