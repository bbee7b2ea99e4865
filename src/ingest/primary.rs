use serde_json::Value;
use tracing::warn;

use crate::error::Result;
use crate::ingest::fields::{coerce_f64, optional_i64, parse_timestamp, required_i64, required_str};
use crate::key_hash::primary_key_hash;
use crate::types::{LongRow, META_MARKET};

/// Flattens a batch of primary-feed payloads into long rows.
/// A payload that fails required-field coercion is logged and skipped; the
/// rest of the batch is still processed.
pub fn build_long_rows(messages: &[Value]) -> Vec<LongRow> {
    let mut rows = Vec::new();
    for msg in messages {
        match parse_primary_record(msg) {
            Ok(mut parsed) => rows.append(&mut parsed),
            Err(e) => warn!(error = %e, "skipping primary message: {msg}"),
        }
    }
    rows
}

/// Walks `Periods[i] -> market -> line -> outcome -> {value}` and emits one
/// row per numeric leaf. A period with no numeric leaves yields exactly one
/// `meta` placeholder row so the period is still represented in the store.
pub fn parse_primary_record(msg: &Value) -> Result<Vec<LongRow>> {
    let match_id = required_i64(msg, "MatchId")?;
    let created_at = parse_timestamp(required_str(msg, "CreatedAt")?)?;
    let home_team = text_or_empty(msg, "homeName");
    let away_team = text_or_empty(msg, "awayName");
    let sport_name = text_or_empty(msg, "SportName");
    let home_score = optional_i64(msg, "HomeScore");
    let away_score = optional_i64(msg, "AwayScore");

    let periods = msg
        .get("Periods")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let row = |period: &str, market: &str, outcome: &str, line: &str, value: Option<f64>| LongRow {
        match_id,
        home_team: home_team.clone(),
        away_team: away_team.clone(),
        home_score,
        away_score,
        sport_name: sport_name.clone(),
        period: period.to_string(),
        market: market.to_string(),
        outcome: outcome.to_string(),
        line: line.to_string(),
        value,
        created_at,
        key_hash: primary_key_hash(match_id, period, market, outcome),
    };

    let mut rows = Vec::new();
    for (index, period_data) in periods.iter().enumerate() {
        let period = period_label(&sport_name, index);
        let before = rows.len();

        let markets = period_data.as_object().into_iter().flatten();
        for (market, lines) in markets {
            let Some(lines) = lines.as_object() else { continue };
            for (line, outcomes) in lines {
                let Some(outcomes) = outcomes.as_object() else { continue };
                for (outcome, leaf) in outcomes {
                    let Some(value) = leaf.get("value").and_then(coerce_f64) else { continue };
                    rows.push(row(&period, market.as_str(), outcome.as_str(), line.as_str(), Some(value)));
                }
            }
        }

        if rows.len() == before {
            rows.push(row(&period, META_MARKET, META_MARKET, "", None));
        }
    }

    Ok(rows)
}

/// Human label for a period index. Index 0 is always the full match.
pub fn period_label(sport_name: &str, index: usize) -> String {
    match (sport_name, index) {
        (_, 0) => "Match".to_string(),
        ("Soccer", 1) => "1H".to_string(),
        ("Soccer", 2) => "2H".to_string(),
        ("Soccer", i) => format!("H{i}"),
        ("Tennis", i) => format!("Set{i}"),
        (_, i) => format!("P{i}"),
    }
}

fn text_or_empty(msg: &Value, key: &str) -> String {
    msg.get(key).and_then(Value::as_str).unwrap_or_default().to_string()
}
