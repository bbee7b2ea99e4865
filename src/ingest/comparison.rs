use std::collections::HashSet;

use serde_json::Value;
use tracing::warn;

use crate::error::{AppError, Result};
use crate::ingest::fields::{
    coerce_f64, coerce_i64, optional_f64, optional_i64, optional_string, parse_timestamp,
    required_i64, required_str,
};
use crate::key_hash::comparison_key_hash;
use crate::types::ComparisonRow;

/// Market type recorded when an outcome entry carries none.
pub const UNKNOWN_MARKET_TYPE: i64 = -999;

/// Builds comparison rows for one flush batch.
///
/// Entries sharing `(createdAt, outcome)` anywhere in the batch are kept
/// once; the first occurrence wins.
pub fn build_comparison_rows(messages: &[Value]) -> Vec<ComparisonRow> {
    let mut rows = Vec::new();
    let mut seen: HashSet<(String, String)> = HashSet::new();

    for msg in messages {
        let parsed = match parse_comparison_record(msg) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(error = %e, "skipping analyzer message: {msg}");
                continue;
            }
        };
        for row in parsed {
            if seen.insert((row.raw_created_at.clone(), row.outcome.clone())) {
                rows.push(row);
            }
        }
    }
    rows
}

/// One row per entry of the `outcome` list. Record-level fields are required;
/// an entry without an `outcome` name is skipped on its own, and missing
/// prices, ROI or margin become `None`.
pub fn parse_comparison_record(msg: &Value) -> Result<Vec<ComparisonRow>> {
    let first = msg
        .get("first")
        .filter(|v| v.is_object())
        .ok_or_else(|| AppError::malformed("missing `first` object"))?;
    let second = msg
        .get("second")
        .filter(|v| v.is_object())
        .ok_or_else(|| AppError::malformed("missing `second` object"))?;

    let match_id_primary = required_i64(first, "matchId")?;
    let match_id_secondary = required_i64(second, "matchId")?;
    let raw_created_at = required_str(msg, "createdAt")?.to_string();
    let created_at = parse_timestamp(&raw_created_at)?;
    let home_team = required_str(first, "homeName")?.to_string();
    let away_team = required_str(first, "awayName")?.to_string();
    let sport_name = msg
        .get("sportName")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let home_score = optional_i64(first, "homeScore");
    let away_score = optional_i64(first, "awayScore");
    let league_primary = optional_string(first, "leagueName");
    let league_secondary = optional_string(second, "leagueName");

    let entries = msg
        .get("outcome")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let mut rows = Vec::with_capacity(entries.len());
    for entry in entries {
        let Some(outcome) = entry.get("outcome").and_then(Value::as_str) else {
            warn!(match_id = match_id_primary, "analyzer outcome entry without a name: {entry}");
            continue;
        };
        let market_type = match entry.get("marketType") {
            None | Some(Value::Null) => UNKNOWN_MARKET_TYPE,
            Some(v) => match coerce_i64(v) {
                Some(mt) => mt,
                None => {
                    warn!(match_id = match_id_primary, outcome, "non-integer marketType: {v}");
                    continue;
                }
            },
        };

        rows.push(ComparisonRow {
            match_id_primary,
            match_id_secondary,
            home_team: home_team.clone(),
            away_team: away_team.clone(),
            home_score,
            away_score,
            sport_name: sport_name.clone(),
            league_primary: league_primary.clone(),
            league_secondary: league_secondary.clone(),
            market_type,
            outcome: outcome.to_string(),
            value_primary: nested_value(entry, "score1"),
            value_secondary: nested_value(entry, "score2"),
            roi: optional_f64(entry, "roi"),
            margin: optional_f64(entry, "margin"),
            created_at,
            raw_created_at: raw_created_at.clone(),
            key_hash: comparison_key_hash(match_id_primary, match_id_secondary, market_type, outcome),
        });
    }

    Ok(rows)
}

fn nested_value(entry: &Value, key: &str) -> Option<f64> {
    entry.get(key)?.get("value").and_then(coerce_f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn analyzer_msg(created_at: &str, match_id: i64, outcomes: Value) -> Value {
        json!({
            "sportName": "Tennis",
            "createdAt": created_at,
            "first": {
                "matchId": match_id,
                "homeName": "Alcaraz C.",
                "awayName": "Sinner J.",
                "homeScore": 1,
                "leagueName": "ATP Madrid"
            },
            "second": {"matchId": "777", "leagueName": "Madrid"},
            "outcome": outcomes
        })
    }

    #[test]
    fn one_row_per_outcome_entry() {
        let msg = analyzer_msg(
            "2025-04-07T18:00:00.123456789Z",
            55,
            json!([
                {"outcome": "Win1", "marketType": 1, "score1": {"value": 1.9}, "score2": {"value": "2.05"}, "roi": 3.1, "margin": 2.2},
                {"outcome": "P1 > 10.5", "marketType": "4", "score1": {"value": 1.7}, "score2": {}}
            ]),
        );
        let rows = parse_comparison_record(&msg).unwrap();
        assert_eq!(rows.len(), 2);

        let win1 = &rows[0];
        assert_eq!(win1.match_id_primary, 55);
        assert_eq!(win1.match_id_secondary, 777);
        assert_eq!(win1.value_secondary, Some(2.05));
        assert_eq!(win1.home_score, Some(1));
        assert_eq!(win1.away_score, None);
        assert_eq!(win1.league_secondary.as_deref(), Some("Madrid"));
        assert_eq!(win1.raw_created_at, "2025-04-07T18:00:00.123456789Z");

        let total = &rows[1];
        assert_eq!(total.market_type, 4);
        assert_eq!(total.value_secondary, None);
        assert_eq!(total.roi, None);
        assert_eq!(total.margin, None);
    }

    #[test]
    fn missing_market_type_uses_sentinel() {
        let msg = analyzer_msg("2025-04-07T18:00:00Z", 1, json!([{"outcome": "Win2"}]));
        let rows = parse_comparison_record(&msg).unwrap();
        assert_eq!(rows[0].market_type, UNKNOWN_MARKET_TYPE);
    }

    #[test]
    fn duplicate_created_at_and_outcome_kept_once_per_batch() {
        let a = analyzer_msg(
            "2025-04-07T18:00:00.5Z",
            1,
            json!([{"outcome": "Win1", "roi": 1.0}, {"outcome": "Win1", "roi": 2.0}]),
        );
        let b = analyzer_msg("2025-04-07T18:00:00.5Z", 1, json!([{"outcome": "Win1", "roi": 9.0}]));
        let c = analyzer_msg("2025-04-07T18:00:01Z", 1, json!([{"outcome": "Win1", "roi": 4.0}]));

        let rows = build_comparison_rows(&[a, b, c]);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].roi, Some(1.0));
        assert_eq!(rows[1].roi, Some(4.0));
    }

    #[test]
    fn nameless_entry_skipped_alone() {
        let msg = analyzer_msg(
            "2025-04-07T18:00:00Z",
            1,
            json!([{"marketType": 1}, {"outcome": "Win2", "marketType": 1}]),
        );
        let rows = build_comparison_rows(&[msg]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].outcome, "Win2");
    }

    #[test]
    fn malformed_message_does_not_abort_batch() {
        let no_second = json!({"createdAt": "2025-04-07T18:00:00Z", "first": {"matchId": 1}, "outcome": []});
        let good = analyzer_msg("2025-04-07T18:00:00Z", 2, json!([{"outcome": "Win1"}]));
        let rows = build_comparison_rows(&[no_second, good]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].match_id_primary, 2);
    }
}
