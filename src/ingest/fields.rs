//! Best-effort coercion of loosely typed upstream JSON fields.

use chrono::{DateTime, NaiveDateTime, SubsecRound, Utc};
use serde_json::Value;

use crate::error::{AppError, Result};

/// Parses an upstream ISO-8601 timestamp. Accepts a trailing `Z`, an explicit
/// offset, or no zone at all (read as UTC), with any fractional precision.
/// Precision beyond microseconds is truncated.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    let raw = raw.trim();
    let parsed = match DateTime::parse_from_rfc3339(raw) {
        Ok(dt) => dt.with_timezone(&Utc),
        Err(_) => {
            let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))?;
            naive.and_utc()
        }
    };
    Ok(parsed.trunc_subsecs(6))
}

/// Integer from a JSON number or numeric string. Floats are accepted only when integral.
pub fn coerce_i64(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite() && f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

/// Finite float from a JSON number or numeric string.
pub fn coerce_f64(v: &Value) -> Option<f64> {
    let parsed = match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|f| f.is_finite())
}

/// Optional free-text field; numbers are rendered, null and containers are absent.
pub fn coerce_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

pub fn required_i64(obj: &Value, key: &str) -> Result<i64> {
    obj.get(key)
        .and_then(coerce_i64)
        .ok_or_else(|| AppError::malformed(format!("missing or non-integer `{key}`")))
}

pub fn required_str<'a>(obj: &'a Value, key: &str) -> Result<&'a str> {
    obj.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| AppError::malformed(format!("missing or non-string `{key}`")))
}

pub fn optional_i64(obj: &Value, key: &str) -> Option<i64> {
    obj.get(key).and_then(coerce_i64)
}

pub fn optional_f64(obj: &Value, key: &str) -> Option<f64> {
    obj.get(key).and_then(coerce_f64)
}

pub fn optional_string(obj: &Value, key: &str) -> Option<String> {
    obj.get(key).and_then(coerce_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;
    use serde_json::json;

    #[test]
    fn nanosecond_timestamps_truncate_to_micros() {
        let dt = parse_timestamp("2025-04-07T12:30:05.123456789Z").unwrap();
        assert_eq!(dt.nanosecond(), 123_456_000);
        assert_eq!(dt.second(), 5);
    }

    #[test]
    fn zone_less_and_short_fraction_timestamps() {
        let a = parse_timestamp("2025-04-07T12:30:05.5").unwrap();
        assert_eq!(a.nanosecond(), 500_000_000);
        let b = parse_timestamp("2025-04-07T12:30:05").unwrap();
        assert_eq!(b.nanosecond(), 0);
        let c = parse_timestamp("2025-04-07T14:30:05+02:00").unwrap();
        assert_eq!(c.hour(), 12);
    }

    #[test]
    fn garbage_timestamp_is_an_error() {
        assert!(matches!(parse_timestamp("yesterday"), Err(AppError::Timestamp(_))));
    }

    #[test]
    fn numeric_coercions() {
        assert_eq!(coerce_i64(&json!("17")), Some(17));
        assert_eq!(coerce_i64(&json!(3.0)), Some(3));
        assert_eq!(coerce_i64(&json!(3.5)), None);
        assert_eq!(coerce_f64(&json!("1.85")), Some(1.85));
        assert_eq!(coerce_f64(&json!(null)), None);
        assert_eq!(coerce_f64(&json!({"value": 1})), None);
    }

    #[test]
    fn non_finite_odds_are_absent() {
        assert_eq!(coerce_f64(&json!("NaN")), None);
        assert_eq!(coerce_f64(&json!("inf")), None);
        assert_eq!(coerce_f64(&json!("-infinity")), None);
        assert_eq!(optional_f64(&json!({"roi": "nan"}), "roi"), None);
    }
}
