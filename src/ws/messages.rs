use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::{json, Map, Value};
use tracing::warn;

static PARSE_FAILURES: AtomicU64 = AtomicU64::new(0);

/// Parse a raw WebSocket text frame into the JSON objects it carries.
///
/// Both feeds push either a single object or an array of objects. Array
/// elements that are not objects are skipped with a warning, as are frames
/// that decode to a scalar. Undecodable frames yield nothing; the connection
/// carries on.
pub fn parse_ws_frame(raw: &str) -> Vec<Map<String, Value>> {
    let decoded = match serde_json::from_str::<Value>(raw) {
        Ok(v) => v,
        Err(e) => {
            let count = PARSE_FAILURES.fetch_add(1, Ordering::Relaxed) + 1;
            if count <= 10 || count % 1000 == 0 {
                let sample: String = raw.chars().take(500).collect();
                warn!(count, error = %e, "[WS PARSE] undecodable frame: {sample}");
            }
            return vec![];
        }
    };

    match decoded {
        Value::Object(obj) => vec![obj],
        Value::Array(items) => {
            let mut objects = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::Object(obj) => objects.push(obj),
                    other => warn!(kind = json_kind(&other), "[WS PARSE] non-object list element skipped"),
                }
            }
            objects
        }
        other => {
            warn!(kind = json_kind(&other), "[WS PARSE] unsupported frame shape");
            vec![]
        }
    }
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Subscription filter sent right after connecting: live odds for `sports`,
/// no prematch.
pub fn build_filter_msg(filter_name: &str, sports: &[String]) -> String {
    json!({
        "bookmakers": [{
            "live": {"filter": true, "sports": sports},
            "prematch": {"filter": false, "sports": []},
            "name": filter_name
        }]
    })
    .to_string()
}
