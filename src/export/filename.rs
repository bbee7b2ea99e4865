use chrono::{DateTime, Utc};

/// Lowercases and flattens free text into `[a-z0-9_.]`.
///
/// `<` and `>` are spelled out first so comparison lines stay readable
/// (`"P1 > 10.5"` becomes `"p1_over_10.5"`). Every run of other characters,
/// together with any underscores touching it, collapses to a single `_`.
pub fn sanitize_filename_part(name: &str) -> String {
    let spelled = name.replace('<', "_less").replace('>', "_over");
    let lowered = spelled.to_lowercase();

    let mut out = String::with_capacity(lowered.len());
    let mut in_separator = false;
    for c in lowered.trim().chars() {
        let allowed = c.is_ascii_lowercase() || c.is_ascii_digit() || c == '.' || c == '_';
        if !allowed {
            if !in_separator {
                while out.ends_with('_') {
                    out.pop();
                }
                out.push('_');
                in_separator = true;
            }
        } else if c == '_' && in_separator {
            continue;
        } else {
            out.push(c);
            in_separator = false;
        }
    }
    out
}

/// `{matchId}_{YYYY-MM-DD}_{home}_vs_{away}_{sport}[_{outcome}].csv`
pub fn format_filename(
    match_id: i64,
    created_at: DateTime<Utc>,
    home: &str,
    away: &str,
    sport: &str,
    outcome: Option<&str>,
) -> String {
    let mut name = format!(
        "{match_id}_{}_{}_vs_{}_{}",
        created_at.format("%Y-%m-%d"),
        sanitize_filename_part(home),
        sanitize_filename_part(away),
        sanitize_filename_part(sport),
    );
    if let Some(outcome) = outcome.filter(|o| !o.is_empty()) {
        name.push('_');
        name.push_str(&sanitize_filename_part(outcome));
    }
    name.push_str(".csv");
    name
}
