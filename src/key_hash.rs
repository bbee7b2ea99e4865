use sha2::{Digest, Sha256};

/// Lookup digest for a primary-feed row. Not unique per row: every
/// observation of the same (match, period, market, outcome) shares it.
pub fn primary_key_hash(match_id: i64, period: &str, market: &str, outcome: &str) -> String {
    digest(&format!("{match_id}-{period}-{market}-{outcome}"))
}

/// Lookup digest for an analyzer row.
pub fn comparison_key_hash(
    match_id_primary: i64,
    match_id_secondary: i64,
    market_type: i64,
    outcome: &str,
) -> String {
    digest(&format!("{match_id_primary}-{match_id_secondary}-{market_type}-{outcome}"))
}

fn digest(natural_key: &str) -> String {
    hex::encode(Sha256::digest(natural_key.as_bytes()))
}
