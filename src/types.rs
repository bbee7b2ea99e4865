use chrono::{DateTime, Utc};
use serde_json::Value;

/// `Source` tag carried by primary-feed payloads.
pub const PRIMARY_SOURCE_TAG: &str = "Pinnacle";

/// Placeholder market/outcome for periods that offered no priced markets.
pub const META_MARKET: &str = "meta";

// ---------------------------------------------------------------------------
// Feed
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feed {
    /// Primary bookmaker's live odds.
    Primary,
    /// Cross-bookmaker comparison (analyzer).
    Analyzer,
}

impl std::fmt::Display for Feed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Feed::Primary => "pinnacle",
            Feed::Analyzer => "analyzer",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Ingested records
// ---------------------------------------------------------------------------

/// One upstream JSON object on its way into an aggregator.
///
/// Feed clients know which socket a payload came from and tag it explicitly.
/// `Untagged` exists for payloads of unknown provenance; those are classified
/// by shape the same way the legacy mixed buffer was.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Primary(Value),
    Analyzer(Value),
    Untagged(Value),
}

impl Record {
    pub fn tagged(feed: Feed, payload: Value) -> Self {
        match feed {
            Feed::Primary => Record::Primary(payload),
            Feed::Analyzer => Record::Analyzer(payload),
        }
    }

    /// Feed this record belongs to, or `None` if it should be dropped.
    /// Shape predicates are checked primary-first so an untagged payload
    /// never lands in both groups.
    pub fn classify(&self) -> Option<Feed> {
        match self {
            Record::Primary(v) if has_foreign_source(v) => None,
            Record::Primary(_) => Some(Feed::Primary),
            Record::Analyzer(_) => Some(Feed::Analyzer),
            Record::Untagged(v) if is_primary_shape(v) => Some(Feed::Primary),
            Record::Untagged(v) if is_analyzer_shape(v) => Some(Feed::Analyzer),
            Record::Untagged(_) => None,
        }
    }

    pub fn payload(&self) -> &Value {
        match self {
            Record::Primary(v) | Record::Analyzer(v) | Record::Untagged(v) => v,
        }
    }

    pub fn into_payload(self) -> Value {
        match self {
            Record::Primary(v) | Record::Analyzer(v) | Record::Untagged(v) => v,
        }
    }
}

pub fn is_primary_shape(v: &Value) -> bool {
    v.get("Source").and_then(Value::as_str) == Some(PRIMARY_SOURCE_TAG)
}

/// A `Source` naming some other bookmaker. Payloads without a `Source`
/// rely on the socket they arrived on.
fn has_foreign_source(v: &Value) -> bool {
    v.get("Source").is_some_and(|s| s.as_str() != Some(PRIMARY_SOURCE_TAG))
}

pub fn is_analyzer_shape(v: &Value) -> bool {
    v.as_object()
        .map_or(false, |o| ["first", "second", "outcome"].iter().all(|k| o.contains_key(*k)))
}

// ---------------------------------------------------------------------------
// Long-format rows
// ---------------------------------------------------------------------------

/// One primary-feed outcome value at one observed timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct LongRow {
    pub match_id: i64,
    pub home_team: String,
    pub away_team: String,
    pub home_score: Option<i64>,
    pub away_score: Option<i64>,
    pub sport_name: String,
    pub period: String,
    pub market: String,
    pub outcome: String,
    /// Line key as delivered upstream, e.g. "2.5"; empty for placeholders.
    pub line: String,
    pub value: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub key_hash: String,
}

impl LongRow {
    pub fn is_placeholder(&self) -> bool {
        self.market == META_MARKET && self.outcome == META_MARKET
    }
}

/// One analyzer outcome comparison at one snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonRow {
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
    pub created_at: DateTime<Utc>,
    /// Upstream timestamp string, untouched (may carry nanoseconds).
    pub raw_created_at: String,
    pub key_hash: String,
}

// ---------------------------------------------------------------------------
// Stale-series grouping
// ---------------------------------------------------------------------------

/// Identity of one exportable series in the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GroupKey {
    /// Every primary row of a match.
    Match(i64),
    /// Analyzer rows of one outcome of a match; ROI and margin evolve per outcome.
    MatchOutcome(i64, String),
}

impl std::fmt::Display for GroupKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GroupKey::Match(id) => write!(f, "match={id}"),
            GroupKey::MatchOutcome(id, outcome) => write!(f, "match={id} outcome={outcome}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Market families with slotted export columns
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarketFamily {
    Totals,
    Handicap,
    FirstTeamTotals,
    SecondTeamTotals,
    Games,
}

impl MarketFamily {
    pub const ALL: [MarketFamily; 5] = [
        MarketFamily::Totals,
        MarketFamily::Handicap,
        MarketFamily::FirstTeamTotals,
        MarketFamily::SecondTeamTotals,
        MarketFamily::Games,
    ];

    pub fn from_market(market: &str) -> Option<Self> {
        match market {
            "Totals" => Some(MarketFamily::Totals),
            "Handicap" => Some(MarketFamily::Handicap),
            "FirstTeamTotals" => Some(MarketFamily::FirstTeamTotals),
            "SecondTeamTotals" => Some(MarketFamily::SecondTeamTotals),
            "Games" => Some(MarketFamily::Games),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MarketFamily::Totals => "Totals",
            MarketFamily::Handicap => "Handicap",
            MarketFamily::FirstTeamTotals => "FirstTeamTotals",
            MarketFamily::SecondTeamTotals => "SecondTeamTotals",
            MarketFamily::Games => "Games",
        }
    }

    /// Number of distinct lines that get their own export columns.
    pub fn slot_capacity(&self) -> usize {
        match self {
            MarketFamily::FirstTeamTotals | MarketFamily::SecondTeamTotals => 2,
            MarketFamily::Totals | MarketFamily::Handicap | MarketFamily::Games => 3,
        }
    }

    pub fn outcomes(&self) -> [&'static str; 2] {
        match self {
            MarketFamily::Handicap => ["Win1", "Win2"],
            _ => ["WinMore", "WinLess"],
        }
    }

    pub fn accepts_outcome(&self, outcome: &str) -> bool {
        self.outcomes().contains(&outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn untagged_classification_is_disjoint() {
        let both = json!({"Source": "Pinnacle", "first": {}, "second": {}, "outcome": []});
        let analyzer = json!({"first": {}, "second": {}, "outcome": []});
        let partial = json!({"first": {}, "outcome": []});
        let other_source = json!({"Source": "Lobbet"});

        assert_eq!(Record::Untagged(both).classify(), Some(Feed::Primary));
        assert_eq!(Record::Untagged(analyzer).classify(), Some(Feed::Analyzer));
        assert_eq!(Record::Untagged(partial).classify(), None);
        assert_eq!(Record::Untagged(other_source).classify(), None);
        assert_eq!(Record::Untagged(json!([1, 2])).classify(), None);
    }

    #[test]
    fn tagged_records_keep_their_feed() {
        let r = Record::tagged(Feed::Analyzer, json!({"anything": true}));
        assert_eq!(r.classify(), Some(Feed::Analyzer));
        let r = Record::tagged(Feed::Primary, json!({"MatchId": 1}));
        assert_eq!(r.classify(), Some(Feed::Primary));
    }

    #[test]
    fn primary_socket_record_from_other_bookmaker_is_dropped() {
        let lobbet = Record::tagged(Feed::Primary, json!({"Source": "Lobbet", "MatchId": 77}));
        let null_source = Record::tagged(Feed::Primary, json!({"Source": null, "MatchId": 77}));
        let pinnacle = Record::tagged(Feed::Primary, json!({"Source": "Pinnacle", "MatchId": 77}));
        assert_eq!(lobbet.classify(), None);
        assert_eq!(null_source.classify(), None);
        assert_eq!(pinnacle.classify(), Some(Feed::Primary));
    }

    #[test]
    fn family_capacities() {
        assert_eq!(MarketFamily::Totals.slot_capacity(), 3);
        assert_eq!(MarketFamily::FirstTeamTotals.slot_capacity(), 2);
        assert!(MarketFamily::Handicap.accepts_outcome("Win2"));
        assert!(!MarketFamily::Handicap.accepts_outcome("WinMore"));
        assert_eq!(MarketFamily::from_market("Win1x2"), None);
    }
}
