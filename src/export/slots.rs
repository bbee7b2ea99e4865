//! Folding a match's long rows into fixed-width export snapshots.
//!
//! The export has a fixed column budget per market family, but the lines a
//! match is offered on drift over its lifetime. Each family therefore keeps a
//! small ordered set of the distinct lines seen so far; a line's slot is its
//! position in that set. Slots are handed out in order of first appearance,
//! not by magnitude, and a new line arriving once the family is full gets no
//! column at all.

use std::collections::{BTreeMap, HashMap};

use chrono::{NaiveDateTime, SubsecRound};

use crate::export::columns::primary_value_column;
use crate::types::{LongRow, MarketFamily};

/// Match result market; its outcomes map straight onto columns.
pub const RESULT_MARKET: &str = "Win1x2";

const MAX_SLOTS: usize = 3;

/// Fixed-capacity ordered set of line values, insert-if-absent by linear scan.
#[derive(Debug, Clone)]
pub struct LineSlots {
    seen: [f64; MAX_SLOTS],
    len: usize,
    capacity: usize,
}

impl LineSlots {
    pub fn new(capacity: usize) -> Self {
        Self {
            seen: [0.0; MAX_SLOTS],
            len: 0,
            capacity: capacity.min(MAX_SLOTS),
        }
    }

    /// Zero-based slot of `line`, claiming the next free slot for a new line.
    /// `None` once every slot belongs to some other line.
    pub fn slot_for(&mut self, line: f64) -> Option<usize> {
        if let Some(pos) = self.seen[..self.len].iter().position(|&l| l == line) {
            return Some(pos);
        }
        if self.len < self.capacity {
            self.seen[self.len] = line;
            self.len += 1;
            return Some(self.len - 1);
        }
        None
    }

    #[cfg(test)]
    pub fn lines(&self) -> &[f64] {
        &self.seen[..self.len]
    }
}

/// Per-export slot state for every market family. Build one per match export.
#[derive(Debug, Clone)]
pub struct SlotMapper {
    families: [LineSlots; 5],
}

impl Default for SlotMapper {
    fn default() -> Self {
        Self::new()
    }
}

impl SlotMapper {
    pub fn new() -> Self {
        Self {
            families: MarketFamily::ALL.map(|f| LineSlots::new(f.slot_capacity())),
        }
    }

    /// Export column for one row, or `None` if the row has no column: an
    /// unsupported market/outcome, or a line beyond the family's capacity.
    pub fn column_for(&mut self, market: &str, line: &str, outcome: &str) -> Option<&'static str> {
        if market == RESULT_MARKET {
            return primary_value_column(outcome);
        }
        let family = MarketFamily::from_market(market)?;
        if !family.accepts_outcome(outcome) {
            return None;
        }
        let slot = self.slots_mut(family).slot_for(parse_line(line))?;
        primary_value_column(&format!("{}_{}_{}", family.as_str(), slot + 1, outcome))
    }

    #[cfg(test)]
    pub fn lines(&self, family: MarketFamily) -> &[f64] {
        self.families[family_index(family)].lines()
    }

    fn slots_mut(&mut self, family: MarketFamily) -> &mut LineSlots {
        &mut self.families[family_index(family)]
    }
}

fn family_index(family: MarketFamily) -> usize {
    match family {
        MarketFamily::Totals => 0,
        MarketFamily::Handicap => 1,
        MarketFamily::FirstTeamTotals => 2,
        MarketFamily::SecondTeamTotals => 3,
        MarketFamily::Games => 4,
    }
}

/// Unparseable or non-finite lines collapse onto 0.0.
fn parse_line(line: &str) -> f64 {
    line.trim()
        .parse::<f64>()
        .ok()
        .filter(|l| l.is_finite())
        .unwrap_or(0.0)
}

// ---------------------------------------------------------------------------
// Snapshots
// ---------------------------------------------------------------------------

/// One export row: every value observed for one period at one second.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub created_at: NaiveDateTime,
    pub period: String,
    pub home_team: String,
    pub away_team: String,
    pub home_score: i64,
    pub away_score: i64,
    pub values: HashMap<&'static str, f64>,
}

impl Snapshot {
    pub fn value(&self, column: &str) -> Option<f64> {
        self.values.get(column).copied()
    }
}

/// Snapshots of one match keyed by `(timestamp, period)`; iteration order is
/// the export's row order.
#[derive(Debug, Default)]
pub struct SnapshotTable {
    mapper: SlotMapper,
    snapshots: BTreeMap<(NaiveDateTime, String), Snapshot>,
    rows: usize,
    overflowed: usize,
}

impl SnapshotTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one row in. Rows must be pushed in arrival order; that order
    /// decides slot numbers.
    pub fn push(&mut self, row: &LongRow) {
        self.rows += 1;
        let created_at = row.created_at.naive_utc().trunc_subsecs(0);

        let snap = self
            .snapshots
            .entry((created_at, row.period.clone()))
            .or_insert_with(|| Snapshot {
                created_at,
                period: row.period.clone(),
                home_team: String::new(),
                away_team: String::new(),
                home_score: 0,
                away_score: 0,
                values: HashMap::new(),
            });
        snap.home_team.clone_from(&row.home_team);
        snap.away_team.clone_from(&row.away_team);
        if let Some(score) = row.home_score {
            snap.home_score = score;
        }
        if let Some(score) = row.away_score {
            snap.away_score = score;
        }
        if row.is_placeholder() {
            return;
        }

        let family = MarketFamily::from_market(&row.market);
        match self.mapper.column_for(&row.market, &row.line, &row.outcome) {
            Some(column) => {
                if let Some(value) = row.value {
                    snap.values.insert(column, value);
                }
            }
            None if family.is_some_and(|f| f.accepts_outcome(&row.outcome)) => self.overflowed += 1,
            None => {}
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Snapshot> {
        self.snapshots.values()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Rows folded in so far.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Rows whose line found no free slot.
    pub fn overflowed(&self) -> usize {
        self.overflowed
    }
}
