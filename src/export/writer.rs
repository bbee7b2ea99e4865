use std::fs::{self, File};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

use crate::error::{AppError, Result};
use crate::export::columns::{
    NULL_CELL, PRIMARY_BOOKMAKER, PRIMARY_COLUMNS, PRIMARY_META_COLUMNS, SECONDARY_BOOKMAKER,
};
use crate::export::slots::SnapshotTable;
use crate::types::{ComparisonRow, Feed};

// ---------------------------------------------------------------------------
// Directory layout
// ---------------------------------------------------------------------------

/// Export directories under the configured root. The archiver zips finished
/// `*.csv` files from the feed directories into `archives`.
#[derive(Debug, Clone)]
pub struct ExportPaths {
    pub pinnacle: PathBuf,
    pub analyzer: PathBuf,
    pub archives: PathBuf,
}

impl ExportPaths {
    pub fn new(root: &Path) -> Self {
        Self {
            pinnacle: root.join("pinnacle"),
            analyzer: root.join("analyzer"),
            archives: root.join("archives"),
        }
    }

    /// Creates every export directory that does not exist yet.
    pub fn ensure(root: &Path) -> Result<Self> {
        let paths = Self::new(root);
        for dir in [&paths.pinnacle, &paths.analyzer, &paths.archives] {
            fs::create_dir_all(dir)?;
        }
        Ok(paths)
    }

    pub fn for_feed(&self, feed: Feed) -> &Path {
        match feed {
            Feed::Primary => &self.pinnacle,
            Feed::Analyzer => &self.analyzer,
        }
    }
}

// ---------------------------------------------------------------------------
// File handling
// ---------------------------------------------------------------------------

/// Writes one export into `dir` under `name` and returns its final path.
///
/// Content goes to `{name}.part` first and is renamed into place only after it
/// has been flushed and synced, so readers that glob `*.csv` never see a
/// partial file. An existing file of the same name is never overwritten; the
/// new export gets a `_{YYYYmmddTHHMMSS}` suffix instead. On failure the
/// `.part` file is removed.
pub fn write_export<F>(dir: &Path, name: &str, now: DateTime<Utc>, fill: F) -> Result<PathBuf>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<()>,
{
    let target = vacant_target(dir, name, now);
    let mut part_name = target.file_name().unwrap_or_default().to_os_string();
    part_name.push(".part");
    let part = target.with_file_name(part_name);

    let written = File::create(&part).map_err(AppError::from).and_then(|file| {
        let mut out = BufWriter::new(file);
        fill(&mut out)?;
        let file = out.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        fs::rename(&part, &target)?;
        Ok(())
    });
    if let Err(e) = written {
        if let Err(rm) = fs::remove_file(&part) {
            if rm.kind() != ErrorKind::NotFound {
                warn!(path = %part.display(), error = %rm, "could not remove partial export");
            }
        }
        return Err(e);
    }
    Ok(target)
}

/// `write_export` on the blocking pool, for callers on the async runtime.
pub async fn spawn_export<F>(dir: PathBuf, name: String, now: DateTime<Utc>, fill: F) -> Result<PathBuf>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<()> + Send + 'static,
{
    tokio::task::spawn_blocking(move || write_export(&dir, &name, now, fill)).await?
}

fn vacant_target(dir: &Path, name: &str, now: DateTime<Utc>) -> PathBuf {
    let target = dir.join(name);
    if !target.exists() {
        return target;
    }
    let stem = name.strip_suffix(".csv").unwrap_or(name);
    let stamp = now.format("%Y%m%dT%H%M%S");
    let mut candidate = dir.join(format!("{stem}_{stamp}.csv"));
    let mut n = 1;
    while candidate.exists() {
        candidate = dir.join(format!("{stem}_{stamp}_{n}.csv"));
        n += 1;
    }
    warn!(existing = %target.display(), path = %candidate.display(), "export already exists, writing alongside");
    candidate
}

// ---------------------------------------------------------------------------
// CSV bodies
// ---------------------------------------------------------------------------

/// One row per snapshot in `(CreatedAt, PeriodType)` order.
pub fn write_primary_csv<W: Write>(out: W, table: &SnapshotTable) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(out);
    wtr.write_record(PRIMARY_COLUMNS)?;

    let mut record: Vec<String> = Vec::with_capacity(PRIMARY_COLUMNS.len());
    for snap in table.iter() {
        record.clear();
        record.push(snap.created_at.format("%Y-%m-%dT%H:%M:%S").to_string());
        record.push(snap.period.clone());
        record.push(snap.home_team.clone());
        record.push(snap.away_team.clone());
        record.push(snap.home_score.to_string());
        record.push(snap.away_score.to_string());
        for column in &PRIMARY_COLUMNS[PRIMARY_META_COLUMNS..] {
            record.push(match snap.value(column) {
                Some(v) => format_odds(v),
                None => NULL_CELL.to_string(),
            });
        }
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Keeps a trailing `.0` on whole numbers, matching how the analyzer export
/// prints floats.
fn format_odds(v: f64) -> String {
    format!("{v:?}")
}

#[derive(Serialize)]
struct AnalyzerCsvRow<'a> {
    #[serde(rename = "createdAt")]
    created_at: &'a str,
    #[serde(rename = "sportName")]
    sport_name: &'a str,
    #[serde(rename = "matchId_pinnacle")]
    match_id_primary: i64,
    #[serde(rename = "matchId_lobbet")]
    match_id_secondary: i64,
    #[serde(rename = "homeName")]
    home_team: &'a str,
    #[serde(rename = "awayName")]
    away_team: &'a str,
    #[serde(rename = "homeScore")]
    home_score: Option<i64>,
    #[serde(rename = "awayScore")]
    away_score: Option<i64>,
    league_pinnacle: Option<&'a str>,
    league_lobbet: Option<&'a str>,
    bookmaker_1: &'static str,
    bookmaker_2: &'static str,
    market: i64,
    outcome: &'a str,
    value_pinnacle: Option<f64>,
    value_lobbet: Option<f64>,
    roi: Option<f64>,
    margin: Option<f64>,
    #[serde(rename = "marketType")]
    market_type: i64,
}

impl<'a> From<&'a ComparisonRow> for AnalyzerCsvRow<'a> {
    fn from(r: &'a ComparisonRow) -> Self {
        Self {
            created_at: &r.raw_created_at,
            sport_name: &r.sport_name,
            match_id_primary: r.match_id_primary,
            match_id_secondary: r.match_id_secondary,
            home_team: &r.home_team,
            away_team: &r.away_team,
            home_score: r.home_score,
            away_score: r.away_score,
            league_pinnacle: r.league_primary.as_deref(),
            league_lobbet: r.league_secondary.as_deref(),
            bookmaker_1: PRIMARY_BOOKMAKER,
            bookmaker_2: SECONDARY_BOOKMAKER,
            market: r.market_type,
            outcome: &r.outcome,
            value_pinnacle: r.value_primary,
            value_lobbet: r.value_secondary,
            roi: r.roi,
            margin: r.margin,
            market_type: r.market_type,
        }
    }
}

/// One row per stored comparison, in the order given. The header comes from
/// the first serialized row, so an empty slice writes nothing.
pub fn write_analyzer_csv<W: Write>(out: W, rows: &[ComparisonRow]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(out);
    for row in rows {
        wtr.serialize(AnalyzerCsvRow::from(row))?;
    }
    wtr.flush()?;
    Ok(())
}
