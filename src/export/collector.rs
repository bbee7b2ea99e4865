use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use futures_util::TryStreamExt;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::db::Store;
use crate::error::Result;
use crate::export::filename::format_filename;
use crate::export::slots::SnapshotTable;
use crate::export::writer::{spawn_export, write_analyzer_csv, write_primary_csv};
use crate::types::{ComparisonRow, Feed, GroupKey, LongRow};

/// Outcome of one pass over the store.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScanStats {
    pub stale: usize,
    pub exported: usize,
    pub empty: usize,
    pub rows_deleted: u64,
}

/// Periodically moves series that stopped updating out of the store and into
/// CSV files. A group's rows are deleted only after its file is in place.
pub struct StaleSeriesCollector {
    feed: Feed,
    store: Store,
    export_dir: PathBuf,
    threshold: TimeDelta,
    interval: Duration,
}

impl StaleSeriesCollector {
    pub fn new(
        feed: Feed,
        store: Store,
        export_dir: PathBuf,
        threshold: TimeDelta,
        interval: Duration,
    ) -> Self {
        Self { feed, store, export_dir, threshold, interval }
    }

    /// Scans immediately, then once per interval. Returns only on error.
    pub async fn run(self) -> Result<()> {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(feed = %self.feed, dir = %self.export_dir.display(), "stale-series collector started");

        loop {
            ticker.tick().await;
            self.scan().await?;
        }
    }

    pub async fn scan(&self) -> Result<ScanStats> {
        self.scan_at(Utc::now()).await
    }

    pub async fn scan_at(&self, now: DateTime<Utc>) -> Result<ScanStats> {
        let cutoff = now - self.threshold;
        let groups = self.store.stale_groups(self.feed, cutoff).await?;
        let mut stats = ScanStats { stale: groups.len(), ..Default::default() };

        if groups.is_empty() {
            debug!(feed = %self.feed, %cutoff, "no stale series");
            return Ok(stats);
        }
        info!(feed = %self.feed, groups = groups.len(), %cutoff, "exporting stale series");

        for key in &groups {
            let exported = match key {
                GroupKey::Match(match_id) => self.export_match(key, *match_id, now).await?,
                GroupKey::MatchOutcome(match_id, outcome) => {
                    self.export_outcome(key, *match_id, outcome, now).await?
                }
            };
            match exported {
                Some((path, max_id)) => {
                    let deleted = self.store.delete_group(key, max_id).await?;
                    info!(feed = %self.feed, group = %key, rows = deleted, path = %path.display(), "exported and deleted");
                    stats.exported += 1;
                    stats.rows_deleted += deleted;
                }
                None => {
                    warn!(feed = %self.feed, group = %key, "stale series had no rows, skipped");
                    stats.empty += 1;
                }
            }
        }
        info!(
            feed = %self.feed,
            stale = stats.stale,
            exported = stats.exported,
            empty = stats.empty,
            rows = stats.rows_deleted,
            "scan complete"
        );
        Ok(stats)
    }

    /// Folds one match into snapshots and writes it out. Returns the file and
    /// the highest row id it covers, or `None` if the match had no rows.
    async fn export_match(
        &self,
        key: &GroupKey,
        match_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<(PathBuf, i64)>> {
        let mut table = SnapshotTable::new();
        let mut first: Option<LongRow> = None;
        let mut max_id = i64::MIN;

        let mut rows = self.store.stream_long_rows(match_id);
        while let Some(record) = rows.try_next().await? {
            max_id = max_id.max(record.id);
            let row = LongRow::try_from(record)?;
            table.push(&row);
            if first.is_none() {
                first = Some(row);
            }
        }
        drop(rows);

        let Some(first) = first else {
            return Ok(None);
        };
        if table.overflowed() > 0 {
            warn!(
                feed = %self.feed,
                group = %key,
                rows = table.overflowed(),
                "lines beyond slot capacity left out of export"
            );
        }

        let name = format_filename(
            match_id,
            first.created_at,
            or_fallback(&first.home_team, "home"),
            or_fallback(&first.away_team, "away"),
            or_fallback(&first.sport_name, "sport"),
            None,
        );
        debug!(group = %key, rows = table.rows(), snapshots = table.len(), "match folded");
        let path = spawn_export(self.export_dir.clone(), name, now, move |out| {
            write_primary_csv(out, &table)
        })
        .await?;
        Ok(Some((path, max_id)))
    }

    async fn export_outcome(
        &self,
        key: &GroupKey,
        match_id: i64,
        outcome: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<(PathBuf, i64)>> {
        let mut out_rows: Vec<ComparisonRow> = Vec::new();
        let mut max_id = i64::MIN;

        let mut rows = self.store.stream_comparison_rows(match_id, outcome);
        while let Some(record) = rows.try_next().await? {
            max_id = max_id.max(record.id);
            out_rows.push(ComparisonRow::try_from(record)?);
        }
        drop(rows);

        let Some(first) = out_rows.first() else {
            return Ok(None);
        };
        let name = format_filename(
            match_id,
            first.created_at,
            &first.home_team,
            &first.away_team,
            &first.sport_name,
            Some(outcome),
        );
        debug!(group = %key, rows = out_rows.len(), "outcome series collected");
        let path = spawn_export(self.export_dir.clone(), name, now, move |out| {
            write_analyzer_csv(out, &out_rows)
        })
        .await?;
        Ok(Some((path, max_id)))
    }
}

fn or_fallback<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.is_empty() {
        fallback
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{comparison_row, long_row, ts};
    use std::fs;

    fn collector(feed: Feed, store: &Store, dir: &std::path::Path) -> StaleSeriesCollector {
        StaleSeriesCollector::new(
            feed,
            store.clone(),
            dir.to_path_buf(),
            TimeDelta::hours(3),
            Duration::from_secs(7200),
        )
    }

    #[tokio::test]
    async fn stale_match_is_exported_then_removed() {
        let store = Store::in_memory().await.unwrap();
        let dir = tempfile::tempdir().unwrap();
        let now = ts("2025-04-07T22:00:00Z");
        let old = now - TimeDelta::hours(4);

        store
            .insert_long_rows(&[
                long_row(1, "Match", "Win1x2", "", "Win1", 1.5, old),
                long_row(1, "Match", "Totals", "2.5", "WinMore", 1.9, old),
                long_row(1, "1H", "Totals", "1.5", "WinMore", 2.1, old + TimeDelta::seconds(30)),
                long_row(2, "Match", "Win1x2", "", "Win1", 1.5, now - TimeDelta::minutes(5)),
            ])
            .await
            .unwrap();

        let stats = collector(Feed::Primary, &store, dir.path()).scan_at(now).await.unwrap();
        assert_eq!(stats, ScanStats { stale: 1, exported: 1, empty: 0, rows_deleted: 3 });

        let path = dir.path().join("1_2025-04-07_real_madrid_vs_barcelona_soccer.csv");
        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("2025-04-07T18:00:00,Match,Real Madrid,Barcelona,0,1,1.5,null,null,1.9,"));
        assert!(lines[2].starts_with("2025-04-07T18:00:30,1H,"));

        assert_eq!(store.count_group(&GroupKey::Match(1)).await.unwrap(), 0);
        assert_eq!(store.count_group(&GroupKey::Match(2)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn exact_cutoff_is_not_yet_stale() {
        let store = Store::in_memory().await.unwrap();
        let dir = tempfile::tempdir().unwrap();
        let now = ts("2025-04-07T22:00:00Z");
        let cutoff = now - TimeDelta::hours(3);

        store
            .insert_long_rows(&[
                long_row(1, "Match", "Win1x2", "", "Win1", 1.5, cutoff),
                long_row(2, "Match", "Win1x2", "", "Win1", 1.5, cutoff - TimeDelta::microseconds(1)),
            ])
            .await
            .unwrap();

        let stats = collector(Feed::Primary, &store, dir.path()).scan_at(now).await.unwrap();
        assert_eq!(stats.exported, 1);
        assert_eq!(store.count_group(&GroupKey::Match(1)).await.unwrap(), 1);
        assert_eq!(store.count_group(&GroupKey::Match(2)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn analyzer_exports_one_file_per_outcome() {
        let store = Store::in_memory().await.unwrap();
        let dir = tempfile::tempdir().unwrap();
        let now = ts("2025-04-07T22:00:00Z");
        let old = now - TimeDelta::hours(5);

        store
            .insert_comparison_rows(&[
                comparison_row(10, "Win1", old),
                comparison_row(10, "Win1", old + TimeDelta::minutes(1)),
                comparison_row(10, "Win2", old),
            ])
            .await
            .unwrap();

        let stats = collector(Feed::Analyzer, &store, dir.path()).scan_at(now).await.unwrap();
        assert_eq!(stats.exported, 2);
        assert_eq!(stats.rows_deleted, 3);

        let win1 = fs::read_to_string(dir.path().join("10_2025-04-07_alcaraz_c._vs_sinner_j._tennis_win1.csv")).unwrap();
        assert_eq!(win1.lines().count(), 3);
        assert!(dir.path().join("10_2025-04-07_alcaraz_c._vs_sinner_j._tennis_win2.csv").exists());
        assert!(store.stale_groups(Feed::Analyzer, now).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn earlier_export_of_same_series_is_kept() {
        let store = Store::in_memory().await.unwrap();
        let dir = tempfile::tempdir().unwrap();
        let now = ts("2025-04-07T22:00:00Z");
        let name = "1_2025-04-07_real_madrid_vs_barcelona_soccer.csv";
        fs::write(dir.path().join(name), "previous run\n").unwrap();

        store
            .insert_long_rows(&[long_row(1, "Match", "Win1x2", "", "Win1", 1.5, now - TimeDelta::hours(4))])
            .await
            .unwrap();
        collector(Feed::Primary, &store, dir.path()).scan_at(now).await.unwrap();

        assert_eq!(fs::read_to_string(dir.path().join(name)).unwrap(), "previous run\n");
        assert!(dir
            .path()
            .join("1_2025-04-07_real_madrid_vs_barcelona_soccer_20250407T220000.csv")
            .exists());
    }

    #[tokio::test]
    async fn nothing_stale_is_a_no_op() {
        let store = Store::in_memory().await.unwrap();
        let dir = tempfile::tempdir().unwrap();
        let now = ts("2025-04-07T22:00:00Z");
        store
            .insert_long_rows(&[long_row(1, "Match", "Win1x2", "", "Win1", 1.5, now)])
            .await
            .unwrap();

        let stats = collector(Feed::Primary, &store, dir.path()).scan_at(now).await.unwrap();
        assert_eq!(stats, ScanStats::default());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn empty_names_fall_back() {
        assert_eq!(or_fallback("", "home"), "home");
        assert_eq!(or_fallback("Lazio", "home"), "Lazio");
    }
}
