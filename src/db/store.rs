use chrono::{DateTime, Utc};
use futures_util::stream::BoxStream;
use futures_util::{StreamExt, TryStreamExt};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite};
use tracing::debug;

use crate::config::INSERT_CHUNK_ROWS;
use crate::db::models::{to_micros, AnalyzerOddsRecord, LiveOddsRecord};
use crate::error::{AppError, Result};
use crate::types::{ComparisonRow, Feed, GroupKey, LongRow};

/// Persistence boundary shared by the flush loops and the stale collectors.
///
/// Every write is its own transaction: a bulk insert commits all of its rows
/// or none, and a group delete commits on its own. Nothing spans a file write.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub async fn connect(db_path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    /// Single-connection in-memory database; the connection is never recycled
    /// so the schema survives for the life of the pool.
    #[cfg(test)]
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    // -----------------------------------------------------------------------
    // Bulk inserts
    // -----------------------------------------------------------------------

    pub async fn insert_long_rows(&self, rows: &[LongRow]) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0u64;

        for chunk in rows.chunks(INSERT_CHUNK_ROWS) {
            let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
                "INSERT INTO live_odds (match_id, home_team, away_team, home_score, away_score, \
                 sport_name, period, market, outcome, line, value, created_at, key_hash) ",
            );
            qb.push_values(chunk, |mut b, row| {
                b.push_bind(row.match_id)
                    .push_bind(row.home_team.as_str())
                    .push_bind(row.away_team.as_str())
                    .push_bind(row.home_score)
                    .push_bind(row.away_score)
                    .push_bind(row.sport_name.as_str())
                    .push_bind(row.period.as_str())
                    .push_bind(row.market.as_str())
                    .push_bind(row.outcome.as_str())
                    .push_bind(row.line.as_str())
                    .push_bind(row.value)
                    .push_bind(to_micros(row.created_at))
                    .push_bind(row.key_hash.as_str());
            });
            inserted += qb.build().execute(&mut *tx).await?.rows_affected();
        }

        tx.commit().await?;
        debug!(rows = inserted, "live_odds batch committed");
        Ok(inserted)
    }

    pub async fn insert_comparison_rows(&self, rows: &[ComparisonRow]) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0u64;

        for chunk in rows.chunks(INSERT_CHUNK_ROWS) {
            let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
                "INSERT INTO analyzer_odds (match_id_primary, match_id_secondary, home_team, \
                 away_team, home_score, away_score, sport_name, league_primary, league_secondary, \
                 market_type, outcome, value_primary, value_secondary, roi, margin, created_at, \
                 raw_created_at, key_hash) ",
            );
            qb.push_values(chunk, |mut b, row| {
                b.push_bind(row.match_id_primary)
                    .push_bind(row.match_id_secondary)
                    .push_bind(row.home_team.as_str())
                    .push_bind(row.away_team.as_str())
                    .push_bind(row.home_score)
                    .push_bind(row.away_score)
                    .push_bind(row.sport_name.as_str())
                    .push_bind(row.league_primary.as_deref())
                    .push_bind(row.league_secondary.as_deref())
                    .push_bind(row.market_type)
                    .push_bind(row.outcome.as_str())
                    .push_bind(row.value_primary)
                    .push_bind(row.value_secondary)
                    .push_bind(row.roi)
                    .push_bind(row.margin)
                    .push_bind(to_micros(row.created_at))
                    .push_bind(row.raw_created_at.as_str())
                    .push_bind(row.key_hash.as_str());
            });
            inserted += qb.build().execute(&mut *tx).await?.rows_affected();
        }

        tx.commit().await?;
        debug!(rows = inserted, "analyzer_odds batch committed");
        Ok(inserted)
    }

    // -----------------------------------------------------------------------
    // Stale-series queries
    // -----------------------------------------------------------------------

    /// Groups whose newest row is strictly older than `cutoff`.
    pub async fn stale_groups(&self, feed: Feed, cutoff: DateTime<Utc>) -> Result<Vec<GroupKey>> {
        let cutoff_us = to_micros(cutoff);
        let keys: Vec<GroupKey> = match feed {
            Feed::Primary => sqlx::query_as::<_, (i64,)>(
                "SELECT match_id FROM live_odds \
                 GROUP BY match_id HAVING MAX(created_at) < ? ORDER BY match_id",
            )
            .bind(cutoff_us)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(|(match_id,)| GroupKey::Match(match_id))
            .collect(),

            Feed::Analyzer => sqlx::query_as::<_, (i64, String)>(
                "SELECT match_id_primary, outcome FROM analyzer_odds \
                 GROUP BY match_id_primary, outcome HAVING MAX(created_at) < ? \
                 ORDER BY match_id_primary, outcome",
            )
            .bind(cutoff_us)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(|(match_id, outcome)| GroupKey::MatchOutcome(match_id, outcome))
            .collect(),
        };
        Ok(keys)
    }

    /// All rows of one match in insertion order, fetched incrementally.
    pub fn stream_long_rows(&self, match_id: i64) -> BoxStream<'_, Result<LiveOddsRecord>> {
        sqlx::query_as::<_, LiveOddsRecord>(
            "SELECT id, match_id, home_team, away_team, home_score, away_score, sport_name, \
             period, market, outcome, line, value, created_at, key_hash \
             FROM live_odds WHERE match_id = ? ORDER BY id",
        )
        .bind(match_id)
        .fetch(&self.pool)
        .map_err(AppError::from)
        .boxed()
    }

    /// All analyzer rows of one (match, outcome) series in insertion order.
    pub fn stream_comparison_rows<'a>(
        &'a self,
        match_id: i64,
        outcome: &'a str,
    ) -> BoxStream<'a, Result<AnalyzerOddsRecord>> {
        sqlx::query_as::<_, AnalyzerOddsRecord>(
            "SELECT id, match_id_primary, match_id_secondary, home_team, away_team, home_score, \
             away_score, sport_name, league_primary, league_secondary, market_type, outcome, \
             value_primary, value_secondary, roi, margin, created_at, raw_created_at, key_hash \
             FROM analyzer_odds WHERE match_id_primary = ? AND outcome = ? ORDER BY id",
        )
        .bind(match_id)
        .bind(outcome)
        .fetch(&self.pool)
        .map_err(AppError::from)
        .boxed()
    }

    /// Deletes the rows of `key` up to and including `max_id`, then commits.
    /// Rows written for the same group after the export was streamed survive.
    pub async fn delete_group(&self, key: &GroupKey, max_id: i64) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let result = match key {
            GroupKey::Match(match_id) => {
                sqlx::query("DELETE FROM live_odds WHERE match_id = ? AND id <= ?")
                    .bind(*match_id)
                    .bind(max_id)
                    .execute(&mut *tx)
                    .await?
            }
            GroupKey::MatchOutcome(match_id, outcome) => {
                sqlx::query(
                    "DELETE FROM analyzer_odds WHERE match_id_primary = ? AND outcome = ? AND id <= ?",
                )
                .bind(*match_id)
                .bind(outcome.as_str())
                .bind(max_id)
                .execute(&mut *tx)
                .await?
            }
        };
        tx.commit().await?;
        Ok(result.rows_affected())
    }

    #[cfg(test)]
    pub async fn count_group(&self, key: &GroupKey) -> Result<i64> {
        let (count,) = match key {
            GroupKey::Match(match_id) => {
                sqlx::query_as::<_, (i64,)>("SELECT COUNT(*) FROM live_odds WHERE match_id = ?")
                    .bind(*match_id)
                    .fetch_one(&self.pool)
                    .await?
            }
            GroupKey::MatchOutcome(match_id, outcome) => {
                sqlx::query_as::<_, (i64,)>(
                    "SELECT COUNT(*) FROM analyzer_odds WHERE match_id_primary = ? AND outcome = ?",
                )
                .bind(*match_id)
                .bind(outcome.as_str())
                .fetch_one(&self.pool)
                .await?
            }
        };
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{comparison_row, long_row, ts};
    use chrono::Duration;

    #[tokio::test]
    async fn bulk_insert_and_stream_back_in_order() {
        let store = Store::in_memory().await.unwrap();
        let t0 = ts("2025-04-07T18:00:00Z");
        let rows = vec![
            long_row(7, "Match", "Totals", "2.5", "WinMore", 1.8, t0),
            long_row(7, "Match", "Totals", "2.5", "WinLess", 2.0, t0),
            long_row(8, "Match", "Win1x2", "", "Win1", 1.5, t0),
        ];
        assert_eq!(store.insert_long_rows(&rows).await.unwrap(), 3);

        let streamed: Vec<LiveOddsRecord> = store.stream_long_rows(7).try_collect().await.unwrap();
        assert_eq!(streamed.len(), 2);
        assert!(streamed[0].id < streamed[1].id);
        assert_eq!(streamed[0].outcome, "WinMore");

        let back = LongRow::try_from(streamed.into_iter().next().unwrap()).unwrap();
        assert_eq!(back, rows[0]);
    }

    #[tokio::test]
    async fn duplicate_natural_keys_are_kept() {
        let store = Store::in_memory().await.unwrap();
        let t0 = ts("2025-04-07T18:00:00Z");
        let a = long_row(7, "Match", "Totals", "2.5", "WinMore", 1.8, t0);
        let b = long_row(7, "Match", "Totals", "2.5", "WinMore", 1.9, t0 + Duration::seconds(60));
        assert_eq!(a.key_hash, b.key_hash);
        store.insert_long_rows(&[a, b]).await.unwrap();
        assert_eq!(store.count_group(&GroupKey::Match(7)).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn large_batches_span_several_statements() {
        let store = Store::in_memory().await.unwrap();
        let t0 = ts("2025-04-07T18:00:00Z");
        let rows: Vec<_> = (0..(INSERT_CHUNK_ROWS * 2 + 7))
            .map(|i| long_row(1, "Match", "Totals", "2.5", "WinMore", 1.0 + i as f64, t0))
            .collect();
        let inserted = store.insert_long_rows(&rows).await.unwrap();
        assert_eq!(inserted as usize, rows.len());
    }

    #[tokio::test]
    async fn staleness_cutoff_is_strict() {
        let store = Store::in_memory().await.unwrap();
        let cutoff = ts("2025-04-07T15:00:00Z");
        store
            .insert_long_rows(&[
                long_row(1, "Match", "Win1x2", "", "Win1", 1.5, cutoff),
                long_row(2, "Match", "Win1x2", "", "Win1", 1.5, cutoff - Duration::microseconds(1)),
            ])
            .await
            .unwrap();
        let stale = store.stale_groups(Feed::Primary, cutoff).await.unwrap();
        assert_eq!(stale, vec![GroupKey::Match(2)]);
    }

    #[tokio::test]
    async fn one_fresh_row_keeps_whole_match_live() {
        let store = Store::in_memory().await.unwrap();
        let cutoff = ts("2025-04-07T15:00:00Z");
        store
            .insert_long_rows(&[
                long_row(1, "Match", "Win1x2", "", "Win1", 1.5, cutoff - Duration::hours(5)),
                long_row(1, "Match", "Win1x2", "", "Win1", 1.6, cutoff + Duration::minutes(1)),
            ])
            .await
            .unwrap();
        assert!(store.stale_groups(Feed::Primary, cutoff).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn analyzer_groups_by_match_and_outcome() {
        let store = Store::in_memory().await.unwrap();
        let cutoff = ts("2025-04-07T15:00:00Z");
        let old = cutoff - Duration::hours(1);
        store
            .insert_comparison_rows(&[
                comparison_row(10, "Win1", old),
                comparison_row(10, "Win2", cutoff + Duration::seconds(1)),
                comparison_row(11, "Win1", old),
            ])
            .await
            .unwrap();
        let stale = store.stale_groups(Feed::Analyzer, cutoff).await.unwrap();
        assert_eq!(
            stale,
            vec![
                GroupKey::MatchOutcome(10, "Win1".to_string()),
                GroupKey::MatchOutcome(11, "Win1".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn delete_respects_streamed_high_water_mark() {
        let store = Store::in_memory().await.unwrap();
        let t0 = ts("2025-04-07T18:00:00Z");
        store
            .insert_comparison_rows(&[comparison_row(10, "Win1", t0), comparison_row(10, "Win1", t0)])
            .await
            .unwrap();
        let key = GroupKey::MatchOutcome(10, "Win1".to_string());
        let streamed: Vec<AnalyzerOddsRecord> =
            store.stream_comparison_rows(10, "Win1").try_collect().await.unwrap();
        let high = streamed.iter().map(|r| r.id).max().unwrap();

        store.insert_comparison_rows(&[comparison_row(10, "Win1", t0)]).await.unwrap();

        assert_eq!(store.delete_group(&key, high).await.unwrap(), 2);
        assert_eq!(store.count_group(&key).await.unwrap(), 1);
    }
}
