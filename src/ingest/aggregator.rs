use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::SAMPLE_LOG_LIMIT;
use crate::db::Store;
use crate::error::Result;
use crate::ingest::comparison::build_comparison_rows;
use crate::ingest::primary::build_long_rows;
use crate::types::{Feed, Record};

/// Producer side of an aggregator. Cheap to clone; `add` never waits.
#[derive(Clone)]
pub struct AggregatorHandle {
    tx: mpsc::UnboundedSender<Record>,
}

impl AggregatorHandle {
    /// Queues one record for the next flush. Returns false once the
    /// aggregator has shut down and the record was discarded.
    pub fn add(&self, record: Record) -> bool {
        self.tx.send(record).is_ok()
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FlushStats {
    pub drained: usize,
    pub primary_rows: u64,
    pub comparison_rows: u64,
    pub dropped: usize,
}

/// Buffers ingested records and writes them to the store once per interval.
pub struct Aggregator {
    name: String,
    rx: mpsc::UnboundedReceiver<Record>,
    store: Store,
    interval: Duration,
}

impl Aggregator {
    pub fn new(name: impl Into<String>, store: Store, interval: Duration) -> (Self, AggregatorHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let aggregator = Self { name: name.into(), rx, store, interval };
        (aggregator, AggregatorHandle { tx })
    }

    /// Flushes once per interval, first flush one interval after start.
    /// Returns only when a flush fails.
    pub async fn run(mut self) -> Result<()> {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await; // first tick is immediate

        info!(aggregator = %self.name, every_secs = self.interval.as_secs(), "aggregator started");
        loop {
            ticker.tick().await;
            self.flush().await?;
        }
    }

    /// Drains what was queued when the flush began and persists it.
    ///
    /// Records added while the flush is running stay queued for the next one.
    pub async fn flush(&mut self) -> Result<FlushStats> {
        let pending = self.rx.len();
        if pending == 0 {
            debug!(aggregator = %self.name, "nothing to flush");
            return Ok(FlushStats::default());
        }

        let mut stats = FlushStats::default();
        let mut primary: Vec<Value> = Vec::new();
        let mut analyzer: Vec<Value> = Vec::new();

        for _ in 0..pending {
            let Ok(record) = self.rx.try_recv() else { break };
            if stats.drained < SAMPLE_LOG_LIMIT {
                debug!(aggregator = %self.name, sample = %record.payload(), "drained record");
            }
            stats.drained += 1;
            match record.classify() {
                Some(Feed::Primary) => primary.push(record.into_payload()),
                Some(Feed::Analyzer) => analyzer.push(record.into_payload()),
                None => stats.dropped += 1,
            }
        }

        if stats.dropped > 0 {
            warn!(aggregator = %self.name, dropped = stats.dropped, "unclassifiable records dropped");
        }

        if !primary.is_empty() {
            let rows = build_long_rows(&primary);
            stats.primary_rows = self.store.insert_long_rows(&rows).await?;
            info!(aggregator = %self.name, feed = %Feed::Primary, messages = primary.len(), rows = stats.primary_rows, "flushed");
        }
        if !analyzer.is_empty() {
            let rows = build_comparison_rows(&analyzer);
            stats.comparison_rows = self.store.insert_comparison_rows(&rows).await?;
            info!(aggregator = %self.name, feed = %Feed::Analyzer, messages = analyzer.len(), rows = stats.comparison_rows, "flushed");
        }

        Ok(stats)
    }
}
