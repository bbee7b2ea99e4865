use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::time::interval;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use crate::config::{RECONNECT_BACKOFF_MS, WS_PING_INTERVAL_SECS};
use crate::error::Result;
use crate::ingest::AggregatorHandle;
use crate::types::{Feed, Record};
use crate::ws::messages::{build_filter_msg, parse_ws_frame};

/// How a single connection ended.
enum Disconnect {
    /// Server closed the socket; reconnect.
    Closed,
    /// Aggregator is gone; nothing left to feed.
    Shutdown,
}

/// Persistent WebSocket connection to one odds feed. Every decoded object is
/// tagged with the feed and handed to its aggregator.
pub struct FeedClient {
    feed: Feed,
    ws_url: String,
    filter_msg: String,
    sink: AggregatorHandle,
    frames_received: u64,
    records_forwarded: u64,
}

impl FeedClient {
    pub fn new(
        feed: Feed,
        ws_url: String,
        filter_name: &str,
        sports: &[String],
        sink: AggregatorHandle,
    ) -> Self {
        Self {
            feed,
            ws_url,
            filter_msg: build_filter_msg(filter_name, sports),
            sink,
            frames_received: 0,
            records_forwarded: 0,
        }
    }

    /// Connects and reconnects with backoff until the aggregator goes away.
    pub async fn run(mut self) -> Result<()> {
        let mut backoff_idx = 0usize;

        loop {
            info!(feed = %self.feed, "WS connecting to {}", self.ws_url);
            match self.connect_once().await {
                Ok(Disconnect::Shutdown) => {
                    info!(feed = %self.feed, "aggregator closed, feed client stopping");
                    return Ok(());
                }
                Ok(Disconnect::Closed) => {
                    info!(feed = %self.feed, "WS connection closed cleanly");
                    backoff_idx = 0;
                }
                Err(e) => {
                    error!(feed = %self.feed, "WS connection error: {e}");
                }
            }

            let delay_ms = RECONNECT_BACKOFF_MS
                .get(backoff_idx)
                .or(RECONNECT_BACKOFF_MS.last())
                .copied()
                .unwrap_or(1_000);
            backoff_idx = (backoff_idx + 1).min(RECONNECT_BACKOFF_MS.len().saturating_sub(1));

            warn!(feed = %self.feed, "WS reconnecting in {delay_ms}ms");
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }
    }

    async fn connect_once(&mut self) -> Result<Disconnect> {
        let (ws_stream, _) = connect_async(&self.ws_url).await?;
        let (mut write, mut read) = ws_stream.split();

        write.send(Message::Text(self.filter_msg.clone())).await?;
        info!(feed = %self.feed, "WS filter sent");

        let mut ping_interval = interval(Duration::from_secs(WS_PING_INTERVAL_SECS));
        ping_interval.tick().await; // consume immediate first tick

        loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if !self.handle_frame(&text) {
                                return Ok(Disconnect::Shutdown);
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            return Ok(Disconnect::Closed);
                        }
                        Some(Err(e)) => return Err(e.into()),
                        Some(Ok(_)) => {}
                    }
                }

                _ = ping_interval.tick() => {
                    debug!(feed = %self.feed, "WS ping");
                    write.send(Message::Ping(Vec::new())).await?;
                }
            }
        }
    }

    /// Returns false once the aggregator no longer accepts records.
    fn handle_frame(&mut self, text: &str) -> bool {
        self.frames_received += 1;
        if self.frames_received % 500 == 0 {
            info!(
                feed = %self.feed,
                frames = self.frames_received,
                records = self.records_forwarded,
                "[WS] {} frames | forwarded={}", self.frames_received, self.records_forwarded
            );
        }

        for obj in parse_ws_frame(text) {
            if !self.sink.add(Record::tagged(self.feed, Value::Object(obj))) {
                return false;
            }
            self.records_forwarded += 1;
        }
        true
    }
}
