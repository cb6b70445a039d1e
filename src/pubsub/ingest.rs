use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::app::Result;
use crate::config::Interval;
use crate::domain::{Feed, FeedEntry};
use crate::pubsub::{PubSub, EVENTS_TARGET};
use crate::store::Store;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlushReport {
    pub received: usize,
    /// Entries whose channel is not tracked
    pub dropped: usize,
    pub inserted: usize,
    pub updated: usize,
}

impl std::ops::AddAssign for FlushReport {
    fn add_assign(&mut self, other: Self) {
        self.received += other.received;
        self.dropped += other.dropped;
        self.inserted += other.inserted;
        self.updated += other.updated;
    }
}

/// What the worker committed over its lifetime; returned when it stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestStats {
    /// Non-empty batches handed to the store
    pub commits: usize,
    pub totals: FlushReport,
}

/// Message type for the ingestion worker
#[derive(Debug)]
enum IngestMessage {
    Entry(FeedEntry),
    /// Commit everything pending now
    Flush(oneshot::Sender<FlushReport>),
    /// Commit everything pending, then stop
    Shutdown(oneshot::Sender<FlushReport>),
}

/// Handle to queue deliveries for the ingestion worker
#[derive(Clone)]
pub struct IngestHandle {
    tx: mpsc::UnboundedSender<IngestMessage>,
    recency: Interval,
}

impl IngestHandle {
    /// Queues a parsed delivery. Entries published outside the recency window
    /// are dropped; returns whether the entry was queued.
    pub fn on_delivery(&self, entry: FeedEntry) -> bool {
        self.on_delivery_at(entry, Utc::now())
    }

    fn on_delivery_at(&self, entry: FeedEntry, now: DateTime<Utc>) -> bool {
        if entry.published_at <= self.recency.before(now) {
            debug!(
                "Skip stale entry {} of {} published {}",
                entry.id, entry.channel_id, entry.published_at
            );
            return false;
        }

        if let Err(e) = self.tx.send(IngestMessage::Entry(entry)) {
            warn!("Failed to queue entry for ingestion: {}", e);
            return false;
        }
        true
    }

    /// Commits pending entries without waiting for the throttle window.
    pub async fn flush(&self) -> FlushReport {
        self.request(IngestMessage::Flush).await
    }

    /// Commits pending entries and stops the worker.
    pub async fn shutdown(&self) -> FlushReport {
        self.request(IngestMessage::Shutdown).await
    }

    async fn request(&self, message: fn(oneshot::Sender<FlushReport>) -> IngestMessage) -> FlushReport {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.tx.send(message(reply_tx)).is_err() {
            return FlushReport::default();
        }
        reply_rx.await.unwrap_or_default()
    }
}

/// Single consumer that batches deliveries and commits at most once per
/// throttle window, on the trailing edge.
pub struct IngestWorker<S: Store + Send + Sync + 'static> {
    pubsub: Arc<PubSub<S>>,
    rx: mpsc::UnboundedReceiver<IngestMessage>,
    throttle: Duration,
    pending: Vec<FeedEntry>,
    stats: IngestStats,
}

impl<S: Store + Send + Sync + 'static> IngestWorker<S> {
    pub fn new(pubsub: Arc<PubSub<S>>) -> (Self, IngestHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let config = pubsub.ingest_config();
        let handle = IngestHandle {
            tx,
            recency: config.recency,
        };
        let worker = Self {
            throttle: Duration::from_millis(config.throttle_ms),
            pubsub,
            rx,
            pending: Vec::new(),
            stats: IngestStats::default(),
        };
        (worker, handle)
    }

    pub async fn run(mut self) -> IngestStats {
        info!("Ingestion worker started");
        let mut deadline: Option<Instant> = None;

        loop {
            let message = match deadline {
                Some(at) => tokio::select! {
                    message = self.rx.recv() => message,
                    _ = tokio::time::sleep_until(at) => {
                        deadline = None;
                        self.commit_pending().await;
                        continue;
                    }
                },
                None => self.rx.recv().await,
            };

            match message {
                Some(IngestMessage::Entry(entry)) => {
                    self.pending.push(entry);
                    if deadline.is_none() {
                        deadline = Some(Instant::now() + self.throttle);
                    }
                }
                Some(IngestMessage::Flush(reply)) => {
                    deadline = None;
                    let report = self.commit_pending().await;
                    let _ = reply.send(report);
                }
                Some(IngestMessage::Shutdown(reply)) => {
                    let report = self.commit_pending().await;
                    let _ = reply.send(report);
                    break;
                }
                None => {
                    self.commit_pending().await;
                    break;
                }
            }
        }

        info!(
            "Ingestion worker stopped ({} commits, {} entries received)",
            self.stats.commits, self.stats.totals.received
        );
        self.stats
    }

    async fn commit_pending(&mut self) -> FlushReport {
        let entries = std::mem::take(&mut self.pending);
        if entries.is_empty() {
            return FlushReport::default();
        }

        self.stats.commits += 1;
        match self.pubsub.commit_entries(entries).await {
            Ok(report) => {
                self.stats.totals += report;
                report
            }
            Err(e) => {
                error!("Failed to commit feed entries: {}", e);
                FlushReport::default()
            }
        }
    }
}

/// Spawn the ingestion worker as a tokio task
pub fn spawn_ingest_worker<S: Store + Send + Sync + 'static>(
    pubsub: Arc<PubSub<S>>,
) -> (IngestHandle, JoinHandle<IngestStats>) {
    let (worker, handle) = IngestWorker::new(pubsub);
    let task = tokio::spawn(worker.run());
    (handle, task)
}

impl<S: Store + Send + Sync + 'static> PubSub<S> {
    /// Stores a batch of delivered entries for tracked channels.
    ///
    /// Only feeds the store did not know before produce an `[insert]` event,
    /// so redeliveries are silent.
    pub async fn commit_entries(&self, entries: Vec<FeedEntry>) -> Result<FlushReport> {
        let _guard = self.gate.lock().await;

        let mut report = FlushReport {
            received: entries.len(),
            ..FlushReport::default()
        };

        // Later deliveries of the same video win.
        let mut order = Vec::new();
        let mut latest: HashMap<String, FeedEntry> = HashMap::new();
        for entry in entries {
            if !latest.contains_key(&entry.id) {
                order.push(entry.id.clone());
            }
            latest.insert(entry.id.clone(), entry);
        }
        let entries: Vec<FeedEntry> = order
            .iter()
            .filter_map(|id| latest.remove(id))
            .collect();

        let channel_ids: Vec<String> = entries
            .iter()
            .map(|e| e.channel_id.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let tracked = self.store.get_existing_channel_ids(&channel_ids)?;
        let known = self.store.get_existing_feed_ids(&order)?;

        let feeds: Vec<Feed> = entries
            .iter()
            .filter(|e| tracked.contains(&e.channel_id))
            .map(Feed::from_entry)
            .collect();
        report.dropped = entries.len() - feeds.len();

        self.store.put_feeds(&feeds)?;

        for feed in &feeds {
            if known.contains(&feed.id) {
                report.updated += 1;
            } else {
                info!(
                    target: EVENTS_TARGET,
                    channel_id = %feed.channel_id,
                    feed_id = %feed.id,
                    "[insert]"
                );
                report.inserted += 1;
            }
        }

        Ok(report)
    }
}
