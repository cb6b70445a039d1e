//! Push subscription engine: lease renewal, delivery ingestion and the two
//! reconciliation passes against the platform API.

pub mod ingest;
pub mod scheduler;
pub mod subscription;
pub mod sync;

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::app::Result;
use crate::config::{Config, HubConfig, IngestConfig, Interval, SyncConfig};
use crate::domain::{Channel, Feed, YOUTUBE_SERVICE};
use crate::hub::HubClient;
use crate::platform::PlatformClient;
use crate::store::Store;

pub use ingest::{spawn_ingest_worker, FlushReport, IngestHandle, IngestStats};
pub use scheduler::Scheduler;
pub use subscription::RenewReport;
pub use sync::{ChannelSyncReport, StreamSyncReport};

/// Target for feed lifecycle events (`[insert]`, `[fixed]`, ...).
pub const EVENTS_TARGET: &str = "livehub::events";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanReport {
    pub removed_video_ids: usize,
}

pub struct PubSub<S: Store + Send + Sync + 'static> {
    store: Arc<S>,
    platform: Arc<dyn PlatformClient + Send + Sync>,
    hub: Arc<dyn HubClient + Send + Sync>,
    hub_config: HubConfig,
    sync_config: SyncConfig,
    ingest_config: IngestConfig,
    retention: Interval,
    /// One sweep at a time: renewal, ingestion commits and cleanup.
    gate: Mutex<()>,
}

impl<S: Store + Send + Sync + 'static> PubSub<S> {
    pub fn new(
        store: Arc<S>,
        platform: Arc<dyn PlatformClient + Send + Sync>,
        hub: Arc<dyn HubClient + Send + Sync>,
        config: &Config,
    ) -> Self {
        Self {
            store,
            platform,
            hub,
            hub_config: config.hub.clone(),
            sync_config: config.sync.clone(),
            ingest_config: config.ingest.clone(),
            retention: config.schedule.retention,
            gate: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn ingest_config(&self) -> &IngestConfig {
        &self.ingest_config
    }

    /// Starts tracking the given channels; returns how many were new.
    pub fn track_channels(&self, channel_ids: &[String]) -> Result<usize> {
        let channels: Vec<Channel> = channel_ids
            .iter()
            .map(|id| Channel::new(YOUTUBE_SERVICE, id.clone()))
            .collect();
        self.store.ensure_channels(&channels)
    }

    /// Live streams of `channel_ids`, reconciled against the platform first.
    ///
    /// Unknown channels are tracked and subscribed on the way. Channels whose
    /// platform lookup failed are appended to `skipped`; their stored streams
    /// are still returned.
    pub async fn get_streams(
        &self,
        channel_ids: &[String],
        skipped: &mut Vec<String>,
    ) -> Result<Vec<Feed>> {
        let new_ids = self.store.get_missing_channel_ids(channel_ids)?;
        if !new_ids.is_empty() {
            self.track_channels(&new_ids)?;
            self.renew_expiring().await?;
        }

        self.sync_channels(channel_ids, skipped).await?;
        self.sync_streams(channel_ids).await?;

        self.store.get_stream_feeds_by_channel_ids(channel_ids)
    }

    /// Drops feeds untouched for longer than the retention window.
    pub async fn clean(&self) -> Result<CleanReport> {
        let _guard = self.gate.lock().await;

        let older_than = self.retention.before(Utc::now());
        let removed = self.store.clean(older_than)?;
        if removed > 0 {
            tracing::info!("Removed {} stale feeds", removed);
        }

        Ok(CleanReport {
            removed_video_ids: removed,
        })
    }
}
