pub mod sqlite;

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::app::Result;
use crate::domain::{Channel, Feed};

pub use sqlite::SqliteStore;

/// An exclusive, expiry-based claim on a batch of rows.
///
/// Rows whose claim column is still in the future are invisible to other
/// claimants; there is no release, the claim simply lapses at `until`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Claim {
    pub now: DateTime<Utc>,
    pub until: DateTime<Utc>,
    pub limit: usize,
}

impl Claim {
    pub fn new(window: chrono::Duration, limit: usize) -> Self {
        Self::at(Utc::now(), window, limit)
    }

    pub fn at(now: DateTime<Utc>, window: chrono::Duration, limit: usize) -> Self {
        Self {
            now,
            until: now
                .checked_add_signed(window)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
            limit,
        }
    }
}

/// Durable state of tracked channels and discovered feeds.
///
/// Every `claim_*` method must select its due rows and stamp their claim as
/// one atomic step.
pub trait Store {
    // Channel operations
    fn ensure_channels(&self, channels: &[Channel]) -> Result<usize>;
    fn get_channel(&self, id: &str) -> Result<Option<Channel>>;
    fn get_missing_channel_ids(&self, ids: &[String]) -> Result<Vec<String>>;
    fn get_existing_channel_ids(&self, ids: &[String]) -> Result<HashSet<String>>;
    /// Channels whose lease lapses before `expiring_before` (or was never taken).
    fn claim_expiring_subscriptions(
        &self,
        expiring_before: DateTime<Utc>,
        claim: Claim,
    ) -> Result<Vec<String>>;
    fn set_subscription_expires_at(&self, ids: &[String], expires_at: DateTime<Utc>)
        -> Result<()>;
    /// Channels among `ids` last synced before `synced_before` (or never).
    fn claim_channels_for_sync(
        &self,
        ids: &[String],
        synced_before: DateTime<Utc>,
        claim: Claim,
    ) -> Result<Vec<Channel>>;
    fn set_channels_last_sync_at(&self, ids: &[String], at: DateTime<Utc>) -> Result<()>;
    fn set_channels_upcoming_checked(&self, ids: &[String]) -> Result<()>;

    // Feed operations
    fn get_feed(&self, id: &str) -> Result<Option<Feed>>;
    fn get_existing_feed_ids(&self, ids: &[String]) -> Result<HashSet<String>>;
    fn get_feeds_by_ids(&self, ids: &[String]) -> Result<Vec<Feed>>;
    /// Insert-or-update from discovery. A feed already classified as a stream
    /// keeps that classification; any other prior value takes the incoming one.
    fn put_feeds(&self, feeds: &[Feed]) -> Result<()>;
    /// Unclassified or live feeds of `channel_ids`, i.e. those needing a status check.
    fn claim_feeds_for_sync(&self, channel_ids: &[String], claim: Claim) -> Result<Vec<Feed>>;
    /// Overwrites classification and live metadata as given.
    fn update_feeds(&self, feeds: &[Feed]) -> Result<()>;
    fn get_stream_feeds_by_channel_ids(&self, channel_ids: &[String]) -> Result<Vec<Feed>>;
    /// Removes feeds that are not live and untouched since `older_than`; returns how many.
    fn clean(&self, older_than: DateTime<Utc>) -> Result<usize>;
}
