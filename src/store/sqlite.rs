use std::collections::HashSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row, TransactionBehavior};
use rusqlite_migration::{Migrations, M};

use crate::app::{LivehubError, Result};
use crate::domain::{Channel, Feed, IsStream};
use crate::store::{Claim, Store};

const CHANNEL_COLUMNS: &str = "id, wrapped_id, subscription_expires_at, subscription_timeout_expires_at,
     last_sync_at, sync_timeout_expires_at, is_upcoming_checked, created_at";

const FEED_COLUMNS: &str = "id, channel_id, title, channel_title, published_at, is_stream, viewers,
     started_at, scheduled_start_at, thumbnail_url, sync_timeout_expires_at, created_at, updated_at";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        // Other processes may hold the write lock while claiming rows.
        conn.busy_timeout(Duration::from_secs(5))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.run_migrations()?;
        Ok(store)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.run_migrations()?;
        Ok(store)
    }

    fn run_migrations(&self) -> Result<()> {
        let migrations = Migrations::new(vec![M::up(include_str!(
            "../../migrations/001-initial/up.sql"
        ))]);

        let mut conn = self.conn()?;
        migrations
            .to_latest(&mut conn)
            .map_err(|e| LivehubError::Other(format!("Migration failed: {}", e)))?;

        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| {
            LivehubError::Database(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(1),
                Some(e.to_string()),
            ))
        })
    }

    fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| s.parse::<DateTime<Utc>>().ok())
    }

    fn optional_datetime(row: &Row, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
        Ok(row
            .get::<_, Option<String>>(idx)?
            .and_then(|s| Self::parse_datetime(&s)))
    }

    fn required_datetime(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
        Ok(row
            .get::<_, String>(idx)
            .ok()
            .and_then(|s| Self::parse_datetime(&s))
            .unwrap_or_else(Utc::now))
    }

    fn channel_from_row(row: &Row) -> rusqlite::Result<Channel> {
        Ok(Channel {
            id: row.get(0)?,
            wrapped_id: row.get(1)?,
            subscription_expires_at: Self::optional_datetime(row, 2)?,
            subscription_timeout_expires_at: Self::optional_datetime(row, 3)?,
            last_sync_at: Self::optional_datetime(row, 4)?,
            sync_timeout_expires_at: Self::optional_datetime(row, 5)?,
            is_upcoming_checked: row.get::<_, i32>(6)? != 0,
            created_at: Self::required_datetime(row, 7)?,
        })
    }

    fn feed_from_row(row: &Row) -> rusqlite::Result<Feed> {
        Ok(Feed {
            id: row.get(0)?,
            channel_id: row.get(1)?,
            title: row.get(2)?,
            channel_title: row.get(3)?,
            published_at: Self::optional_datetime(row, 4)?,
            is_stream: IsStream::from(row.get::<_, Option<bool>>(5)?),
            viewers: row.get::<_, Option<i64>>(6)?.map(|v| v.max(0) as u64),
            started_at: Self::optional_datetime(row, 7)?,
            scheduled_start_at: Self::optional_datetime(row, 8)?,
            thumbnail_url: row.get(9)?,
            sync_timeout_expires_at: Self::optional_datetime(row, 10)?,
            created_at: Self::required_datetime(row, 11)?,
            updated_at: Self::required_datetime(row, 12)?,
        })
    }

    /// Fixed-width UTC text so that SQL string comparison orders like time.
    fn timestamp(dt: &DateTime<Utc>) -> String {
        dt.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    fn placeholders(count: usize) -> String {
        vec!["?"; count].join(", ")
    }

    fn text_values(ids: &[String]) -> Vec<Value> {
        ids.iter().cloned().map(Value::Text).collect()
    }

    fn set_channel_column(&self, column: &str, ids: &[String], value: Value) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let conn = self.conn()?;

        let mut values = vec![value];
        values.extend(Self::text_values(ids));
        conn.execute(
            &format!(
                "UPDATE channels SET {} = ? WHERE id IN ({})",
                column,
                Self::placeholders(ids.len())
            ),
            params_from_iter(values.iter()),
        )?;

        Ok(())
    }
}

impl Store for SqliteStore {
    fn ensure_channels(&self, channels: &[Channel]) -> Result<usize> {
        let mut conn = self.conn()?;

        let tx = conn.transaction()?;
        let mut count = 0;

        for channel in channels {
            count += tx.execute(
                "INSERT OR IGNORE INTO channels (id, wrapped_id, is_upcoming_checked, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    channel.id,
                    channel.wrapped_id,
                    channel.is_upcoming_checked as i32,
                    Self::timestamp(&channel.created_at)
                ],
            )?;
        }

        tx.commit()?;
        Ok(count)
    }

    fn get_channel(&self, id: &str) -> Result<Option<Channel>> {
        let conn = self.conn()?;

        let result = conn
            .query_row(
                &format!("SELECT {} FROM channels WHERE id = ?1", CHANNEL_COLUMNS),
                params![id],
                Self::channel_from_row,
            )
            .optional()?;

        Ok(result)
    }

    fn get_missing_channel_ids(&self, ids: &[String]) -> Result<Vec<String>> {
        let existing = self.get_existing_channel_ids(ids)?;
        let mut seen = HashSet::new();

        Ok(ids
            .iter()
            .filter(|id| !existing.contains(*id) && seen.insert(id.as_str()))
            .cloned()
            .collect())
    }

    fn get_existing_channel_ids(&self, ids: &[String]) -> Result<HashSet<String>> {
        if ids.is_empty() {
            return Ok(HashSet::new());
        }
        let conn = self.conn()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT id FROM channels WHERE id IN ({})",
            Self::placeholders(ids.len())
        ))?;
        let existing = stmt
            .query_map(params_from_iter(Self::text_values(ids).iter()), |row| row.get(0))?
            .collect::<std::result::Result<HashSet<String>, _>>()?;

        Ok(existing)
    }

    fn claim_expiring_subscriptions(
        &self,
        expiring_before: DateTime<Utc>,
        claim: Claim,
    ) -> Result<Vec<String>> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let ids = {
            let mut stmt = tx.prepare(
                "SELECT id FROM channels
                 WHERE (subscription_expires_at IS NULL OR subscription_expires_at < ?1)
                   AND (subscription_timeout_expires_at IS NULL OR subscription_timeout_expires_at < ?2)
                 ORDER BY subscription_expires_at, id
                 LIMIT ?3",
            )?;
            let ids = stmt
                .query_map(
                    params![
                        Self::timestamp(&expiring_before),
                        Self::timestamp(&claim.now),
                        claim.limit as i64
                    ],
                    |row| row.get(0),
                )?
                .collect::<std::result::Result<Vec<String>, _>>()?;
            ids
        };

        if !ids.is_empty() {
            let mut values = vec![Value::Text(Self::timestamp(&claim.until))];
            values.extend(Self::text_values(&ids));
            tx.execute(
                &format!(
                    "UPDATE channels SET subscription_timeout_expires_at = ? WHERE id IN ({})",
                    Self::placeholders(ids.len())
                ),
                params_from_iter(values.iter()),
            )?;
        }

        tx.commit()?;
        Ok(ids)
    }

    fn set_subscription_expires_at(
        &self,
        ids: &[String],
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        self.set_channel_column(
            "subscription_expires_at",
            ids,
            Value::Text(Self::timestamp(&expires_at)),
        )
    }

    fn claim_channels_for_sync(
        &self,
        ids: &[String],
        synced_before: DateTime<Utc>,
        claim: Claim,
    ) -> Result<Vec<Channel>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let mut channels = {
            let mut values = Self::text_values(ids);
            values.push(Value::Text(Self::timestamp(&claim.now)));
            values.push(Value::Text(Self::timestamp(&synced_before)));
            values.push(Value::Integer(claim.limit as i64));

            let mut stmt = tx.prepare(&format!(
                "SELECT {} FROM channels
                 WHERE id IN ({})
                   AND (sync_timeout_expires_at IS NULL OR sync_timeout_expires_at < ?)
                   AND (last_sync_at IS NULL OR last_sync_at < ?)
                 ORDER BY last_sync_at, id
                 LIMIT ?",
                CHANNEL_COLUMNS,
                Self::placeholders(ids.len())
            ))?;
            let channels = stmt
                .query_map(params_from_iter(values.iter()), Self::channel_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            channels
        };

        if !channels.is_empty() {
            let claimed: Vec<String> = channels.iter().map(|c| c.id.clone()).collect();
            let mut values = vec![Value::Text(Self::timestamp(&claim.until))];
            values.extend(Self::text_values(&claimed));
            tx.execute(
                &format!(
                    "UPDATE channels SET sync_timeout_expires_at = ? WHERE id IN ({})",
                    Self::placeholders(claimed.len())
                ),
                params_from_iter(values.iter()),
            )?;
        }

        tx.commit()?;

        for channel in &mut channels {
            channel.sync_timeout_expires_at = Some(claim.until);
        }
        Ok(channels)
    }

    fn set_channels_last_sync_at(&self, ids: &[String], at: DateTime<Utc>) -> Result<()> {
        self.set_channel_column("last_sync_at", ids, Value::Text(Self::timestamp(&at)))
    }

    fn set_channels_upcoming_checked(&self, ids: &[String]) -> Result<()> {
        self.set_channel_column("is_upcoming_checked", ids, Value::Integer(1))
    }

    fn get_feed(&self, id: &str) -> Result<Option<Feed>> {
        let conn = self.conn()?;

        let result = conn
            .query_row(
                &format!("SELECT {} FROM feeds WHERE id = ?1", FEED_COLUMNS),
                params![id],
                Self::feed_from_row,
            )
            .optional()?;

        Ok(result)
    }

    fn get_existing_feed_ids(&self, ids: &[String]) -> Result<HashSet<String>> {
        if ids.is_empty() {
            return Ok(HashSet::new());
        }
        let conn = self.conn()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT id FROM feeds WHERE id IN ({})",
            Self::placeholders(ids.len())
        ))?;
        let existing = stmt
            .query_map(params_from_iter(Self::text_values(ids).iter()), |row| row.get(0))?
            .collect::<std::result::Result<HashSet<String>, _>>()?;

        Ok(existing)
    }

    fn get_feeds_by_ids(&self, ids: &[String]) -> Result<Vec<Feed>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM feeds WHERE id IN ({})",
            FEED_COLUMNS,
            Self::placeholders(ids.len())
        ))?;
        let feeds = stmt
            .query_map(
                params_from_iter(Self::text_values(ids).iter()),
                Self::feed_from_row,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(feeds)
    }

    fn put_feeds(&self, feeds: &[Feed]) -> Result<()> {
        let mut conn = self.conn()?;

        let tx = conn.transaction()?;
        for feed in feeds {
            tx.execute(
                "INSERT INTO feeds (id, channel_id, title, channel_title, published_at, is_stream,
                                    created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(id) DO UPDATE SET
                    channel_id = excluded.channel_id,
                    title = excluded.title,
                    channel_title = excluded.channel_title,
                    published_at = COALESCE(excluded.published_at, feeds.published_at),
                    is_stream = CASE WHEN feeds.is_stream = 1 THEN 1 ELSE excluded.is_stream END,
                    updated_at = excluded.updated_at",
                params![
                    feed.id,
                    feed.channel_id,
                    feed.title,
                    feed.channel_title,
                    feed.published_at.as_ref().map(Self::timestamp),
                    Option::<bool>::from(feed.is_stream),
                    Self::timestamp(&feed.created_at),
                    Self::timestamp(&Utc::now()),
                ],
            )?;
        }
        tx.commit()?;

        Ok(())
    }

    fn claim_feeds_for_sync(&self, channel_ids: &[String], claim: Claim) -> Result<Vec<Feed>> {
        if channel_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let mut feeds = {
            let mut values = Self::text_values(channel_ids);
            values.push(Value::Text(Self::timestamp(&claim.now)));
            values.push(Value::Integer(claim.limit as i64));

            let mut stmt = tx.prepare(&format!(
                "SELECT {} FROM feeds
                 WHERE channel_id IN ({})
                   AND (is_stream IS NULL OR is_stream = 1)
                   AND (sync_timeout_expires_at IS NULL OR sync_timeout_expires_at < ?)
                 ORDER BY sync_timeout_expires_at, id
                 LIMIT ?",
                FEED_COLUMNS,
                Self::placeholders(channel_ids.len())
            ))?;
            let feeds = stmt
                .query_map(params_from_iter(values.iter()), Self::feed_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            feeds
        };

        if !feeds.is_empty() {
            let claimed: Vec<String> = feeds.iter().map(|f| f.id.clone()).collect();
            let mut values = vec![Value::Text(Self::timestamp(&claim.until))];
            values.extend(Self::text_values(&claimed));
            tx.execute(
                &format!(
                    "UPDATE feeds SET sync_timeout_expires_at = ? WHERE id IN ({})",
                    Self::placeholders(claimed.len())
                ),
                params_from_iter(values.iter()),
            )?;
        }

        tx.commit()?;

        for feed in &mut feeds {
            feed.sync_timeout_expires_at = Some(claim.until);
        }
        Ok(feeds)
    }

    fn update_feeds(&self, feeds: &[Feed]) -> Result<()> {
        let mut conn = self.conn()?;

        let tx = conn.transaction()?;
        for feed in feeds {
            tx.execute(
                "UPDATE feeds SET title = ?2, channel_title = ?3, is_stream = ?4, viewers = ?5,
                    started_at = ?6, scheduled_start_at = ?7, thumbnail_url = ?8, updated_at = ?9
                 WHERE id = ?1",
                params![
                    feed.id,
                    feed.title,
                    feed.channel_title,
                    Option::<bool>::from(feed.is_stream),
                    feed.viewers.map(|v| v.min(i64::MAX as u64) as i64),
                    feed.started_at.as_ref().map(Self::timestamp),
                    feed.scheduled_start_at.as_ref().map(Self::timestamp),
                    feed.thumbnail_url,
                    Self::timestamp(&Utc::now()),
                ],
            )?;
        }
        tx.commit()?;

        Ok(())
    }

    fn get_stream_feeds_by_channel_ids(&self, channel_ids: &[String]) -> Result<Vec<Feed>> {
        if channel_ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM feeds
             WHERE channel_id IN ({}) AND is_stream = 1
             ORDER BY started_at DESC, id",
            FEED_COLUMNS,
            Self::placeholders(channel_ids.len())
        ))?;
        let feeds = stmt
            .query_map(
                params_from_iter(Self::text_values(channel_ids).iter()),
                Self::feed_from_row,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(feeds)
    }

    fn clean(&self, older_than: DateTime<Utc>) -> Result<usize> {
        let conn = self.conn()?;

        let removed = conn.execute(
            "DELETE FROM feeds
             WHERE updated_at < ?1 AND (is_stream IS NULL OR is_stream = 0)",
            params![Self::timestamp(&older_than)],
        )?;

        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::YOUTUBE_SERVICE;
    use std::sync::Arc;

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    fn store_with_channels(channel_ids: &[&str]) -> SqliteStore {
        let store = SqliteStore::in_memory().unwrap();
        let channels: Vec<Channel> = channel_ids
            .iter()
            .map(|id| Channel::new(YOUTUBE_SERVICE, *id))
            .collect();
        store.ensure_channels(&channels).unwrap();
        store
    }

    #[test]
    fn test_ensure_channels_is_idempotent() {
        let store = store_with_channels(&["ch1", "ch2"]);
        let again = store
            .ensure_channels(&[Channel::new(YOUTUBE_SERVICE, "ch1")])
            .unwrap();
        assert_eq!(again, 0);

        let channel = store.get_channel("ch1").unwrap().unwrap();
        assert_eq!(channel.wrapped_id, "yo:\"ch1\"");
    }

    #[test]
    fn test_missing_channel_ids_dedups_and_keeps_order() {
        let store = store_with_channels(&["ch1"]);
        let missing = store
            .get_missing_channel_ids(&ids(&["ch3", "ch1", "ch2", "ch3"]))
            .unwrap();
        assert_eq!(missing, ids(&["ch3", "ch2"]));
    }

    #[test]
    fn test_claim_expiring_subscriptions_is_exclusive() {
        let store = store_with_channels(&["a", "b", "c"]);
        let now = Utc::now();
        let window = chrono::Duration::minutes(5);

        let first = store
            .claim_expiring_subscriptions(now, Claim::at(now, window, 2))
            .unwrap();
        let second = store
            .claim_expiring_subscriptions(now, Claim::at(now, window, 2))
            .unwrap();
        let third = store
            .claim_expiring_subscriptions(now, Claim::at(now, window, 2))
            .unwrap();

        assert_eq!(first.len(), 2);
        assert_eq!(second.len(), 1);
        assert!(third.is_empty());
        assert!(!first.contains(&second[0]));
    }

    #[test]
    fn test_claim_lapses_after_window() {
        let store = store_with_channels(&["a"]);
        let now = Utc::now();
        let window = chrono::Duration::minutes(5);

        assert_eq!(
            store
                .claim_expiring_subscriptions(now, Claim::at(now, window, 10))
                .unwrap()
                .len(),
            1
        );

        // A crashed claimant never releases; the claim just runs out.
        let later = now + chrono::Duration::minutes(6);
        let reclaimed = store
            .claim_expiring_subscriptions(later, Claim::at(later, window, 10))
            .unwrap();
        assert_eq!(reclaimed, ids(&["a"]));
    }

    #[test]
    fn test_concurrent_claims_never_overlap() {
        let channel_ids: Vec<String> = (0..40).map(|i| format!("ch{:02}", i)).collect();
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let channels: Vec<Channel> = channel_ids
            .iter()
            .map(|id| Channel::new(YOUTUBE_SERVICE, id.clone()))
            .collect();
        store.ensure_channels(&channels).unwrap();

        let now = Utc::now();
        let claimed: Vec<Vec<String>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    let store = store.clone();
                    scope.spawn(move || {
                        let mut mine = Vec::new();
                        loop {
                            let batch = store
                                .claim_expiring_subscriptions(
                                    now,
                                    Claim::at(now, chrono::Duration::minutes(5), 3),
                                )
                                .unwrap();
                            if batch.is_empty() {
                                break;
                            }
                            mine.extend(batch);
                        }
                        mine
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let mut all: Vec<String> = claimed.into_iter().flatten().collect();
        let total = all.len();
        all.sort();
        all.dedup();
        assert_eq!(total, 40);
        assert_eq!(all, channel_ids);
    }

    #[test]
    fn test_subscribed_channels_are_not_expiring() {
        let store = store_with_channels(&["a", "b"]);
        let now = Utc::now();
        store
            .set_subscription_expires_at(&ids(&["a"]), now + chrono::Duration::days(5))
            .unwrap();

        let expiring_before = now + chrono::Duration::hours(1);
        let claimed = store
            .claim_expiring_subscriptions(
                expiring_before,
                Claim::at(now, chrono::Duration::minutes(5), 10),
            )
            .unwrap();
        assert_eq!(claimed, ids(&["b"]));
    }

    #[test]
    fn test_claim_channels_for_sync_respects_interval_and_scope() {
        let store = store_with_channels(&["a", "b", "c"]);
        let now = Utc::now();
        store
            .set_channels_last_sync_at(&ids(&["a"]), now - chrono::Duration::minutes(1))
            .unwrap();

        let synced_before = now - chrono::Duration::minutes(30);
        let claimed = store
            .claim_channels_for_sync(
                &ids(&["a", "b"]),
                synced_before,
                Claim::at(now, chrono::Duration::minutes(5), 50),
            )
            .unwrap();

        let claimed_ids: Vec<&str> = claimed.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(claimed_ids, vec!["b"]);
        assert!(claimed[0].sync_timeout_expires_at.unwrap() > now);

        let again = store
            .claim_channels_for_sync(
                &ids(&["a", "b"]),
                synced_before,
                Claim::at(now, chrono::Duration::minutes(5), 50),
            )
            .unwrap();
        assert!(again.is_empty());
    }

    #[test]
    fn test_upcoming_checked_flag() {
        let store = store_with_channels(&["a", "b"]);
        store.set_channels_upcoming_checked(&ids(&["a"])).unwrap();

        assert!(store.get_channel("a").unwrap().unwrap().is_upcoming_checked);
        assert!(!store.get_channel("b").unwrap().unwrap().is_upcoming_checked);
    }

    #[test]
    fn test_put_feeds_never_downgrades_stream() {
        let store = SqliteStore::in_memory().unwrap();
        let mut live = Feed::new("v1", "ch1", "Live", "Chan");
        live.is_stream = IsStream::Stream;
        store.update_feeds(&[live.clone()]).unwrap(); // no row yet: no-op
        store.put_feeds(&[Feed::new("v1", "ch1", "Live", "Chan")]).unwrap();
        store.update_feeds(&[live]).unwrap();

        store
            .put_feeds(&[Feed::new("v1", "ch1", "Renamed", "Chan")])
            .unwrap();

        let stored = store.get_feed("v1").unwrap().unwrap();
        assert_eq!(stored.is_stream, IsStream::Stream);
        assert_eq!(stored.title, "Renamed");
    }

    #[test]
    fn test_put_feeds_reopens_not_stream() {
        let store = SqliteStore::in_memory().unwrap();
        store.put_feeds(&[Feed::new("v1", "ch1", "T", "C")]).unwrap();
        let mut gone = store.get_feed("v1").unwrap().unwrap();
        gone.is_stream = IsStream::NotStream;
        store.update_feeds(&[gone]).unwrap();
        assert_eq!(
            store.get_feed("v1").unwrap().unwrap().is_stream,
            IsStream::NotStream
        );

        store.put_feeds(&[Feed::new("v1", "ch1", "T", "C")]).unwrap();
        assert_eq!(
            store.get_feed("v1").unwrap().unwrap().is_stream,
            IsStream::Unknown
        );
    }

    #[test]
    fn test_put_feeds_keeps_published_at() {
        let store = SqliteStore::in_memory().unwrap();
        let published = Utc::now() - chrono::Duration::hours(3);
        let mut pushed = Feed::new("v1", "ch1", "T", "C");
        pushed.published_at = Some(published);
        store.put_feeds(&[pushed]).unwrap();

        store.put_feeds(&[Feed::new("v1", "ch1", "T", "C")]).unwrap();
        let stored = store.get_feed("v1").unwrap().unwrap();
        assert_eq!(
            stored.published_at.map(|dt| dt.timestamp_millis()),
            Some(published.timestamp_millis())
        );
    }

    #[test]
    fn test_update_feeds_round_trips_live_details() {
        let store = SqliteStore::in_memory().unwrap();
        store.put_feeds(&[Feed::new("v1", "ch1", "T", "C")]).unwrap();

        let mut feed = store.get_feed("v1").unwrap().unwrap();
        let started = Utc::now() - chrono::Duration::minutes(10);
        feed.is_stream = IsStream::Stream;
        feed.viewers = Some(1234);
        feed.started_at = Some(started);
        feed.thumbnail_url = Some("https://i.ytimg.com/vi/v1/hq.jpg".into());
        store.update_feeds(&[feed]).unwrap();

        let stored = store.get_feed("v1").unwrap().unwrap();
        assert!(stored.is_live());
        assert_eq!(stored.viewers, Some(1234));
        assert_eq!(
            stored.started_at.map(|dt| dt.timestamp_millis()),
            Some(started.timestamp_millis())
        );
    }

    #[test]
    fn test_claim_feeds_for_sync_skips_not_stream_and_claimed() {
        let store = SqliteStore::in_memory().unwrap();
        store
            .put_feeds(&[
                Feed::new("unknown", "ch1", "T", "C"),
                Feed::new("live", "ch1", "T", "C"),
                Feed::new("gone", "ch1", "T", "C"),
                Feed::new("other", "ch2", "T", "C"),
            ])
            .unwrap();
        let mut live = store.get_feed("live").unwrap().unwrap();
        live.is_stream = IsStream::Stream;
        let mut gone = store.get_feed("gone").unwrap().unwrap();
        gone.is_stream = IsStream::NotStream;
        store.update_feeds(&[live, gone]).unwrap();

        let now = Utc::now();
        let claim = Claim::at(now, chrono::Duration::minutes(1), 50);
        let mut claimed: Vec<String> = store
            .claim_feeds_for_sync(&ids(&["ch1"]), claim)
            .unwrap()
            .into_iter()
            .map(|f| f.id)
            .collect();
        claimed.sort();
        assert_eq!(claimed, ids(&["live", "unknown"]));

        assert!(store
            .claim_feeds_for_sync(&ids(&["ch1"]), claim)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_stream_feeds_by_channel_ids() {
        let store = SqliteStore::in_memory().unwrap();
        store
            .put_feeds(&[
                Feed::new("v1", "ch1", "T", "C"),
                Feed::new("v2", "ch1", "T", "C"),
                Feed::new("v3", "ch2", "T", "C"),
            ])
            .unwrap();
        let mut v1 = store.get_feed("v1").unwrap().unwrap();
        v1.is_stream = IsStream::Stream;
        let mut v3 = store.get_feed("v3").unwrap().unwrap();
        v3.is_stream = IsStream::Stream;
        store.update_feeds(&[v1, v3]).unwrap();

        let streams = store
            .get_stream_feeds_by_channel_ids(&ids(&["ch1"]))
            .unwrap();
        assert_eq!(streams.len(), 1);
        assert_eq!(streams[0].id, "v1");
    }

    #[test]
    fn test_clean_removes_untouched_feeds() {
        let store = SqliteStore::in_memory().unwrap();
        store.put_feeds(&[Feed::new("v1", "ch1", "T", "C")]).unwrap();

        assert_eq!(
            store
                .clean(Utc::now() - chrono::Duration::days(14))
                .unwrap(),
            0
        );
        assert_eq!(
            store
                .clean(Utc::now() + chrono::Duration::seconds(1))
                .unwrap(),
            1
        );
        assert!(store.get_feed("v1").unwrap().is_none());
    }

    #[test]
    fn test_clean_keeps_live_feeds() {
        let store = SqliteStore::in_memory().unwrap();
        store.put_feeds(&[Feed::new("v1", "ch1", "T", "C")]).unwrap();
        let mut live = store.get_feed("v1").unwrap().unwrap();
        live.is_stream = IsStream::Stream;
        store.update_feeds(&[live]).unwrap();

        assert_eq!(
            store
                .clean(Utc::now() + chrono::Duration::seconds(1))
                .unwrap(),
            0
        );
        assert!(store.get_feed("v1").unwrap().is_some());
    }

    #[test]
    fn test_empty_inputs_are_noops() {
        let store = SqliteStore::in_memory().unwrap();
        assert!(store.get_existing_feed_ids(&[]).unwrap().is_empty());
        assert!(store.get_feeds_by_ids(&[]).unwrap().is_empty());
        assert!(store
            .claim_channels_for_sync(&[], Utc::now(), Claim::new(chrono::Duration::minutes(1), 50))
            .unwrap()
            .is_empty());
        store.set_channels_last_sync_at(&[], Utc::now()).unwrap();
    }
}
