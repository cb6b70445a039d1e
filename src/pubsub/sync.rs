use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::app::Result;
use crate::domain::{Channel, Feed, IsStream};
use crate::fetcher::ParallelFetcher;
use crate::platform::PlatformClient;
use crate::pubsub::{PubSub, EVENTS_TARGET};
use crate::store::{Claim, Store};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelSyncReport {
    pub channels: usize,
    pub skipped: usize,
    pub inserted: usize,
    pub fixed: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamSyncReport {
    pub checked: usize,
    pub live: usize,
    pub ended: usize,
    pub failed_pages: usize,
}

/// What one channel's enumeration produced.
struct ChannelFeeds {
    upcoming_checked: bool,
    feeds: Vec<Feed>,
}

async fn request_channel_feeds(
    platform: &(dyn PlatformClient + Send + Sync),
    channel_id: &str,
    is_upcoming_checked: bool,
) -> Result<ChannelFeeds> {
    let upcoming = async {
        if is_upcoming_checked {
            None
        } else {
            Some(platform.get_video_snippets_by_channel(channel_id, true).await)
        }
    };
    let (upcoming, current) = tokio::join!(
        upcoming,
        platform.get_video_snippets_by_channel(channel_id, false)
    );

    let mut upcoming_checked = false;
    let mut feeds = Vec::new();

    match upcoming {
        Some(Ok(snippets)) => {
            upcoming_checked = true;
            feeds.extend(snippets.iter().map(|(id, s)| Feed::from_snippet(id.clone(), s)));
        }
        Some(Err(e)) => {
            tracing::debug!("Get upcoming feeds {} error: {}", channel_id, e);
        }
        None => {}
    }

    let snippets = current?;
    feeds.extend(snippets.iter().map(|(id, s)| Feed::from_snippet(id.clone(), s)));

    Ok(ChannelFeeds {
        upcoming_checked,
        feeds,
    })
}

impl<S: Store + Send + Sync + 'static> PubSub<S> {
    /// Enumerates current and upcoming broadcasts of every due channel in
    /// `channel_ids` and records any the store doesn't know yet.
    ///
    /// Channels whose enumeration failed are appended to `skipped`.
    pub async fn sync_channels(
        &self,
        channel_ids: &[String],
        skipped: &mut Vec<String>,
    ) -> Result<ChannelSyncReport> {
        let fetcher = ParallelFetcher::with_workers(self.sync_config.concurrency);
        let mut report = ChannelSyncReport::default();
        let mut pending: Vec<String> = channel_ids.to_vec();

        while !pending.is_empty() {
            let now = Utc::now();
            let page = self.store.claim_channels_for_sync(
                &pending,
                self.sync_config.channel_interval.before(now),
                Claim::at(
                    now,
                    self.sync_config.channel_claim.as_chrono(),
                    self.sync_config.page_size,
                ),
            )?;
            if page.is_empty() {
                break;
            }

            report.channels += page.len();
            let page_ids: Vec<String> = page.iter().map(|c| c.id.clone()).collect();
            pending.retain(|id| !page_ids.contains(id));
            if let Err(e) = self
                .sync_channel_page(&fetcher, page, now, skipped, &mut report)
                .await
            {
                tracing::error!("Channel sync page {:?} failed: {}", page_ids, e);
            }
        }

        Ok(report)
    }

    async fn sync_channel_page(
        &self,
        fetcher: &ParallelFetcher,
        page: Vec<Channel>,
        synced_at: DateTime<Utc>,
        skipped: &mut Vec<String>,
        report: &mut ChannelSyncReport,
    ) -> Result<()> {
        let page_ids: Vec<String> = page.iter().map(|c| c.id.clone()).collect();
        let keys: Vec<(String, bool)> = page
            .into_iter()
            .map(|c| (c.id, c.is_upcoming_checked))
            .collect();

        let platform = self.platform.clone();
        let results = fetcher
            .fetch_all(keys, |(channel_id, is_upcoming_checked)| {
                let platform = platform.clone();
                async move {
                    request_channel_feeds(platform.as_ref(), &channel_id, is_upcoming_checked)
                        .await
                }
            })
            .await;

        let mut feeds: Vec<Feed> = Vec::new();
        let mut seen = HashSet::new();
        let mut upcoming_checked = Vec::new();

        for ((channel_id, _), result) in results {
            match result {
                Ok(channel_feeds) => {
                    if channel_feeds.upcoming_checked {
                        upcoming_checked.push(channel_id);
                    }
                    feeds.extend(
                        channel_feeds
                            .feeds
                            .into_iter()
                            .filter(|f| seen.insert(f.id.clone())),
                    );
                }
                Err(e) => {
                    tracing::debug!("Get streams for channel {} skip, cause: {}", channel_id, e);
                    report.skipped += 1;
                    skipped.push(channel_id);
                }
            }
        }

        let feed_ids: Vec<String> = feeds.iter().map(|f| f.id.clone()).collect();
        let known: HashMap<String, IsStream> = self
            .store
            .get_feeds_by_ids(&feed_ids)?
            .into_iter()
            .map(|f| (f.id, f.is_stream))
            .collect();

        let mut inserted = Vec::new();
        let mut fixed = Vec::new();
        for feed in &mut feeds {
            match known.get(&feed.id) {
                None => inserted.push((feed.channel_id.clone(), feed.id.clone())),
                Some(IsStream::NotStream) => {
                    feed.is_stream = IsStream::Unknown;
                    fixed.push((feed.channel_id.clone(), feed.id.clone()));
                }
                Some(IsStream::Stream) => feed.is_stream = IsStream::Stream,
                Some(IsStream::Unknown) => {}
            }
        }

        self.store.put_feeds(&feeds)?;
        self.store.set_channels_last_sync_at(&page_ids, synced_at)?;
        self.store.set_channels_upcoming_checked(&upcoming_checked)?;

        for (channel_id, feed_id) in &inserted {
            tracing::info!(target: EVENTS_TARGET, %channel_id, %feed_id, "[insert full]");
        }
        for (channel_id, feed_id) in &fixed {
            tracing::info!(target: EVENTS_TARGET, %channel_id, %feed_id, "[fixed]");
        }
        report.inserted += inserted.len();
        report.fixed += fixed.len();

        Ok(())
    }

    /// Classifies the unclassified and live feeds of `channel_ids` against
    /// the platform's live details.
    pub async fn sync_streams(&self, channel_ids: &[String]) -> Result<StreamSyncReport> {
        let mut report = StreamSyncReport::default();
        let mut seen = HashSet::new();

        loop {
            let page = self.store.claim_feeds_for_sync(
                channel_ids,
                Claim::new(
                    self.sync_config.feed_claim.as_chrono(),
                    self.sync_config.page_size,
                ),
            )?;
            // A lapsed claim can hand back feeds this sweep already checked.
            let fresh = page.iter().filter(|f| seen.insert(f.id.clone())).count();
            if fresh == 0 {
                break;
            }

            report.checked += fresh;
            if let Err(e) = self.sync_stream_page(page, &mut report).await {
                tracing::error!("Stream sync page failed: {}", e);
                report.failed_pages += 1;
            }
        }

        Ok(report)
    }

    async fn sync_stream_page(&self, page: Vec<Feed>, report: &mut StreamSyncReport) -> Result<()> {
        let feed_ids: Vec<String> = page.iter().map(|f| f.id.clone()).collect();
        let details = self
            .platform
            .get_live_details_by_video_ids(&feed_ids)
            .await?;

        let mut changed = Vec::with_capacity(page.len());
        for mut feed in page {
            match details.get(&feed.id) {
                Some(live) => {
                    feed.apply_live_details(live);
                    report.live += 1;
                }
                None => {
                    if feed.is_live() {
                        tracing::info!(
                            target: EVENTS_TARGET,
                            channel_id = %feed.channel_id,
                            feed_id = %feed.id,
                            "[not found]"
                        );
                        report.ended += 1;
                    }
                    feed.is_stream = IsStream::NotStream;
                }
            }
            changed.push(feed);
        }

        self.store.update_feeds(&changed)
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::{Feed, IsStream};
    use crate::pubsub::testing::*;
    use crate::store::Store;

    #[tokio::test]
    async fn test_upcoming_failure_keeps_flag_and_still_fetches_current() {
        let fx = fixture();
        fx.pubsub.track_channels(&ids(&["ch1"])).unwrap();
        fx.platform.failing_upcoming.lock().unwrap().insert("ch1".into());
        fx.platform.add_video("ch1", "v1", false);

        let mut skipped = Vec::new();
        let report = fx
            .pubsub
            .sync_channels(&ids(&["ch1"]), &mut skipped)
            .await
            .unwrap();

        assert!(skipped.is_empty());
        assert_eq!(report.inserted, 1);
        let mut calls = fx.platform.calls_for("ch1");
        calls.sort();
        assert_eq!(calls, vec![false, true]);
        assert!(!fx.store.get_channel("ch1").unwrap().unwrap().is_upcoming_checked);
        assert!(fx.store.get_feed("v1").unwrap().is_some());
    }

    #[tokio::test]
    async fn test_upcoming_requested_once() {
        let mut config = crate::config::Config::default();
        config.sync.channel_interval = crate::config::Interval::from_secs(0);
        config.sync.channel_claim = crate::config::Interval::from_secs(0);
        let fx = fixture_with(config);
        fx.pubsub.track_channels(&ids(&["ch1"])).unwrap();
        fx.platform.add_video("ch1", "soon", true);

        let mut skipped = Vec::new();
        fx.pubsub
            .sync_channels(&ids(&["ch1"]), &mut skipped)
            .await
            .unwrap();
        assert!(fx.store.get_channel("ch1").unwrap().unwrap().is_upcoming_checked);
        assert!(fx.store.get_feed("soon").unwrap().is_some());

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let report = fx
            .pubsub
            .sync_channels(&ids(&["ch1"]), &mut skipped)
            .await
            .unwrap();
        assert_eq!(report.channels, 1);

        let mut calls = fx.platform.calls_for("ch1");
        calls.sort();
        assert_eq!(calls, vec![false, false, true]);
    }

    #[tokio::test]
    async fn test_channel_failure_is_skipped_not_fatal() {
        let fx = fixture();
        fx.pubsub.track_channels(&ids(&["good", "bad"])).unwrap();
        fx.platform.failing_channels.lock().unwrap().insert("bad".into());
        fx.platform.add_video("good", "v1", false);

        let mut skipped = Vec::new();
        let report = fx
            .pubsub
            .sync_channels(&ids(&["good", "bad"]), &mut skipped)
            .await
            .unwrap();

        assert_eq!(skipped, ids(&["bad"]));
        assert_eq!(report.channels, 2);
        assert_eq!(report.skipped, 1);
        assert!(fx.store.get_feed("v1").unwrap().is_some());
    }

    #[tokio::test]
    async fn test_discovery_reopens_not_stream_and_keeps_stream() {
        let fx = fixture();
        fx.pubsub.track_channels(&ids(&["ch1"])).unwrap();
        fx.store
            .put_feeds(&[Feed::new("gone", "ch1", "T", "C"), Feed::new("live", "ch1", "T", "C")])
            .unwrap();
        let mut gone = fx.store.get_feed("gone").unwrap().unwrap();
        gone.is_stream = IsStream::NotStream;
        let mut live = fx.store.get_feed("live").unwrap().unwrap();
        live.is_stream = IsStream::Stream;
        fx.store.update_feeds(&[gone, live]).unwrap();

        fx.platform.add_video("ch1", "gone", false);
        fx.platform.add_video("ch1", "live", false);
        fx.platform.add_video("ch1", "new", false);

        let mut skipped = Vec::new();
        let report = fx
            .pubsub
            .sync_channels(&ids(&["ch1"]), &mut skipped)
            .await
            .unwrap();

        assert_eq!(report.inserted, 1);
        assert_eq!(report.fixed, 1);
        assert_eq!(
            fx.store.get_feed("gone").unwrap().unwrap().is_stream,
            IsStream::Unknown
        );
        assert_eq!(
            fx.store.get_feed("live").unwrap().unwrap().is_stream,
            IsStream::Stream
        );
        assert_eq!(
            fx.store.get_feed("new").unwrap().unwrap().is_stream,
            IsStream::Unknown
        );
    }

    #[tokio::test]
    async fn test_sync_streams_classifies_page() {
        let fx = fixture();
        fx.store
            .put_feeds(&[
                Feed::new("starting", "ch1", "T", "C"),
                Feed::new("upload", "ch1", "T", "C"),
                Feed::new("ended", "ch1", "T", "C"),
            ])
            .unwrap();
        let mut ended = fx.store.get_feed("ended").unwrap().unwrap();
        ended.is_stream = IsStream::Stream;
        fx.store.update_feeds(&[ended]).unwrap();
        fx.platform.set_live("ch1", "starting", 10);

        let report = fx.pubsub.sync_streams(&ids(&["ch1"])).await.unwrap();

        assert_eq!(report.checked, 3);
        assert_eq!(report.live, 1);
        assert_eq!(report.ended, 1);

        let starting = fx.store.get_feed("starting").unwrap().unwrap();
        assert!(starting.is_live());
        assert_eq!(starting.viewers, Some(10));
        assert_eq!(starting.title, "starting live");
        assert_eq!(
            fx.store.get_feed("upload").unwrap().unwrap().is_stream,
            IsStream::NotStream
        );
        assert_eq!(
            fx.store.get_feed("ended").unwrap().unwrap().is_stream,
            IsStream::NotStream
        );
    }

    #[tokio::test]
    async fn test_sync_streams_pages_until_drained() {
        let mut config = crate::config::Config::default();
        config.sync.page_size = 2;
        let fx = fixture_with(config);
        let feeds: Vec<Feed> = (0..5)
            .map(|i| Feed::new(format!("v{}", i), "ch1", "T", "C"))
            .collect();
        fx.store.put_feeds(&feeds).unwrap();

        let report = fx.pubsub.sync_streams(&ids(&["ch1"])).await.unwrap();
        assert_eq!(report.checked, 5);

        // Everything is classified now, so nothing is due.
        let again = fx.pubsub.sync_streams(&ids(&["ch1"])).await.unwrap();
        assert_eq!(again.checked, 0);
    }
}
