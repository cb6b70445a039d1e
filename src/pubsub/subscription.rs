use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;

use crate::app::Result;
use crate::config::Interval;
use crate::fetcher::ParallelFetcher;
use crate::hub::{topic_url, HubClient, HubMode};
use crate::pubsub::PubSub;
use crate::store::{Claim, Store};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenewReport {
    pub subscribe_count: usize,
    pub error_count: usize,
}

async fn hub_request(
    hub: Arc<dyn HubClient + Send + Sync>,
    mode: HubMode,
    channel_id: &str,
) -> Result<()> {
    let topic = topic_url(channel_id)?;
    match mode {
        HubMode::Subscribe => hub.subscribe(&topic).await,
        HubMode::Unsubscribe => hub.unsubscribe(&topic).await,
    }
}

impl<S: Store + Send + Sync + 'static> PubSub<S> {
    pub async fn unsubscribe(&self, channel_id: &str) -> Result<()> {
        hub_request(self.hub.clone(), HubMode::Unsubscribe, channel_id).await
    }

    /// Re-subscribes every channel whose lease is missing or about to lapse.
    ///
    /// Claims batches until none are left. A channel whose subscribe fails
    /// keeps its claim and is picked up again once the claim runs out.
    pub async fn renew_expiring(&self) -> Result<RenewReport> {
        let _guard = self.gate.lock().await;

        let fetcher = ParallelFetcher::with_workers(self.hub_config.concurrency);
        let claim_window = self.hub_config.subscribe_claim.as_chrono();
        let lease = Interval::from_secs(self.hub_config.lease_seconds);
        let mut report = RenewReport::default();
        let mut attempted = HashSet::new();

        loop {
            let now = Utc::now();
            let channel_ids = self.store.claim_expiring_subscriptions(
                self.hub_config.renew_before.after(now),
                Claim::at(now, claim_window, self.hub_config.batch_size),
            )?;
            // Only a lapsed claim hands back channels already attempted in this sweep.
            let channel_ids: Vec<String> = channel_ids
                .into_iter()
                .filter(|id| attempted.insert(id.clone()))
                .collect();
            if channel_ids.is_empty() {
                break;
            }

            // Stored expiry must not outlive the lease the hub grants.
            let expires_at = lease.after(now);

            let hub = self.hub.clone();
            let results = fetcher
                .fetch_all(channel_ids, |channel_id| {
                    let hub = hub.clone();
                    async move { hub_request(hub, HubMode::Subscribe, &channel_id).await }
                })
                .await;

            let mut subscribed = Vec::new();
            for (channel_id, result) in results {
                match result {
                    Ok(()) => {
                        subscribed.push(channel_id);
                        report.subscribe_count += 1;
                    }
                    Err(e) => {
                        tracing::debug!("Subscribe channel {} skip, cause: {}", channel_id, e);
                        report.error_count += 1;
                    }
                }
            }

            self.store
                .set_subscription_expires_at(&subscribed, expires_at)?;
        }

        if report.subscribe_count + report.error_count > 0 {
            tracing::info!(
                "Renewed {} subscriptions, {} errors",
                report.subscribe_count,
                report.error_count
            );
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::RenewReport;
    use crate::app::Result;
    use crate::domain::FeedEntry;
    use crate::pubsub::testing::*;
    use crate::pubsub::PubSub;
    use crate::store::{SqliteStore, Store};
    use chrono::Utc;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    async fn renew(pubsub: Arc<PubSub<SqliteStore>>) -> Result<RenewReport> {
        pubsub.renew_expiring().await
    }

    #[tokio::test]
    async fn test_renew_counts_successes_and_failures() {
        let fx = fixture();
        fx.pubsub.track_channels(&ids(&["ok", "bad"])).unwrap();
        fx.hub.failing.lock().unwrap().insert("bad".into());

        let before = Utc::now();
        let report = fx.pubsub.renew_expiring().await.unwrap();

        assert_eq!(report.subscribe_count, 1);
        assert_eq!(report.error_count, 1);
        assert_eq!(
            serde_json::to_value(report).unwrap(),
            serde_json::json!({"subscribeCount": 1, "errorCount": 1})
        );

        let ok = fx.store.get_channel("ok").unwrap().unwrap();
        let bad = fx.store.get_channel("bad").unwrap().unwrap();
        assert!(ok.subscription_expires_at.unwrap() > before + chrono::Duration::days(4));
        assert!(bad.subscription_expires_at.is_none());
    }

    #[tokio::test]
    async fn test_renew_skips_fresh_leases_and_claimed_channels() {
        let fx = fixture();
        fx.pubsub.track_channels(&ids(&["a", "b"])).unwrap();
        fx.hub.failing.lock().unwrap().insert("b".into());

        let first = fx.pubsub.renew_expiring().await.unwrap();
        assert_eq!((first.subscribe_count, first.error_count), (1, 1));

        // "a" holds a fresh lease, "b" is still claimed by the failed attempt.
        fx.hub.failing.lock().unwrap().clear();
        let second = fx.pubsub.renew_expiring().await.unwrap();
        assert_eq!((second.subscribe_count, second.error_count), (0, 0));
        assert_eq!(*fx.hub.subscribed.lock().unwrap(), ids(&["a"]));
    }

    #[tokio::test]
    async fn test_renew_sweeps_multiple_batches() {
        let mut config = crate::config::Config::default();
        config.hub.batch_size = 2;
        let fx = fixture_with(config);
        let channels: Vec<String> = (0..5).map(|i| format!("ch{}", i)).collect();
        fx.pubsub.track_channels(&channels).unwrap();

        let report = fx.pubsub.renew_expiring().await.unwrap();
        assert_eq!(report.subscribe_count, 5);

        let mut subscribed = fx.hub.subscribed.lock().unwrap().clone();
        subscribed.sort();
        assert_eq!(subscribed, channels);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_renewals_subscribe_each_channel_once() {
        let mut config = crate::config::Config::default();
        config.hub.batch_size = 5;
        let fx = fixture_with(config);
        *fx.hub.delay.lock().unwrap() = Duration::from_millis(5);
        let channels: Vec<String> = (0..30).map(|i| format!("ch{:02}", i)).collect();
        fx.pubsub.track_channels(&channels).unwrap();

        let (a, b) = tokio::join!(
            renew(fx.pubsub.clone()),
            renew(fx.pubsub.clone())
        );
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_eq!(a.subscribe_count + b.subscribe_count, 30);
        assert_eq!(a.error_count + b.error_count, 0);
        let mut subscribed = fx.hub.subscribed.lock().unwrap().clone();
        subscribed.sort();
        assert_eq!(subscribed, channels);
    }

    #[tokio::test]
    async fn test_commit_waits_for_running_renewal() {
        let fx = fixture();
        fx.pubsub.track_channels(&ids(&["ch1"])).unwrap();
        *fx.hub.delay.lock().unwrap() = Duration::from_millis(300);

        let renewal = tokio::spawn(renew(fx.pubsub.clone()));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(fx.hub.subscribed.lock().unwrap().is_empty());

        let entry = FeedEntry {
            id: "v1".into(),
            title: "T".into(),
            channel_id: "ch1".into(),
            channel_title: "A".into(),
            published_at: Utc::now(),
        };
        let started = Instant::now();
        let report = fx.pubsub.commit_entries(vec![entry]).await.unwrap();

        // The commit only got the gate once the renewal had finished.
        assert!(started.elapsed() >= Duration::from_millis(200));
        assert_eq!(*fx.hub.subscribed.lock().unwrap(), ids(&["ch1"]));
        assert_eq!(report.inserted, 1);
        assert_eq!(renewal.await.unwrap().unwrap().subscribe_count, 1);
    }

    #[tokio::test]
    async fn test_unsubscribe_uses_topic() {
        let fx = fixture();
        fx.pubsub.unsubscribe("UCabc").await.unwrap();
        assert_eq!(*fx.hub.unsubscribed.lock().unwrap(), ids(&["UCabc"]));
    }
}
