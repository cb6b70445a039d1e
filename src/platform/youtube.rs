use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::app::{LivehubError, Result};
use crate::config::YoutubeConfig;
use crate::domain::{LiveDetails, VideoSnippet};
use crate::platform::PlatformClient;

/// The videos endpoint accepts at most this many ids per call.
const MAX_IDS_PER_REQUEST: usize = 50;

pub struct YoutubeClient {
    client: Client,
    api_base: String,
    api_key: String,
}

impl YoutubeClient {
    pub fn new(config: &YoutubeConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .gzip(true)
            .brotli(true)
            .user_agent(concat!("livehub/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, endpoint: &str, query: &[(&str, &str)]) -> Result<T> {
        let response = self
            .client
            .get(format!("{}/{}", self.api_base, endpoint))
            .query(query)
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let excerpt: String = body.chars().take(200).collect();
            return Err(LivehubError::Platform(format!(
                "{} responded {}: {}",
                endpoint, status, excerpt
            )));
        }

        Ok(response.json().await?)
    }
}

#[derive(Debug, Deserialize)]
struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: SearchItemId,
    snippet: Snippet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchItemId {
    video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snippet {
    title: String,
    channel_id: String,
    channel_title: String,
    #[serde(default)]
    thumbnails: HashMap<String, Thumbnail>,
}

impl Snippet {
    fn best_thumbnail(&self) -> Option<String> {
        ["maxres", "standard", "high", "medium", "default"]
            .iter()
            .find_map(|size| self.thumbnails.get(*size))
            .map(|t| t.url.clone())
    }
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
    url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoItem {
    id: String,
    snippet: Snippet,
    live_streaming_details: Option<LiveStreamingDetails>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LiveStreamingDetails {
    actual_start_time: Option<DateTime<Utc>>,
    actual_end_time: Option<DateTime<Utc>>,
    scheduled_start_time: Option<DateTime<Utc>>,
    /// Sent as a decimal string.
    concurrent_viewers: Option<String>,
}

impl VideoItem {
    fn into_live_details(self) -> Option<(String, LiveDetails)> {
        let live = self.live_streaming_details?;
        if live.actual_start_time.is_none() || live.actual_end_time.is_some() {
            return None;
        }

        let details = LiveDetails {
            thumbnail_url: self.snippet.best_thumbnail(),
            title: self.snippet.title,
            channel_id: self.snippet.channel_id,
            channel_title: self.snippet.channel_title,
            viewers: live.concurrent_viewers.and_then(|v| v.parse().ok()),
            started_at: live.actual_start_time,
            scheduled_start_at: live.scheduled_start_time,
        };
        Some((self.id, details))
    }
}

#[async_trait]
impl PlatformClient for YoutubeClient {
    async fn get_video_snippets_by_channel(
        &self,
        channel_id: &str,
        upcoming_only: bool,
    ) -> Result<HashMap<String, VideoSnippet>> {
        let event_type = if upcoming_only { "upcoming" } else { "live" };
        let max_results = MAX_IDS_PER_REQUEST.to_string();

        let response: ListResponse<SearchItem> = self
            .get_json(
                "search",
                &[
                    ("part", "snippet"),
                    ("channelId", channel_id),
                    ("eventType", event_type),
                    ("type", "video"),
                    ("maxResults", max_results.as_str()),
                ],
            )
            .await?;

        Ok(response
            .items
            .into_iter()
            .filter_map(|item| {
                let id = item.id.video_id?;
                Some((
                    id,
                    VideoSnippet {
                        title: item.snippet.title,
                        channel_id: item.snippet.channel_id,
                        channel_title: item.snippet.channel_title,
                    },
                ))
            })
            .collect())
    }

    async fn get_live_details_by_video_ids(
        &self,
        video_ids: &[String],
    ) -> Result<HashMap<String, LiveDetails>> {
        let mut result = HashMap::new();

        for chunk in video_ids.chunks(MAX_IDS_PER_REQUEST) {
            let ids = chunk.join(",");
            let response: ListResponse<VideoItem> = self
                .get_json(
                    "videos",
                    &[("part", "snippet,liveStreamingDetails"), ("id", ids.as_str())],
                )
                .await?;

            result.extend(
                response
                    .items
                    .into_iter()
                    .filter_map(VideoItem::into_live_details),
            );
        }

        Ok(result)
    }
}
