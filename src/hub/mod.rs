//! WebSub (PubSubHubbub) subscriber side: topic URLs and subscription requests.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use url::Url;

use crate::app::{LivehubError, Result};
use crate::config::{HubConfig, ServerConfig};

const TOPIC_BASE: &str = "https://www.youtube.com/xml/feeds/videos.xml";

/// Feed URL the hub publishes a channel's uploads under.
pub fn topic_url(channel_id: &str) -> Result<Url> {
    let mut url = Url::parse(TOPIC_BASE)?;
    url.query_pairs_mut().append_pair("channel_id", channel_id);
    Ok(url)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HubMode {
    Subscribe,
    Unsubscribe,
}

impl HubMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            HubMode::Subscribe => "subscribe",
            HubMode::Unsubscribe => "unsubscribe",
        }
    }
}

#[async_trait]
pub trait HubClient {
    async fn subscribe(&self, topic: &Url) -> Result<()>;
    async fn unsubscribe(&self, topic: &Url) -> Result<()>;
}

pub struct WebSubHubClient {
    client: Client,
    hub_url: String,
    callback_url: String,
    lease_seconds: u64,
    secret: Option<String>,
}

impl WebSubHubClient {
    pub fn new(hub: &HubConfig, server: &ServerConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(hub.timeout_secs))
            .user_agent(concat!("livehub/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            hub_url: hub.url.clone(),
            callback_url: server.callback_url.clone(),
            lease_seconds: hub.lease_seconds,
            secret: server.secret.clone(),
        })
    }

    async fn request(&self, mode: HubMode, topic: &Url) -> Result<()> {
        let lease_seconds = self.lease_seconds.to_string();
        let mut form = vec![
            ("hub.mode", mode.as_str()),
            ("hub.topic", topic.as_str()),
            ("hub.callback", self.callback_url.as_str()),
            ("hub.verify", "async"),
            ("hub.lease_seconds", lease_seconds.as_str()),
        ];
        if let Some(secret) = &self.secret {
            form.push(("hub.secret", secret.as_str()));
        }

        let response = self.client.post(&self.hub_url).form(&form).send().await?;

        let status = response.status();
        if status == StatusCode::ACCEPTED || status == StatusCode::NO_CONTENT {
            tracing::debug!("Hub accepted {} for {}", mode.as_str(), topic);
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(LivehubError::Hub {
            status: status.as_u16(),
            body: body.trim().chars().take(200).collect(),
        })
    }
}

#[async_trait]
impl HubClient for WebSubHubClient {
    async fn subscribe(&self, topic: &Url) -> Result<()> {
        self.request(HubMode::Subscribe, topic).await
    }

    async fn unsubscribe(&self, topic: &Url) -> Result<()> {
        self.request(HubMode::Unsubscribe, topic).await
    }
}
