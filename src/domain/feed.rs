use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Live classification of a feed.
///
/// Serialized as `null` / `true` / `false`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "Option<bool>", into = "Option<bool>")]
pub enum IsStream {
    #[default]
    Unknown,
    Stream,
    NotStream,
}

impl From<Option<bool>> for IsStream {
    fn from(value: Option<bool>) -> Self {
        match value {
            None => IsStream::Unknown,
            Some(true) => IsStream::Stream,
            Some(false) => IsStream::NotStream,
        }
    }
}

impl From<IsStream> for Option<bool> {
    fn from(value: IsStream) -> Self {
        match value {
            IsStream::Unknown => None,
            IsStream::Stream => Some(true),
            IsStream::NotStream => Some(false),
        }
    }
}

/// One discovered video or broadcast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feed {
    pub id: String,
    pub channel_id: String,
    pub title: String,
    pub channel_title: String,
    pub published_at: Option<DateTime<Utc>>,
    pub is_stream: IsStream,
    pub viewers: Option<u64>,
    pub started_at: Option<DateTime<Utc>>,
    pub scheduled_start_at: Option<DateTime<Utc>>,
    pub thumbnail_url: Option<String>,
    #[serde(skip)]
    pub sync_timeout_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Feed {
    pub fn new(
        id: impl Into<String>,
        channel_id: impl Into<String>,
        title: impl Into<String>,
        channel_title: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            channel_id: channel_id.into(),
            title: title.into(),
            channel_title: channel_title.into(),
            published_at: None,
            is_stream: IsStream::Unknown,
            viewers: None,
            started_at: None,
            scheduled_start_at: None,
            thumbnail_url: None,
            sync_timeout_expires_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn from_entry(entry: &FeedEntry) -> Self {
        let mut feed = Self::new(
            entry.id.clone(),
            entry.channel_id.clone(),
            entry.title.clone(),
            entry.channel_title.clone(),
        );
        feed.published_at = Some(entry.published_at);
        feed
    }

    pub fn from_snippet(id: impl Into<String>, snippet: &VideoSnippet) -> Self {
        Self::new(
            id,
            snippet.channel_id.clone(),
            snippet.title.clone(),
            snippet.channel_title.clone(),
        )
    }

    /// Marks the feed live and merges the platform's live metadata.
    pub fn apply_live_details(&mut self, details: &LiveDetails) {
        self.is_stream = IsStream::Stream;
        self.title = details.title.clone();
        self.channel_title = details.channel_title.clone();
        self.viewers = details.viewers;
        self.started_at = details.started_at;
        self.scheduled_start_at = details.scheduled_start_at;
        if details.thumbnail_url.is_some() {
            self.thumbnail_url = details.thumbnail_url.clone();
        }
        self.updated_at = Utc::now();
    }

    pub fn is_live(&self) -> bool {
        self.is_stream == IsStream::Stream
    }
}

/// Entry parsed out of a hub delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedEntry {
    pub id: String,
    pub title: String,
    pub channel_id: String,
    pub channel_title: String,
    pub published_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoSnippet {
    pub title: String,
    pub channel_id: String,
    pub channel_title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveDetails {
    pub title: String,
    pub channel_id: String,
    pub channel_title: String,
    pub viewers: Option<u64>,
    pub started_at: Option<DateTime<Utc>>,
    pub scheduled_start_at: Option<DateTime<Utc>>,
    pub thumbnail_url: Option<String>,
}
