use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Service id of the only push-capable platform.
pub const YOUTUBE_SERVICE: &str = "youtube";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    pub id: String,
    pub wrapped_id: String,
    pub subscription_expires_at: Option<DateTime<Utc>>,
    /// Renewal claim; valid only while in the future.
    pub subscription_timeout_expires_at: Option<DateTime<Utc>>,
    pub last_sync_at: Option<DateTime<Utc>>,
    /// Reconciliation claim; valid only while in the future.
    pub sync_timeout_expires_at: Option<DateTime<Utc>>,
    pub is_upcoming_checked: bool,
    pub created_at: DateTime<Utc>,
}

impl Channel {
    pub fn new(service: &str, id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            wrapped_id: Self::wrap_id(service, &id),
            id,
            subscription_expires_at: None,
            subscription_timeout_expires_at: None,
            last_sync_at: None,
            sync_timeout_expires_at: None,
            is_upcoming_checked: false,
            created_at: Utc::now(),
        }
    }

    /// Cross-service key: two-letter service tag plus the JSON-quoted native id.
    pub fn wrap_id(service: &str, id: &str) -> String {
        let tag: String = service.chars().take(2).collect();
        let quoted = serde_json::to_string(id).unwrap_or_else(|_| format!("\"{}\"", id));
        format!("{}:{}", tag, quoted)
    }
}
