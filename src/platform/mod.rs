pub mod youtube;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::app::Result;
use crate::domain::{LiveDetails, VideoSnippet};

pub use youtube::YoutubeClient;

/// The two platform queries the reconciliation passes rely on.
#[async_trait]
pub trait PlatformClient {
    /// Current live broadcasts of a channel, or only its scheduled ones when
    /// `upcoming_only` is set. Keyed by video id.
    async fn get_video_snippets_by_channel(
        &self,
        channel_id: &str,
        upcoming_only: bool,
    ) -> Result<HashMap<String, VideoSnippet>>;

    /// Live details for those of `video_ids` that are broadcasting right now.
    /// Ids missing from the map are not streams.
    async fn get_live_details_by_video_ids(
        &self,
        video_ids: &[String],
    ) -> Result<HashMap<String, LiveDetails>>;
}
