pub mod channel;
pub mod feed;

pub use channel::{Channel, YOUTUBE_SERVICE};
pub use feed::{Feed, FeedEntry, IsStream, LiveDetails, VideoSnippet};
