use async_trait::async_trait;

use crate::error::Result;
use crate::youtube::{DailyAnalytics, YouTubeVideo};

/// Read side of YouTube used by sync.
#[async_trait]
pub trait VideoSource: Send + Sync {
    /// Upload ids of a channel, newest first.
    async fn channel_video_ids(&self, channel_id: &str) -> Result<Vec<String>>;

    /// Metadata and counters for the given video ids. Ids YouTube does not
    /// return (deleted, private) are absent from the result.
    async fn video_details(&self, youtube_ids: &[String]) -> Result<Vec<YouTubeVideo>>;

    /// Daily analytics rows between two `YYYY-MM-DD` days, inclusive.
    async fn video_analytics(
        &self,
        youtube_id: &str,
        start_day: &str,
        end_day: &str,
    ) -> Result<Vec<DailyAnalytics>>;
}
