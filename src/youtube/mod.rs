use serde::{Deserialize, Serialize};

pub mod client;

pub use client::YouTubeClient;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct YouTubeVideo {
    pub youtube_id: String,
    pub title: String,
    pub description: Option<String>,
    pub thumbnail_url: Option<String>,
    pub published_at: Option<i64>,
    pub view_count: i64,
    pub like_count: i64,
    pub comment_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyAnalytics {
    pub day: String,
    pub views: i64,
    pub watch_minutes: i64,
    pub average_view_duration_seconds: i64,
    pub average_view_percentage: f64,
    pub subscribers_gained: i64,
}
