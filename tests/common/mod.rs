#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tempfile::NamedTempFile;

use tubetest_tracker::db::Database;
use tubetest_tracker::error::{Result, TrackerError};
use tubetest_tracker::interfaces::providers::LlmProvider;
use tubetest_tracker::interfaces::youtube::VideoSource;
use tubetest_tracker::youtube::{DailyAnalytics, YouTubeVideo};

/// Fresh database in a temp file. Keep the file alive for the test.
pub async fn temp_db() -> (NamedTempFile, Database) {
    let file = NamedTempFile::new().unwrap();
    let db = Database::open(file.path().to_str().unwrap()).await.unwrap();
    (file, db)
}

pub fn yt_video(id: &str, views: i64, likes: i64, comments: i64) -> YouTubeVideo {
    YouTubeVideo {
        youtube_id: id.to_string(),
        title: format!("Video {id}"),
        description: Some(format!("About {id}")),
        thumbnail_url: None,
        published_at: Some(1_700_000_000),
        view_count: views,
        like_count: likes,
        comment_count: comments,
    }
}

/// In-memory YouTube: channel uploads plus per-video details.
#[derive(Default)]
pub struct FakeSource {
    pub uploads: Mutex<HashMap<String, Vec<String>>>,
    pub videos: Mutex<HashMap<String, YouTubeVideo>>,
    pub analytics: Mutex<HashMap<String, Vec<DailyAnalytics>>>,
    pub failing_channels: Mutex<Vec<String>>,
}

impl FakeSource {
    pub fn set_uploads(&self, channel_id: &str, ids: &[&str]) {
        self.uploads.lock().unwrap().insert(
            channel_id.to_string(),
            ids.iter().map(|id| id.to_string()).collect(),
        );
    }

    pub fn put_video(&self, video: YouTubeVideo) {
        self.videos
            .lock()
            .unwrap()
            .insert(video.youtube_id.clone(), video);
    }

    pub fn remove_video(&self, youtube_id: &str) {
        self.videos.lock().unwrap().remove(youtube_id);
    }

    pub fn fail_channel(&self, channel_id: &str) {
        self.failing_channels
            .lock()
            .unwrap()
            .push(channel_id.to_string());
    }
}

#[async_trait]
impl VideoSource for FakeSource {
    async fn channel_video_ids(&self, channel_id: &str) -> Result<Vec<String>> {
        if self
            .failing_channels
            .lock()
            .unwrap()
            .iter()
            .any(|c| c == channel_id)
        {
            return Err(TrackerError::Http(format!("channel {channel_id} failed")));
        }
        Ok(self
            .uploads
            .lock()
            .unwrap()
            .get(channel_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn video_details(&self, youtube_ids: &[String]) -> Result<Vec<YouTubeVideo>> {
        let videos = self.videos.lock().unwrap();
        Ok(youtube_ids
            .iter()
            .filter_map(|id| videos.get(id).cloned())
            .collect())
    }

    async fn video_analytics(
        &self,
        youtube_id: &str,
        _start_day: &str,
        _end_day: &str,
    ) -> Result<Vec<DailyAnalytics>> {
        Ok(self
            .analytics
            .lock()
            .unwrap()
            .get(youtube_id)
            .cloned()
            .unwrap_or_default())
    }
}

/// Records every prompt and answers with a fixed text.
pub struct RecordingLlm {
    pub reply: String,
    pub prompts: Mutex<Vec<(String, String)>>,
}

impl RecordingLlm {
    pub fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().unwrap().last().map(|(p, _)| p.clone())
    }
}

#[async_trait]
impl LlmProvider for RecordingLlm {
    async fn generate_text(&self, prompt: &str, system_prompt: &str) -> Result<String> {
        self.prompts
            .lock()
            .unwrap()
            .push((prompt.to_string(), system_prompt.to_string()));
        Ok(self.reply.clone())
    }
}
