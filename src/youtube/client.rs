use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::config::YouTubeConfig;
use crate::error::{Result, TrackerError};
use crate::interfaces::youtube::VideoSource;
use crate::youtube::{DailyAnalytics, YouTubeVideo};

const DEFAULT_DATA_BASE_URL: &str = "https://www.googleapis.com/youtube/v3";
const DEFAULT_ANALYTICS_BASE_URL: &str = "https://youtubeanalytics.googleapis.com/v2";
const DEFAULT_MAX_VIDEOS: usize = 200;
const PAGE_SIZE: usize = 50;
const ANALYTICS_METRICS: &str =
    "views,estimatedMinutesWatched,averageViewDuration,averageViewPercentage,subscribersGained";

#[derive(Deserialize)]
struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelItem {
    content_details: ChannelContentDetails,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelContentDetails {
    related_playlists: RelatedPlaylists,
}

#[derive(Deserialize)]
struct RelatedPlaylists {
    uploads: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistItem {
    content_details: PlaylistItemDetails,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistItemDetails {
    video_id: String,
}

#[derive(Deserialize)]
struct VideoItem {
    id: String,
    snippet: Option<Snippet>,
    statistics: Option<Statistics>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snippet {
    title: String,
    description: Option<String>,
    published_at: Option<String>,
    thumbnails: Option<Value>,
}

// The Data API encodes counters as decimal strings.
#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct Statistics {
    view_count: Option<String>,
    like_count: Option<String>,
    comment_count: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalyticsReport {
    #[serde(default)]
    column_headers: Vec<ColumnHeader>,
    #[serde(default)]
    rows: Vec<Vec<Value>>,
}

#[derive(Deserialize)]
struct ColumnHeader {
    name: String,
}

pub struct YouTubeClient {
    http: reqwest::Client,
    data_base_url: String,
    analytics_base_url: String,
    api_key: Option<String>,
    access_token: Option<String>,
    max_videos: usize,
}

impl YouTubeClient {
    pub fn new(config: &YouTubeConfig) -> Result<Self> {
        let api_key = non_empty(config.api_key.as_deref());
        let access_token = non_empty(config.access_token.as_deref());
        if api_key.is_none() && access_token.is_none() {
            return Err(TrackerError::Config(
                "youtube.api_key or youtube.access_token is required".to_string(),
            ));
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| TrackerError::Http(e.to_string()))?;
        Ok(Self {
            http,
            data_base_url: base_url(config.data_base_url.as_deref(), DEFAULT_DATA_BASE_URL),
            analytics_base_url: base_url(
                config.analytics_base_url.as_deref(),
                DEFAULT_ANALYTICS_BASE_URL,
            ),
            api_key,
            access_token,
            max_videos: config.max_videos.unwrap_or(DEFAULT_MAX_VIDEOS).max(1),
        })
    }

    async fn get<T: DeserializeOwned>(&self, url: &str, query: &[(&str, String)]) -> Result<T> {
        let mut req = self.http.get(url).query(query);
        if let Some(key) = &self.api_key {
            req = req.query(&[("key", key.as_str())]);
        }
        if let Some(token) = &self.access_token {
            req = req.bearer_auth(token);
        }

        let response = req
            .send()
            .await
            .map_err(|e| TrackerError::Http(e.to_string()))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| TrackerError::Http(e.to_string()))?;
        if !status.is_success() {
            return Err(TrackerError::Http(format!(
                "GET {url} returned {}: {}",
                status.as_u16(),
                api_error_message(&text)
            )));
        }
        serde_json::from_str(&text).map_err(|e| TrackerError::Serialization(e.to_string()))
    }

    async fn uploads_playlist(&self, channel_id: &str) -> Result<String> {
        let url = format!("{}/channels", self.data_base_url);
        let response: ListResponse<ChannelItem> = self
            .get(
                &url,
                &[
                    ("part", "contentDetails".to_string()),
                    ("id", channel_id.to_string()),
                ],
            )
            .await?;
        response
            .items
            .into_iter()
            .next()
            .map(|item| item.content_details.related_playlists.uploads)
            .ok_or_else(|| TrackerError::NotFound(format!("channel {channel_id}")))
    }
}

#[async_trait]
impl VideoSource for YouTubeClient {
    async fn channel_video_ids(&self, channel_id: &str) -> Result<Vec<String>> {
        let playlist_id = self.uploads_playlist(channel_id).await?;
        let url = format!("{}/playlistItems", self.data_base_url);
        let mut ids = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut query = vec![
                ("part", "contentDetails".to_string()),
                ("playlistId", playlist_id.clone()),
                ("maxResults", PAGE_SIZE.to_string()),
            ];
            if let Some(token) = page_token.take() {
                query.push(("pageToken", token));
            }
            let page: ListResponse<PlaylistItem> = self.get(&url, &query).await?;
            ids.extend(page.items.into_iter().map(|i| i.content_details.video_id));
            if ids.len() >= self.max_videos {
                ids.truncate(self.max_videos);
                break;
            }
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }
        Ok(ids)
    }

    async fn video_details(&self, youtube_ids: &[String]) -> Result<Vec<YouTubeVideo>> {
        let url = format!("{}/videos", self.data_base_url);
        let mut out = Vec::with_capacity(youtube_ids.len());
        for chunk in youtube_ids.chunks(PAGE_SIZE) {
            let response: ListResponse<VideoItem> = self
                .get(
                    &url,
                    &[
                        ("part", "snippet,statistics".to_string()),
                        ("id", chunk.join(",")),
                    ],
                )
                .await?;
            out.extend(response.items.into_iter().map(map_video_item));
        }
        Ok(out)
    }

    async fn video_analytics(
        &self,
        youtube_id: &str,
        start_day: &str,
        end_day: &str,
    ) -> Result<Vec<DailyAnalytics>> {
        let url = format!("{}/reports", self.analytics_base_url);
        let report: AnalyticsReport = self
            .get(
                &url,
                &[
                    ("ids", "channel==MINE".to_string()),
                    ("startDate", start_day.to_string()),
                    ("endDate", end_day.to_string()),
                    ("metrics", ANALYTICS_METRICS.to_string()),
                    ("dimensions", "day".to_string()),
                    ("filters", format!("video=={youtube_id}")),
                    ("sort", "day".to_string()),
                ],
            )
            .await?;
        parse_report(&report)
    }
}

fn map_video_item(item: VideoItem) -> YouTubeVideo {
    let stats = item.statistics.unwrap_or_default();
    let (title, description, published_at, thumbnail_url) = match item.snippet {
        Some(snippet) => (
            snippet.title,
            snippet.description.filter(|d| !d.is_empty()),
            snippet.published_at.as_deref().and_then(parse_timestamp),
            snippet.thumbnails.as_ref().and_then(best_thumbnail),
        ),
        None => (item.id.clone(), None, None, None),
    };
    YouTubeVideo {
        youtube_id: item.id,
        title,
        description,
        thumbnail_url,
        published_at,
        view_count: parse_count(stats.view_count.as_deref()),
        like_count: parse_count(stats.like_count.as_deref()),
        comment_count: parse_count(stats.comment_count.as_deref()),
    }
}

fn parse_report(report: &AnalyticsReport) -> Result<Vec<DailyAnalytics>> {
    let column = |name: &str| -> Result<usize> {
        report
            .column_headers
            .iter()
            .position(|h| h.name == name)
            .ok_or_else(|| TrackerError::Serialization(format!("report is missing column {name}")))
    };
    if report.rows.is_empty() {
        return Ok(Vec::new());
    }
    let day = column("day")?;
    let views = column("views")?;
    let minutes = column("estimatedMinutesWatched")?;
    let duration = column("averageViewDuration")?;
    let percentage = column("averageViewPercentage")?;
    let subscribers = column("subscribersGained")?;

    report
        .rows
        .iter()
        .map(|row| {
            let day = row
                .get(day)
                .and_then(|v| v.as_str())
                .ok_or_else(|| TrackerError::Serialization("report row without day".to_string()))?;
            Ok(DailyAnalytics {
                day: day.to_string(),
                views: number(row.get(views)) as i64,
                watch_minutes: number(row.get(minutes)) as i64,
                average_view_duration_seconds: number(row.get(duration)) as i64,
                average_view_percentage: number(row.get(percentage)),
                subscribers_gained: number(row.get(subscribers)) as i64,
            })
        })
        .collect()
}

fn best_thumbnail(thumbnails: &Value) -> Option<String> {
    ["maxres", "high", "medium", "default"]
        .iter()
        .find_map(|size| thumbnails.get(size)?.get("url")?.as_str())
        .map(|url| url.to_string())
}

fn parse_count(value: Option<&str>) -> i64 {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(0)
}

fn parse_timestamp(value: &str) -> Option<i64> {
    OffsetDateTime::parse(value, &Rfc3339)
        .ok()
        .map(|ts| ts.unix_timestamp())
}

fn number(value: Option<&Value>) -> f64 {
    value.and_then(|v| v.as_f64()).unwrap_or(0.0)
}

fn api_error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(|m| m.to_string())
        })
        .unwrap_or_else(|| body.chars().take(200).collect())
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn base_url(value: Option<&str>, default: &str) -> String {
    non_empty(value)
        .unwrap_or_else(|| default.to_string())
        .trim_end_matches('/')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn video_item_parses_string_counters() {
        let item: VideoItem = serde_json::from_value(json!({
            "id": "abc",
            "snippet": {
                "title": "Hello",
                "description": "",
                "publishedAt": "2024-01-02T03:04:05Z",
                "thumbnails": {"default": {"url": "d"}, "high": {"url": "h"}}
            },
            "statistics": {"viewCount": "1200", "likeCount": "30"}
        }))
        .unwrap();
        let video = map_video_item(item);
        assert_eq!(video.title, "Hello");
        assert_eq!(video.description, None);
        assert_eq!(video.thumbnail_url.as_deref(), Some("h"));
        assert_eq!(video.published_at, Some(1_704_164_645));
        assert_eq!(video.view_count, 1_200);
        assert_eq!(video.like_count, 30);
        assert_eq!(video.comment_count, 0);
    }

    #[test]
    fn report_columns_are_matched_by_name() {
        let report: AnalyticsReport = serde_json::from_value(json!({
            "columnHeaders": [
                {"name": "day"},
                {"name": "subscribersGained"},
                {"name": "views"},
                {"name": "estimatedMinutesWatched"},
                {"name": "averageViewDuration"},
                {"name": "averageViewPercentage"}
            ],
            "rows": [["2024-05-01", 3, 120, 400, 200, 41.5]]
        }))
        .unwrap();
        let rows = parse_report(&report).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].day, "2024-05-01");
        assert_eq!(rows[0].views, 120);
        assert_eq!(rows[0].subscribers_gained, 3);
        assert_eq!(rows[0].average_view_percentage, 41.5);
    }

    #[test]
    fn client_requires_credentials() {
        assert!(YouTubeClient::new(&YouTubeConfig::default()).is_err());
        let config = YouTubeConfig {
            api_key: Some("k".to_string()),
            data_base_url: Some("http://localhost:1/".to_string()),
            ..Default::default()
        };
        let client = YouTubeClient::new(&config).unwrap();
        assert_eq!(client.data_base_url, "http://localhost:1");
    }
}
