use httpmock::Method::GET;
use httpmock::MockServer;
use serde_json::json;

use tubetest_tracker::config::YouTubeConfig;
use tubetest_tracker::error::TrackerError;
use tubetest_tracker::interfaces::youtube::VideoSource;
use tubetest_tracker::youtube::YouTubeClient;

fn client_for(server: &MockServer, max_videos: Option<usize>) -> YouTubeClient {
    YouTubeClient::new(&YouTubeConfig {
        api_key: Some("key".to_string()),
        access_token: Some("tok".to_string()),
        data_base_url: Some(server.base_url()),
        analytics_base_url: Some(server.url("/v2")),
        max_videos,
    })
    .unwrap()
}

#[tokio::test]
async fn channel_uploads_are_listed_and_capped() {
    let server = MockServer::start_async().await;
    let channel_mock = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/channels")
                .query_param("id", "UC1")
                .query_param("key", "key");
            then.status(200).json_body(json!({
                "items": [{"contentDetails": {"relatedPlaylists": {"uploads": "UU1"}}}]
            }));
        })
        .await;
    let playlist_mock = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/playlistItems")
                .query_param("playlistId", "UU1");
            then.status(200).json_body(json!({
                "items": [
                    {"contentDetails": {"videoId": "v1"}},
                    {"contentDetails": {"videoId": "v2"}},
                    {"contentDetails": {"videoId": "v3"}}
                ],
                "nextPageToken": "p2"
            }));
        })
        .await;

    let client = client_for(&server, Some(2));
    let ids = client.channel_video_ids("UC1").await.unwrap();
    assert_eq!(ids, vec!["v1".to_string(), "v2".to_string()]);
    channel_mock.assert_hits(1);
    playlist_mock.assert_hits(1);
}

#[tokio::test]
async fn video_details_parse_snippet_and_statistics() {
    let server = MockServer::start_async().await;
    let videos_mock = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/videos")
                .query_param("id", "v1,v2")
                .query_param("part", "snippet,statistics")
                .header("authorization", "Bearer tok");
            then.status(200).json_body(json!({
                "items": [{
                    "id": "v1",
                    "snippet": {
                        "title": "First",
                        "description": "desc",
                        "publishedAt": "2024-01-02T03:04:05Z",
                        "thumbnails": {"medium": {"url": "m.jpg"}}
                    },
                    "statistics": {"viewCount": "42", "likeCount": "7", "commentCount": "3"}
                }]
            }));
        })
        .await;

    let client = client_for(&server, None);
    let videos = client
        .video_details(&["v1".to_string(), "v2".to_string()])
        .await
        .unwrap();
    videos_mock.assert();
    assert_eq!(videos.len(), 1);
    let first = &videos[0];
    assert_eq!(first.youtube_id, "v1");
    assert_eq!(first.title, "First");
    assert_eq!(first.thumbnail_url.as_deref(), Some("m.jpg"));
    assert_eq!((first.view_count, first.like_count, first.comment_count), (42, 7, 3));
}

#[tokio::test]
async fn analytics_report_is_requested_per_video() {
    let server = MockServer::start_async().await;
    let report_mock = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/v2/reports")
                .query_param("filters", "video==v1")
                .query_param("dimensions", "day")
                .query_param("startDate", "2024-05-01")
                .query_param("endDate", "2024-05-02");
            then.status(200).json_body(json!({
                "columnHeaders": [
                    {"name": "day"},
                    {"name": "views"},
                    {"name": "estimatedMinutesWatched"},
                    {"name": "averageViewDuration"},
                    {"name": "averageViewPercentage"},
                    {"name": "subscribersGained"}
                ],
                "rows": [
                    ["2024-05-01", 100, 250, 150, 40.0, 2],
                    ["2024-05-02", 80, 200, 140, 38.5, 0]
                ]
            }));
        })
        .await;

    let client = client_for(&server, None);
    let rows = client
        .video_analytics("v1", "2024-05-01", "2024-05-02")
        .await
        .unwrap();
    report_mock.assert();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1].day, "2024-05-02");
    assert_eq!(rows[1].watch_minutes, 200);
    assert_eq!(rows[0].subscribers_gained, 2);
}

#[tokio::test]
async fn api_errors_surface_the_google_message() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/channels");
            then.status(403).json_body(json!({
                "error": {"code": 403, "message": "quotaExceeded"}
            }));
        })
        .await;

    let client = client_for(&server, None);
    let err = client.channel_video_ids("UC1").await.unwrap_err();
    match err {
        TrackerError::Http(message) => {
            assert!(message.contains("403"));
            assert!(message.contains("quotaExceeded"));
        }
        other => panic!("unexpected error {other:?}"),
    }
}
