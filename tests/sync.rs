mod common;

use std::sync::Arc;

use common::{temp_db, yt_video, FakeSource};
use tubetest_tracker::alerts::{AlertStore, AlertType, NewAlertInput};
use tubetest_tracker::analytics::AnalyticsStore;
use tubetest_tracker::sync::SyncService;
use tubetest_tracker::tracking::{TrackingPeriod, ViewTracker};
use tubetest_tracker::videos::VideoStore;
use tubetest_tracker::youtube::DailyAnalytics;

#[tokio::test]
async fn sync_imports_uploads_then_refreshes_counters() {
    let (_file, db) = temp_db().await;
    let videos = VideoStore::new(db.clone());
    let user = videos.ensure_user("u1", "Creator", Some("UC1")).await.unwrap();

    let source = Arc::new(FakeSource::default());
    source.set_uploads("UC1", &["a", "b"]);
    source.put_video(yt_video("a", 100, 5, 1));
    source.put_video(yt_video("b", 50, 2, 0));
    let sync = SyncService::new(db.clone(), source.clone());

    let report = sync.sync_user(&user).await.unwrap();
    assert_eq!(report.videos_imported, 2);
    assert_eq!(report.videos_updated, 0);
    let stored = videos.list_videos("u1").await.unwrap();
    assert_eq!(stored.len(), 2);

    source.put_video(yt_video("a", 180, 9, 2));
    source.remove_video("b");
    let report = sync.sync_user(&user).await.unwrap();
    assert_eq!(report.videos_imported, 0);
    assert_eq!(report.videos_updated, 1);
    assert_eq!(report.errors, 1);

    let a = videos.find_by_youtube_id("u1", "a").await.unwrap().unwrap();
    assert_eq!((a.view_count, a.like_count, a.comment_count), (180, 9, 2));
    let b = videos.find_by_youtube_id("u1", "b").await.unwrap().unwrap();
    assert_eq!(b.view_count, 50);
}

#[tokio::test]
async fn one_failing_user_does_not_stop_the_others() {
    let (_file, db) = temp_db().await;
    let videos = VideoStore::new(db.clone());
    videos.ensure_user("bad", "Bad", Some("UC-bad")).await.unwrap();
    videos.ensure_user("good", "Good", Some("UC-good")).await.unwrap();

    let source = Arc::new(FakeSource::default());
    source.fail_channel("UC-bad");
    source.set_uploads("UC-good", &["g1"]);
    source.put_video(yt_video("g1", 10, 0, 0));
    let sync = SyncService::new(db.clone(), source);

    let report = sync.sync_all().await.unwrap();
    assert_eq!(report.users, 2);
    assert_eq!(report.errors, 1);
    assert_eq!(report.videos_imported, 1);
    assert_eq!(videos.list_videos("good").await.unwrap().len(), 1);
}

#[tokio::test]
async fn cycle_records_snapshots_and_checks_alerts() {
    let (_file, db) = temp_db().await;
    let videos = VideoStore::new(db.clone());
    videos.ensure_user("u1", "Creator", Some("UC1")).await.unwrap();
    let source = Arc::new(FakeSource::default());
    source.set_uploads("UC1", &["a"]);
    source.put_video(yt_video("a", 500, 0, 0));

    AlertStore::new(db.clone())
        .create_alert(
            "u1",
            &NewAlertInput {
                video_id: None,
                alert_type: AlertType::Views,
                threshold: 0,
            },
        )
        .await
        .unwrap();

    let sync = SyncService::new(db.clone(), source);
    let report = sync.run_cycle(TrackingPeriod::Day).await.unwrap();
    assert_eq!(report.sync.videos_imported, 1);
    assert_eq!(report.snapshots_recorded, 1);
    assert_eq!(report.snapshot_errors, 0);
    assert_eq!(report.alerts_triggered.len(), 1);

    let video = videos.find_by_youtube_id("u1", "a").await.unwrap().unwrap();
    let snapshots = ViewTracker::new(db.clone())
        .list_snapshots(video.id, 5)
        .await
        .unwrap();
    assert_eq!(snapshots[0].view_count, 500);
}

#[tokio::test]
async fn local_service_skips_youtube_but_still_tracks() {
    let (_file, db) = temp_db().await;
    let videos = VideoStore::new(db.clone());
    let user = videos.ensure_user("u1", "Creator", None).await.unwrap();
    let sync = SyncService::local(db.clone());
    assert!(!sync.has_source());

    assert!(sync.sync_user(&user).await.is_err());
    let report = sync.run_cycle(TrackingPeriod::Day).await.unwrap();
    assert_eq!(report.sync.users, 0);
    assert_eq!(report.snapshots_recorded, 0);
}

#[tokio::test]
async fn analytics_rows_are_upserted_per_day() {
    let (_file, db) = temp_db().await;
    let videos = VideoStore::new(db.clone());
    let user = videos.ensure_user("u1", "Creator", Some("UC1")).await.unwrap();
    let source = Arc::new(FakeSource::default());
    source.set_uploads("UC1", &["a"]);
    source.put_video(yt_video("a", 10, 0, 0));
    let day = |views: i64| DailyAnalytics {
        day: "2024-03-01".to_string(),
        views,
        watch_minutes: views * 2,
        average_view_duration_seconds: 95,
        average_view_percentage: 41.5,
        subscribers_gained: 1,
    };
    source
        .analytics
        .lock()
        .unwrap()
        .insert("a".to_string(), vec![day(30)]);
    let sync = SyncService::new(db.clone(), source.clone());
    sync.sync_user(&user).await.unwrap();

    let report = sync.sync_analytics_user(&user, 7).await.unwrap();
    assert_eq!((report.videos, report.rows, report.errors), (1, 1, 0));

    source
        .analytics
        .lock()
        .unwrap()
        .insert("a".to_string(), vec![day(45)]);
    sync.sync_analytics_all(7).await.unwrap();

    let video = videos.find_by_youtube_id("u1", "a").await.unwrap().unwrap();
    let rows = AnalyticsStore::new(db.clone())
        .list_for_video(video.id, 10)
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].views, 45);
    assert_eq!(rows[0].watch_minutes, 90);
    assert!((rows[0].average_view_percentage - 41.5).abs() < f64::EPSILON);
}
