mod common;

use diesel_async::RunQueryDsl;

use common::temp_db;
use tubetest_tracker::alerts::{AlertStore, AlertType, AlertUpdate, NewAlertInput};
use tubetest_tracker::db::Database;
use tubetest_tracker::error::TrackerError;
use tubetest_tracker::tracking::{Counters, TrackingPeriod, ViewTracker};
use tubetest_tracker::videos::{NewVideoInput, VideoStore};

const NOW: i64 = 1_700_000_000;
const DAY: i64 = 86_400;

fn views(views: i64) -> Counters {
    Counters {
        views,
        likes: 0,
        comments: 0,
    }
}

/// Adds a video with snapshots two days and one day back, then sets its
/// live counters.
async fn seeded_video(db: &Database, youtube_id: &str, older: i64, newer: i64, live: i64) -> i32 {
    let videos = VideoStore::new(db.clone());
    let tracker = ViewTracker::new(db.clone());
    videos.ensure_user("u1", "Creator", None).await.unwrap();
    let video = videos
        .create_video(
            "u1",
            &NewVideoInput {
                youtube_id: youtube_id.to_string(),
                title: format!("Video {youtube_id}"),
                description: None,
                thumbnail_url: None,
                published_at: None,
            },
        )
        .await
        .unwrap();
    tracker
        .insert_snapshot(video.id, "u1", NOW - 2 * DAY, views(older))
        .await
        .unwrap();
    tracker
        .insert_snapshot(video.id, "u1", NOW - DAY, views(newer))
        .await
        .unwrap();
    videos.update_counters(video.id, views(live)).await.unwrap();
    video.id
}

fn alert(video_id: Option<i32>, alert_type: AlertType, threshold: i64) -> NewAlertInput {
    NewAlertInput {
        video_id,
        alert_type,
        threshold,
    }
}

#[tokio::test]
async fn growth_decline_and_view_alerts_fire_on_thresholds() {
    let (_file, db) = temp_db().await;
    let growing = seeded_video(&db, "grow", 100, 150, 300).await;
    let declining = seeded_video(&db, "drop", 100, 200, 250).await;
    let store = AlertStore::new(db.clone());

    let growth = store
        .create_alert("u1", &alert(None, AlertType::Growth, 10_000))
        .await
        .unwrap();
    let decline = store
        .create_alert("u1", &alert(None, AlertType::Decline, 4_000))
        .await
        .unwrap();
    let views_on_growing = store
        .create_alert("u1", &alert(Some(growing), AlertType::Views, 100))
        .await
        .unwrap();
    store
        .create_alert("u1", &alert(Some(declining), AlertType::Views, 100))
        .await
        .unwrap();

    let report = store
        .check_alerts_at("u1", TrackingPeriod::Day, NOW)
        .await
        .unwrap();
    assert_eq!(report.alerts_checked, 4);
    assert_eq!(report.errors, 0);

    let mut fired: Vec<(i32, i32, i64)> = report
        .triggered
        .iter()
        .map(|e| (e.alert_id, e.video_id, e.observed_value))
        .collect();
    fired.sort();
    assert_eq!(
        fired,
        vec![
            (growth.id, growing, 20_000),
            (decline.id, declining, -5_000),
            (views_on_growing.id, growing, 150),
        ]
    );
    let decline_entry = report
        .triggered
        .iter()
        .find(|e| e.alert_id == decline.id)
        .unwrap();
    assert_eq!(decline_entry.period, "24h");
    assert!(decline_entry.message.contains("declined 50.00%"));
}

#[tokio::test]
async fn triggers_repeat_on_every_check_and_update_counters() {
    let (_file, db) = temp_db().await;
    seeded_video(&db, "grow", 100, 150, 300).await;
    let store = AlertStore::new(db.clone());
    let growth = store
        .create_alert("u1", &alert(None, AlertType::Growth, 5_000))
        .await
        .unwrap();

    for _ in 0..2 {
        let report = store
            .check_alerts_at("u1", TrackingPeriod::Day, NOW)
            .await
            .unwrap();
        assert_eq!(report.triggered.len(), 1);
    }

    let stored = store.get_alert("u1", growth.id).await.unwrap().unwrap();
    assert_eq!(stored.trigger_count, 2);
    assert_eq!(stored.last_triggered_at, Some(NOW));
    assert_eq!(store.list_history("u1", 10).await.unwrap().len(), 2);
}

#[tokio::test]
async fn disabled_alerts_and_latest_period_growth_do_not_fire() {
    let (_file, db) = temp_db().await;
    let growing = seeded_video(&db, "grow", 100, 150, 300).await;
    let store = AlertStore::new(db.clone());
    let growth = store
        .create_alert("u1", &alert(None, AlertType::Growth, 0))
        .await
        .unwrap();
    let views_alert = store
        .create_alert("u1", &alert(Some(growing), AlertType::Views, 100))
        .await
        .unwrap();

    let latest = store
        .check_alerts_at("u1", TrackingPeriod::Latest, NOW)
        .await
        .unwrap();
    assert_eq!(latest.triggered.len(), 1);
    assert_eq!(latest.triggered[0].alert_id, views_alert.id);
    assert_eq!(latest.triggered[0].observed_value, 150);

    store
        .update_alert(
            "u1",
            growth.id,
            &AlertUpdate {
                threshold: None,
                enabled: Some(false),
            },
        )
        .await
        .unwrap();
    store
        .update_alert(
            "u1",
            views_alert.id,
            &AlertUpdate {
                threshold: Some(1_000),
                enabled: None,
            },
        )
        .await
        .unwrap();
    let report = store
        .check_alerts_at("u1", TrackingPeriod::Day, NOW)
        .await
        .unwrap();
    assert_eq!(report.alerts_checked, 1);
    assert!(report.triggered.is_empty());
}

#[tokio::test]
async fn alert_crud_is_scoped_to_the_owner() {
    let (_file, db) = temp_db().await;
    let store = AlertStore::new(db.clone());
    let created = store
        .create_alert("u1", &alert(None, AlertType::Views, 10))
        .await
        .unwrap();
    assert!(created.enabled);
    assert_eq!(created.trigger_count, 0);

    assert!(store.get_alert("u2", created.id).await.unwrap().is_none());
    assert!(!store.delete_alert("u2", created.id).await.unwrap());
    assert!(store
        .create_alert("u1", &alert(None, AlertType::Views, -1))
        .await
        .is_err());

    assert!(store.delete_alert("u1", created.id).await.unwrap());
    assert!(store.list_alerts("u1").await.unwrap().is_empty());
}

#[tokio::test]
async fn alerts_only_target_the_owners_videos() {
    let (_file, db) = temp_db().await;
    let store = AlertStore::new(db.clone());
    let video_id = seeded_video(&db, "abc", 100, 150, 300).await;

    let err = store
        .create_alert("u2", &alert(Some(video_id), AlertType::Views, 10))
        .await
        .unwrap_err();
    assert!(matches!(err, TrackerError::NotFound(_)));
    let err = store
        .create_alert("u1", &alert(Some(video_id + 100), AlertType::Views, 10))
        .await
        .unwrap_err();
    assert!(matches!(err, TrackerError::NotFound(_)));

    let created = store
        .create_alert("u1", &alert(Some(video_id), AlertType::Views, 10))
        .await
        .unwrap();
    assert_eq!(created.video_id, Some(video_id));
    assert!(store.list_alerts("u2").await.unwrap().is_empty());
}

#[tokio::test]
async fn failed_history_writes_are_counted_not_raised() {
    let (_file, db) = temp_db().await;
    let alerts = AlertStore::new(db.clone());
    seeded_video(&db, "abc", 100, 150, 300).await;
    alerts
        .create_alert(
            "u1",
            &NewAlertInput {
                video_id: None,
                alert_type: AlertType::Views,
                threshold: 100,
            },
        )
        .await
        .unwrap();

    let mut conn = db.conn().await.unwrap();
    diesel::sql_query("DROP TABLE alert_history")
        .execute(&mut conn)
        .await
        .unwrap();
    drop(conn);

    let report = alerts
        .check_alerts_at("u1", TrackingPeriod::Day, NOW)
        .await
        .unwrap();
    assert_eq!(report.alerts_checked, 1);
    assert!(report.triggered.is_empty());
    assert_eq!(report.errors, 1);
    assert_eq!(alerts.list_alerts("u1").await.unwrap()[0].trigger_count, 0);
}
