mod common;

use diesel_async::RunQueryDsl;

use common::temp_db;
use tubetest_tracker::ab_tests::{
    AbTestStore, NewTestInput, NewVariantInput, TestStatus, TestType, VariantMetrics,
};
use tubetest_tracker::db::Database;
use tubetest_tracker::error::TrackerError;
use tubetest_tracker::events;
use tubetest_tracker::notifications::SignificanceMonitor;
use tubetest_tracker::videos::{NewVideoInput, VideoStore};

async fn video_for(db: &Database, user_id: &str) -> i32 {
    let videos = VideoStore::new(db.clone());
    videos.ensure_user(user_id, user_id, None).await.unwrap();
    videos
        .create_video(
            user_id,
            &NewVideoInput {
                youtube_id: format!("yt-{user_id}"),
                title: "Launch video".to_string(),
                description: None,
                thumbnail_url: None,
                published_at: None,
            },
        )
        .await
        .unwrap()
        .id
}

fn variant(label: &str, is_control: bool) -> NewVariantInput {
    NewVariantInput {
        label: label.to_string(),
        title: Some(format!("Title {label}")),
        thumbnail_url: None,
        is_control,
    }
}

fn metrics(impressions: i64, clicks: i64, views: i64, likes: i64, comments: i64) -> VariantMetrics {
    VariantMetrics {
        impressions,
        clicks,
        views,
        likes,
        comments,
    }
}

#[tokio::test]
async fn test_lifecycle_from_draft_to_completed() {
    let (_file, db) = temp_db().await;
    let video_id = video_for(&db, "u1").await;
    let store = AbTestStore::new(db.clone());

    let test = store
        .create_test(
            "u1",
            &NewTestInput {
                video_id,
                name: "Title test".to_string(),
                test_type: TestType::Title,
            },
        )
        .await
        .unwrap();
    assert_eq!(test.status, TestStatus::Draft);

    let a = store.add_variant("u1", test.id, &variant("A", true)).await.unwrap();
    let err = store.start_test("u1", test.id).await.unwrap_err();
    assert!(matches!(err, TrackerError::Validation(_)));

    let b = store.add_variant("u1", test.id, &variant("B", false)).await.unwrap();
    let started = store.start_test("u1", test.id).await.unwrap();
    assert_eq!(started.status, TestStatus::Active);
    assert!(started.started_at.is_some());
    assert!(store.start_test("u1", test.id).await.is_err());

    store
        .update_variant_metrics("u1", a.id, &metrics(10_000, 600, 0, 0, 0))
        .await
        .unwrap();
    store
        .update_variant_metrics("u1", b.id, &metrics(10_000, 400, 0, 0, 0))
        .await
        .unwrap();

    let evaluation = store.evaluate("u1", test.id).await.unwrap();
    let ctr = evaluation.ctr.unwrap();
    assert_eq!(ctr.leader_id, a.id);
    assert_eq!(ctr.runner_up_id, b.id);
    assert!(ctr.significant);

    let active = store
        .list_tests("u1", Some(TestStatus::Active))
        .await
        .unwrap();
    assert_eq!(active.len(), 1);

    let done = store.complete_test("u1", test.id, Some(a.id)).await.unwrap();
    assert_eq!(done.status, TestStatus::Completed);
    assert_eq!(done.winner_variant_id, Some(a.id));
    assert!(done.ended_at.is_some());
    assert!(store.complete_test("u1", test.id, None).await.is_err());

    let detail = store.get_test("u1", test.id).await.unwrap().unwrap();
    assert_eq!(detail.variants.len(), 2);
    assert!(store.delete_test("u1", test.id).await.unwrap());
    assert!(store.get_test("u1", test.id).await.unwrap().is_none());
    assert!(store.list_variants(test.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn metrics_are_validated_and_owner_scoped() {
    let (_file, db) = temp_db().await;
    let video_id = video_for(&db, "u1").await;
    let store = AbTestStore::new(db.clone());
    let test = store
        .create_test(
            "u1",
            &NewTestInput {
                video_id,
                name: "Thumb".to_string(),
                test_type: TestType::Thumbnail,
            },
        )
        .await
        .unwrap();
    let a = store.add_variant("u1", test.id, &variant("A", true)).await.unwrap();

    let err = store
        .update_variant_metrics("u1", a.id, &metrics(10, 20, 0, 0, 0))
        .await
        .unwrap_err();
    assert!(matches!(err, TrackerError::Validation(_)));
    let err = store
        .update_variant_metrics("u2", a.id, &metrics(10, 5, 0, 0, 0))
        .await
        .unwrap_err();
    assert!(matches!(err, TrackerError::NotFound(_)));

    let err = store
        .create_test(
            "u2",
            &NewTestInput {
                video_id,
                name: "Not mine".to_string(),
                test_type: TestType::Both,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, TrackerError::NotFound(_)));
}

#[tokio::test]
async fn significance_monitor_notifies_once_per_test() {
    let (_file, db) = temp_db().await;
    let video_id = video_for(&db, "u1").await;
    let store = AbTestStore::new(db.clone());
    let test = store
        .create_test(
            "u1",
            &NewTestInput {
                video_id,
                name: "Engagement".to_string(),
                test_type: TestType::Title,
            },
        )
        .await
        .unwrap();
    let a = store.add_variant("u1", test.id, &variant("A", true)).await.unwrap();
    let b = store.add_variant("u1", test.id, &variant("B", false)).await.unwrap();
    store
        .update_variant_metrics("u1", a.id, &metrics(0, 0, 2_000, 200, 40))
        .await
        .unwrap();
    store
        .update_variant_metrics("u1", b.id, &metrics(0, 0, 2_000, 100, 20))
        .await
        .unwrap();

    let tx = events::channel(16);
    let mut rx = tx.subscribe();
    let monitor = SignificanceMonitor::new(store.clone(), tx.clone());

    // Draft tests are not watched.
    let report = monitor.run_once().await.unwrap();
    assert_eq!(report.tests_checked, 0);

    store.start_test("u1", test.id).await.unwrap();
    let report = monitor.run_once().await.unwrap();
    assert_eq!(report.tests_checked, 1);
    assert_eq!(report.notified, 1);

    let event = rx.try_recv().unwrap();
    assert_eq!(event.event_type, "ab_test");
    assert_eq!(event.user_id, "u1");
    assert_eq!(event.status, "significant");
    assert_eq!(
        event.payload.get("leader_variant_id").and_then(|v| v.as_i64()),
        Some(i64::from(a.id))
    );

    let report = monitor.run_once().await.unwrap();
    assert_eq!(report.notified, 0);
    assert!(rx.try_recv().is_err());

    let stored = store.get_test("u1", test.id).await.unwrap().unwrap();
    assert!(stored.test.notified_at.is_some());
}

#[tokio::test]
async fn small_samples_do_not_notify() {
    let (_file, db) = temp_db().await;
    let video_id = video_for(&db, "u1").await;
    let store = AbTestStore::new(db.clone());
    let test = store
        .create_test(
            "u1",
            &NewTestInput {
                video_id,
                name: "Tiny".to_string(),
                test_type: TestType::Title,
            },
        )
        .await
        .unwrap();
    let a = store.add_variant("u1", test.id, &variant("A", true)).await.unwrap();
    let b = store.add_variant("u1", test.id, &variant("B", false)).await.unwrap();
    store
        .update_variant_metrics("u1", a.id, &metrics(0, 0, 400, 80, 0))
        .await
        .unwrap();
    store
        .update_variant_metrics("u1", b.id, &metrics(0, 0, 400, 20, 0))
        .await
        .unwrap();
    store.start_test("u1", test.id).await.unwrap();

    let monitor = SignificanceMonitor::new(store.clone(), events::channel(4));
    let report = monitor.run_once().await.unwrap();
    assert_eq!(report.tests_checked, 1);
    assert_eq!(report.notified, 0);
}

#[tokio::test]
async fn owner_is_not_notified_until_the_test_is_marked() {
    let (_file, db) = temp_db().await;
    let video_id = video_for(&db, "u1").await;
    let store = AbTestStore::new(db.clone());
    let test = store
        .create_test(
            "u1",
            &NewTestInput {
                video_id,
                name: "Engagement".to_string(),
                test_type: TestType::Title,
            },
        )
        .await
        .unwrap();
    let a = store.add_variant("u1", test.id, &variant("A", true)).await.unwrap();
    let b = store.add_variant("u1", test.id, &variant("B", false)).await.unwrap();
    store
        .update_variant_metrics("u1", a.id, &metrics(0, 0, 2_000, 200, 40))
        .await
        .unwrap();
    store
        .update_variant_metrics("u1", b.id, &metrics(0, 0, 2_000, 100, 20))
        .await
        .unwrap();
    store.start_test("u1", test.id).await.unwrap();

    let mut conn = db.conn().await.unwrap();
    diesel::sql_query(
        "CREATE TRIGGER freeze_notified BEFORE UPDATE OF notified_at ON ab_tests \
         BEGIN SELECT RAISE(ABORT, 'frozen'); END",
    )
    .execute(&mut conn)
    .await
    .unwrap();

    let tx = events::channel(16);
    let mut rx = tx.subscribe();
    let monitor = SignificanceMonitor::new(store.clone(), tx.clone());
    let report = monitor.run_once().await.unwrap();
    assert_eq!(report.tests_checked, 1);
    assert_eq!(report.notified, 0);
    assert_eq!(report.errors, 1);
    assert!(rx.try_recv().is_err());

    diesel::sql_query("DROP TRIGGER freeze_notified")
        .execute(&mut conn)
        .await
        .unwrap();
    drop(conn);

    let report = monitor.run_once().await.unwrap();
    assert_eq!(report.notified, 1);
    assert_eq!(rx.try_recv().unwrap().status, "significant");
    assert!(rx.try_recv().is_err());
}
