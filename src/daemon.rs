use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{Json, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Router,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::ab_tests::{AbTestStore, NewTestInput, NewVariantInput, TestStatus, VariantMetrics};
use crate::alerts::{AlertStore, AlertUpdate, NewAlertInput};
use crate::analytics::AnalyticsStore;
use crate::config::{AlertsConfig, Config, ScheduleConfig};
use crate::config_store;
use crate::db::Database;
use crate::error::{Result, TrackerError};
use crate::events::{self, publish, AppEvent, EventSender};
use crate::interfaces::scheduler::ScheduledJob;
use crate::notifications::SignificanceMonitor;
use crate::providers::openai::OpenAiProvider;
use crate::scheduler::Scheduler;
use crate::scripts::{
    ContentType, NewCorrectionInput, NewProfileInput, NewScriptInput, ScriptFamily, ScriptStore,
};
use crate::studio::{GenerationRequest, ScriptStudio};
use crate::sync::SyncService;
use crate::tracking::{TrackingPeriod, ViewTracker};
use crate::videos::{NewVideoInput, VideoStore};
use crate::youtube::YouTubeClient;

const DEFAULT_LIMIT: usize = 10;
const ANALYTICS_DAYS: u32 = 28;

#[derive(Clone)]
pub struct AppState {
    pub videos: VideoStore,
    pub tracker: ViewTracker,
    pub alerts: AlertStore,
    pub ab_tests: AbTestStore,
    pub analytics: AnalyticsStore,
    pub scripts: ScriptStore,
    pub sync: Arc<SyncService>,
    pub studio: Option<Arc<ScriptStudio>>,
    pub token: String,
    pub events: EventSender,
}

impl AppState {
    pub fn new(
        db: Database,
        sync: Arc<SyncService>,
        studio: Option<Arc<ScriptStudio>>,
        token: &str,
        events: EventSender,
    ) -> Self {
        Self {
            videos: VideoStore::new(db.clone()),
            tracker: ViewTracker::new(db.clone()),
            alerts: AlertStore::new(db.clone()),
            ab_tests: AbTestStore::new(db.clone()),
            analytics: AnalyticsStore::new(db.clone()),
            scripts: ScriptStore::new(db),
            sync,
            studio,
            token: token.to_string(),
            events,
        }
    }
}

/// Sync, snapshot and alert check; every triggered alert is also pushed as
/// an event.
struct TrackingCycleJob {
    sync: Arc<SyncService>,
    period: TrackingPeriod,
    interval: Duration,
    events: EventSender,
}

#[async_trait::async_trait]
impl ScheduledJob for TrackingCycleJob {
    fn name(&self) -> &str {
        "tracking_cycle"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn run(&self) -> Result<()> {
        let report = self.sync.run_cycle(self.period).await?;
        info!(
            snapshots = report.snapshots_recorded,
            snapshot_errors = report.snapshot_errors,
            alerts = report.alerts_triggered.len(),
            alert_errors = report.alert_errors,
            "tracking cycle finished"
        );
        for entry in report.alerts_triggered {
            let payload = json!(entry);
            publish(
                &self.events,
                AppEvent::new("alert", &entry.user_id, "triggered", payload),
            );
        }
        Ok(())
    }
}

struct AnalyticsJob {
    sync: Arc<SyncService>,
    interval: Duration,
}

#[async_trait::async_trait]
impl ScheduledJob for AnalyticsJob {
    fn name(&self) -> &str {
        "analytics_sync"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn run(&self) -> Result<()> {
        let report = self.sync.sync_analytics_all(ANALYTICS_DAYS).await?;
        info!(
            videos = report.videos,
            rows = report.rows,
            errors = report.errors,
            "analytics sync finished"
        );
        Ok(())
    }
}

struct SignificanceJob {
    monitor: SignificanceMonitor,
    interval: Duration,
}

#[async_trait::async_trait]
impl ScheduledJob for SignificanceJob {
    fn name(&self) -> &str {
        "ab_significance"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn run(&self) -> Result<()> {
        let report = self.monitor.run_once().await?;
        if report.notified > 0 || report.errors > 0 {
            info!(
                checked = report.tests_checked,
                notified = report.notified,
                errors = report.errors,
                "significance check finished"
            );
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Deserialize)]
struct EventStreamQuery {
    user_id: Option<String>,
}

#[derive(Deserialize)]
struct RegisterUserRequest {
    display_name: Option<String>,
    channel_id: Option<String>,
}

#[derive(Deserialize)]
struct PeriodQuery {
    period: Option<String>,
    limit: Option<usize>,
}

#[derive(Deserialize)]
struct LimitQuery {
    limit: Option<usize>,
}

#[derive(Deserialize)]
struct TestListQuery {
    status: Option<String>,
}

#[derive(Deserialize, Default)]
struct CompleteTestRequest {
    winner_variant_id: Option<i32>,
}

#[derive(Deserialize)]
struct ScriptListQuery {
    family: Option<String>,
    content_type: Option<String>,
}

#[derive(Deserialize)]
struct CorrectionListQuery {
    content_type: Option<String>,
    limit: Option<usize>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/events", get(event_stream))
        .route("/api/users", post(register_user))
        .route("/api/videos", get(list_videos).post(create_video))
        .route("/api/videos/:id", get(get_video).delete(delete_video))
        .route("/api/videos/:id/analytics", get(video_analytics))
        .route("/api/ab-tests", get(list_tests).post(create_test))
        .route("/api/ab-tests/:id", get(get_test).delete(delete_test))
        .route("/api/ab-tests/:id/variants", post(add_variant))
        .route("/api/ab-tests/variants/:id/metrics", put(update_variant_metrics))
        .route("/api/ab-tests/:id/start", post(start_test))
        .route("/api/ab-tests/:id/complete", post(complete_test))
        .route("/api/ab-tests/:id/evaluation", get(evaluate_test))
        .route("/api/sync", post(sync_now))
        .route("/api/view-tracking/snapshots", post(record_snapshots))
        .route("/api/view-tracking/trends", get(trends))
        .route("/api/view-tracking/rankings", get(rankings))
        .route("/api/alerts", get(list_alerts).post(create_alert))
        .route("/api/alerts/check", post(check_alerts))
        .route("/api/alerts/history", get(alert_history))
        .route("/api/alerts/:id", put(update_alert).delete(delete_alert))
        .route("/api/script-studio/scripts", get(list_scripts).post(save_script))
        .route("/api/script-studio/scripts/:id/activate", post(activate_script))
        .route(
            "/api/script-studio/profiles",
            get(list_profiles).post(create_profile),
        )
        .route("/api/script-studio/profiles/:id", delete(delete_profile))
        .route(
            "/api/script-studio/corrections",
            get(list_corrections).post(add_correction),
        )
        .route("/api/script-studio/history", get(script_history))
        .route("/api/script-studio/generate", post(generate))
        .with_state(state)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

async fn event_stream(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<EventStreamQuery>,
) -> Response {
    if let Err(err) = authorize(&headers, &state.token) {
        return err.into_response();
    }

    let mut receiver = state.events.subscribe();
    let filter_user = query.user_id;

    let body = Body::from_stream(async_stream::stream! {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    if let Some(filter) = &filter_user {
                        if event.user_id != *filter {
                            continue;
                        }
                    }
                    let payload = serde_json::to_string(&event).unwrap_or_default();
                    let line = format!("data: {}\n\n", payload);
                    yield Ok::<Bytes, std::convert::Infallible>(Bytes::from(line));
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {
                    continue;
                }
                Err(_) => break,
            }
        }
    });

    (
        StatusCode::OK,
        [
            ("content-type", "text/event-stream"),
            ("cache-control", "no-cache"),
        ],
        body,
    )
        .into_response()
}

async fn register_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<RegisterUserRequest>,
) -> Response {
    let user_id = match acting_user(&headers, &state.token) {
        Ok(user_id) => user_id,
        Err(resp) => return resp,
    };
    let display_name = payload.display_name.unwrap_or_else(|| user_id.clone());
    respond(
        StatusCode::OK,
        state
            .videos
            .ensure_user(&user_id, &display_name, payload.channel_id.as_deref())
            .await,
    )
}

async fn list_videos(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let user_id = match acting_user(&headers, &state.token) {
        Ok(user_id) => user_id,
        Err(resp) => return resp,
    };
    respond(StatusCode::OK, state.videos.list_videos(&user_id).await)
}

async fn create_video(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<NewVideoInput>,
) -> Response {
    let user_id = match acting_user(&headers, &state.token) {
        Ok(user_id) => user_id,
        Err(resp) => return resp,
    };
    if let Err(err) = state.videos.ensure_user(&user_id, &user_id, None).await {
        return error_response(err);
    }
    respond(
        StatusCode::CREATED,
        state.videos.create_video(&user_id, &payload).await,
    )
}

async fn get_video(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i32>,
) -> Response {
    let user_id = match acting_user(&headers, &state.token) {
        Ok(user_id) => user_id,
        Err(resp) => return resp,
    };
    let result = state
        .videos
        .get_video(&user_id, id)
        .await
        .and_then(|video| video.ok_or_else(|| TrackerError::NotFound(format!("video {id}"))));
    respond(StatusCode::OK, result)
}

async fn video_analytics(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i32>,
    Query(query): Query<LimitQuery>,
) -> Response {
    let user_id = match acting_user(&headers, &state.token) {
        Ok(user_id) => user_id,
        Err(resp) => return resp,
    };
    let video = match state.videos.get_video(&user_id, id).await {
        Ok(Some(video)) => video,
        Ok(None) => return error_response(TrackerError::NotFound(format!("video {id}"))),
        Err(err) => return error_response(err),
    };
    let limit = query.limit.unwrap_or(ANALYTICS_DAYS as usize);
    respond(
        StatusCode::OK,
        state.analytics.list_for_video(video.id, limit).await,
    )
}

async fn delete_video(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i32>,
) -> Response {
    let user_id = match acting_user(&headers, &state.token) {
        Ok(user_id) => user_id,
        Err(resp) => return resp,
    };
    deleted(state.videos.delete_video(&user_id, id).await, "video", id)
}

async fn list_tests(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<TestListQuery>,
) -> Response {
    let user_id = match acting_user(&headers, &state.token) {
        Ok(user_id) => user_id,
        Err(resp) => return resp,
    };
    let status = match query.status.as_deref().map(str::parse::<TestStatus>).transpose() {
        Ok(status) => status,
        Err(err) => return error_response(err),
    };
    respond(StatusCode::OK, state.ab_tests.list_tests(&user_id, status).await)
}

async fn create_test(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<NewTestInput>,
) -> Response {
    let user_id = match acting_user(&headers, &state.token) {
        Ok(user_id) => user_id,
        Err(resp) => return resp,
    };
    respond(
        StatusCode::CREATED,
        state.ab_tests.create_test(&user_id, &payload).await,
    )
}

async fn get_test(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i32>,
) -> Response {
    let user_id = match acting_user(&headers, &state.token) {
        Ok(user_id) => user_id,
        Err(resp) => return resp,
    };
    let result = state
        .ab_tests
        .get_test(&user_id, id)
        .await
        .and_then(|test| test.ok_or_else(|| TrackerError::NotFound(format!("test {id}"))));
    respond(StatusCode::OK, result)
}

async fn delete_test(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i32>,
) -> Response {
    let user_id = match acting_user(&headers, &state.token) {
        Ok(user_id) => user_id,
        Err(resp) => return resp,
    };
    deleted(state.ab_tests.delete_test(&user_id, id).await, "test", id)
}

async fn add_variant(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i32>,
    Json(payload): Json<NewVariantInput>,
) -> Response {
    let user_id = match acting_user(&headers, &state.token) {
        Ok(user_id) => user_id,
        Err(resp) => return resp,
    };
    respond(
        StatusCode::CREATED,
        state.ab_tests.add_variant(&user_id, id, &payload).await,
    )
}

async fn update_variant_metrics(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i32>,
    Json(payload): Json<VariantMetrics>,
) -> Response {
    let user_id = match acting_user(&headers, &state.token) {
        Ok(user_id) => user_id,
        Err(resp) => return resp,
    };
    respond(
        StatusCode::OK,
        state
            .ab_tests
            .update_variant_metrics(&user_id, id, &payload)
            .await,
    )
}

async fn start_test(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i32>,
) -> Response {
    let user_id = match acting_user(&headers, &state.token) {
        Ok(user_id) => user_id,
        Err(resp) => return resp,
    };
    respond(StatusCode::OK, state.ab_tests.start_test(&user_id, id).await)
}

async fn complete_test(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i32>,
    payload: Option<Json<CompleteTestRequest>>,
) -> Response {
    let user_id = match acting_user(&headers, &state.token) {
        Ok(user_id) => user_id,
        Err(resp) => return resp,
    };
    let Json(payload) = payload.unwrap_or_default();
    respond(
        StatusCode::OK,
        state
            .ab_tests
            .complete_test(&user_id, id, payload.winner_variant_id)
            .await,
    )
}

async fn evaluate_test(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i32>,
) -> Response {
    let user_id = match acting_user(&headers, &state.token) {
        Ok(user_id) => user_id,
        Err(resp) => return resp,
    };
    respond(StatusCode::OK, state.ab_tests.evaluate(&user_id, id).await)
}

async fn sync_now(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let user_id = match acting_user(&headers, &state.token) {
        Ok(user_id) => user_id,
        Err(resp) => return resp,
    };
    let user = match state.videos.get_user(&user_id).await {
        Ok(Some(user)) => user,
        Ok(None) => return error_response(TrackerError::NotFound(format!("user {user_id}"))),
        Err(err) => return error_response(err),
    };
    respond(StatusCode::OK, state.sync.sync_user(&user).await)
}

async fn record_snapshots(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let user_id = match acting_user(&headers, &state.token) {
        Ok(user_id) => user_id,
        Err(resp) => return resp,
    };
    respond(StatusCode::OK, state.tracker.record_snapshots(&user_id).await)
}

async fn trends(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<PeriodQuery>,
) -> Response {
    let user_id = match acting_user(&headers, &state.token) {
        Ok(user_id) => user_id,
        Err(resp) => return resp,
    };
    let period = match parse_period(query.period.as_deref()) {
        Ok(period) => period,
        Err(err) => return error_response(err),
    };
    let limit = query.limit.unwrap_or(usize::MAX);
    let result = state
        .tracker
        .trends(&user_id, period)
        .await
        .map(|trends| trends.into_iter().take(limit).collect::<Vec<_>>());
    respond(StatusCode::OK, result)
}

async fn rankings(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<PeriodQuery>,
) -> Response {
    let user_id = match acting_user(&headers, &state.token) {
        Ok(user_id) => user_id,
        Err(resp) => return resp,
    };
    let period = match parse_period(query.period.as_deref()) {
        Ok(period) => period,
        Err(err) => return error_response(err),
    };
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT);
    respond(
        StatusCode::OK,
        state.tracker.rankings(&user_id, period, limit).await,
    )
}

async fn list_alerts(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let user_id = match acting_user(&headers, &state.token) {
        Ok(user_id) => user_id,
        Err(resp) => return resp,
    };
    respond(StatusCode::OK, state.alerts.list_alerts(&user_id).await)
}

async fn create_alert(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<NewAlertInput>,
) -> Response {
    let user_id = match acting_user(&headers, &state.token) {
        Ok(user_id) => user_id,
        Err(resp) => return resp,
    };
    respond(
        StatusCode::CREATED,
        state.alerts.create_alert(&user_id, &payload).await,
    )
}

async fn update_alert(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i32>,
    Json(payload): Json<AlertUpdate>,
) -> Response {
    let user_id = match acting_user(&headers, &state.token) {
        Ok(user_id) => user_id,
        Err(resp) => return resp,
    };
    respond(
        StatusCode::OK,
        state.alerts.update_alert(&user_id, id, &payload).await,
    )
}

async fn delete_alert(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i32>,
) -> Response {
    let user_id = match acting_user(&headers, &state.token) {
        Ok(user_id) => user_id,
        Err(resp) => return resp,
    };
    deleted(state.alerts.delete_alert(&user_id, id).await, "alert", id)
}

async fn check_alerts(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<PeriodQuery>,
) -> Response {
    let user_id = match acting_user(&headers, &state.token) {
        Ok(user_id) => user_id,
        Err(resp) => return resp,
    };
    let period = match parse_period(query.period.as_deref()) {
        Ok(period) => period,
        Err(err) => return error_response(err),
    };
    respond(
        StatusCode::OK,
        state.alerts.check_alerts(&user_id, period).await,
    )
}

async fn alert_history(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<LimitQuery>,
) -> Response {
    let user_id = match acting_user(&headers, &state.token) {
        Ok(user_id) => user_id,
        Err(resp) => return resp,
    };
    let limit = query.limit.unwrap_or(50);
    respond(
        StatusCode::OK,
        state.alerts.list_history(&user_id, limit).await,
    )
}

async fn list_scripts(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ScriptListQuery>,
) -> Response {
    let user_id = match acting_user(&headers, &state.token) {
        Ok(user_id) => user_id,
        Err(resp) => return resp,
    };
    let family = match query.family.as_deref().unwrap_or("coordination").parse::<ScriptFamily>() {
        Ok(family) => family,
        Err(err) => return error_response(err),
    };
    let content_type = match query
        .content_type
        .as_deref()
        .unwrap_or("script")
        .parse::<ContentType>()
    {
        Ok(content_type) => content_type,
        Err(err) => return error_response(err),
    };
    respond(
        StatusCode::OK,
        state
            .scripts
            .list_versions(&user_id, family, content_type)
            .await,
    )
}

async fn save_script(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<NewScriptInput>,
) -> Response {
    let user_id = match acting_user(&headers, &state.token) {
        Ok(user_id) => user_id,
        Err(resp) => return resp,
    };
    respond(
        StatusCode::CREATED,
        state.scripts.save_script(&user_id, &payload).await,
    )
}

async fn activate_script(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i32>,
) -> Response {
    let user_id = match acting_user(&headers, &state.token) {
        Ok(user_id) => user_id,
        Err(resp) => return resp,
    };
    respond(StatusCode::OK, state.scripts.activate(&user_id, id).await)
}

async fn list_profiles(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let user_id = match acting_user(&headers, &state.token) {
        Ok(user_id) => user_id,
        Err(resp) => return resp,
    };
    respond(StatusCode::OK, state.scripts.list_profiles(&user_id).await)
}

async fn create_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<NewProfileInput>,
) -> Response {
    let user_id = match acting_user(&headers, &state.token) {
        Ok(user_id) => user_id,
        Err(resp) => return resp,
    };
    respond(
        StatusCode::CREATED,
        state.scripts.create_profile(&user_id, &payload).await,
    )
}

async fn delete_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i32>,
) -> Response {
    let user_id = match acting_user(&headers, &state.token) {
        Ok(user_id) => user_id,
        Err(resp) => return resp,
    };
    deleted(state.scripts.delete_profile(&user_id, id).await, "profile", id)
}

async fn list_corrections(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<CorrectionListQuery>,
) -> Response {
    let user_id = match acting_user(&headers, &state.token) {
        Ok(user_id) => user_id,
        Err(resp) => return resp,
    };
    let content_type = match query
        .content_type
        .as_deref()
        .map(str::parse::<ContentType>)
        .transpose()
    {
        Ok(content_type) => content_type,
        Err(err) => return error_response(err),
    };
    let limit = query.limit.unwrap_or(50);
    respond(
        StatusCode::OK,
        state
            .scripts
            .list_corrections(&user_id, content_type, limit)
            .await,
    )
}

async fn add_correction(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<NewCorrectionInput>,
) -> Response {
    let user_id = match acting_user(&headers, &state.token) {
        Ok(user_id) => user_id,
        Err(resp) => return resp,
    };
    respond(
        StatusCode::CREATED,
        state.scripts.add_correction(&user_id, &payload).await,
    )
}

async fn script_history(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<LimitQuery>,
) -> Response {
    let user_id = match acting_user(&headers, &state.token) {
        Ok(user_id) => user_id,
        Err(resp) => return resp,
    };
    let limit = query.limit.unwrap_or(50);
    respond(
        StatusCode::OK,
        state.scripts.list_history(&user_id, limit).await,
    )
}

async fn generate(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<GenerationRequest>,
) -> Response {
    let user_id = match acting_user(&headers, &state.token) {
        Ok(user_id) => user_id,
        Err(resp) => return resp,
    };
    let Some(studio) = state.studio.clone() else {
        return error_response(TrackerError::Config(
            "no language model is configured".to_string(),
        ));
    };
    respond(StatusCode::OK, studio.generate(&user_id, &payload).await)
}

fn parse_period(value: Option<&str>) -> Result<TrackingPeriod> {
    value.map(str::parse).unwrap_or(Ok(TrackingPeriod::Day))
}

fn respond<T: Serialize>(status: StatusCode, result: Result<T>) -> Response {
    match result {
        Ok(value) => (status, Json(value)).into_response(),
        Err(err) => error_response(err),
    }
}

fn deleted(result: Result<bool>, kind: &str, id: i32) -> Response {
    match result {
        Ok(true) => (StatusCode::OK, Json(json!({"deleted": true}))).into_response(),
        Ok(false) => error_response(TrackerError::NotFound(format!("{kind} {id}"))),
        Err(err) => error_response(err),
    }
}

fn error_response(err: TrackerError) -> Response {
    let status = match &err {
        TrackerError::NotFound(_) => StatusCode::NOT_FOUND,
        TrackerError::Validation(_) => StatusCode::BAD_REQUEST,
        TrackerError::Config(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        warn!(error = %err, "request failed");
    }
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
        .into_response()
}

/// Authorizes the request and returns the `x-user-id` it acts for.
fn acting_user(headers: &HeaderMap, token: &str) -> std::result::Result<String, Response> {
    authorize(headers, token).map_err(IntoResponse::into_response)?;
    headers
        .get("x-user-id")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: "missing x-user-id header".to_string(),
                }),
            )
                .into_response()
        })
}

fn authorize(
    headers: &HeaderMap,
    token: &str,
) -> std::result::Result<(), (StatusCode, Json<ErrorResponse>)> {
    let header = headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    let api_key = headers
        .get("x-api-key")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    let bearer = header.strip_prefix("Bearer ").unwrap_or("");

    if bearer == token || api_key == token {
        Ok(())
    } else {
        Err((
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse {
                error: "Unauthorized".to_string(),
            }),
        ))
    }
}

pub async fn run(host: &str, port: u16, db_path: &str, token: &str) -> Result<()> {
    run_with_shutdown(host, port, db_path, token, futures::future::pending::<()>()).await
}

fn default_config() -> Config {
    Config {
        openai: None,
        youtube: None,
        schedule: Some(ScheduleConfig {
            sync_minutes: Some(60),
            analytics_hours: Some(24),
            ab_monitor_minutes: Some(30),
        }),
        alerts: Some(AlertsConfig {
            period: Some(TrackingPeriod::Day.to_string()),
        }),
    }
}

/// Builds the shared state from stored config: a YouTube source and an LLM
/// are attached only when their credentials are present.
pub fn build_state(db: Database, config: &Config, token: &str, events: EventSender) -> AppState {
    let sync = match config.youtube.as_ref().map(YouTubeClient::new) {
        Some(Ok(client)) => SyncService::new(db.clone(), Arc::new(client)),
        Some(Err(err)) => {
            warn!(error = %err, "YouTube client disabled");
            SyncService::local(db.clone())
        }
        None => SyncService::local(db.clone()),
    };
    let studio = config
        .openai
        .as_ref()
        .and_then(OpenAiProvider::from_config)
        .map(|provider| Arc::new(ScriptStudio::new(db.clone(), Arc::new(provider))));
    if studio.is_none() {
        info!("no OpenAI key configured, script generation disabled");
    }
    AppState::new(db, Arc::new(sync), studio, token, events)
}

pub async fn run_with_shutdown<F>(
    host: &str,
    port: u16,
    db_path: &str,
    token: &str,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if Config::from_store(db_path).is_err() {
        config_store::save_config(db_path, &default_config())?;
    }
    let config = Config::from_store(db_path)?;

    let db = Database::open(db_path).await?;
    let events = events::channel(256);
    let state = build_state(db, &config, token, events.clone());

    let mut scheduler = Scheduler::new();
    scheduler.register_job(Arc::new(TrackingCycleJob {
        sync: state.sync.clone(),
        period: config.alert_period(),
        interval: Duration::from_secs(config.sync_interval_minutes() * 60),
        events: events.clone(),
    }));
    if state.sync.has_source() {
        scheduler.register_job(Arc::new(AnalyticsJob {
            sync: state.sync.clone(),
            interval: Duration::from_secs(config.analytics_interval_hours() * 3600),
        }));
    }
    scheduler.register_job(Arc::new(SignificanceJob {
        monitor: SignificanceMonitor::new(state.ab_tests.clone(), events),
        interval: Duration::from_secs(config.ab_monitor_interval_minutes() * 60),
    }));
    scheduler.start();

    let app = build_router(state);

    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| TrackerError::Runtime(e.to_string()))?;
    info!(%addr, "tubetestd listening");
    let shutdown = async move {
        shutdown.await;
        scheduler.stop().await;
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| TrackerError::Runtime(e.to_string()))?;

    Ok(())
}
