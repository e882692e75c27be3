use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::db::{now_ts, Database};
use crate::error::{Result, TrackerError};
use crate::tracking::{TrackingPeriod, ViewTracker};
use crate::videos::VideoStore;

pub mod evaluator;
pub(crate) mod schema;

pub use evaluator::{evaluate, AlertRule, AlertTrigger, AlertType};
use schema::{alert_history, view_alerts};

#[derive(Debug, Clone, Serialize)]
pub struct ViewAlert {
    pub id: i32,
    pub user_id: String,
    pub video_id: Option<i32>,
    pub alert_type: AlertType,
    pub threshold: i64,
    pub enabled: bool,
    pub trigger_count: i64,
    pub last_triggered_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl ViewAlert {
    pub fn rule(&self) -> AlertRule {
        AlertRule {
            alert_id: self.id,
            video_id: self.video_id,
            alert_type: self.alert_type,
            threshold: self.threshold,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AlertHistoryEntry {
    pub id: i32,
    pub alert_id: i32,
    pub user_id: String,
    pub video_id: i32,
    pub alert_type: String,
    pub period: String,
    pub threshold: i64,
    pub observed_value: i64,
    pub message: String,
    pub triggered_at: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewAlertInput {
    pub video_id: Option<i32>,
    pub alert_type: AlertType,
    pub threshold: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AlertUpdate {
    pub threshold: Option<i64>,
    pub enabled: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CheckReport {
    pub period: Option<TrackingPeriod>,
    pub alerts_checked: usize,
    pub triggered: Vec<AlertHistoryEntry>,
    pub errors: usize,
}

#[derive(Queryable)]
struct AlertRow {
    id: i32,
    user_id: String,
    video_id: Option<i32>,
    alert_type: String,
    threshold: i64,
    enabled: bool,
    trigger_count: i64,
    last_triggered_at: Option<i64>,
    created_at: i64,
    updated_at: i64,
}

#[derive(Insertable)]
#[diesel(table_name = view_alerts)]
struct NewAlert<'a> {
    user_id: &'a str,
    video_id: Option<i32>,
    alert_type: &'a str,
    threshold: i64,
    enabled: bool,
    trigger_count: i64,
    last_triggered_at: Option<i64>,
    created_at: i64,
    updated_at: i64,
}

#[derive(Queryable)]
struct HistoryRow {
    id: i32,
    alert_id: i32,
    user_id: String,
    video_id: i32,
    alert_type: String,
    period: String,
    threshold: i64,
    observed_value: i64,
    message: String,
    triggered_at: i64,
}

#[derive(Insertable)]
#[diesel(table_name = alert_history)]
struct NewHistory<'a> {
    alert_id: i32,
    user_id: &'a str,
    video_id: i32,
    alert_type: &'a str,
    period: &'a str,
    threshold: i64,
    observed_value: i64,
    message: &'a str,
    triggered_at: i64,
}

#[derive(Clone)]
pub struct AlertStore {
    db: Database,
    tracker: ViewTracker,
    videos: VideoStore,
}

impl AlertStore {
    pub fn new(db: Database) -> Self {
        Self {
            tracker: ViewTracker::new(db.clone()),
            videos: VideoStore::new(db.clone()),
            db,
        }
    }

    pub async fn create_alert(&self, user_id: &str, input: &NewAlertInput) -> Result<ViewAlert> {
        if input.threshold < 0 {
            return Err(TrackerError::Validation(
                "threshold must not be negative".to_string(),
            ));
        }
        if let Some(video_id) = input.video_id {
            if self.videos.get_video(user_id, video_id).await?.is_none() {
                return Err(TrackerError::NotFound(format!("video {video_id}")));
            }
        }
        let now = now_ts();
        let new = NewAlert {
            user_id,
            video_id: input.video_id,
            alert_type: input.alert_type.as_str(),
            threshold: input.threshold,
            enabled: true,
            trigger_count: 0,
            last_triggered_at: None,
            created_at: now,
            updated_at: now,
        };

        let mut conn = self.db.conn().await?;
        diesel::insert_into(view_alerts::table)
            .values(&new)
            .execute(&mut conn)
            .await
            .map_err(|e| TrackerError::Runtime(e.to_string()))?;

        let row: AlertRow = view_alerts::table
            .filter(view_alerts::user_id.eq(user_id))
            .order(view_alerts::id.desc())
            .first(&mut conn)
            .await
            .map_err(|e| TrackerError::Runtime(e.to_string()))?;
        map_alert(row)
    }

    pub async fn list_alerts(&self, user_id: &str) -> Result<Vec<ViewAlert>> {
        let mut conn = self.db.conn().await?;
        let rows: Vec<AlertRow> = view_alerts::table
            .filter(view_alerts::user_id.eq(user_id))
            .order(view_alerts::id.asc())
            .load(&mut conn)
            .await
            .map_err(|e| TrackerError::Runtime(e.to_string()))?;
        rows.into_iter().map(map_alert).collect()
    }

    pub async fn get_alert(&self, user_id: &str, id: i32) -> Result<Option<ViewAlert>> {
        let mut conn = self.db.conn().await?;
        let row: Option<AlertRow> = view_alerts::table
            .filter(view_alerts::user_id.eq(user_id))
            .filter(view_alerts::id.eq(id))
            .first(&mut conn)
            .await
            .optional()
            .map_err(|e| TrackerError::Runtime(e.to_string()))?;
        row.map(map_alert).transpose()
    }

    pub async fn update_alert(
        &self,
        user_id: &str,
        id: i32,
        update: &AlertUpdate,
    ) -> Result<ViewAlert> {
        let current = self
            .get_alert(user_id, id)
            .await?
            .ok_or_else(|| TrackerError::NotFound(format!("alert {id}")))?;
        let threshold = update.threshold.unwrap_or(current.threshold);
        if threshold < 0 {
            return Err(TrackerError::Validation(
                "threshold must not be negative".to_string(),
            ));
        }
        let enabled = update.enabled.unwrap_or(current.enabled);

        let mut conn = self.db.conn().await?;
        diesel::update(view_alerts::table.filter(view_alerts::id.eq(id)))
            .set((
                view_alerts::threshold.eq(threshold),
                view_alerts::enabled.eq(enabled),
                view_alerts::updated_at.eq(now_ts()),
            ))
            .execute(&mut conn)
            .await
            .map_err(|e| TrackerError::Runtime(e.to_string()))?;
        drop(conn);

        self.get_alert(user_id, id)
            .await?
            .ok_or_else(|| TrackerError::NotFound(format!("alert {id}")))
    }

    pub async fn delete_alert(&self, user_id: &str, id: i32) -> Result<bool> {
        let mut conn = self.db.conn().await?;
        let count = diesel::delete(
            view_alerts::table
                .filter(view_alerts::user_id.eq(user_id))
                .filter(view_alerts::id.eq(id)),
        )
        .execute(&mut conn)
        .await
        .map_err(|e| TrackerError::Runtime(e.to_string()))?;
        Ok(count > 0)
    }

    pub async fn list_history(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<AlertHistoryEntry>> {
        let mut conn = self.db.conn().await?;
        let rows: Vec<HistoryRow> = alert_history::table
            .filter(alert_history::user_id.eq(user_id))
            .order((alert_history::triggered_at.desc(), alert_history::id.desc()))
            .limit(limit as i64)
            .load(&mut conn)
            .await
            .map_err(|e| TrackerError::Runtime(e.to_string()))?;
        Ok(rows.into_iter().map(map_history).collect())
    }

    pub async fn check_alerts(&self, user_id: &str, period: TrackingPeriod) -> Result<CheckReport> {
        self.check_alerts_at(user_id, period, now_ts()).await
    }

    /// Evaluates every enabled alert of the user against the period's
    /// trends. Each trigger is written to history and bumps the alert's
    /// counter, so a condition that still holds fires again on the next
    /// check.
    pub async fn check_alerts_at(
        &self,
        user_id: &str,
        period: TrackingPeriod,
        now: i64,
    ) -> Result<CheckReport> {
        let alerts: Vec<ViewAlert> = self
            .list_alerts(user_id)
            .await?
            .into_iter()
            .filter(|a| a.enabled)
            .collect();
        let mut report = CheckReport {
            period: Some(period),
            alerts_checked: alerts.len(),
            ..Default::default()
        };
        if alerts.is_empty() {
            return Ok(report);
        }

        let trends = self.tracker.trends_at(user_id, period, now).await?;
        let rules: Vec<AlertRule> = alerts.iter().map(ViewAlert::rule).collect();
        for trigger in evaluate(&rules, &trends) {
            match self.record_trigger(user_id, period, &trigger, now).await {
                Ok(entry) => {
                    info!(
                        alert_id = entry.alert_id,
                        video_id = entry.video_id,
                        "{}",
                        entry.message
                    );
                    report.triggered.push(entry);
                }
                Err(err) => {
                    warn!(alert_id = trigger.alert_id, error = %err, "failed to record alert");
                    report.errors += 1;
                }
            }
        }
        Ok(report)
    }

    async fn record_trigger(
        &self,
        user_id: &str,
        period: TrackingPeriod,
        trigger: &AlertTrigger,
        now: i64,
    ) -> Result<AlertHistoryEntry> {
        let new = NewHistory {
            alert_id: trigger.alert_id,
            user_id,
            video_id: trigger.video_id,
            alert_type: trigger.alert_type.as_str(),
            period: period.as_str(),
            threshold: trigger.threshold,
            observed_value: trigger.observed_value,
            message: &trigger.message,
            triggered_at: now,
        };

        let mut conn = self.db.conn().await?;
        diesel::insert_into(alert_history::table)
            .values(&new)
            .execute(&mut conn)
            .await
            .map_err(|e| TrackerError::Runtime(e.to_string()))?;

        diesel::update(view_alerts::table.filter(view_alerts::id.eq(trigger.alert_id)))
            .set((
                view_alerts::trigger_count.eq(view_alerts::trigger_count + 1),
                view_alerts::last_triggered_at.eq(Some(now)),
            ))
            .execute(&mut conn)
            .await
            .map_err(|e| TrackerError::Runtime(e.to_string()))?;

        let row: HistoryRow = alert_history::table
            .filter(alert_history::alert_id.eq(trigger.alert_id))
            .order(alert_history::id.desc())
            .first(&mut conn)
            .await
            .map_err(|e| TrackerError::Runtime(e.to_string()))?;
        Ok(map_history(row))
    }
}

fn map_alert(row: AlertRow) -> Result<ViewAlert> {
    Ok(ViewAlert {
        id: row.id,
        user_id: row.user_id,
        video_id: row.video_id,
        alert_type: row.alert_type.parse()?,
        threshold: row.threshold,
        enabled: row.enabled,
        trigger_count: row.trigger_count,
        last_triggered_at: row.last_triggered_at,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

fn map_history(row: HistoryRow) -> AlertHistoryEntry {
    AlertHistoryEntry {
        id: row.id,
        alert_id: row.alert_id,
        user_id: row.user_id,
        video_id: row.video_id,
        alert_type: row.alert_type,
        period: row.period,
        threshold: row.threshold,
        observed_value: row.observed_value,
        message: row.message,
        triggered_at: row.triggered_at,
    }
}
