use diesel::prelude::*;
use diesel::upsert::excluded;
use diesel_async::RunQueryDsl;
use serde::Serialize;
use time::macros::format_description;
use time::{Duration, OffsetDateTime};

use crate::db::{now_ts, Database};
use crate::error::{Result, TrackerError};
use crate::youtube::DailyAnalytics;

pub(crate) mod schema;
use schema::video_analytics;

#[derive(Debug, Clone, Serialize)]
pub struct VideoAnalyticsRow {
    pub id: i32,
    pub video_id: i32,
    pub user_id: String,
    pub day: String,
    pub views: i64,
    pub watch_minutes: i64,
    pub average_view_duration_seconds: i64,
    pub average_view_percentage: f64,
    pub subscribers_gained: i64,
    pub created_at: i64,
}

#[derive(Queryable)]
struct AnalyticsRow {
    id: i32,
    video_id: i32,
    user_id: String,
    day: String,
    views: i64,
    watch_minutes: i64,
    average_view_duration_seconds: i64,
    average_view_percentage: f64,
    subscribers_gained: i64,
    created_at: i64,
}

#[derive(Insertable)]
#[diesel(table_name = video_analytics)]
struct NewAnalytics<'a> {
    video_id: i32,
    user_id: &'a str,
    day: &'a str,
    views: i64,
    watch_minutes: i64,
    average_view_duration_seconds: i64,
    average_view_percentage: f64,
    subscribers_gained: i64,
    created_at: i64,
}

#[derive(Clone)]
pub struct AnalyticsStore {
    db: Database,
}

impl AnalyticsStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Inserts or replaces the row for `(video_id, day)`.
    pub async fn upsert_daily(
        &self,
        video_id: i32,
        user_id: &str,
        row: &DailyAnalytics,
    ) -> Result<()> {
        let new = NewAnalytics {
            video_id,
            user_id,
            day: &row.day,
            views: row.views,
            watch_minutes: row.watch_minutes,
            average_view_duration_seconds: row.average_view_duration_seconds,
            average_view_percentage: row.average_view_percentage,
            subscribers_gained: row.subscribers_gained,
            created_at: now_ts(),
        };

        let mut conn = self.db.conn().await?;
        diesel::insert_into(video_analytics::table)
            .values(&new)
            .on_conflict((video_analytics::video_id, video_analytics::day))
            .do_update()
            .set((
                video_analytics::views.eq(excluded(video_analytics::views)),
                video_analytics::watch_minutes.eq(excluded(video_analytics::watch_minutes)),
                video_analytics::average_view_duration_seconds
                    .eq(excluded(video_analytics::average_view_duration_seconds)),
                video_analytics::average_view_percentage
                    .eq(excluded(video_analytics::average_view_percentage)),
                video_analytics::subscribers_gained
                    .eq(excluded(video_analytics::subscribers_gained)),
            ))
            .execute(&mut conn)
            .await
            .map_err(|e| TrackerError::Runtime(e.to_string()))?;
        Ok(())
    }

    pub async fn list_for_video(
        &self,
        video_id: i32,
        limit: usize,
    ) -> Result<Vec<VideoAnalyticsRow>> {
        let mut conn = self.db.conn().await?;
        let rows: Vec<AnalyticsRow> = video_analytics::table
            .filter(video_analytics::video_id.eq(video_id))
            .order(video_analytics::day.desc())
            .limit(limit as i64)
            .load(&mut conn)
            .await
            .map_err(|e| TrackerError::Runtime(e.to_string()))?;
        Ok(rows.into_iter().map(map_row).collect())
    }
}

/// `(start, end)` days covering the last `days` days up to yesterday,
/// formatted `YYYY-MM-DD`.
pub fn day_range(now: OffsetDateTime, days: u32) -> Result<(String, String)> {
    let format = format_description!("[year]-[month]-[day]");
    let end = now.date() - Duration::days(1);
    let start = end - Duration::days(i64::from(days.max(1)) - 1);
    let start = start
        .format(&format)
        .map_err(|e| TrackerError::Runtime(e.to_string()))?;
    let end = end
        .format(&format)
        .map_err(|e| TrackerError::Runtime(e.to_string()))?;
    Ok((start, end))
}

fn map_row(row: AnalyticsRow) -> VideoAnalyticsRow {
    VideoAnalyticsRow {
        id: row.id,
        video_id: row.video_id,
        user_id: row.user_id,
        day: row.day,
        views: row.views,
        watch_minutes: row.watch_minutes,
        average_view_duration_seconds: row.average_view_duration_seconds,
        average_view_percentage: row.average_view_percentage,
        subscribers_gained: row.subscribers_gained,
        created_at: row.created_at,
    }
}
