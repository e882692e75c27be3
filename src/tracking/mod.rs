use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use serde::Serialize;
use tracing::{debug, warn};

use crate::db::{now_ts, Database};
use crate::error::{Result, TrackerError};
use crate::videos::VideoStore;

pub(crate) mod schema;
pub mod trend;

use schema::daily_view_stats;
pub use trend::{
    compute_trend, Counters, MetricTrend, TrackingPeriod, TrendInput, TrendRankings, VideoTrend,
};

#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub id: i32,
    pub video_id: i32,
    pub user_id: String,
    pub recorded_at: i64,
    pub view_count: i64,
    pub like_count: i64,
    pub comment_count: i64,
}

impl Snapshot {
    pub fn counters(&self) -> Counters {
        Counters {
            views: self.view_count,
            likes: self.like_count,
            comments: self.comment_count,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RecordReport {
    pub recorded: usize,
    pub errors: usize,
}

#[derive(Queryable)]
struct SnapshotRow {
    id: i32,
    video_id: i32,
    user_id: String,
    recorded_at: i64,
    view_count: i64,
    like_count: i64,
    comment_count: i64,
    _views_delta: i64,
    _likes_delta: i64,
    _comments_delta: i64,
    _growth_rate: i64,
}

// Delta and growth columns stay zero; trends are derived when read.
#[derive(Insertable)]
#[diesel(table_name = daily_view_stats)]
struct NewSnapshot<'a> {
    video_id: i32,
    user_id: &'a str,
    recorded_at: i64,
    view_count: i64,
    like_count: i64,
    comment_count: i64,
    views_delta: i64,
    likes_delta: i64,
    comments_delta: i64,
    growth_rate: i64,
}

#[derive(Clone)]
pub struct ViewTracker {
    db: Database,
    videos: VideoStore,
}

impl ViewTracker {
    pub fn new(db: Database) -> Self {
        let videos = VideoStore::new(db.clone());
        Self { db, videos }
    }

    pub async fn record_snapshots(&self, user_id: &str) -> Result<RecordReport> {
        self.record_snapshots_at(user_id, now_ts()).await
    }

    /// Stores one snapshot per video of the user. A failed insert is
    /// counted and skipped.
    pub async fn record_snapshots_at(
        &self,
        user_id: &str,
        recorded_at: i64,
    ) -> Result<RecordReport> {
        let videos = self.videos.list_videos(user_id).await?;
        let mut report = RecordReport::default();
        for video in videos {
            match self
                .insert_snapshot(video.id, user_id, recorded_at, video.counters())
                .await
            {
                Ok(_) => report.recorded += 1,
                Err(err) => {
                    warn!(video_id = video.id, error = %err, "snapshot insert failed");
                    report.errors += 1;
                }
            }
        }
        debug!(
            user_id,
            recorded = report.recorded,
            errors = report.errors,
            "recorded view snapshots"
        );
        Ok(report)
    }

    pub async fn insert_snapshot(
        &self,
        video_id: i32,
        user_id: &str,
        recorded_at: i64,
        counters: Counters,
    ) -> Result<Snapshot> {
        let new = NewSnapshot {
            video_id,
            user_id,
            recorded_at,
            view_count: counters.views,
            like_count: counters.likes,
            comment_count: counters.comments,
            views_delta: 0,
            likes_delta: 0,
            comments_delta: 0,
            growth_rate: 0,
        };

        let mut conn = self.db.conn().await?;
        diesel::insert_into(daily_view_stats::table)
            .values(&new)
            .execute(&mut conn)
            .await
            .map_err(|e| TrackerError::Runtime(e.to_string()))?;

        let row: SnapshotRow = daily_view_stats::table
            .filter(daily_view_stats::video_id.eq(video_id))
            .order(daily_view_stats::id.desc())
            .first(&mut conn)
            .await
            .map_err(|e| TrackerError::Runtime(e.to_string()))?;
        Ok(map_row(row))
    }

    pub async fn list_snapshots(&self, video_id: i32, limit: usize) -> Result<Vec<Snapshot>> {
        let mut conn = self.db.conn().await?;
        let rows: Vec<SnapshotRow> = daily_view_stats::table
            .filter(daily_view_stats::video_id.eq(video_id))
            .order(daily_view_stats::recorded_at.desc())
            .limit(limit as i64)
            .load(&mut conn)
            .await
            .map_err(|e| TrackerError::Runtime(e.to_string()))?;
        Ok(rows.into_iter().map(map_row).collect())
    }

    /// Latest snapshot recorded at or before `ts`.
    pub async fn snapshot_at_or_before(&self, video_id: i32, ts: i64) -> Result<Option<Snapshot>> {
        let mut conn = self.db.conn().await?;
        let row: Option<SnapshotRow> = daily_view_stats::table
            .filter(daily_view_stats::video_id.eq(video_id))
            .filter(daily_view_stats::recorded_at.le(ts))
            .order((
                daily_view_stats::recorded_at.desc(),
                daily_view_stats::id.desc(),
            ))
            .first(&mut conn)
            .await
            .optional()
            .map_err(|e| TrackerError::Runtime(e.to_string()))?;
        Ok(row.map(map_row))
    }

    pub async fn trends(&self, user_id: &str, period: TrackingPeriod) -> Result<Vec<VideoTrend>> {
        self.trends_at(user_id, period, now_ts()).await
    }

    /// Period comparison for every video of the user, evaluated at `now`.
    /// Live counters come from the video rows kept fresh by sync.
    pub async fn trends_at(
        &self,
        user_id: &str,
        period: TrackingPeriod,
        now: i64,
    ) -> Result<Vec<VideoTrend>> {
        let videos = self.videos.list_videos(user_id).await?;
        let window = period.window(now);
        let mut out = Vec::with_capacity(videos.len());
        for video in videos {
            let newer = self
                .snapshot_at_or_before(video.id, window.current_start)
                .await?
                .map(|s| s.counters());
            let older = if period == TrackingPeriod::Latest {
                None
            } else {
                self.snapshot_at_or_before(video.id, window.previous_start)
                    .await?
                    .map(|s| s.counters())
            };
            out.push(compute_trend(
                video.id,
                &video.youtube_id,
                &video.title,
                period,
                TrendInput {
                    live: video.counters(),
                    newer,
                    older,
                },
            ));
        }
        Ok(out)
    }

    pub async fn rankings(
        &self,
        user_id: &str,
        period: TrackingPeriod,
        limit: usize,
    ) -> Result<TrendRankings> {
        let trends = self.trends(user_id, period).await?;
        Ok(TrendRankings::from_trends(period, &trends, limit))
    }
}

fn map_row(row: SnapshotRow) -> Snapshot {
    Snapshot {
        id: row.id,
        video_id: row.video_id,
        user_id: row.user_id,
        recorded_at: row.recorded_at,
        view_count: row.view_count,
        like_count: row.like_count,
        comment_count: row.comment_count,
    }
}
