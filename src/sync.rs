use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use time::OffsetDateTime;
use tracing::{debug, error, info, warn};

use crate::alerts::{AlertHistoryEntry, AlertStore};
use crate::analytics::{day_range, AnalyticsStore};
use crate::db::Database;
use crate::error::{Result, TrackerError};
use crate::interfaces::youtube::VideoSource;
use crate::tracking::{Counters, TrackingPeriod, ViewTracker};
use crate::videos::{User, VideoStore};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub users: usize,
    pub videos_imported: usize,
    pub videos_updated: usize,
    pub errors: usize,
}

impl SyncReport {
    fn absorb(&mut self, other: SyncReport) {
        self.users += other.users;
        self.videos_imported += other.videos_imported;
        self.videos_updated += other.videos_updated;
        self.errors += other.errors;
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CycleReport {
    pub sync: SyncReport,
    pub snapshots_recorded: usize,
    pub snapshot_errors: usize,
    pub alerts_triggered: Vec<AlertHistoryEntry>,
    pub alert_errors: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AnalyticsReport {
    pub videos: usize,
    pub rows: usize,
    pub errors: usize,
}

/// Pulls channel uploads and counters from YouTube into the local store.
/// Without a source only the snapshot and alert half of a cycle runs.
pub struct SyncService {
    videos: VideoStore,
    tracker: ViewTracker,
    alerts: AlertStore,
    analytics: AnalyticsStore,
    source: Option<Arc<dyn VideoSource>>,
}

impl SyncService {
    pub fn new(db: Database, source: Arc<dyn VideoSource>) -> Self {
        Self::build(db, Some(source))
    }

    pub fn local(db: Database) -> Self {
        Self::build(db, None)
    }

    fn build(db: Database, source: Option<Arc<dyn VideoSource>>) -> Self {
        Self {
            videos: VideoStore::new(db.clone()),
            tracker: ViewTracker::new(db.clone()),
            alerts: AlertStore::new(db.clone()),
            analytics: AnalyticsStore::new(db),
            source,
        }
    }

    pub fn has_source(&self) -> bool {
        self.source.is_some()
    }

    fn source(&self) -> Result<&Arc<dyn VideoSource>> {
        self.source
            .as_ref()
            .ok_or_else(|| TrackerError::Config("YouTube is not configured".to_string()))
    }

    /// Imports new uploads when the user's channel is known, then refreshes
    /// counters of every stored video. Videos YouTube no longer returns are
    /// counted as errors and left untouched.
    pub async fn sync_user(&self, user: &User) -> Result<SyncReport> {
        let source = self.source()?;
        let mut report = SyncReport {
            users: 1,
            ..Default::default()
        };

        let known: HashSet<String> = self
            .videos
            .list_videos(&user.id)
            .await?
            .into_iter()
            .map(|v| v.youtube_id)
            .collect();

        if let Some(channel_id) = user.channel_id.as_deref() {
            let uploads = source.channel_video_ids(channel_id).await?;
            let fresh: Vec<String> = uploads
                .into_iter()
                .filter(|id| !known.contains(id))
                .collect();
            if !fresh.is_empty() {
                for item in source.video_details(&fresh).await? {
                    match self.videos.upsert_from_youtube(&user.id, &item).await {
                        Ok(_) => report.videos_imported += 1,
                        Err(err) => {
                            warn!(
                                youtube_id = %item.youtube_id,
                                error = %err,
                                "video import failed"
                            );
                            report.errors += 1;
                        }
                    }
                }
            }
        }

        let ids: Vec<String> = known.into_iter().collect();
        if ids.is_empty() {
            return Ok(report);
        }
        let details = source.video_details(&ids).await?;
        let returned: HashSet<&str> = details.iter().map(|d| d.youtube_id.as_str()).collect();
        for missing in ids.iter().filter(|id| !returned.contains(id.as_str())) {
            warn!(user_id = %user.id, youtube_id = %missing, "video not returned by YouTube");
            report.errors += 1;
        }

        for item in &details {
            let result = match self.videos.find_by_youtube_id(&user.id, &item.youtube_id).await {
                Ok(Some(video)) => {
                    let counters = Counters {
                        views: item.view_count,
                        likes: item.like_count,
                        comments: item.comment_count,
                    };
                    self.videos.update_counters(video.id, counters).await
                }
                Ok(None) => continue,
                Err(err) => Err(err),
            };
            match result {
                Ok(()) => report.videos_updated += 1,
                Err(err) => {
                    warn!(youtube_id = %item.youtube_id, error = %err, "counter update failed");
                    report.errors += 1;
                }
            }
        }
        Ok(report)
    }

    /// Syncs every user in turn; one user's failure is logged and counted.
    pub async fn sync_all(&self) -> Result<SyncReport> {
        let mut total = SyncReport::default();
        if self.source.is_none() {
            debug!("no video source, skipping sync");
            return Ok(total);
        }
        for user in self.videos.list_users().await? {
            match self.sync_user(&user).await {
                Ok(report) => total.absorb(report),
                Err(err) => {
                    error!(user_id = %user.id, error = %err, "sync failed");
                    total.users += 1;
                    total.errors += 1;
                }
            }
        }
        info!(
            users = total.users,
            imported = total.videos_imported,
            updated = total.videos_updated,
            errors = total.errors,
            "sync finished"
        );
        Ok(total)
    }

    /// Sync, then snapshot, then alert check, for every user.
    pub async fn run_cycle(&self, alert_period: TrackingPeriod) -> Result<CycleReport> {
        let mut report = CycleReport {
            sync: self.sync_all().await?,
            ..Default::default()
        };
        for user in self.videos.list_users().await? {
            match self.tracker.record_snapshots(&user.id).await {
                Ok(recorded) => {
                    report.snapshots_recorded += recorded.recorded;
                    report.snapshot_errors += recorded.errors;
                }
                Err(err) => {
                    error!(user_id = %user.id, error = %err, "snapshot run failed");
                    report.snapshot_errors += 1;
                }
            }
            match self.alerts.check_alerts(&user.id, alert_period).await {
                Ok(checked) => {
                    report.alert_errors += checked.errors;
                    report.alerts_triggered.extend(checked.triggered);
                }
                Err(err) => {
                    error!(user_id = %user.id, error = %err, "alert check failed");
                    report.alert_errors += 1;
                }
            }
        }
        Ok(report)
    }

    pub async fn sync_analytics_user(&self, user: &User, days: u32) -> Result<AnalyticsReport> {
        let source = self.source()?;
        let (start, end) = day_range(OffsetDateTime::now_utc(), days)?;
        let mut report = AnalyticsReport::default();
        for video in self.videos.list_videos(&user.id).await? {
            report.videos += 1;
            let rows = match source
                .video_analytics(&video.youtube_id, &start, &end)
                .await
            {
                Ok(rows) => rows,
                Err(err) => {
                    warn!(video_id = video.id, error = %err, "analytics fetch failed");
                    report.errors += 1;
                    continue;
                }
            };
            for row in &rows {
                match self.analytics.upsert_daily(video.id, &user.id, row).await {
                    Ok(()) => report.rows += 1,
                    Err(err) => {
                        warn!(
                            video_id = video.id,
                            day = %row.day,
                            error = %err,
                            "analytics upsert failed"
                        );
                        report.errors += 1;
                    }
                }
            }
        }
        Ok(report)
    }

    pub async fn sync_analytics_all(&self, days: u32) -> Result<AnalyticsReport> {
        let mut total = AnalyticsReport::default();
        if self.source.is_none() {
            debug!("no video source, skipping analytics sync");
            return Ok(total);
        }
        for user in self.videos.list_users().await? {
            match self.sync_analytics_user(&user, days).await {
                Ok(report) => {
                    total.videos += report.videos;
                    total.rows += report.rows;
                    total.errors += report.errors;
                }
                Err(err) => {
                    error!(user_id = %user.id, error = %err, "analytics sync failed");
                    total.errors += 1;
                }
            }
        }
        Ok(total)
    }
}
