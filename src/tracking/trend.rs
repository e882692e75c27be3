use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TrackerError;

/// Growth rates are fixed point: 10000 means +100.00%.
pub const GROWTH_SCALE: f64 = 10_000.0;

/// Growth reported when a metric moves from a zero previous period.
pub const FULL_GROWTH: i64 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackingPeriod {
    #[serde(rename = "latest")]
    Latest,
    #[serde(rename = "1h")]
    Hour,
    #[serde(rename = "2h")]
    TwoHours,
    #[serde(rename = "24h")]
    Day,
    #[serde(rename = "48h")]
    TwoDays,
    #[serde(rename = "1week")]
    Week,
    #[serde(rename = "2weeks")]
    TwoWeeks,
    #[serde(rename = "1month")]
    Month,
}

impl TrackingPeriod {
    pub const ALL: [TrackingPeriod; 8] = [
        Self::Latest,
        Self::Hour,
        Self::TwoHours,
        Self::Day,
        Self::TwoDays,
        Self::Week,
        Self::TwoWeeks,
        Self::Month,
    ];

    pub fn hours(self) -> i64 {
        match self {
            Self::Latest => 0,
            Self::Hour => 1,
            Self::TwoHours => 2,
            Self::Day => 24,
            Self::TwoDays => 48,
            Self::Week => 168,
            Self::TwoWeeks => 336,
            Self::Month => 720,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Latest => "latest",
            Self::Hour => "1h",
            Self::TwoHours => "2h",
            Self::Day => "24h",
            Self::TwoDays => "48h",
            Self::Week => "1week",
            Self::TwoWeeks => "2weeks",
            Self::Month => "1month",
        }
    }

    /// Start of the current and previous windows, in unix seconds.
    pub fn window(self, now: i64) -> PeriodWindow {
        let span = self.hours() * 3600;
        PeriodWindow {
            current_start: now - span,
            previous_start: now - 2 * span,
        }
    }
}

impl fmt::Display for TrackingPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrackingPeriod {
    type Err = TrackerError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == value)
            .ok_or_else(|| TrackerError::Validation(format!("unknown period '{value}'")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodWindow {
    pub current_start: i64,
    pub previous_start: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counters {
    pub views: i64,
    pub likes: i64,
    pub comments: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricTrend {
    pub current_period: i64,
    pub previous_period: i64,
    pub delta: i64,
    pub growth_rate: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VideoTrend {
    pub video_id: i32,
    pub youtube_id: String,
    pub title: String,
    pub period: TrackingPeriod,
    pub live: Counters,
    pub views: MetricTrend,
    pub likes: MetricTrend,
    pub comments: MetricTrend,
}

impl VideoTrend {
    fn growth_key(&self) -> i64 {
        self.views.growth_rate.unwrap_or(0)
    }
}

pub fn growth_rate(current_period: i64, previous_period: i64) -> i64 {
    if previous_period > 0 {
        let delta = (current_period - previous_period) as f64;
        (delta / previous_period as f64 * GROWTH_SCALE).round() as i64
    } else if current_period > 0 {
        FULL_GROWTH
    } else {
        0
    }
}

/// Compares the window ending now against the one before it.
///
/// `newer` is the latest snapshot at or before the current window start,
/// `older` the latest at or before the previous window start. A missing
/// `newer` means nothing accrued in the current window; a missing `older`
/// means nothing accrued in the previous one.
pub fn compare_metric(live: i64, newer: Option<i64>, older: Option<i64>) -> MetricTrend {
    let current_period = live - newer.unwrap_or(live);
    let previous_period = match (newer, older) {
        (Some(newer), Some(older)) => newer - older,
        _ => 0,
    };
    MetricTrend {
        current_period,
        previous_period,
        delta: current_period - previous_period,
        growth_rate: Some(growth_rate(current_period, previous_period)),
    }
}

/// Movement since the most recent snapshot; no growth rate.
pub fn latest_metric(live: i64, last: Option<i64>) -> MetricTrend {
    let current_period = live - last.unwrap_or(live);
    MetricTrend {
        current_period,
        previous_period: 0,
        delta: current_period,
        growth_rate: None,
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TrendInput {
    pub live: Counters,
    /// For [`TrackingPeriod::Latest`] this is the most recent snapshot.
    pub newer: Option<Counters>,
    pub older: Option<Counters>,
}

pub fn compute_trend(
    video_id: i32,
    youtube_id: &str,
    title: &str,
    period: TrackingPeriod,
    input: TrendInput,
) -> VideoTrend {
    let TrendInput { live, newer, older } = input;
    let (views, likes, comments) = if period == TrackingPeriod::Latest {
        (
            latest_metric(live.views, newer.map(|c| c.views)),
            latest_metric(live.likes, newer.map(|c| c.likes)),
            latest_metric(live.comments, newer.map(|c| c.comments)),
        )
    } else {
        (
            compare_metric(live.views, newer.map(|c| c.views), older.map(|c| c.views)),
            compare_metric(live.likes, newer.map(|c| c.likes), older.map(|c| c.likes)),
            compare_metric(
                live.comments,
                newer.map(|c| c.comments),
                older.map(|c| c.comments),
            ),
        )
    };
    VideoTrend {
        video_id,
        youtube_id: youtube_id.to_string(),
        title: title.to_string(),
        period,
        live,
        views,
        likes,
        comments,
    }
}

pub fn top_viewers(trends: &[VideoTrend], limit: usize) -> Vec<VideoTrend> {
    let mut out = trends.to_vec();
    out.sort_by(|a, b| b.views.current_period.cmp(&a.views.current_period));
    out.truncate(limit);
    out
}

pub fn top_growing(trends: &[VideoTrend], limit: usize) -> Vec<VideoTrend> {
    let mut out: Vec<VideoTrend> = trends
        .iter()
        .filter(|t| t.views.delta > 0)
        .cloned()
        .collect();
    out.sort_by(|a, b| b.growth_key().cmp(&a.growth_key()));
    out.truncate(limit);
    out
}

pub fn top_declining(trends: &[VideoTrend], limit: usize) -> Vec<VideoTrend> {
    let mut out: Vec<VideoTrend> = trends
        .iter()
        .filter(|t| t.views.delta < 0)
        .cloned()
        .collect();
    out.sort_by_key(|t| t.growth_key());
    out.truncate(limit);
    out
}

pub fn lowest_viewers(trends: &[VideoTrend], limit: usize) -> Vec<VideoTrend> {
    let mut out = trends.to_vec();
    out.sort_by_key(|t| t.views.current_period);
    out.truncate(limit);
    out
}

#[derive(Debug, Clone, Serialize)]
pub struct TrendRankings {
    pub period: TrackingPeriod,
    pub top_viewers: Vec<VideoTrend>,
    pub top_growing: Vec<VideoTrend>,
    pub top_declining: Vec<VideoTrend>,
    pub lowest_viewers: Vec<VideoTrend>,
}

impl TrendRankings {
    pub fn from_trends(period: TrackingPeriod, trends: &[VideoTrend], limit: usize) -> Self {
        Self {
            period,
            top_viewers: top_viewers(trends, limit),
            top_growing: top_growing(trends, limit),
            top_declining: top_declining(trends, limit),
            lowest_viewers: lowest_viewers(trends, limit),
        }
    }
}
