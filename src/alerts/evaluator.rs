use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TrackerError;
use crate::tracking::{TrackingPeriod, VideoTrend};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertType {
    Growth,
    Decline,
    Views,
}

impl AlertType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Growth => "growth",
            Self::Decline => "decline",
            Self::Views => "views",
        }
    }
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertType {
    type Err = TrackerError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "growth" => Ok(Self::Growth),
            "decline" => Ok(Self::Decline),
            "views" => Ok(Self::Views),
            other => Err(TrackerError::Validation(format!(
                "unknown alert type '{other}'"
            ))),
        }
    }
}

/// Threshold rule. `video_id == None` applies to every video of the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertRule {
    pub alert_id: i32,
    pub video_id: Option<i32>,
    pub alert_type: AlertType,
    pub threshold: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlertTrigger {
    pub alert_id: i32,
    pub video_id: i32,
    pub alert_type: AlertType,
    pub threshold: i64,
    pub observed_value: i64,
    pub message: String,
}

/// Value that crossed the rule's threshold, if any. Trends without a growth
/// rate never fire growth or decline rules.
pub fn observe(rule: &AlertRule, trend: &VideoTrend) -> Option<i64> {
    match rule.alert_type {
        AlertType::Growth => trend
            .views
            .growth_rate
            .filter(|rate| *rate >= rule.threshold),
        AlertType::Decline => trend
            .views
            .growth_rate
            .filter(|rate| *rate <= -rule.threshold),
        AlertType::Views => {
            Some(trend.views.current_period).filter(|views| *views >= rule.threshold)
        }
    }
}

pub fn evaluate(rules: &[AlertRule], trends: &[VideoTrend]) -> Vec<AlertTrigger> {
    let mut out = Vec::new();
    for rule in rules {
        for trend in trends {
            if rule.video_id.is_some_and(|id| id != trend.video_id) {
                continue;
            }
            if let Some(observed_value) = observe(rule, trend) {
                out.push(AlertTrigger {
                    alert_id: rule.alert_id,
                    video_id: trend.video_id,
                    alert_type: rule.alert_type,
                    threshold: rule.threshold,
                    observed_value,
                    message: describe(rule.alert_type, trend, observed_value),
                });
            }
        }
    }
    out
}

fn describe(alert_type: AlertType, trend: &VideoTrend, observed: i64) -> String {
    let period = period_label(trend.period);
    match alert_type {
        AlertType::Growth => format!(
            "\"{}\" views grew {:.2}% over {period}",
            trend.title,
            observed as f64 / 100.0
        ),
        AlertType::Decline => format!(
            "\"{}\" views declined {:.2}% over {period}",
            trend.title,
            (observed as f64 / 100.0).abs()
        ),
        AlertType::Views => format!(
            "\"{}\" gained {observed} views over {period}",
            trend.title
        ),
    }
}

fn period_label(period: TrackingPeriod) -> String {
    match period {
        TrackingPeriod::Latest => "the latest interval".to_string(),
        other => format!("the last {other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::{compute_trend, Counters, TrendInput};

    fn views(v: i64) -> Counters {
        Counters {
            views: v,
            likes: 0,
            comments: 0,
        }
    }

    fn trend(id: i32, live: i64, newer: i64, older: i64) -> VideoTrend {
        compute_trend(
            id,
            "yt",
            "Video",
            TrackingPeriod::Day,
            TrendInput {
                live: views(live),
                newer: Some(views(newer)),
                older: Some(views(older)),
            },
        )
    }

    fn rule(alert_type: AlertType, video_id: Option<i32>, threshold: i64) -> AlertRule {
        AlertRule {
            alert_id: 9,
            video_id,
            alert_type,
            threshold,
        }
    }

    #[test]
    fn growth_fires_at_threshold() {
        // current 300, previous 200: +50.00%
        let trends = vec![trend(1, 1_500, 1_200, 1_000)];
        assert_eq!(evaluate(&[rule(AlertType::Growth, None, 5_000)], &trends).len(), 1);
        assert!(evaluate(&[rule(AlertType::Growth, None, 5_001)], &trends).is_empty());
    }

    #[test]
    fn decline_compares_against_negated_threshold() {
        // current 100, previous 200: -50.00%
        let trends = vec![trend(1, 1_300, 1_200, 1_000)];
        let fired = evaluate(&[rule(AlertType::Decline, None, 5_000)], &trends);
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].observed_value, -5_000);
        assert!(fired[0].message.contains("declined 50.00%"));
        assert!(evaluate(&[rule(AlertType::Decline, None, 6_000)], &trends).is_empty());
    }

    #[test]
    fn views_rule_uses_current_period() {
        let trends = vec![trend(1, 1_300, 1_200, 1_000)];
        let fired = evaluate(&[rule(AlertType::Views, None, 100)], &trends);
        assert_eq!(fired[0].observed_value, 100);
        assert!(evaluate(&[rule(AlertType::Views, None, 101)], &trends).is_empty());
    }

    #[test]
    fn rule_scoped_to_video_only_matches_that_video() {
        let trends = vec![trend(1, 2_000, 1_000, 900), trend(2, 2_000, 1_000, 900)];
        let fired = evaluate(&[rule(AlertType::Views, Some(2), 10)], &trends);
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].video_id, 2);

        let fired = evaluate(&[rule(AlertType::Views, None, 10)], &trends);
        assert_eq!(fired.len(), 2);
    }

    #[test]
    fn latest_trends_never_fire_rate_rules() {
        let latest = compute_trend(
            1,
            "yt",
            "Video",
            TrackingPeriod::Latest,
            TrendInput {
                live: views(5_000),
                newer: Some(views(10)),
                older: None,
            },
        );
        let trends = vec![latest];
        assert!(evaluate(&[rule(AlertType::Growth, None, 0)], &trends).is_empty());
        assert!(evaluate(&[rule(AlertType::Decline, None, 0)], &trends).is_empty());
        assert_eq!(evaluate(&[rule(AlertType::Views, None, 0)], &trends).len(), 1);
    }

    #[test]
    fn alert_type_parses() {
        assert_eq!("decline".parse::<AlertType>().unwrap(), AlertType::Decline);
        assert!("spike".parse::<AlertType>().is_err());
    }
}
