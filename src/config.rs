use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{Result, TrackerError};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OpenAiConfig {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct YouTubeConfig {
    pub api_key: Option<String>,
    pub access_token: Option<String>,
    pub data_base_url: Option<String>,
    pub analytics_base_url: Option<String>,
    pub max_videos: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ScheduleConfig {
    pub sync_minutes: Option<u64>,
    pub analytics_hours: Option<u64>,
    pub ab_monitor_minutes: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AlertsConfig {
    pub period: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    pub openai: Option<OpenAiConfig>,
    pub youtube: Option<YouTubeConfig>,
    pub schedule: Option<ScheduleConfig>,
    pub alerts: Option<AlertsConfig>,
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content =
            fs::read_to_string(path.as_ref()).map_err(|e| TrackerError::Config(e.to_string()))?;
        let config: Config =
            serde_json::from_str(&content).map_err(|e| TrackerError::Config(e.to_string()))?;
        Ok(config)
    }

    pub fn from_store(db_path: &str) -> Result<Self> {
        crate::config_store::load_config(db_path)
    }

    pub fn sync_interval_minutes(&self) -> u64 {
        self.schedule
            .as_ref()
            .and_then(|s| s.sync_minutes)
            .unwrap_or(60)
            .max(1)
    }

    pub fn analytics_interval_hours(&self) -> u64 {
        self.schedule
            .as_ref()
            .and_then(|s| s.analytics_hours)
            .unwrap_or(24)
            .max(1)
    }

    pub fn ab_monitor_interval_minutes(&self) -> u64 {
        self.schedule
            .as_ref()
            .and_then(|s| s.ab_monitor_minutes)
            .unwrap_or(30)
            .max(1)
    }

    /// Period used by the scheduled alert check; falls back to `24h` when
    /// unset or unparseable.
    pub fn alert_period(&self) -> crate::tracking::TrackingPeriod {
        self.alerts
            .as_ref()
            .and_then(|a| a.period.as_deref())
            .and_then(|p| p.parse().ok())
            .unwrap_or(crate::tracking::TrackingPeriod::Day)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::TrackingPeriod;

    #[test]
    fn defaults_apply_when_sections_missing() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.sync_interval_minutes(), 60);
        assert_eq!(config.analytics_interval_hours(), 24);
        assert_eq!(config.ab_monitor_interval_minutes(), 30);
        assert_eq!(config.alert_period(), TrackingPeriod::Day);
    }

    #[test]
    fn schedule_and_alert_period_are_read() {
        let config: Config = serde_json::from_str(
            r#"{"schedule":{"sync_minutes":0,"analytics_hours":6},"alerts":{"period":"1week"}}"#,
        )
        .unwrap();
        assert_eq!(config.sync_interval_minutes(), 1);
        assert_eq!(config.analytics_interval_hours(), 6);
        assert_eq!(config.alert_period(), TrackingPeriod::Week);
    }
}
