pub mod ab_tests;
pub mod alerts;
pub mod analytics;
pub mod config;
pub mod config_store;
pub mod daemon;
pub mod db;
pub mod error;
pub mod events;
pub mod interfaces;
pub mod notifications;
pub mod providers;
pub mod scheduler;
pub mod scripts;
pub mod stats;
pub mod studio;
pub mod sync;
pub mod tracking;
pub mod videos;
pub mod youtube;

pub use crate::config::Config;
pub use crate::db::Database;
pub use crate::error::{Result, TrackerError};
pub use crate::tracking::{TrackingPeriod, ViewTracker};
