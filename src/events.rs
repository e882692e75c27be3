use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::db::now_ts;

/// Event pushed to `/events` subscribers.
#[derive(Debug, Clone, Serialize)]
pub struct AppEvent {
    pub event_type: String,
    pub user_id: String,
    pub status: String,
    pub payload: Value,
    pub timestamp: i64,
}

impl AppEvent {
    pub fn new(event_type: &str, user_id: &str, status: &str, payload: Value) -> Self {
        Self {
            event_type: event_type.to_string(),
            user_id: user_id.to_string(),
            status: status.to_string(),
            payload,
            timestamp: now_ts(),
        }
    }
}

pub type EventSender = broadcast::Sender<AppEvent>;

pub fn channel(capacity: usize) -> EventSender {
    let (tx, _) = broadcast::channel(capacity);
    tx
}

/// Sends without caring whether anyone listens.
pub fn publish(tx: &EventSender, event: AppEvent) {
    let _ = tx.send(event);
}
