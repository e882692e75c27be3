use serde_json::json;
use tracing::{info, warn};

use crate::ab_tests::{compare_engagement, AbTest, AbTestStore};
use crate::db::now_ts;
use crate::error::Result;
use crate::events::{publish, AppEvent, EventSender};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MonitorReport {
    pub tests_checked: usize,
    pub notified: usize,
    pub errors: usize,
}

/// Watches active A/B tests and tells the owner once a variant's engagement
/// lead is significant.
pub struct SignificanceMonitor {
    store: AbTestStore,
    events: EventSender,
}

impl SignificanceMonitor {
    pub fn new(store: AbTestStore, events: EventSender) -> Self {
        Self { store, events }
    }

    pub async fn run_once(&self) -> Result<MonitorReport> {
        let tests = self.store.list_active().await?;
        let mut report = MonitorReport::default();
        for test in tests.into_iter().filter(|t| t.notified_at.is_none()) {
            report.tests_checked += 1;
            match self.check_test(&test).await {
                Ok(true) => report.notified += 1,
                Ok(false) => {}
                Err(err) => {
                    warn!(test_id = test.id, error = %err, "significance check failed");
                    report.errors += 1;
                }
            }
        }
        Ok(report)
    }

    async fn check_test(&self, test: &AbTest) -> Result<bool> {
        let variants = self.store.list_variants(test.id).await?;
        let Some(comparison) = compare_engagement(&variants) else {
            return Ok(false);
        };
        let Some(signal) = comparison.signal.filter(|s| s.notify) else {
            return Ok(false);
        };

        let leader = variants.iter().find(|v| v.id == comparison.leader_id);
        let label = leader.map(|v| v.label.as_str()).unwrap_or("?");
        let message = format!(
            "Variant \"{label}\" of test \"{}\" leads engagement by {:.2} points \
             ({:.1}% confidence)",
            test.name,
            signal.rate_gap * 100.0,
            signal.test.confidence * 100.0
        );
        self.store.mark_notified(test.id, now_ts()).await?;
        info!(test_id = test.id, "{message}");

        publish(
            &self.events,
            AppEvent::new(
                "ab_test",
                &test.user_id,
                "significant",
                json!({
                    "test_id": test.id,
                    "leader_variant_id": comparison.leader_id,
                    "runner_up_variant_id": comparison.runner_up_id,
                    "confidence": signal.test.confidence,
                    "rate_gap": signal.rate_gap,
                    "message": message,
                }),
            ),
        );
        Ok(true)
    }
}
