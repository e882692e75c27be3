use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use tubetest_tracker::error::{Result, TrackerError};
use tubetest_tracker::interfaces::scheduler::ScheduledJob;
use tubetest_tracker::scheduler::Scheduler;

struct TickJob {
    name: &'static str,
    runs: AtomicUsize,
    fail: bool,
}

impl TickJob {
    fn new(name: &'static str, fail: bool) -> Arc<Self> {
        Arc::new(Self {
            name,
            runs: AtomicUsize::new(0),
            fail,
        })
    }
}

#[async_trait]
impl ScheduledJob for TickJob {
    fn name(&self) -> &str {
        self.name
    }

    fn interval(&self) -> Duration {
        Duration::from_millis(10)
    }

    async fn run(&self) -> Result<()> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(TrackerError::Runtime("tick failed".to_string()));
        }
        Ok(())
    }
}

#[tokio::test]
async fn jobs_run_repeatedly_until_stopped() {
    let ok = TickJob::new("ok", false);
    let failing = TickJob::new("failing", true);
    let mut scheduler = Scheduler::new();
    scheduler.register_job(ok.clone());
    scheduler.register_job(failing.clone());
    assert_eq!(scheduler.job_names(), vec!["ok".to_string(), "failing".to_string()]);

    scheduler.start();
    tokio::time::sleep(Duration::from_millis(60)).await;
    scheduler.stop().await;

    let ok_runs = ok.runs.load(Ordering::SeqCst);
    assert!(ok_runs >= 2, "ran {ok_runs} times");
    assert!(failing.runs.load(Ordering::SeqCst) >= 2);

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(ok.runs.load(Ordering::SeqCst), ok_runs);
}
