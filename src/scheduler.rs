use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::interfaces::scheduler::ScheduledJob;

/// Runs each registered job on its own task at the job's interval. The
/// first run happens immediately on `start`.
#[derive(Default)]
pub struct Scheduler {
    jobs: Vec<Arc<dyn ScheduledJob>>,
    handles: Vec<JoinHandle<()>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_job(&mut self, job: Arc<dyn ScheduledJob>) {
        self.jobs.push(job);
    }

    pub fn job_names(&self) -> Vec<String> {
        self.jobs.iter().map(|job| job.name().to_string()).collect()
    }

    pub fn start(&mut self) {
        for job in &self.jobs {
            let job = job.clone();
            info!(job = job.name(), interval_secs = job.interval().as_secs(), "starting job");
            let handle = tokio::spawn(async move {
                let period = job.interval().max(Duration::from_millis(1));
                let mut ticker = tokio::time::interval(period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    ticker.tick().await;
                    debug!(job = job.name(), "job tick");
                    if let Err(err) = job.run().await {
                        error!(job = job.name(), error = %err, "job failed");
                    }
                }
            });
            self.handles.push(handle);
        }
    }

    /// Cancels every job task and waits for them to finish.
    pub async fn stop(&mut self) {
        for handle in &self.handles {
            handle.abort();
        }
        for handle in self.handles.drain(..) {
            let _ = handle.await;
        }
    }
}
