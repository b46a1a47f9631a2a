//! Fixed-interval driver for [`ScheduledJob`]s.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval_at};
use tracing::{debug, error, info, warn};

use crate::jobs::ScheduledJob;

/// Runs a job every `period` on its own tokio task until stopped.
///
/// The first run happens one period after start. A run that overlaps the
/// next tick delays that tick rather than bunching runs together.
pub struct PeriodicTask {
    name: String,
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl PeriodicTask {
    pub fn spawn(job: Arc<dyn ScheduledJob>, period: Duration) -> Self {
        let name = job.name().to_string();
        let (shutdown, mut shutdown_rx) = watch::channel(false);

        let task_name = name.clone();
        let handle = tokio::spawn(async move {
            info!(job = %task_name, period_secs = period.as_secs(), "Periodic job started");

            let mut ticker = interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        debug!(job = %task_name, "Running periodic job");
                        job.run_once().await;
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }

            info!(job = %task_name, "Periodic job stopped");
        });

        Self {
            name,
            shutdown,
            handle,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Signal the task and wait for it. A run in progress completes first.
    ///
    /// A task that already died (panicked job) is reported at `error`.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.handle.await {
            if e.is_panic() {
                error!(job = %self.name, error = %e, "Periodic job task panicked");
            } else {
                warn!(job = %self.name, error = %e, "Periodic job task was cancelled");
            }
        }
    }
}

impl std::fmt::Debug for PeriodicTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeriodicTask")
            .field("name", &self.name)
            .field("finished", &self.handle.is_finished())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Counting(AtomicU32);

    #[async_trait]
    impl ScheduledJob for Counting {
        fn name(&self) -> &str {
            "counting"
        }

        async fn run_once(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Exploding;

    #[async_trait]
    impl ScheduledJob for Exploding {
        fn name(&self) -> &str {
            "exploding"
        }

        async fn run_once(&self) {
            panic!("job failure");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_after_job_panic_returns() {
        let task = PeriodicTask::spawn(Arc::new(Exploding), Duration::from_secs(1));
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(task.handle.is_finished());
        task.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_each_period_until_stopped() {
        let job = Arc::new(Counting(AtomicU32::new(0)));
        let task = PeriodicTask::spawn(job.clone(), Duration::from_secs(30));

        tokio::time::sleep(Duration::from_secs(29)).await;
        assert_eq!(job.0.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(62)).await;
        assert_eq!(job.0.load(Ordering::SeqCst), 3);

        task.stop().await;
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(job.0.load(Ordering::SeqCst), 3);
    }
}
