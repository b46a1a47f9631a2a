//! Async execution lane.
//!
//! A fixed set of tokio worker tasks, each draining its own FIFO queue.
//! Jobs with the same affinity key always land on the same worker and so
//! run in submission order; jobs without a key are spread round-robin.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError, RwLock};
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, join_all};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::hooks::HookError;

/// Default time allowed for queued jobs to finish on shutdown.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

type Job = BoxFuture<'static, ()>;

/// Lane sizing and shutdown behaviour.
#[derive(Debug, Clone)]
pub struct LaneConfig {
    /// Number of worker tasks. Must be at least 1.
    pub workers: usize,
    /// How long `shutdown` waits for queued jobs before aborting workers.
    pub shutdown_timeout: Duration,
}

impl LaneConfig {
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

impl Default for LaneConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

/// `max(cpus, 4) * 2 + 1`
pub fn default_workers() -> usize {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    cpus.max(4) * 2 + 1
}

/// Worker pool executing asynchronous handler invocations.
///
/// Must be started from within a tokio runtime.
pub struct AsyncLane {
    senders: RwLock<Option<Vec<mpsc::UnboundedSender<Job>>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    next: AtomicUsize,
    worker_count: usize,
    shutdown_timeout: Duration,
}

impl AsyncLane {
    /// Spawn the worker tasks.
    pub fn start(config: LaneConfig) -> Self {
        let worker_count = config.workers.max(1);
        let mut senders = Vec::with_capacity(worker_count);
        let mut workers = Vec::with_capacity(worker_count);

        for index in 0..worker_count {
            let (tx, rx) = mpsc::unbounded_channel::<Job>();
            senders.push(tx);
            workers.push(tokio::spawn(run_worker(index, rx)));
        }

        info!(workers = worker_count, "Async lane started");

        Self {
            senders: RwLock::new(Some(senders)),
            workers: Mutex::new(workers),
            next: AtomicUsize::new(0),
            worker_count,
            shutdown_timeout: config.shutdown_timeout,
        }
    }

    /// Queue a job. Never blocks.
    ///
    /// With `affinity = Some(h)` the job goes to worker `h % workers`.
    pub fn submit<F>(&self, affinity: Option<u64>, job: F) -> Result<(), HookError>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let guard = self.senders.read().unwrap_or_else(PoisonError::into_inner);
        let Some(senders) = guard.as_ref() else {
            return Err(HookError::LaneClosed("lane is shut down".to_string()));
        };

        let index = match affinity {
            Some(hash) => (hash % senders.len() as u64) as usize,
            None => self.next.fetch_add(1, Ordering::Relaxed) % senders.len(),
        };

        senders[index]
            .send(Box::pin(job))
            .map_err(|_| HookError::LaneClosed(format!("worker {index} has stopped")))
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    pub fn is_closed(&self) -> bool {
        self.senders
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Stop accepting jobs and let workers finish what is already queued.
    ///
    /// Workers still running after the shutdown timeout are aborted.
    /// Calling this more than once is harmless.
    pub async fn shutdown(&self) {
        let senders = self
            .senders
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if senders.is_none() {
            return;
        }
        // Dropping the senders lets each worker exit once its queue is empty.
        drop(senders);

        let mut handles: Vec<JoinHandle<()>> = {
            let mut workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::take(&mut *workers)
        };
        let aborts: Vec<_> = handles.iter().map(|h| h.abort_handle()).collect();

        debug!(workers = handles.len(), "Draining async lane");
        let drained = tokio::time::timeout(self.shutdown_timeout, join_all(handles.iter_mut()))
            .await
            .is_ok();
        if drained {
            info!("Async lane drained");
        } else {
            let pending = handles.iter().filter(|h| !h.is_finished()).count();
            warn!(
                pending,
                timeout_ms = self.shutdown_timeout.as_millis() as u64,
                "Async lane did not drain in time, aborting workers"
            );
            for abort in aborts {
                abort.abort();
            }
        }
    }
}

async fn run_worker(index: usize, mut rx: mpsc::UnboundedReceiver<Job>) {
    while let Some(job) = rx.recv().await {
        if AssertUnwindSafe(job).catch_unwind().await.is_err() {
            error!(worker = index, "Async lane job panicked");
        }
    }
    debug!(worker = index, "Async lane worker stopped");
}

impl std::fmt::Debug for AsyncLane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncLane")
            .field("workers", &self.worker_count)
            .field("closed", &self.is_closed())
            .field("shutdown_timeout", &self.shutdown_timeout)
            .finish()
    }
}
