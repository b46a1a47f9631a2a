//! Periodic maintenance jobs for the ingestion pipeline.
//!
//! Both jobs are idempotent and safe to invoke at any time. They are driven
//! either by [`PeriodicTask`](crate::runner::PeriodicTask) or by an external
//! scheduler calling [`ScheduledJob::run_once`].

use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use time::OffsetDateTime;
use tracing::{debug, warn};

use crate::buffer::IngestBuffer;
use crate::entry::LogEntry;
use crate::store::{LogStore, StoreError};

/// Default number of entries persisted per drain run.
pub const DEFAULT_BATCH_SIZE: usize = 1_000;
/// Default age after which persisted entries are pruned.
pub const DEFAULT_RETENTION: time::Duration = time::Duration::days(7);

/// A zero-argument job a scheduler can fire.
#[async_trait]
pub trait ScheduledJob: Send + Sync {
    fn name(&self) -> &str;

    /// Run once. Failures are logged, never returned.
    async fn run_once(&self);
}

// ============================================================================
// Clock
// ============================================================================

/// Source of "now" for retention cutoffs.
pub trait Clock: Send + Sync {
    fn now(&self) -> OffsetDateTime;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<OffsetDateTime>,
}

impl ManualClock {
    pub fn new(now: OffsetDateTime) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: OffsetDateTime) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = now;
    }

    pub fn advance(&self, by: time::Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> OffsetDateTime {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// ============================================================================
// Drain job
// ============================================================================

/// Moves up to one batch from the buffer into the store.
pub struct DrainJob {
    buffer: Arc<IngestBuffer<LogEntry>>,
    store: Arc<dyn LogStore>,
    batch_size: usize,
}

impl DrainJob {
    pub fn new(
        buffer: Arc<IngestBuffer<LogEntry>>,
        store: Arc<dyn LogStore>,
        batch_size: usize,
    ) -> Self {
        Self {
            buffer,
            store,
            batch_size: batch_size.max(1),
        }
    }

    /// Collect at most `batch_size` entries and persist them in one call.
    ///
    /// Returns the number persisted; zero means the buffer was empty and the
    /// store was not called. On a store error the collected entries are lost.
    pub async fn run(&self) -> Result<usize, StoreError> {
        let mut batch = Vec::new();
        while batch.len() < self.batch_size {
            let chunk = self.buffer.drain_up_to(self.batch_size - batch.len());
            if chunk.is_empty() {
                break;
            }
            batch.extend(chunk);
        }

        if batch.is_empty() {
            return Ok(0);
        }

        let count = batch.len();
        debug!(count, remaining = self.buffer.len(), "Persisting log batch");
        self.store.batch_insert(batch).await?;
        Ok(count)
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }
}

#[async_trait]
impl ScheduledJob for DrainJob {
    fn name(&self) -> &str {
        "log_drain"
    }

    async fn run_once(&self) {
        if let Err(e) = self.run().await {
            warn!(error = %e, "Log drain failed, batch discarded");
        }
    }
}

impl std::fmt::Debug for DrainJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DrainJob")
            .field("buffer", &self.buffer)
            .field("batch_size", &self.batch_size)
            .finish()
    }
}

// ============================================================================
// Prune job
// ============================================================================

/// Deletes persisted entries older than the retention window.
pub struct PruneJob {
    store: Arc<dyn LogStore>,
    clock: Arc<dyn Clock>,
    retention: time::Duration,
}

impl PruneJob {
    pub fn new(store: Arc<dyn LogStore>, clock: Arc<dyn Clock>, retention: time::Duration) -> Self {
        Self {
            store,
            clock,
            retention,
        }
    }

    /// `now - retention`, recomputed on every call.
    pub fn cutoff(&self) -> OffsetDateTime {
        self.clock.now() - self.retention
    }

    /// Issue one `delete_before(cutoff)`. Returns the number deleted.
    pub async fn run(&self) -> Result<u64, StoreError> {
        let cutoff = self.cutoff();
        debug!(cutoff = %cutoff, "Pruning log entries");
        self.store.delete_before(cutoff).await
    }
}

#[async_trait]
impl ScheduledJob for PruneJob {
    fn name(&self) -> &str {
        "log_prune"
    }

    async fn run_once(&self) {
        match self.run().await {
            Ok(deleted) => debug!(deleted, "Pruned log entries"),
            Err(e) => warn!(error = %e, "Log prune failed"),
        }
    }
}

impl std::fmt::Debug for PruneJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PruneJob")
            .field("retention", &self.retention)
            .finish_non_exhaustive()
    }
}
