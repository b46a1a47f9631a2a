//! Wiring of buffer, ingestion handler and jobs.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use hookline_core::{EventHub, HandlerId, RegistryError};
use thiserror::Error;
use tracing::{info, warn};

use crate::buffer::{DEFAULT_CAPACITY, IngestBuffer};
use crate::entry::LogEntry;
use crate::ingest::{DEFAULT_IGNORE_PATTERN, IgnoreFilter, LogIngestHook};
use crate::jobs::{Clock, DEFAULT_BATCH_SIZE, DEFAULT_RETENTION, DrainJob, PruneJob};
use crate::runner::PeriodicTask;
use crate::store::LogStore;

/// Owner name of the pipeline's handler registrations.
pub const AUDIT_OWNER: &str = "audit";

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Invalid ignore pattern: {0}")]
    InvalidIgnorePattern(#[from] regex::Error),

    #[error("Audit capacity and batch size must be greater than zero")]
    ZeroSize,

    #[error("Audit {0} must be greater than zero")]
    ZeroInterval(&'static str),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Sizing and schedule of the pipeline.
#[derive(Debug, Clone)]
pub struct AuditSettings {
    pub capacity: usize,
    pub batch_size: usize,
    pub drain_interval: Duration,
    pub prune_interval: Duration,
    pub retention: time::Duration,
    /// `None` ingests every message.
    pub ignore_pattern: Option<String>,
}

impl Default for AuditSettings {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            batch_size: DEFAULT_BATCH_SIZE,
            drain_interval: Duration::from_secs(30),
            prune_interval: Duration::from_secs(24 * 60 * 60),
            retention: DEFAULT_RETENTION,
            ignore_pattern: Some(DEFAULT_IGNORE_PATTERN.to_string()),
        }
    }
}

/// The audit-log ingestion pipeline.
///
/// `LogEntry` events published on the hub are buffered by an async handler
/// and persisted by the drain job; the prune job enforces retention.
pub struct AuditPipeline {
    settings: AuditSettings,
    buffer: Arc<IngestBuffer<LogEntry>>,
    ignore: Option<IgnoreFilter>,
    drain: Arc<DrainJob>,
    prune: Arc<PruneJob>,
    tasks: Mutex<Vec<PeriodicTask>>,
}

impl AuditPipeline {
    pub fn new(
        settings: AuditSettings,
        store: Arc<dyn LogStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, AuditError> {
        if settings.capacity == 0 || settings.batch_size == 0 {
            return Err(AuditError::ZeroSize);
        }
        if settings.drain_interval.is_zero() {
            return Err(AuditError::ZeroInterval("drain interval"));
        }
        if settings.prune_interval.is_zero() {
            return Err(AuditError::ZeroInterval("prune interval"));
        }
        if !settings.retention.is_positive() {
            return Err(AuditError::ZeroInterval("retention"));
        }
        let ignore = settings
            .ignore_pattern
            .as_deref()
            .map(IgnoreFilter::new)
            .transpose()?;

        let buffer = Arc::new(IngestBuffer::new(settings.capacity));
        let drain = Arc::new(DrainJob::new(
            buffer.clone(),
            store.clone(),
            settings.batch_size,
        ));
        let prune = Arc::new(PruneJob::new(store, clock, settings.retention));

        Ok(Self {
            settings,
            buffer,
            ignore,
            drain,
            prune,
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Register the ingestion handler (async) for `LogEntry` on `hub`.
    pub fn register(&self, hub: &EventHub) -> Result<HandlerId, AuditError> {
        let hook = LogIngestHook::new(self.buffer.clone(), self.ignore.clone());
        Ok(hub.register_async::<LogEntry>(AUDIT_OWNER, Arc::new(hook))?)
    }

    /// Start the drain and prune jobs on their fixed intervals.
    pub fn start(&self) {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        if !tasks.is_empty() {
            return;
        }
        tasks.push(PeriodicTask::spawn(
            self.drain.clone(),
            self.settings.drain_interval,
        ));
        tasks.push(PeriodicTask::spawn(
            self.prune.clone(),
            self.settings.prune_interval,
        ));
        info!(
            capacity = self.settings.capacity,
            batch_size = self.settings.batch_size,
            drain_interval_secs = self.settings.drain_interval.as_secs(),
            prune_interval_secs = self.settings.prune_interval.as_secs(),
            "Audit pipeline started"
        );
    }

    /// Stop the periodic jobs and persist whatever is still buffered.
    pub async fn shutdown(&self) {
        let tasks: Vec<PeriodicTask> = {
            let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::take(&mut *tasks)
        };
        for task in tasks {
            task.stop().await;
        }
        let flushed = self.flush().await;
        info!(flushed, dropped = self.buffer.dropped(), "Audit pipeline stopped");
    }

    /// Run the drain job until the buffer is empty or the store fails.
    /// Returns the number of entries persisted.
    pub async fn flush(&self) -> usize {
        let mut total = 0;
        loop {
            match self.drain.run().await {
                Ok(0) => break,
                Ok(n) => total += n,
                Err(e) => {
                    warn!(error = %e, "Log flush failed, batch discarded");
                    break;
                }
            }
        }
        total
    }

    pub fn buffer(&self) -> &Arc<IngestBuffer<LogEntry>> {
        &self.buffer
    }

    /// The "run drain" callback for an external scheduler.
    pub fn drain_job(&self) -> Arc<DrainJob> {
        self.drain.clone()
    }

    /// The "run prune" callback for an external scheduler.
    pub fn prune_job(&self) -> Arc<PruneJob> {
        self.prune.clone()
    }

    pub fn settings(&self) -> &AuditSettings {
        &self.settings
    }
}

impl std::fmt::Debug for AuditPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditPipeline")
            .field("settings", &self.settings)
            .field("buffer", &self.buffer)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::SystemClock;
    use crate::store::MemoryLogStore;

    #[test]
    fn test_rejects_invalid_settings() {
        let store = Arc::new(MemoryLogStore::new());
        let bad_regex = AuditSettings {
            ignore_pattern: Some("(".into()),
            ..Default::default()
        };
        assert!(matches!(
            AuditPipeline::new(bad_regex, store.clone(), Arc::new(SystemClock)),
            Err(AuditError::InvalidIgnorePattern(_))
        ));

        let zero = AuditSettings {
            batch_size: 0,
            ..Default::default()
        };
        assert!(matches!(
            AuditPipeline::new(zero, store.clone(), Arc::new(SystemClock)),
            Err(AuditError::ZeroSize)
        ));
    }

    #[test]
    fn test_rejects_zero_intervals() {
        let store = Arc::new(MemoryLogStore::new());
        let cases = [
            (
                AuditSettings {
                    drain_interval: Duration::ZERO,
                    ..Default::default()
                },
                "drain interval",
            ),
            (
                AuditSettings {
                    prune_interval: Duration::ZERO,
                    ..Default::default()
                },
                "prune interval",
            ),
            (
                AuditSettings {
                    retention: time::Duration::ZERO,
                    ..Default::default()
                },
                "retention",
            ),
        ];
        for (settings, field) in cases {
            match AuditPipeline::new(settings, store.clone(), Arc::new(SystemClock)) {
                Err(AuditError::ZeroInterval(name)) => assert_eq!(name, field),
                other => panic!("expected ZeroInterval({field}), got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_flush_persists_everything() {
        let store = Arc::new(MemoryLogStore::new());
        let settings = AuditSettings {
            batch_size: 4,
            ..Default::default()
        };
        let pipeline = AuditPipeline::new(settings, store.clone(), Arc::new(SystemClock)).unwrap();
        for i in 0..10 {
            pipeline
                .buffer()
                .offer(LogEntry::new(crate::entry::LEVEL_INFO, format!("/x/{i}")));
        }

        assert_eq!(pipeline.flush().await, 10);
        assert_eq!(store.batch_sizes().await, vec![4, 4, 2]);
    }
}
