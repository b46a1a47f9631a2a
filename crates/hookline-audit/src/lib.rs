//! Audit-log ingestion for Hookline.
//!
//! Request-processing code publishes [`LogEntry`] events; an async handler
//! buffers them in a fixed-capacity queue without ever blocking, a periodic
//! drain job persists them in batches and a prune job enforces retention.
//!
//! Delivery is at-most-once: entries are dropped when the buffer is full and
//! lost when the store rejects a batch.

pub mod buffer;
pub mod entry;
pub mod ingest;
pub mod jobs;
pub mod pipeline;
pub mod runner;
pub mod store;

pub use buffer::IngestBuffer;
pub use entry::{LEVEL_ERROR, LEVEL_INFO, LogEntry, RequestAuth, RequestLog};
pub use ingest::{DEFAULT_IGNORE_PATTERN, IgnoreFilter, LogIngestHook};
pub use jobs::{Clock, DrainJob, ManualClock, PruneJob, ScheduledJob, SystemClock};
pub use pipeline::{AUDIT_OWNER, AuditError, AuditPipeline, AuditSettings};
pub use runner::PeriodicTask;
pub use store::{LogStore, MemoryLogStore, StoreError};
