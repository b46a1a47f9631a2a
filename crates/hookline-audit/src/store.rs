//! Persistence boundary for drained log entries.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::entry::LogEntry;

/// Failure reported by a [`LogStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Log store unavailable: {0}")]
    Unavailable(String),

    #[error("Log store operation failed: {0}")]
    Operation(String),
}

/// Durable home of persisted log entries.
#[async_trait]
pub trait LogStore: Send + Sync {
    /// Persist one batch as a unit.
    async fn batch_insert(&self, entries: Vec<LogEntry>) -> Result<(), StoreError>;

    /// Delete every entry created strictly before `cutoff`.
    /// Returns the number of deleted entries.
    async fn delete_before(&self, cutoff: OffsetDateTime) -> Result<u64, StoreError>;
}

/// In-memory [`LogStore`].
///
/// Also records every call it receives, which is what the job tests assert
/// against.
#[derive(Default)]
pub struct MemoryLogStore {
    entries: RwLock<Vec<LogEntry>>,
    batches: RwLock<Vec<usize>>,
    cutoffs: RwLock<Vec<OffsetDateTime>>,
    failing: AtomicBool,
}

impl MemoryLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with [`StoreError::Unavailable`].
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Persisted entries, newest first by ordering key.
    pub async fn entries(&self) -> Vec<LogEntry> {
        let mut entries = self.entries.read().await.clone();
        entries.sort_by(|a, b| b.rowid.cmp(&a.rowid));
        entries
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Size of every successful `batch_insert`, in call order.
    pub async fn batch_sizes(&self) -> Vec<usize> {
        self.batches.read().await.clone()
    }

    /// Cutoff of every successful `delete_before`, in call order.
    pub async fn cutoffs(&self) -> Vec<OffsetDateTime> {
        self.cutoffs.read().await.clone()
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store set to fail".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl LogStore for MemoryLogStore {
    async fn batch_insert(&self, entries: Vec<LogEntry>) -> Result<(), StoreError> {
        self.check()?;
        self.batches.write().await.push(entries.len());
        self.entries.write().await.extend(entries);
        Ok(())
    }

    async fn delete_before(&self, cutoff: OffsetDateTime) -> Result<u64, StoreError> {
        self.check()?;
        self.cutoffs.write().await.push(cutoff);
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|e| e.created >= cutoff);
        Ok((before - entries.len()) as u64)
    }
}

impl std::fmt::Debug for MemoryLogStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryLogStore")
            .field("failing", &self.failing.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
