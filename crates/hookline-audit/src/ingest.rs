//! Async handler feeding published [`LogEntry`] events into the buffer.

use std::sync::Arc;

use async_trait::async_trait;
use hookline_core::{AsyncHook, HookError};
use regex::Regex;
use tracing::trace;

use crate::buffer::IngestBuffer;
use crate::entry::LogEntry;

/// Messages of requests to the log endpoints themselves.
pub const DEFAULT_IGNORE_PATTERN: &str = ".*/(api/logs|console/).*";

/// Whole-message matcher for entries that must not be ingested.
#[derive(Debug, Clone)]
pub struct IgnoreFilter {
    regex: Regex,
}

impl IgnoreFilter {
    /// Compile `pattern`; it must match the entire message.
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        let regex = Regex::new(&format!("^(?:{pattern})$"))?;
        Ok(Self { regex })
    }

    pub fn matches(&self, message: &str) -> bool {
        self.regex.is_match(message)
    }
}

/// Registered as an async handler for [`LogEntry`].
///
/// Skips ignored messages, stamps the ordering key and offers the entry to
/// the buffer. A full buffer drops the entry without reporting a failure.
pub struct LogIngestHook {
    buffer: Arc<IngestBuffer<LogEntry>>,
    ignore: Option<IgnoreFilter>,
}

impl LogIngestHook {
    pub fn new(buffer: Arc<IngestBuffer<LogEntry>>, ignore: Option<IgnoreFilter>) -> Self {
        Self { buffer, ignore }
    }

    /// Synchronous body of [`AsyncHook::handle`]; returns whether the entry
    /// landed in the buffer.
    pub fn ingest(&self, entry: &LogEntry) -> bool {
        if self
            .ignore
            .as_ref()
            .is_some_and(|filter| filter.matches(&entry.message))
        {
            trace!(message = %entry.message, "Ignoring log entry");
            return false;
        }

        let mut entry = entry.clone();
        entry.rowid = entry.created_millis();
        let accepted = self.buffer.offer(entry);
        if !accepted {
            trace!(
                capacity = self.buffer.capacity(),
                dropped = self.buffer.dropped(),
                "Log buffer full, entry dropped"
            );
        }
        accepted
    }
}

#[async_trait]
impl AsyncHook<LogEntry> for LogIngestHook {
    fn name(&self) -> &str {
        "log_ingest"
    }

    async fn handle(&self, entry: &LogEntry) -> Result<(), HookError> {
        self.ingest(entry);
        Ok(())
    }
}

impl std::fmt::Debug for LogIngestHook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogIngestHook")
            .field("buffer", &self.buffer)
            .field("ignore", &self.ignore.as_ref().map(|f| f.regex.as_str()))
            .finish()
    }
}
