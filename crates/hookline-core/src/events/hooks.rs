//! Hook traits for the typed event system.
//!
//! Hooks come in two flavors:
//! - **Sync** ([`SyncHook`]): run inline inside `publish`, may veto the
//!   publisher by returning an error
//! - **Async** ([`AsyncHook`]): run on the async lane, errors are reported
//!   to the exception handler and never reach the publisher
//!
//! Closures can be registered directly through [`FnHook`] and
//! [`AsyncFnHook`] (or the `on_sync` / `on_async` shortcuts on the hub).

use async_trait::async_trait;
use std::future::Future;
use std::marker::PhantomData;

use super::types::Event;

/// Error type for hook operations.
#[derive(Debug, thiserror::Error)]
pub enum HookError {
    /// Hook execution failed with a message.
    #[error("Hook execution failed: {0}")]
    Execution(String),

    /// Hook refused the event (e.g. a veto in a lifecycle phase).
    #[error("Hook rejected event: {0}")]
    Rejected(String),

    /// Async hook panicked; the payload is captured as text.
    #[error("Hook panicked: {0}")]
    Panicked(String),

    /// Async invocation could not be scheduled.
    #[error("Async lane unavailable: {0}")]
    LaneClosed(String),

    /// Generic error with source.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl HookError {
    /// Create an execution error from a string.
    pub fn execution(msg: impl Into<String>) -> Self {
        HookError::Execution(msg.into())
    }

    /// Create a rejection error from a string.
    pub fn rejected(msg: impl Into<String>) -> Self {
        HookError::Rejected(msg.into())
    }
}

// ============================================================================
// Hook Traits
// ============================================================================

/// Handler invoked inline by `publish`.
///
/// # Implementation Notes
///
/// - Runs on the publisher's thread, within the `publish` call
/// - Returning `Err` stops dispatch; later handlers for this publication
///   are skipped and the error is returned to the publisher
/// - Keep it short: the publisher waits for it
pub trait SyncHook<E: Event>: Send + Sync {
    /// Name for this hook (for logging and failure reports).
    fn name(&self) -> &str;

    /// Handle an event.
    fn handle(&self, event: &E) -> Result<(), HookError>;
}

/// Handler invoked on the async lane.
///
/// The publisher never waits for it and never sees its errors.
#[async_trait]
pub trait AsyncHook<E: Event>: Send + Sync {
    /// Name for this hook (for logging and failure reports).
    fn name(&self) -> &str;

    /// Handle an event.
    async fn handle(&self, event: &E) -> Result<(), HookError>;
}

// ============================================================================
// Closure adapters
// ============================================================================

/// Adapter turning a closure into a [`SyncHook`].
pub struct FnHook<F> {
    name: String,
    f: F,
}

impl<F> FnHook<F> {
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<E, F> SyncHook<E> for FnHook<F>
where
    E: Event,
    F: Fn(&E) -> Result<(), HookError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn handle(&self, event: &E) -> Result<(), HookError> {
        (self.f)(event)
    }
}

/// Adapter turning an async closure into an [`AsyncHook`].
///
/// The closure receives an owned clone of the event.
pub struct AsyncFnHook<F, Fut> {
    name: String,
    f: F,
    _future: PhantomData<fn() -> Fut>,
}

impl<F, Fut> AsyncFnHook<F, Fut> {
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
            _future: PhantomData,
        }
    }
}

#[async_trait]
impl<E, F, Fut> AsyncHook<E> for AsyncFnHook<F, Fut>
where
    E: Event,
    F: Fn(E) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HookError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, event: &E) -> Result<(), HookError> {
        (self.f)(event.clone()).await
    }
}

impl<F> std::fmt::Debug for FnHook<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnHook").field("name", &self.name).finish()
    }
}

impl<F, Fut> std::fmt::Debug for AsyncFnHook<F, Fut> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncFnHook")
            .field("name", &self.name)
            .finish()
    }
}
