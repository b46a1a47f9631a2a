use thiserror::Error;

use crate::events::{HookError, Registration, Timing};

/// Rejected handler registrations.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Handler name must not be blank")]
    EmptyName,

    #[error("Owner of handler '{handler}' must not be blank")]
    EmptyOwner { handler: String },
}

/// A synchronous handler failed while an event was being published.
///
/// Dispatch stopped at that handler; the handler's own error is kept
/// unchanged in `source`.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Handler '{handler}' failed on {event}: {source}")]
    Handler {
        handler: String,
        owner: String,
        event: &'static str,
        #[source]
        source: HookError,
    },
}

impl PublishError {
    pub(crate) fn handler(registration: &Registration, event: &'static str, source: HookError) -> Self {
        Self::Handler {
            handler: registration.name().to_string(),
            owner: registration.owner().to_string(),
            event,
            source,
        }
    }

    /// Name of the handler that failed.
    pub fn handler_name(&self) -> &str {
        match self {
            Self::Handler { handler, .. } => handler,
        }
    }

    /// The error raised by the handler.
    pub fn hook_error(&self) -> &HookError {
        match self {
            Self::Handler { source, .. } => source,
        }
    }

    pub fn into_hook_error(self) -> HookError {
        match self {
            Self::Handler { source, .. } => source,
        }
    }
}

/// Outcome of an intercepted (BEFORE/AFTER bracketed) operation.
#[derive(Debug, Error)]
pub enum InterceptError<E> {
    /// A handler failed in the given phase. For `Before` the operation never
    /// ran; for `After` it ran but must be reported as failed.
    #[error("{phase} handlers vetoed the operation: {source}")]
    Vetoed {
        phase: Timing,
        #[source]
        source: PublishError,
    },

    /// The operation itself failed; AFTER was not published.
    #[error(transparent)]
    Operation(E),
}

impl<E> InterceptError<E> {
    /// Phase that vetoed, if this is a veto.
    pub fn vetoed_in(&self) -> Option<Timing> {
        match self {
            Self::Vetoed { phase, .. } => Some(*phase),
            Self::Operation(_) => None,
        }
    }
}
