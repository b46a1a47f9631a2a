//! Core event dispatch for Hookline.
//!
//! Business operations publish typed events through an [`EventHub`];
//! independently registered handlers observe them synchronously (inline,
//! able to veto) or asynchronously (on the async lane, failure-isolated).

pub mod error;
pub mod events;

pub use error::{InterceptError, PublishError, RegistryError};
pub use events::{
    AnyEvent, AsyncFnHook, AsyncHook, AsyncLane, DeliveryMode, Event, EventHub, EventHubBuilder,
    ExceptionHandler, FnHook, HandlerId, HandlerRegistry, HookError, LaneConfig, LifecycleEvent,
    LogExceptionHandler, Owner, Registration, SyncHook, Timing, intercept,
};
