//! The event hub: registry, dispatcher and async lane in one context object.
//!
//! `publish` resolves the handlers registered for the event's concrete type
//! and walks them in registration order. Sync handlers run inline and the
//! first failure is returned to the publisher; async handlers are queued on
//! the lane and their failures are routed to the [`ExceptionHandler`].

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use arc_swap::ArcSwap;
use futures_util::FutureExt;
use tracing::{debug, error, warn};

use super::hooks::{AsyncHook, HookError, SyncHook};
use super::lane::{AsyncLane, LaneConfig};
use super::registry::{AsyncCallback, Callback, HandlerRegistry, Registration};
use super::types::{AnyEvent, Event, HandlerId, Owner};
use crate::error::{PublishError, RegistryError};

// ============================================================================
// Exception routing
// ============================================================================

/// Receives every failure of an asynchronous handler.
///
/// Called on a lane worker. Must not block for long; a panic here is
/// contained by the lane.
pub trait ExceptionHandler: Send + Sync {
    fn on_failure(&self, registration: &Registration, event: &dyn AnyEvent, error: &HookError);
}

impl<F> ExceptionHandler for F
where
    F: Fn(&Registration, &dyn AnyEvent, &HookError) + Send + Sync,
{
    fn on_failure(&self, registration: &Registration, event: &dyn AnyEvent, error: &HookError) {
        self(registration, event, error)
    }
}

/// Default exception handler: log and continue.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogExceptionHandler;

impl ExceptionHandler for LogExceptionHandler {
    fn on_failure(&self, registration: &Registration, event: &dyn AnyEvent, error: &HookError) {
        match error {
            HookError::Panicked(_) => error!(
                handler = %registration.name(),
                owner = %registration.owner(),
                event = event.kind(),
                error = %error,
                "Async handler panicked"
            ),
            _ => warn!(
                handler = %registration.name(),
                owner = %registration.owner(),
                event = event.kind(),
                error = %error,
                "Async handler failed"
            ),
        }
    }
}

/// Callback for events published with no registered handlers.
pub type UnhandledFn = Box<dyn Fn(&dyn AnyEvent) + Send + Sync>;

fn log_unhandled() -> UnhandledFn {
    Box::new(|event: &dyn AnyEvent| {
        debug!(event = event.kind(), "No handlers registered for event");
    })
}

// ============================================================================
// Event Hub
// ============================================================================

/// Publishes events to registered handlers.
///
/// Owned by the application context and shared as `Arc<EventHub>`; there is
/// no global instance. Must be built inside a tokio runtime because the
/// async lane spawns its workers on construction.
pub struct EventHub {
    registry: HandlerRegistry,
    lane: AsyncLane,
    sink: Arc<ArcSwap<Box<dyn ExceptionHandler>>>,
    unhandled: ArcSwap<UnhandledFn>,
}

impl EventHub {
    pub fn builder() -> EventHubBuilder {
        EventHubBuilder::new()
    }

    /// Hub with default lane sizing and logging exception handler.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Deliver `event` to every handler registered for its exact type.
    ///
    /// Returns once all sync handlers have completed. Async handlers are
    /// queued and may not have run yet. If a sync handler fails, later
    /// handlers (sync or async) are skipped for this publication.
    pub fn publish<E: Event>(&self, event: &E) -> Result<(), PublishError> {
        let erased: &dyn AnyEvent = event;
        let registrations = self.registry.handlers_for::<E>();
        if registrations.is_empty() {
            let unhandled = self.unhandled.load();
            let callback: &UnhandledFn = &unhandled;
            callback(erased);
            return Ok(());
        }

        // Cloned at most once, on the first async handler.
        let mut shared: Option<Arc<dyn AnyEvent>> = None;

        for registration in &registrations {
            match registration.callback() {
                Callback::Sync(callback) => {
                    if let Err(err) = callback(erased) {
                        debug!(
                            handler = %registration.name(),
                            event = event.event_name(),
                            error = %err,
                            "Sync handler failed, stopping dispatch"
                        );
                        return Err(PublishError::handler(registration, event.event_name(), err));
                    }
                }
                Callback::Async(callback) => {
                    let event_arc = shared
                        .get_or_insert_with(|| Arc::new(event.clone()) as Arc<dyn AnyEvent>)
                        .clone();
                    self.dispatch_async(registration, callback, event_arc, event.executor_hash());
                }
            }
        }

        Ok(())
    }

    fn dispatch_async(
        &self,
        registration: &Arc<Registration>,
        callback: &AsyncCallback,
        event: Arc<dyn AnyEvent>,
        affinity: Option<u64>,
    ) {
        let job_registration = Arc::clone(registration);
        let job_callback = Arc::clone(callback);
        let job_event = Arc::clone(&event);
        let sink = Arc::clone(&self.sink);

        let job = async move {
            let invocation = async { job_callback(Arc::clone(&job_event)).await };
            let error = match AssertUnwindSafe(invocation).catch_unwind().await {
                Ok(Ok(())) => return,
                Ok(Err(err)) => err,
                Err(payload) => HookError::Panicked(panic_message(payload.as_ref())),
            };
            sink.load()
                .on_failure(&job_registration, job_event.as_ref(), &error);
        };

        if let Err(err) = self.lane.submit(affinity, job) {
            self.sink.load().on_failure(registration, event.as_ref(), &err);
        }
    }

    // ------------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------------

    pub fn register_sync<E: Event>(
        &self,
        owner: impl Into<Owner>,
        hook: Arc<dyn SyncHook<E>>,
    ) -> Result<HandlerId, RegistryError> {
        self.registry.register_sync(owner, hook)
    }

    pub fn register_async<E: Event>(
        &self,
        owner: impl Into<Owner>,
        hook: Arc<dyn AsyncHook<E>>,
    ) -> Result<HandlerId, RegistryError> {
        self.registry.register_async(owner, hook)
    }

    pub fn on_sync<E, F>(
        &self,
        owner: impl Into<Owner>,
        name: impl Into<String>,
        f: F,
    ) -> Result<HandlerId, RegistryError>
    where
        E: Event,
        F: Fn(&E) -> Result<(), HookError> + Send + Sync + 'static,
    {
        self.registry.on_sync(owner, name, f)
    }

    pub fn on_async<E, F, Fut>(
        &self,
        owner: impl Into<Owner>,
        name: impl Into<String>,
        f: F,
    ) -> Result<HandlerId, RegistryError>
    where
        E: Event,
        F: Fn(E) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HookError>> + Send + 'static,
    {
        self.registry.on_async(owner, name, f)
    }

    pub fn unregister(&self, id: HandlerId) -> bool {
        self.registry.unregister(id)
    }

    pub fn unregister_owner(&self, owner: &Owner) -> usize {
        self.registry.unregister_owner(owner)
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    // ------------------------------------------------------------------------
    // Configuration
    // ------------------------------------------------------------------------

    /// Replace the async failure sink. Takes effect for failures reported
    /// after the call, including jobs already queued.
    pub fn set_exception_handler(&self, handler: impl ExceptionHandler + 'static) {
        self.sink.store(Arc::new(Box::new(handler)));
    }

    /// Replace the callback invoked for events nobody listens to.
    pub fn set_unhandled_handler<F>(&self, f: F)
    where
        F: Fn(&dyn AnyEvent) + Send + Sync + 'static,
    {
        self.unhandled.store(Arc::new(Box::new(f)));
    }

    pub fn lane(&self) -> &AsyncLane {
        &self.lane
    }

    /// Stop the async lane, letting queued invocations finish.
    ///
    /// Async handlers published afterwards are reported to the exception
    /// handler as [`HookError::LaneClosed`]; sync handlers keep working.
    pub async fn shutdown(&self) {
        self.lane.shutdown().await;
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHub")
            .field("registry", &self.registry)
            .field("lane", &self.lane)
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`EventHub`].
pub struct EventHubBuilder {
    lane: LaneConfig,
    exception_handler: Option<Box<dyn ExceptionHandler>>,
    unhandled: Option<UnhandledFn>,
}

impl EventHubBuilder {
    pub fn new() -> Self {
        Self {
            lane: LaneConfig::default(),
            exception_handler: None,
            unhandled: None,
        }
    }

    pub fn lane(mut self, config: LaneConfig) -> Self {
        self.lane = config;
        self
    }

    pub fn exception_handler(mut self, handler: impl ExceptionHandler + 'static) -> Self {
        self.exception_handler = Some(Box::new(handler));
        self
    }

    pub fn unhandled_handler<F>(mut self, f: F) -> Self
    where
        F: Fn(&dyn AnyEvent) + Send + Sync + 'static,
    {
        self.unhandled = Some(Box::new(f));
        self
    }

    /// Build the hub and start its async lane.
    pub fn build(self) -> EventHub {
        let sink = self
            .exception_handler
            .unwrap_or_else(|| Box::new(LogExceptionHandler));
        EventHub {
            registry: HandlerRegistry::new(),
            lane: AsyncLane::start(self.lane),
            sink: Arc::new(ArcSwap::from_pointee(sink)),
            unhandled: ArcSwap::from_pointee(self.unhandled.unwrap_or_else(log_unhandled)),
        }
    }
}

impl Default for EventHubBuilder {
    fn default() -> Self {
        Self::new()
    }
}
