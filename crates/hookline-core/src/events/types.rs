//! Event and identity types for the hook system.
//!
//! - `Event` - anything that can be published
//! - `LifecycleEvent` - an event published once BEFORE and once AFTER an operation
//! - `HandlerId` / `Owner` - registration identities

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

// ============================================================================
// Events
// ============================================================================

/// A value published through the [`EventHub`](super::EventHub).
///
/// Routing uses the concrete type only. Publishing a `Wrapper<T>` never
/// reaches handlers registered for `T`.
///
/// Events are cloned once per publication when at least one async handler
/// is registered, so the async lane can own a copy.
pub trait Event: Any + Send + Sync + Clone + fmt::Debug {
    /// Short name used in logs.
    fn event_name(&self) -> &'static str {
        short_type_name(std::any::type_name::<Self>())
    }

    /// Lane affinity for async handlers.
    ///
    /// Events returning the same hash run their async handlers on the same
    /// lane worker, in publication order. `None` spreads work round-robin.
    fn executor_hash(&self) -> Option<u64> {
        None
    }
}

/// Object-safe view of an [`Event`], handed to exception and no-receiver
/// callbacks.
pub trait AnyEvent: Any + Send + Sync + fmt::Debug {
    fn as_any(&self) -> &dyn Any;

    /// Same as [`Event::event_name`], callable through the trait object.
    fn kind(&self) -> &'static str;
}

impl<E: Event> AnyEvent for E {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn kind(&self) -> &'static str {
        Event::event_name(self)
    }
}

impl<'a> dyn AnyEvent + 'a {
    /// Downcast to the concrete event type.
    pub fn downcast_ref<E: Event>(&self) -> Option<&E> {
        self.as_any().downcast_ref::<E>()
    }
}

fn short_type_name(full: &'static str) -> &'static str {
    // Strip the module path but keep generic arguments intact.
    let head = full.split('<').next().unwrap_or(full);
    match head.rfind("::") {
        Some(idx) => &full[idx + 2..],
        None => full,
    }
}

// ============================================================================
// Lifecycle
// ============================================================================

/// When a lifecycle event is published relative to the operation it brackets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Timing {
    /// Published before the operation's effect; a failure aborts the operation.
    Before,
    /// Published after the effect; a failure vetoes the outward success.
    After,
}

impl Timing {
    /// Returns the string representation of the timing.
    pub fn as_str(&self) -> &'static str {
        match self {
            Timing::Before => "before",
            Timing::After => "after",
        }
    }
}

impl fmt::Display for Timing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An event type published twice per operation, once per [`Timing`].
///
/// The same value is mutated between the two publications (timing flipped,
/// result attached), see [`intercept`](super::intercept).
pub trait LifecycleEvent: Event {
    fn timing(&self) -> Timing;

    fn set_timing(&mut self, timing: Timing);

    fn is_before(&self) -> bool {
        self.timing() == Timing::Before
    }

    fn is_after(&self) -> bool {
        self.timing() == Timing::After
    }
}

// ============================================================================
// Registration identities
// ============================================================================

/// How a handler is invoked by `publish`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    /// Inline on the publisher's thread, in registration order, fail-fast.
    Sync,
    /// On the async lane; failures go to the exception handler.
    Async,
}

impl DeliveryMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryMode::Sync => "sync",
            DeliveryMode::Async => "async",
        }
    }
}

impl fmt::Display for DeliveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Identity of a single registration, returned by the register calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(pub(crate) u64);

impl HandlerId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handler-{}", self.0)
    }
}

/// The component that registered a handler.
///
/// Used to remove every registration of a component at once.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Owner(Arc<str>);

impl Owner {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Owner {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for Owner {
    fn from(name: String) -> Self {
        Self(Arc::from(name))
    }
}

impl From<&Owner> for Owner {
    fn from(owner: &Owner) -> Self {
        owner.clone()
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
