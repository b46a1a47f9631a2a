//! Typed event system for in-process hooks.
//!
//! This module provides the dispatch infrastructure that decouples
//! cross-cutting concerns (audit logging, cache invalidation, auth
//! interception) from the operations that trigger them.
//!
//! # Architecture
//!
//! ```text
//!              publish(&event)
//!                    │
//!                    ▼
//!         ┌─────────────────────┐      exact TypeId lookup
//!         │      EventHub       │ ───────────────────────────┐
//!         └─────────────────────┘                            ▼
//!            │              │                    ┌──────────────────┐
//!     SYNC   │              │  ASYNC             │ HandlerRegistry  │
//!   (inline, │              │  (worker pool,     └──────────────────┘
//!  fail-fast)│              │   isolated)
//!            ▼              ▼
//!      ┌──────────┐   ┌───────────┐  failures   ┌──────────────────┐
//!      │ SyncHook │   │ AsyncLane │ ──────────▶ │ ExceptionHandler │
//!      └──────────┘   └───────────┘             └──────────────────┘
//! ```
//!
//! # Features
//!
//! - **Exact-type routing**: handlers are keyed by the concrete event type;
//!   no supertype or trait-object broadcast.
//! - **Sync handlers** run on the publisher's stack in registration order;
//!   the first failure stops dispatch and is returned to the publisher.
//! - **Async handlers** run on a fixed pool of lane workers; their failures
//!   and panics go to an injectable exception handler.
//! - **Lifecycle**: [`intercept`] brackets an operation with BEFORE/AFTER
//!   publications so handlers can veto it.
//!
//! # Example
//!
//! ```ignore
//! use hookline_core::events::{Event, EventHub, HookError};
//!
//! #[derive(Debug, Clone)]
//! struct CacheCleared { key: String }
//! impl Event for CacheCleared {}
//!
//! let hub = EventHub::builder().build();
//! hub.on_sync("cache", "log_clear", |e: &CacheCleared| {
//!     tracing::info!(key = %e.key, "cleared");
//!     Ok(())
//! })?;
//! hub.publish(&CacheCleared { key: "users".into() })?;
//! ```
//!
//! # Module Structure
//!
//! - [`types`]: `Event`, `LifecycleEvent`, `Timing`, identities
//! - [`hooks`]: handler traits and `HookError`
//! - [`registry`]: per-type ordered registrations
//! - [`lane`]: async worker pool
//! - [`hub`]: the dispatcher and exception routing
//! - [`lifecycle`]: BEFORE/AFTER interception helper

pub mod hooks;
pub mod hub;
pub mod lane;
pub mod lifecycle;
pub mod registry;
pub mod types;

pub use hooks::{AsyncFnHook, AsyncHook, FnHook, HookError, SyncHook};
pub use hub::{EventHub, EventHubBuilder, ExceptionHandler, LogExceptionHandler, UnhandledFn};
pub use lane::{AsyncLane, LaneConfig};
pub use lifecycle::intercept;
pub use registry::{HandlerRegistry, Registration};
pub use types::{AnyEvent, DeliveryMode, Event, HandlerId, LifecycleEvent, Owner, Timing};
