//! Handler registry for the typed event system.
//!
//! Registrations are kept per concrete event type, in registration order.
//! Lookups hand out a snapshot so dispatch never holds a registry lock while
//! handlers run (handlers may themselves publish or register).

use std::any::TypeId;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use futures_util::future::BoxFuture;
use tracing::debug;

use super::hooks::{AsyncFnHook, AsyncHook, FnHook, HookError, SyncHook};
use super::types::{AnyEvent, DeliveryMode, Event, HandlerId, Owner};
use crate::error::RegistryError;

pub(crate) type SyncCallback = Arc<dyn Fn(&dyn AnyEvent) -> Result<(), HookError> + Send + Sync>;
pub(crate) type AsyncCallback =
    Arc<dyn Fn(Arc<dyn AnyEvent>) -> BoxFuture<'static, Result<(), HookError>> + Send + Sync>;

#[derive(Clone)]
pub(crate) enum Callback {
    Sync(SyncCallback),
    Async(AsyncCallback),
}

/// One handler bound to one event type.
pub struct Registration {
    id: HandlerId,
    name: String,
    owner: Owner,
    event_type: &'static str,
    callback: Callback,
}

impl Registration {
    pub fn id(&self) -> HandlerId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn owner(&self) -> &Owner {
        &self.owner
    }

    /// Type name of the event this handler was registered for.
    pub fn event_type(&self) -> &'static str {
        self.event_type
    }

    pub fn mode(&self) -> DeliveryMode {
        match self.callback {
            Callback::Sync(_) => DeliveryMode::Sync,
            Callback::Async(_) => DeliveryMode::Async,
        }
    }

    pub(crate) fn callback(&self) -> &Callback {
        &self.callback
    }
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("owner", &self.owner)
            .field("event_type", &self.event_type)
            .field("mode", &self.mode())
            .finish()
    }
}

// ============================================================================
// Handler Registry
// ============================================================================

/// Registry of handlers keyed by concrete event type.
///
/// Read-mostly: lookups happen on every `publish`, writes happen at wiring
/// time. An event type never maps to an empty list; the entry is removed
/// together with its last registration.
///
/// Registering the same hook twice for one type is allowed and makes it
/// fire twice.
pub struct HandlerRegistry {
    handlers: DashMap<TypeId, Vec<Arc<Registration>>>,
    next_id: AtomicU64,
}

impl HandlerRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            handlers: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a synchronous hook for events of type `E`.
    pub fn register_sync<E: Event>(
        &self,
        owner: impl Into<Owner>,
        hook: Arc<dyn SyncHook<E>>,
    ) -> Result<HandlerId, RegistryError> {
        let name = hook.name().to_string();
        let callback: SyncCallback =
            Arc::new(move |event: &dyn AnyEvent| -> Result<(), HookError> {
                match event.downcast_ref::<E>() {
                    Some(typed) => hook.handle(typed),
                    None => Err(mismatch::<E>(event)),
                }
            });
        self.insert::<E>(owner.into(), name, Callback::Sync(callback))
    }

    /// Register an asynchronous hook for events of type `E`.
    pub fn register_async<E: Event>(
        &self,
        owner: impl Into<Owner>,
        hook: Arc<dyn AsyncHook<E>>,
    ) -> Result<HandlerId, RegistryError> {
        let name = hook.name().to_string();
        let callback: AsyncCallback = Arc::new(
            move |event: Arc<dyn AnyEvent>| -> BoxFuture<'static, Result<(), HookError>> {
                let hook = Arc::clone(&hook);
                Box::pin(async move {
                    match event.downcast_ref::<E>() {
                        Some(typed) => hook.handle(typed).await,
                        None => Err(mismatch::<E>(event.as_ref())),
                    }
                })
            },
        );
        self.insert::<E>(owner.into(), name, Callback::Async(callback))
    }

    /// Register a closure as a synchronous handler.
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
        self.register_sync::<E>(owner, Arc::new(FnHook::new(name, f)))
    }

    /// Register an async closure as an asynchronous handler.
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
        self.register_async::<E>(owner, Arc::new(AsyncFnHook::new(name, f)))
    }

    fn insert<E: Event>(
        &self,
        owner: Owner,
        name: String,
        callback: Callback,
    ) -> Result<HandlerId, RegistryError> {
        if name.trim().is_empty() {
            return Err(RegistryError::EmptyName);
        }
        if owner.as_str().trim().is_empty() {
            return Err(RegistryError::EmptyOwner { handler: name });
        }

        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let registration = Arc::new(Registration {
            id,
            name,
            owner,
            event_type: std::any::type_name::<E>(),
            callback,
        });
        debug!(
            handler = %registration.name,
            owner = %registration.owner,
            event = registration.event_type,
            mode = %registration.mode(),
            id = %id,
            "Registered event handler"
        );
        self.handlers
            .entry(TypeId::of::<E>())
            .or_default()
            .push(registration);
        Ok(id)
    }

    /// Remove one registration. Returns whether anything was removed.
    pub fn unregister(&self, id: HandlerId) -> bool {
        let mut removed = 0usize;
        self.handlers.retain(|_, registrations| {
            let before = registrations.len();
            registrations.retain(|r| r.id != id);
            removed += before - registrations.len();
            !registrations.is_empty()
        });
        if removed > 0 {
            debug!(id = %id, "Unregistered event handler");
        }
        removed > 0
    }

    /// Remove every registration made by `owner`. Returns the number removed.
    pub fn unregister_owner(&self, owner: &Owner) -> usize {
        let mut removed = 0usize;
        self.handlers.retain(|_, registrations| {
            let before = registrations.len();
            registrations.retain(|r| &r.owner != owner);
            removed += before - registrations.len();
            !registrations.is_empty()
        });
        if removed > 0 {
            debug!(owner = %owner, removed, "Unregistered owner's event handlers");
        }
        removed
    }

    /// Registrations for exactly `E`, in registration order.
    pub fn handlers_for<E: Event>(&self) -> Vec<Arc<Registration>> {
        self.handlers_for_type(TypeId::of::<E>())
    }

    /// Registrations for the given concrete type, in registration order.
    ///
    /// Returns an empty list when nothing is registered.
    pub fn handlers_for_type(&self, type_id: TypeId) -> Vec<Arc<Registration>> {
        self.handlers
            .get(&type_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    /// Total number of registrations across all event types.
    pub fn handler_count(&self) -> usize {
        self.handlers.iter().map(|entry| entry.value().len()).sum()
    }

    /// Number of event types with at least one registration.
    pub fn event_type_count(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

fn mismatch<E: Event>(event: &dyn AnyEvent) -> HookError {
    HookError::execution(format!(
        "handler for {} received {}",
        std::any::type_name::<E>(),
        event.kind()
    ))
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("event_types", &self.event_type_count())
            .field("handlers", &self.handler_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone)]
    struct Created;
    impl Event for Created {}

    #[derive(Debug, Clone)]
    struct Deleted;
    impl Event for Deleted {}

    fn noop(_: &Created) -> Result<(), HookError> {
        Ok(())
    }

    #[test]
    fn test_registry_keeps_registration_order() {
        let registry = HandlerRegistry::new();
        let first = registry.on_sync("a", "first", noop).unwrap();
        let second = registry
            .on_async("b", "second", |_: Created| async { Ok(()) })
            .unwrap();
        let third = registry.on_sync("a", "third", noop).unwrap();

        let found: Vec<_> = registry.handlers_for::<Created>().iter().map(|r| r.id()).collect();
        assert_eq!(found, vec![first, second, third]);

        let modes: Vec<_> = registry
            .handlers_for::<Created>()
            .iter()
            .map(|r| r.mode())
            .collect();
        assert_eq!(
            modes,
            vec![DeliveryMode::Sync, DeliveryMode::Async, DeliveryMode::Sync]
        );
    }

    #[test]
    fn test_registry_lookup_is_exact_type() {
        let registry = HandlerRegistry::new();
        registry.on_sync("a", "created", noop).unwrap();

        assert_eq!(registry.handlers_for::<Created>().len(), 1);
        assert!(registry.handlers_for::<Deleted>().is_empty());
    }

    #[test]
    fn test_registry_duplicate_registration_is_kept() {
        let registry = HandlerRegistry::new();
        let hook: Arc<dyn SyncHook<Created>> = Arc::new(FnHook::new("dup", noop));
        registry.register_sync("a", hook.clone()).unwrap();
        registry.register_sync("a", hook).unwrap();

        assert_eq!(registry.handlers_for::<Created>().len(), 2);
    }

    #[test]
    fn test_registry_rejects_blank_identity() {
        let registry = HandlerRegistry::new();
        assert!(matches!(
            registry.on_sync("a", "  ", noop),
            Err(RegistryError::EmptyName)
        ));
        assert!(matches!(
            registry.on_sync("", "handler", noop),
            Err(RegistryError::EmptyOwner { .. })
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_unregister_by_id_removes_empty_type() {
        let registry = HandlerRegistry::new();
        let id = registry.on_sync("a", "only", noop).unwrap();
        assert_eq!(registry.event_type_count(), 1);

        assert!(registry.unregister(id));
        assert_eq!(registry.event_type_count(), 0);
        assert!(registry.handlers_for::<Created>().is_empty());

        // Idempotent.
        assert!(!registry.unregister(id));
    }

    #[test]
    fn test_unregister_owner() {
        let registry = HandlerRegistry::new();
        registry.on_sync("cache", "evict", noop).unwrap();
        registry
            .on_sync("cache", "evict_deleted", |_: &Deleted| Ok(()))
            .unwrap();
        let kept = registry.on_sync("audit", "record", noop).unwrap();

        assert_eq!(registry.unregister_owner(&Owner::from("cache")), 2);
        assert_eq!(registry.handler_count(), 1);
        assert_eq!(registry.event_type_count(), 1);
        assert_eq!(registry.handlers_for::<Created>()[0].id(), kept);

        assert_eq!(registry.unregister_owner(&Owner::from("cache")), 0);
    }
}
