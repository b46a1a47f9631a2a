//! Collection CRUD with lifecycle events and cache invalidation.
//!
//! Create, update and delete are bracketed by BEFORE/AFTER events; a sync
//! [`CollectionCacheHandler`] evicts cached lookups on the AFTER phase of
//! update and delete.

use std::sync::Arc;

use dashmap::DashMap;
use hookline_core::{
    Event, EventHub, HandlerId, HookError, LifecycleEvent, RegistryError, SyncHook, Timing,
    intercept,
};
use serde::{Deserialize, Serialize};
use serde_json::Map;
use time::OffsetDateTime;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::api::{ApiError, required_field};

/// Owner of the cache invalidation registrations.
pub const CACHE_OWNER: &str = "collection_cache";

const CREATE_FAILED: &str = "Failed to create the collection.";
const UPDATE_FAILED: &str = "Failed to update the collection.";
const DELETE_FAILED: &str = "Failed to delete the collection.";
const VIEW_FAILED: &str = "Failed to view the collection.";
const LIST_FAILED: &str = "Failed to list the collections.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionKind {
    #[default]
    Base,
    Auth,
    View,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Collection {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: CollectionKind,
    pub system: bool,
    pub fields: Vec<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated: OffsetDateTime,
}

// ============================================================================
// Events
// ============================================================================

macro_rules! lifecycle_event {
    ($(#[$meta:meta])* $name:ident { $($field:ident : $ty:ty),* $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone)]
        pub struct $name {
            pub timing: Timing,
            $(pub $field: $ty,)*
        }

        impl Event for $name {}

        impl LifecycleEvent for $name {
            fn timing(&self) -> Timing {
                self.timing
            }

            fn set_timing(&mut self, timing: Timing) {
                self.timing = timing;
            }
        }
    };
}

lifecycle_event!(
    /// Published BEFORE and AFTER a collection is stored for the first time.
    CollectionCreateEvent { collection: Collection }
);

lifecycle_event!(
    /// Published BEFORE and AFTER a collection is replaced. `previous` is the
    /// stored state the update started from.
    CollectionUpdateEvent {
        collection: Collection,
        previous: Collection,
    }
);

lifecycle_event!(
    /// Published BEFORE and AFTER a collection is removed.
    CollectionDeleteEvent { collection: Collection }
);

/// Published when a single collection is viewed.
#[derive(Debug, Clone)]
pub struct CollectionViewEvent {
    pub collection: Collection,
}

impl Event for CollectionViewEvent {}

/// Published when the collection list is read.
#[derive(Debug, Clone)]
pub struct CollectionsListEvent {
    pub collections: Vec<Collection>,
}

impl Event for CollectionsListEvent {}

// ============================================================================
// Repository
// ============================================================================

/// Collection storage with a lookup cache keyed by id and by lowercase name.
#[derive(Debug, Default)]
pub struct CollectionRepository {
    rows: DashMap<String, Collection>,
    by_id: DashMap<String, Collection>,
    by_name: DashMap<String, Collection>,
}

impl CollectionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Find by id or name (case insensitive), filling the cache on a miss.
    ///
    /// Cached entries are stored only under the collection's id and its
    /// lowercase name, whatever key the lookup used.
    pub fn find(&self, id_or_name: &str) -> Option<Collection> {
        let name_key = id_or_name.to_ascii_lowercase();
        let hit = self
            .by_id
            .get(id_or_name)
            .or_else(|| self.by_name.get(&name_key))
            .map(|r| r.value().clone());
        if let Some(hit) = hit {
            trace!(key = id_or_name, "Collection cache hit");
            return Some(hit);
        }

        let found = self.rows.get(id_or_name).map(|r| r.value().clone()).or_else(|| {
            self.rows
                .iter()
                .find(|r| r.value().name.to_ascii_lowercase() == name_key)
                .map(|r| r.value().clone())
        })?;
        self.by_id.insert(found.id.clone(), found.clone());
        self.by_name
            .insert(found.name.to_ascii_lowercase(), found.clone());
        Some(found)
    }

    pub fn name_taken(&self, name: &str, except_id: Option<&str>) -> bool {
        self.rows.iter().any(|r| {
            r.value().name.eq_ignore_ascii_case(name) && Some(r.key().as_str()) != except_id
        })
    }

    pub fn save(&self, collection: Collection) {
        self.rows.insert(collection.id.clone(), collection);
    }

    pub fn delete(&self, id: &str) -> Option<Collection> {
        self.rows.remove(id).map(|(_, c)| c)
    }

    /// All collections ordered by creation time.
    pub fn list(&self) -> Vec<Collection> {
        let mut all: Vec<_> = self.rows.iter().map(|r| r.value().clone()).collect();
        all.sort_by(|a, b| a.created.cmp(&b.created).then_with(|| a.name.cmp(&b.name)));
        all
    }

    /// Drop the cache entry stored under `key` as an id or as a name.
    pub fn remove_cache(&self, key: &str) {
        self.by_id.remove(key);
        self.by_name.remove(&key.to_ascii_lowercase());
    }

    pub fn is_cached(&self, key: &str) -> bool {
        self.by_id.contains_key(key) || self.by_name.contains_key(&key.to_ascii_lowercase())
    }
}

// ============================================================================
// Cache invalidation
// ============================================================================

/// Evicts cached lookups once an update or delete has completed.
pub struct CollectionCacheHandler {
    repository: Arc<CollectionRepository>,
}

impl CollectionCacheHandler {
    pub fn new(repository: Arc<CollectionRepository>) -> Self {
        Self { repository }
    }

    /// Register for update and delete events.
    pub fn register(self, hub: &EventHub) -> Result<Vec<HandlerId>, RegistryError> {
        let handler = Arc::new(self);
        Ok(vec![
            hub.register_sync::<CollectionUpdateEvent>(CACHE_OWNER, handler.clone())?,
            hub.register_sync::<CollectionDeleteEvent>(CACHE_OWNER, handler)?,
        ])
    }

    fn evict(&self, collection: &Collection) {
        self.repository.remove_cache(&collection.id);
        self.repository.remove_cache(&collection.name);
        debug!(collection = %collection.name, "Evicted collection cache");
    }
}

impl SyncHook<CollectionUpdateEvent> for CollectionCacheHandler {
    fn name(&self) -> &str {
        "collection_cache_update"
    }

    fn handle(&self, event: &CollectionUpdateEvent) -> Result<(), HookError> {
        if event.is_after() {
            self.evict(&event.collection);
            if event.previous.name != event.collection.name {
                self.repository.remove_cache(&event.previous.name);
            }
        }
        Ok(())
    }
}

impl SyncHook<CollectionDeleteEvent> for CollectionCacheHandler {
    fn name(&self) -> &str {
        "collection_cache_delete"
    }

    fn handle(&self, event: &CollectionDeleteEvent) -> Result<(), HookError> {
        if event.is_after() {
            self.evict(&event.collection);
        }
        Ok(())
    }
}

// ============================================================================
// Service
// ============================================================================

/// Submitted create/update form.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CollectionForm {
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "type")]
    pub kind: CollectionKind,
    #[serde(default)]
    pub fields: Vec<String>,
}

impl CollectionForm {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    fn validate(&self) -> Result<(), ApiError> {
        let mut errors = Map::new();
        if self.name.trim().is_empty() {
            errors.insert("name".into(), required_field());
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ApiError::validation(errors))
        }
    }
}

pub struct CollectionService {
    hub: Arc<EventHub>,
    repository: Arc<CollectionRepository>,
}

impl CollectionService {
    pub fn new(hub: Arc<EventHub>, repository: Arc<CollectionRepository>) -> Self {
        Self { hub, repository }
    }

    pub fn repository(&self) -> &Arc<CollectionRepository> {
        &self.repository
    }

    pub fn list(&self) -> Result<Vec<Collection>, ApiError> {
        let collections = self.repository.list();
        let event = CollectionsListEvent {
            collections: collections.clone(),
        };
        self.hub
            .publish(&event)
            .map_err(|e| ApiError::from_publish(e, LIST_FAILED))?;
        Ok(collections)
    }

    pub fn view(&self, id_or_name: &str) -> Result<Collection, ApiError> {
        let collection = self.find(id_or_name)?;
        let event = CollectionViewEvent {
            collection: collection.clone(),
        };
        self.hub
            .publish(&event)
            .map_err(|e| ApiError::from_publish(e, VIEW_FAILED))?;
        Ok(collection)
    }

    pub fn create(&self, form: &CollectionForm) -> Result<Collection, ApiError> {
        form.validate()?;
        if self.repository.name_taken(&form.name, None) {
            return Err(name_taken());
        }

        let now = OffsetDateTime::now_utc();
        let mut event = CollectionCreateEvent {
            timing: Timing::Before,
            collection: Collection {
                id: Uuid::new_v4().simple().to_string(),
                name: form.name.trim().to_string(),
                kind: form.kind,
                system: false,
                fields: form.fields.clone(),
                created: now,
                updated: now,
            },
        };

        intercept(&self.hub, &mut event, |event| -> Result<(), ApiError> {
            self.repository.save(event.collection.clone());
            Ok(())
        })
        .map_err(|e| ApiError::from_intercept(e, CREATE_FAILED))?;

        Ok(event.collection)
    }

    pub fn update(&self, id_or_name: &str, form: &CollectionForm) -> Result<Collection, ApiError> {
        form.validate()?;
        let previous = self.find(id_or_name)?;
        if self.repository.name_taken(&form.name, Some(&previous.id)) {
            return Err(name_taken());
        }

        let mut collection = previous.clone();
        collection.name = form.name.trim().to_string();
        collection.kind = form.kind;
        collection.fields = form.fields.clone();

        let mut event = CollectionUpdateEvent {
            timing: Timing::Before,
            collection,
            previous,
        };

        intercept(&self.hub, &mut event, |event| -> Result<(), ApiError> {
            event.collection.updated = OffsetDateTime::now_utc();
            self.repository.save(event.collection.clone());
            Ok(())
        })
        .map_err(|e| ApiError::from_intercept(e, UPDATE_FAILED))?;

        Ok(event.collection)
    }

    pub fn delete(&self, id_or_name: &str) -> Result<(), ApiError> {
        let collection = self.find(id_or_name)?;
        if collection.system {
            return Err(ApiError::bad_request("System collections cannot be deleted."));
        }

        let mut event = CollectionDeleteEvent {
            timing: Timing::Before,
            collection,
        };

        intercept(&self.hub, &mut event, |event| -> Result<(), ApiError> {
            self.repository
                .delete(&event.collection.id)
                .map(|_| ())
                .ok_or_else(|| ApiError::not_found("The requested resource wasn't found."))
        })
        .map_err(|e| ApiError::from_intercept(e, DELETE_FAILED))
    }

    fn find(&self, id_or_name: &str) -> Result<Collection, ApiError> {
        self.repository
            .find(id_or_name)
            .ok_or_else(|| ApiError::not_found("The requested resource wasn't found."))
    }
}

impl std::fmt::Debug for CollectionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionService")
            .field("repository", &self.repository)
            .finish_non_exhaustive()
    }
}

fn name_taken() -> ApiError {
    let mut errors = Map::new();
    errors.insert(
        "name".into(),
        serde_json::json!({
            "code": "validation_collection_name_exists",
            "message": "Collection name must be unique (case insensitive).",
        }),
    );
    ApiError::validation(errors)
}
