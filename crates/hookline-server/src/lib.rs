pub mod admin;
pub mod api;
pub mod app;
pub mod collections;
pub mod config;
pub mod credentials;
pub mod observability;
pub mod shutdown;

pub use admin::{
    AdminAuthRequestEvent, AdminAuthService, AdminAuthWithPasswordEvent, AdminDirectory,
    AdminLogin, AdminLoginResult,
};
pub use api::{ApiError, FailureResponse};
pub use app::{AppError, Application, ApplicationBuilder};
pub use collections::{
    Collection, CollectionCacheHandler, CollectionCreateEvent, CollectionDeleteEvent,
    CollectionForm, CollectionRepository, CollectionService, CollectionUpdateEvent,
    CollectionViewEvent, CollectionsListEvent,
};
pub use config::AppConfig;
pub use observability::init_tracing;
