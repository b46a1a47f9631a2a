//! Application wiring: event hub, audit pipeline and services.

use std::sync::Arc;

use hookline_audit::{
    AuditError, AuditPipeline, Clock, LogEntry, LogStore, MemoryLogStore, RequestLog, SystemClock,
};
use hookline_core::{EventHub, LogExceptionHandler};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::admin::{AdminAuthService, AdminDirectory};
use crate::collections::{CollectionCacheHandler, CollectionRepository, CollectionService};
use crate::config::AppConfig;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Audit pipeline setup failed: {0}")]
    Audit(#[from] AuditError),

    #[error("Handler registration failed: {0}")]
    Registry(#[from] hookline_core::RegistryError),

    #[error("Configured admin password could not be hashed: {0}")]
    AdminPassword(String),
}

pub struct ApplicationBuilder {
    config: AppConfig,
    store: Option<Arc<dyn LogStore>>,
    clock: Option<Arc<dyn Clock>>,
    directory: Option<Arc<AdminDirectory>>,
}

impl ApplicationBuilder {
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
            store: None,
            clock: None,
            directory: None,
        }
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.config = cfg;
        self
    }

    /// Persist audit entries to `store` instead of the in-memory default.
    pub fn with_log_store(mut self, store: Arc<dyn LogStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_admin_directory(mut self, directory: Arc<AdminDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    /// Build the application. Must be called inside a tokio runtime, as
    /// the async lane spawns its workers here.
    pub fn build(self) -> Result<Application, AppError> {
        let cfg = self.config;

        let hub = Arc::new(
            EventHub::builder()
                .lane(cfg.events.lane_config())
                .exception_handler(LogExceptionHandler)
                .unhandled_handler(|event| {
                    debug!(event = event.kind(), "No handlers registered");
                })
                .build(),
        );

        let audit = if cfg.audit.enabled {
            let store = self
                .store
                .unwrap_or_else(|| Arc::new(MemoryLogStore::new()) as Arc<dyn LogStore>);
            let clock = self
                .clock
                .unwrap_or_else(|| Arc::new(SystemClock) as Arc<dyn Clock>);
            let pipeline = AuditPipeline::new(cfg.audit.settings(), store, clock)?;
            pipeline.register(&hub)?;
            Some(pipeline)
        } else {
            info!("Audit pipeline disabled");
            None
        };

        let directory = self.directory.unwrap_or_default();
        let mut admin_auth = AdminAuthService::new(hub.clone(), directory);
        if cfg.admin.has_identity() {
            admin_auth = admin_auth
                .with_configured_admin(&cfg.admin.identity, &cfg.admin.password)
                .map_err(|e| AppError::AdminPassword(e.to_string()))?;
        }

        let repository = Arc::new(CollectionRepository::new());
        CollectionCacheHandler::new(repository.clone()).register(&hub)?;
        let collections = CollectionService::new(hub.clone(), repository);

        Ok(Application {
            config: cfg,
            hub,
            audit,
            admin_auth,
            collections,
        })
    }
}

impl Default for ApplicationBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Application {
    config: AppConfig,
    hub: Arc<EventHub>,
    audit: Option<AuditPipeline>,
    admin_auth: AdminAuthService,
    collections: CollectionService,
}

impl Application {
    pub fn builder() -> ApplicationBuilder {
        ApplicationBuilder::new()
    }

    /// Start the background audit jobs.
    pub fn start(&self) {
        if let Some(audit) = &self.audit {
            audit.start();
        }
        info!(
            async_workers = self.hub.lane().worker_count(),
            handlers = self.hub.registry().handler_count(),
            "Application started"
        );
    }

    /// Publish the audit entry for a completed request.
    pub fn record_request(&self, request: &RequestLog) {
        if let Err(e) = self.hub.publish(&LogEntry::request(request)) {
            warn!(handler = e.handler_name(), error = %e, "Request log handler failed");
        }
    }

    pub fn hub(&self) -> &Arc<EventHub> {
        &self.hub
    }

    pub fn audit(&self) -> Option<&AuditPipeline> {
        self.audit.as_ref()
    }

    pub fn admin_auth(&self) -> &AdminAuthService {
        &self.admin_auth
    }

    pub fn collections(&self) -> &CollectionService {
        &self.collections
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Drain the async lane first so queued ingestion lands in the buffer,
    /// then stop the audit jobs and flush.
    pub async fn shutdown(&self) {
        self.hub.shutdown().await;
        if let Some(audit) = &self.audit {
            audit.shutdown().await;
        }
        info!("Application stopped");
    }
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application")
            .field("audit", &self.audit)
            .field("admin_auth", &self.admin_auth)
            .field("collections", &self.collections)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_audit_builds_without_pipeline() {
        let mut cfg = AppConfig::default();
        cfg.audit.enabled = false;
        cfg.events.async_workers = Some(1);
        let app = Application::builder().with_config(cfg).build().unwrap();
        assert!(app.audit().is_none());

        // No handler for LogEntry: publication is a no-op.
        app.record_request(&RequestLog::new("GET", "/api/health", 200));
        app.shutdown().await;
    }

    #[tokio::test]
    async fn test_registers_cache_and_audit_handlers() {
        let mut cfg = AppConfig::default();
        cfg.events.async_workers = Some(1);
        let app = Application::builder().with_config(cfg).build().unwrap();
        // log ingest + cache update + cache delete
        assert_eq!(app.hub().registry().handler_count(), 3);
        app.shutdown().await;
    }
}
