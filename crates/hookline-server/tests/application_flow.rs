//! Application wiring: request logs reach the store, collections evict caches.

use std::sync::Arc;

use hookline_audit::{LEVEL_ERROR, LEVEL_INFO, LogStore, MemoryLogStore, RequestLog};
use hookline_server::config::AppConfig;
use hookline_server::{Application, CollectionForm};

fn config() -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.events.async_workers = Some(2);
    cfg
}

#[tokio::test]
async fn request_logs_are_flushed_on_shutdown() {
    let store = Arc::new(MemoryLogStore::new());
    let app = Application::builder()
        .with_config(config())
        .with_log_store(store.clone() as Arc<dyn LogStore>)
        .build()
        .expect("build app");
    app.start();

    app.record_request(&RequestLog::new("get", "/api/collections", 200));
    app.record_request(&RequestLog::new("POST", "/api/admins/auth-with-password", 400));
    // Matches the default ignore pattern.
    app.record_request(&RequestLog::new("GET", "/api/logs/stats", 200));

    app.shutdown().await;

    let entries = store.entries().await;
    assert_eq!(entries.len(), 2);
    let by_url = |url: &str| {
        entries
            .iter()
            .find(|e| e.message == url)
            .cloned()
            .expect("entry for url")
    };
    let ok = by_url("/api/collections");
    assert_eq!(ok.level, LEVEL_INFO);
    assert_eq!(ok.data["method"], "GET");
    assert_eq!(by_url("/api/admins/auth-with-password").level, LEVEL_ERROR);
}

#[tokio::test]
async fn configured_admin_can_log_in() {
    let mut cfg = config();
    cfg.audit.enabled = false;
    cfg.admin.identity = "root@example.com".into();
    cfg.admin.password = "rootpass".into();
    let app = Application::builder()
        .with_config(cfg)
        .build()
        .expect("build app");

    let login = app
        .admin_auth()
        .auth_with_password(&hookline_server::AdminLogin::new("ROOT@example.com", "rootpass"))
        .expect("configured admin login");
    assert_eq!(login.admin.id, hookline_server::admin::CONFIG_ADMIN_ID);
    app.shutdown().await;
}

#[tokio::test]
async fn collection_rename_evicts_old_name() {
    let app = Application::builder()
        .with_config(config())
        .build()
        .expect("build app");
    let collections = app.collections();

    let created = collections
        .create(&CollectionForm::new("drafts"))
        .expect("create");
    collections.view("drafts").expect("view by name");
    assert!(collections.repository().is_cached("drafts"));

    collections
        .update(&created.id, &CollectionForm::new("posts"))
        .expect("rename");
    assert!(!collections.repository().is_cached("drafts"));
    assert!(collections.view("drafts").is_err());
    assert_eq!(collections.view("posts").expect("view renamed").id, created.id);

    app.shutdown().await;
}
