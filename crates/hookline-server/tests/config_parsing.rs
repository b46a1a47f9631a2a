use std::{env, fs};

use hookline_server::config::loader::load_config;

#[test]
fn config_parsing_and_env_overrides_and_validation() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let path = dir.path().join("hookline.toml");

    let toml_content = r#"
[logging]
level = "debug"

[events]
async_workers = 3
shutdown_timeout_ms = 2500

[audit]
capacity = 500
batch_size = 50
drain_interval_secs = 5
retention_days = 14
ignore_pattern = ""

[admin]
identity = "root@example.com"
password = "rootpass"
"#;
    fs::write(&path, toml_content).expect("write toml");

    // 1) Valid config parses
    let cfg = load_config(path.to_str()).expect("should parse config");
    assert_eq!(cfg.logging.level, "debug");
    assert_eq!(cfg.events.async_workers, Some(3));
    assert_eq!(cfg.events.shutdown_timeout_ms, 2500);
    assert_eq!(cfg.audit.capacity, 500);
    assert_eq!(cfg.audit.batch_size, 50);
    assert_eq!(cfg.audit.prune_interval_secs, 86_400);
    assert!(cfg.audit.settings().ignore_pattern.is_none());
    assert_eq!(
        cfg.audit.settings().retention,
        time::Duration::days(14)
    );
    assert!(cfg.admin.has_identity());

    // 2) Env override should win over file
    unsafe {
        env::set_var("HOOKLINE__AUDIT__BATCH_SIZE", "25");
    }
    let cfg_env = load_config(path.to_str()).expect("should parse config with env overrides");
    assert_eq!(cfg_env.audit.batch_size, 25);
    unsafe {
        env::remove_var("HOOKLINE__AUDIT__BATCH_SIZE");
    }

    // 3) Invalid config should error
    let invalid_path = dir.path().join("invalid.toml");
    let invalid_toml = r#"
[audit]
capacity = 0
"#;
    fs::write(&invalid_path, invalid_toml).expect("write invalid toml");
    let err = load_config(invalid_path.to_str()).expect_err("expected validation error");
    assert!(err.contains("audit.capacity must be > 0"));

    let bad_regex_path = dir.path().join("bad_regex.toml");
    fs::write(&bad_regex_path, "[audit]\nignore_pattern = \"([\"\n").expect("write toml");
    let err = load_config(bad_regex_path.to_str()).expect_err("expected regex error");
    assert!(err.contains("ignore_pattern"));
}

#[test]
fn missing_file_falls_back_to_defaults() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let path = dir.path().join("absent.toml");

    let cfg = load_config(path.to_str()).expect("defaults should load");
    assert!(cfg.audit.enabled);
    assert_eq!(cfg.audit.capacity, 10_000);
    assert!(!cfg.admin.has_identity());
}
