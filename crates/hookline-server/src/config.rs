use std::time::Duration;

use hookline_audit::{AuditSettings, DEFAULT_IGNORE_PATTERN, IgnoreFilter};
use hookline_core::LaneConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub events: EventsConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    /// Admin account accepted by password auth. When `identity` is empty,
    /// admins are looked up in the directory instead.
    #[serde(default)]
    pub admin: AdminConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        // Logging validation
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        // Event hub validations
        if self.events.async_workers == Some(0) {
            return Err("events.async_workers must be > 0".into());
        }
        if self.events.shutdown_timeout_ms == 0 {
            return Err("events.shutdown_timeout_ms must be > 0".into());
        }
        // Audit validations
        if self.audit.capacity == 0 {
            return Err("audit.capacity must be > 0".into());
        }
        if self.audit.batch_size == 0 {
            return Err("audit.batch_size must be > 0".into());
        }
        if self.audit.drain_interval_secs == 0 || self.audit.prune_interval_secs == 0 {
            return Err("audit intervals must be > 0".into());
        }
        if self.audit.retention_days == 0 {
            return Err("audit.retention_days must be > 0".into());
        }
        if let Some(pattern) = self.audit.ignore_pattern.as_deref() {
            IgnoreFilter::new(pattern)
                .map_err(|e| format!("audit.ignore_pattern is not a valid regex: {e}"))?;
        }
        // Admin validation
        if self.admin.has_identity() && self.admin.password.is_empty() {
            return Err("admin.identity requires admin.password".into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}
fn default_log_level() -> String {
    "info".into()
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConfig {
    /// Async lane workers; defaults to `max(cpus, 4) * 2 + 1`.
    #[serde(default)]
    pub async_workers: Option<usize>,
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
}
fn default_shutdown_timeout_ms() -> u64 {
    10_000
}
impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            async_workers: None,
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
        }
    }
}
impl EventsConfig {
    pub fn lane_config(&self) -> LaneConfig {
        let mut lane = LaneConfig::default()
            .with_shutdown_timeout(Duration::from_millis(self.shutdown_timeout_ms));
        if let Some(workers) = self.async_workers {
            lane = lane.with_workers(workers);
        }
        lane
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_drain_interval_secs")]
    pub drain_interval_secs: u64,
    #[serde(default = "default_prune_interval_secs")]
    pub prune_interval_secs: u64,
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    /// Messages matching this regex are not ingested. Set to an empty
    /// string to ingest everything.
    #[serde(default = "default_ignore_pattern")]
    pub ignore_pattern: Option<String>,
}
fn default_true() -> bool {
    true
}
fn default_capacity() -> usize {
    10_000
}
fn default_batch_size() -> usize {
    1_000
}
fn default_drain_interval_secs() -> u64 {
    30
}
fn default_prune_interval_secs() -> u64 {
    86_400
}
fn default_retention_days() -> u32 {
    7
}
fn default_ignore_pattern() -> Option<String> {
    Some(DEFAULT_IGNORE_PATTERN.to_string())
}
impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: default_capacity(),
            batch_size: default_batch_size(),
            drain_interval_secs: default_drain_interval_secs(),
            prune_interval_secs: default_prune_interval_secs(),
            retention_days: default_retention_days(),
            ignore_pattern: default_ignore_pattern(),
        }
    }
}
impl AuditConfig {
    pub fn settings(&self) -> AuditSettings {
        AuditSettings {
            capacity: self.capacity,
            batch_size: self.batch_size,
            drain_interval: Duration::from_secs(self.drain_interval_secs),
            prune_interval: Duration::from_secs(self.prune_interval_secs),
            retention: time::Duration::days(i64::from(self.retention_days)),
            ignore_pattern: self
                .ignore_pattern
                .clone()
                .filter(|p| !p.trim().is_empty()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AdminConfig {
    #[serde(default)]
    pub identity: String,
    #[serde(default)]
    pub password: String,
}
impl AdminConfig {
    pub fn has_identity(&self) -> bool {
        !self.identity.trim().is_empty()
    }
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File};
    use std::path::{Path, PathBuf};

    pub const DEFAULT_CONFIG_PATH: &str = "hookline.toml";

    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let mut builder = Config::builder();
        let pathbuf = PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_PATH));
        if pathbuf.exists() {
            builder = builder.add_source(File::from(pathbuf));
        }
        // Environment variable overrides, e.g., HOOKLINE__AUDIT__BATCH_SIZE=500
        builder = builder.add_source(
            Environment::with_prefix("HOOKLINE")
                .prefix_separator("__")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        merged.validate()?;
        Ok(merged)
    }

    pub fn load_config_with_default_path<P: AsRef<Path>>(
        path: Option<P>,
    ) -> Result<AppConfig, String> {
        let p = path
            .as_ref()
            .map(|p| p.as_ref().to_string_lossy().to_string());
        load_config(p.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = AppConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.audit.capacity, 10_000);
        assert_eq!(cfg.audit.batch_size, 1_000);
        assert_eq!(cfg.audit.settings().retention, time::Duration::days(7));
        assert_eq!(
            cfg.events.lane_config().shutdown_timeout,
            Duration::from_secs(10)
        );
    }

    #[test]
    fn test_validation_rejects_zero_and_bad_regex() {
        let mut cfg = AppConfig::default();
        cfg.audit.batch_size = 0;
        assert!(cfg.validate().unwrap_err().contains("batch_size"));

        let mut cfg = AppConfig::default();
        cfg.events.async_workers = Some(0);
        assert!(cfg.validate().is_err());

        let mut cfg = AppConfig::default();
        cfg.audit.ignore_pattern = Some("([".into());
        assert!(cfg.validate().unwrap_err().contains("ignore_pattern"));

        let mut cfg = AppConfig::default();
        cfg.admin.identity = "root@example.com".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_blank_ignore_pattern_disables_filter() {
        let mut cfg = AuditConfig::default();
        cfg.ignore_pattern = Some(String::new());
        assert!(cfg.settings().ignore_pattern.is_none());
    }
}
