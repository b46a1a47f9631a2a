//! Structured log entries carried through the ingestion pipeline.

use std::time::Duration;

use hookline_core::Event;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use time::OffsetDateTime;
use uuid::Uuid;

/// Level for successful requests.
pub const LEVEL_INFO: i32 = 0;
/// Level for requests that did not answer 200.
pub const LEVEL_ERROR: i32 = 8;

/// One audit log record.
///
/// Published as an event by request-processing code and buffered by the
/// ingestion handler until the drain job persists it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated: OffsetDateTime,
    pub level: i32,
    pub message: String,
    #[serde(default)]
    pub data: Map<String, Value>,
    /// Ordering key derived from `created`, assigned on ingestion.
    #[serde(skip)]
    pub rowid: i64,
}

impl LogEntry {
    pub fn new(level: i32, message: impl Into<String>) -> Self {
        Self::at(OffsetDateTime::now_utc(), level, message)
    }

    /// Entry with an explicit creation time.
    pub fn at(created: OffsetDateTime, level: i32, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            created,
            updated: created,
            level,
            message: message.into(),
            data: Map::new(),
            rowid: 0,
        }
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Creation time in Unix milliseconds.
    pub fn created_millis(&self) -> i64 {
        (self.created.unix_timestamp_nanos() / 1_000_000) as i64
    }

    /// Structured log of one handled HTTP request.
    pub fn request(req: &RequestLog) -> Self {
        let level = if req.status == 200 {
            LEVEL_INFO
        } else {
            LEVEL_ERROR
        };
        let mut entry = Self::at(req.started, level, req.url.clone())
            .with_data("execTime", req.exec_time.as_millis() as u64)
            .with_data("type", "request")
            .with_data("auth", req.auth.as_str())
            .with_data("status", req.status)
            .with_data("method", req.method.to_ascii_uppercase())
            .with_data("url", req.url.clone())
            .with_data("referer", json!(req.referer))
            .with_data("remoteIp", json!(req.remote_ip))
            .with_data("userIp", json!(req.user_ip))
            .with_data("userAgent", json!(req.user_agent));
        if let Some(error) = &req.error {
            entry = entry
                .with_data("error", error.clone())
                .with_data("details", req.details.clone().unwrap_or(Value::Null));
        }
        entry
    }
}

impl Event for LogEntry {}

/// Who made a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RequestAuth {
    #[default]
    Guest,
    Admin,
    AuthRecord,
}

impl RequestAuth {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestAuth::Guest => "guest",
            RequestAuth::Admin => "admin",
            RequestAuth::AuthRecord => "authRecord",
        }
    }
}

/// Facts about a handled request, turned into a [`LogEntry`] by
/// [`LogEntry::request`].
#[derive(Debug, Clone)]
pub struct RequestLog {
    pub started: OffsetDateTime,
    pub method: String,
    pub url: String,
    pub status: u16,
    pub exec_time: Duration,
    pub auth: RequestAuth,
    pub referer: Option<String>,
    pub remote_ip: Option<String>,
    pub user_ip: Option<String>,
    pub user_agent: Option<String>,
    /// Failure message for non-200 responses.
    pub error: Option<String>,
    pub details: Option<Value>,
}

impl RequestLog {
    pub fn new(method: impl Into<String>, url: impl Into<String>, status: u16) -> Self {
        Self {
            started: OffsetDateTime::now_utc(),
            method: method.into(),
            url: url.into(),
            status,
            exec_time: Duration::ZERO,
            auth: RequestAuth::Guest,
            referer: None,
            remote_ip: None,
            user_ip: None,
            user_agent: None,
            error: None,
            details: None,
        }
    }
}
