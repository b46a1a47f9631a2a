//! Outward error model of the application services.

use hookline_core::{InterceptError, PublishError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use thiserror::Error;
use tracing::warn;

/// Errors returned by application services, mapped to a [`FailureResponse`].
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Bad request: {message}")]
    BadRequest {
        message: String,
        data: Map<String, Value>,
    },
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest {
            message: msg.into(),
            data: Map::new(),
        }
    }
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Form validation failure; `errors` maps field names to error details.
    pub fn validation(errors: Map<String, Value>) -> Self {
        Self::BadRequest {
            message: "Failed to load the submitted data due to invalid formatting.".into(),
            data: errors,
        }
    }

    /// Map an intercepted operation's failure. Handler vetoes become a
    /// generic bad request; operation errors pass through.
    pub fn from_intercept(err: InterceptError<ApiError>, generic: &str) -> Self {
        match err {
            InterceptError::Operation(e) => e,
            InterceptError::Vetoed { phase, source } => {
                warn!(
                    phase = %phase,
                    handler = source.handler_name(),
                    error = %source,
                    "Operation vetoed by event handler"
                );
                Self::bad_request(generic)
            }
        }
    }

    /// Map a failed notification publish to a generic bad request.
    pub fn from_publish(err: PublishError, generic: &str) -> Self {
        warn!(
            handler = err.handler_name(),
            error = %err,
            "Event handler rejected the request"
        );
        Self::bad_request(generic)
    }

    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::BadRequest { .. } => 400,
            ApiError::Unauthorized(_) => 401,
            ApiError::NotFound(_) => 404,
            ApiError::Internal(_) => 500,
        }
    }

    pub fn to_response(&self) -> FailureResponse {
        let (message, data) = match self {
            ApiError::BadRequest { message, data } => (message.clone(), data.clone()),
            ApiError::Unauthorized(msg) | ApiError::NotFound(msg) | ApiError::Internal(msg) => {
                (msg.clone(), Map::new())
            }
        };
        FailureResponse {
            code: self.status_code(),
            message,
            data: Value::Object(data),
        }
    }
}

/// Body of every failed request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureResponse {
    pub code: u16,
    pub message: String,
    pub data: Value,
}

/// Validation detail for a required field left blank.
pub fn required_field() -> Value {
    json!({
        "code": "validation_required",
        "message": "cannot be blank",
    })
}
