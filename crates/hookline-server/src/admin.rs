//! Admin password authentication.
//!
//! The login is interceptable: [`AdminAuthWithPasswordEvent`] is published
//! BEFORE and AFTER the credential check, and [`AdminAuthRequestEvent`] is
//! published once a token has been issued and AFTER handlers accepted it.

use std::sync::Arc;

use dashmap::DashMap;
use hookline_core::{Event, EventHub, LifecycleEvent, Timing, intercept};
use serde::{Deserialize, Serialize};
use serde_json::Map;
use time::OffsetDateTime;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::api::{ApiError, required_field};
use crate::credentials;

/// Id given to the admin defined in configuration.
pub const CONFIG_ADMIN_ID: &str = "config-admin";

const AUTH_FAILED: &str = "Failed to authenticate.";
const INVALID_CREDENTIALS: &str = "Invalid login credentials.";

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Admin {
    pub id: String,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created: OffsetDateTime,
}

impl std::fmt::Debug for Admin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Admin")
            .field("id", &self.id)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Events
// ============================================================================

/// Published BEFORE and AFTER an admin password login.
///
/// `admin` is the account resolved for the identity (if any); `token` is set
/// for the AFTER publication.
#[derive(Clone)]
pub struct AdminAuthWithPasswordEvent {
    pub timing: Timing,
    pub identity: String,
    pub password: String,
    pub admin: Option<Admin>,
    pub token: Option<String>,
}

impl std::fmt::Debug for AdminAuthWithPasswordEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminAuthWithPasswordEvent")
            .field("timing", &self.timing)
            .field("identity", &self.identity)
            .field("admin", &self.admin)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish_non_exhaustive()
    }
}

impl Event for AdminAuthWithPasswordEvent {}

impl LifecycleEvent for AdminAuthWithPasswordEvent {
    fn timing(&self) -> Timing {
        self.timing
    }

    fn set_timing(&mut self, timing: Timing) {
        self.timing = timing;
    }
}

/// Published after a successful, unvetoed admin login.
#[derive(Clone)]
pub struct AdminAuthRequestEvent {
    pub admin: Admin,
    pub token: String,
}

impl std::fmt::Debug for AdminAuthRequestEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminAuthRequestEvent")
            .field("admin", &self.admin)
            .finish_non_exhaustive()
    }
}

impl Event for AdminAuthRequestEvent {}

// ============================================================================
// Directory
// ============================================================================

/// Admin accounts keyed by lowercase email.
#[derive(Debug, Default)]
pub struct AdminDirectory {
    admins: DashMap<String, Admin>,
}

impl AdminDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an admin with a freshly hashed password.
    pub fn create(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Admin, argon2::password_hash::Error> {
        let admin = Admin {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            password_hash: credentials::hash_password(password)?,
            created: OffsetDateTime::now_utc(),
        };
        self.admins
            .insert(email.to_ascii_lowercase(), admin.clone());
        Ok(admin)
    }

    pub fn find_by_email(&self, email: &str) -> Option<Admin> {
        self.admins
            .get(&email.to_ascii_lowercase())
            .map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.admins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.admins.is_empty()
    }
}

// ============================================================================
// Service
// ============================================================================

/// Submitted login form.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdminLogin {
    #[serde(default)]
    pub identity: String,
    #[serde(default)]
    pub password: String,
}

impl AdminLogin {
    pub fn new(identity: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            password: password.into(),
        }
    }

    pub fn validate(&self) -> Result<(), ApiError> {
        let mut errors = Map::new();
        if self.identity.trim().is_empty() {
            errors.insert("identity".into(), required_field());
        }
        if self.password.is_empty() {
            errors.insert("password".into(), required_field());
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ApiError::validation(errors))
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AdminLoginResult {
    pub token: String,
    pub admin: Admin,
}

/// Password login for admins.
///
/// When an admin is configured, it is the only account that can log in;
/// otherwise accounts are looked up in the directory.
pub struct AdminAuthService {
    hub: Arc<EventHub>,
    directory: Arc<AdminDirectory>,
    configured: Option<Admin>,
    tokens: DashMap<String, String>,
}

impl AdminAuthService {
    pub fn new(hub: Arc<EventHub>, directory: Arc<AdminDirectory>) -> Self {
        Self {
            hub,
            directory,
            configured: None,
            tokens: DashMap::new(),
        }
    }

    /// Use a single configured account instead of the directory.
    pub fn with_configured_admin(
        mut self,
        identity: &str,
        password: &str,
    ) -> Result<Self, argon2::password_hash::Error> {
        self.configured = Some(Admin {
            id: CONFIG_ADMIN_ID.to_string(),
            email: identity.to_string(),
            password_hash: credentials::hash_password(password)?,
            created: OffsetDateTime::now_utc(),
        });
        Ok(self)
    }

    /// Account for `identity`. With a configured admin, any other identity
    /// resolves to nothing.
    fn resolve(&self, identity: &str) -> Option<Admin> {
        match &self.configured {
            Some(admin) if admin.email.eq_ignore_ascii_case(identity) => Some(admin.clone()),
            Some(_) => None,
            None => self.directory.find_by_email(identity),
        }
    }

    pub fn auth_with_password(&self, form: &AdminLogin) -> Result<AdminLoginResult, ApiError> {
        form.validate()?;

        let mut event = AdminAuthWithPasswordEvent {
            timing: Timing::Before,
            identity: form.identity.clone(),
            password: form.password.clone(),
            admin: self.resolve(&form.identity),
            token: None,
        };

        let result = intercept(
            &self.hub,
            &mut event,
            |event| -> Result<AdminLoginResult, ApiError> {
                let admin = match &event.admin {
                    Some(admin) => admin.clone(),
                    None => {
                        debug!(identity = %event.identity, "Unknown admin identity");
                        return Err(ApiError::bad_request(INVALID_CREDENTIALS));
                    }
                };
                let matches = credentials::verify_password(&event.password, &admin.password_hash)
                    .map_err(|e| {
                        warn!(admin = %admin.id, error = %e, "Stored admin password hash is invalid");
                        ApiError::bad_request(INVALID_CREDENTIALS)
                    })?;
                if !matches {
                    debug!(admin = %admin.id, "Admin password mismatch");
                    return Err(ApiError::bad_request(INVALID_CREDENTIALS));
                }

                let token = credentials::generate_token();
                self.tokens.insert(token.clone(), admin.id.clone());
                event.token = Some(token.clone());
                Ok(AdminLoginResult { token, admin })
            },
        );

        let login = match result {
            Ok(login) => login,
            Err(err) => {
                // A vetoed AFTER phase must not leave a usable token behind.
                if let Some(token) = event.token.as_deref() {
                    self.tokens.remove(token);
                }
                return Err(ApiError::from_intercept(err, AUTH_FAILED));
            }
        };

        let issued = AdminAuthRequestEvent {
            admin: login.admin.clone(),
            token: login.token.clone(),
        };
        if let Err(e) = self.hub.publish(&issued) {
            self.tokens.remove(&login.token);
            return Err(ApiError::from_publish(e, AUTH_FAILED));
        }

        info!(admin = %login.admin.id, "Admin authenticated");
        Ok(login)
    }

    /// Admin id a token was issued to.
    pub fn token_owner(&self, token: &str) -> Option<String> {
        self.tokens.get(token).map(|entry| entry.value().clone())
    }
}

impl std::fmt::Debug for AdminAuthService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminAuthService")
            .field("configured", &self.configured.as_ref().map(|a| &a.email))
            .field("directory", &self.directory.len())
            .field("tokens", &self.tokens.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hookline_core::LaneConfig;

    fn hub() -> Arc<EventHub> {
        Arc::new(
            EventHub::builder()
                .lane(LaneConfig::default().with_workers(1))
                .build(),
        )
    }

    #[test]
    fn test_blank_form_fails_validation() {
        let err = AdminLogin::default().validate().unwrap_err();
        let response = err.to_response();
        assert_eq!(response.code, 400);
        assert_eq!(response.data["identity"]["code"], "validation_required");
        assert_eq!(response.data["password"]["message"], "cannot be blank");
    }

    #[tokio::test]
    async fn test_directory_login_issues_token() {
        let directory = Arc::new(AdminDirectory::new());
        let admin = directory.create("Ops@Example.com", "s3cret-pass").unwrap();
        let service = AdminAuthService::new(hub(), directory);

        let login = service
            .auth_with_password(&AdminLogin::new("ops@example.com", "s3cret-pass"))
            .unwrap();
        assert_eq!(login.admin.id, admin.id);
        assert_eq!(service.token_owner(&login.token), Some(admin.id));

        let err = service
            .auth_with_password(&AdminLogin::new("ops@example.com", "wrong"))
            .unwrap_err();
        assert_eq!(err.to_response().message, INVALID_CREDENTIALS);
    }

    #[tokio::test]
    async fn test_configured_admin_rejects_other_identity() {
        let service = AdminAuthService::new(hub(), Arc::new(AdminDirectory::new()))
            .with_configured_admin("root@example.com", "rootpass")
            .unwrap();

        assert!(
            service
                .auth_with_password(&AdminLogin::new("root@example.com", "rootpass"))
                .is_ok()
        );
        assert!(
            service
                .auth_with_password(&AdminLogin::new("other@example.com", "rootpass"))
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_before_sees_no_admin_for_other_identity() {
        let hub = hub();
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let spy = seen.clone();
        hub.on_sync("test", "record_before", move |e: &AdminAuthWithPasswordEvent| {
            if e.is_before() {
                spy.lock()
                    .unwrap()
                    .push((e.identity.clone(), e.admin.as_ref().map(|a| a.email.clone())));
            }
            Ok(())
        })
        .unwrap();
        let service = AdminAuthService::new(hub, Arc::new(AdminDirectory::new()))
            .with_configured_admin("root@example.com", "rootpass")
            .unwrap();

        let err = service
            .auth_with_password(&AdminLogin::new("other@example.com", "rootpass"))
            .unwrap_err();
        assert_eq!(err.to_response().message, INVALID_CREDENTIALS);
        service
            .auth_with_password(&AdminLogin::new("Root@Example.com", "rootpass"))
            .unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![
                ("other@example.com".to_string(), None),
                (
                    "Root@Example.com".to_string(),
                    Some("root@example.com".to_string())
                ),
            ]
        );
    }

    #[test]
    fn test_event_debug_hides_secrets() {
        let event = AdminAuthWithPasswordEvent {
            timing: Timing::After,
            identity: "a@b.c".into(),
            password: "hunter2".into(),
            admin: None,
            token: Some("adm_abc".into()),
        };
        let debug = format!("{event:?}");
        assert!(!debug.contains("hunter2"));
        assert!(!debug.contains("adm_abc"));
    }
}
