//! Backend contract consumed by the session engine.
//!
//! Transport and endpoint shapes live behind [`AuthBackend`]; errors cross
//! this seam as [`BackendError`] and are translated by the machine before
//! any caller sees them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use learnhub_auth::{IdentitySnapshot, Role};

use crate::storage::TokenPair;

#[derive(Clone, Serialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

impl core::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Sign-up form as handed over by the UI. Field validation happens upstream.
#[derive(Clone, Serialize)]
pub struct RegistrationPayload {
    pub email: String,
    pub password: String,
    pub display_name: Option<String>,
    pub requested_roles: Vec<Role>,
    pub extra: serde_json::Value,
}

impl core::fmt::Debug for RegistrationPayload {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RegistrationPayload")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("display_name", &self.display_name)
            .field("requested_roles", &self.requested_roles)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub user: IdentitySnapshot,
    #[serde(flatten)]
    pub tokens: TokenPair,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegistrationResponse {
    pub user: IdentitySnapshot,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub auto_login: bool,
    #[serde(default)]
    pub message: Option<String>,
}

impl RegistrationResponse {
    /// Token pair, only when the backend permits signing in straight away.
    pub fn session_tokens(&self) -> Option<TokenPair> {
        if !self.auto_login {
            return None;
        }
        match (&self.access_token, &self.refresh_token) {
            (Some(access), Some(refresh)) => Some(TokenPair::new(access.clone(), refresh.clone())),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SwitchRoleResponse {
    pub active_role: Role,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// Credentials or token refused (HTTP 401/403 or equivalent).
    #[error("unauthorized")]
    Unauthorized,

    /// Request understood and refused, with a server-provided reason.
    #[error("rejected: {message}")]
    Rejected { message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Remote authentication service.
///
/// `switch_role` must be idempotent when the requested role is already
/// active. `logout` is best-effort; the client clears its session regardless.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    async fn login(&self, credentials: &Credentials) -> Result<LoginResponse, BackendError>;

    async fn register(&self, payload: &RegistrationPayload) -> Result<RegistrationResponse, BackendError>;

    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, BackendError>;

    async fn current_identity(&self, access_token: &str) -> Result<IdentitySnapshot, BackendError>;

    async fn switch_role(&self, access_token: &str, role: Role) -> Result<SwitchRoleResponse, BackendError>;

    async fn logout(&self, access_token: &str) -> Result<(), BackendError>;
}
