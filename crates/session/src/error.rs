//! Session error taxonomy.
//!
//! Backend failures are translated into these variants at the machine
//! boundary; raw transport errors never reach callers.

use thiserror::Error;

use learnhub_auth::Role;

use crate::status::SessionStatus;
use crate::storage::StorageError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Login/registration refused or backend unreachable. Retryable.
    #[error("invalid credentials or server unreachable")]
    Credentials,

    /// Refresh token expired or revoked. The session has been cleared.
    #[error("session expired; sign in again")]
    RefreshFailed,

    /// Identity could not be loaded. The session has been cleared.
    #[error("account details could not be loaded; sign in again")]
    IdentityUnavailable,

    /// The session moved on while the request was in flight.
    #[error("response discarded: session changed while the request was in flight")]
    Stale,

    #[error("not authenticated")]
    NotAuthenticated,

    #[error("operation not allowed while session is {0}")]
    InvalidState(SessionStatus),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl SessionError {
    /// Stale results are dropped silently; everything else is shown.
    pub fn is_user_visible(&self) -> bool {
        !matches!(self, SessionError::Stale)
    }

    /// The session was torn down and the user must sign in again.
    pub fn forces_logout(&self) -> bool {
        matches!(self, SessionError::RefreshFailed | SessionError::IdentityUnavailable)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SwitchError {
    #[error("not authenticated")]
    NotAuthenticated,

    #[error("role '{0}' is not assigned to this account")]
    NotAssigned(Role),

    #[error("a switch to '{pending}' is already in progress")]
    InFlight { pending: Role },

    #[error("role switch rejected: {0}")]
    Rejected(String),

    #[error("role switch failed: server unreachable")]
    Unreachable,

    #[error("server confirmed '{confirmed}' instead of '{requested}'")]
    Mismatch { requested: Role, confirmed: Role },

    #[error("response discarded: session changed while the switch was in flight")]
    Stale,
}

impl SwitchError {
    pub fn is_user_visible(&self) -> bool {
        !matches!(self, SwitchError::Stale)
    }
}
