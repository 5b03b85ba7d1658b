//! `learnhub-session`: session lifecycle, token storage and role switching.
//!
//! [`AuthMachine`] is the single owner of the session. UI layers read its
//! state through [`SessionView`] snapshots and drive it through async
//! operations; access decisions come from `learnhub-auth`.

pub mod backend;
pub mod clock;
pub mod config;
pub mod error;
pub mod guard;
pub mod lifecycle;
pub mod status;
pub mod storage;
pub mod store;
pub mod switch;

pub use backend::{
    AuthBackend, BackendError, Credentials, LoginResponse, RegistrationPayload, RegistrationResponse,
    SwitchRoleResponse,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, SessionConfig};
pub use error::{SessionError, SwitchError};
pub use guard::{GuardOutcome, ResumeTarget};
pub use lifecycle::{AuthMachine, LoginOutcome, RegistrationOutcome};
pub use status::SessionStatus;
pub use storage::{
    ACCESS_TOKEN_KEY, FileTokenStorage, InMemoryTokenStorage, REFRESH_TOKEN_KEY, StorageError, TokenPair,
    TokenStorage,
};
pub use store::{Epoch, SessionStore, SessionView};
pub use switch::SwitchOutcome;
