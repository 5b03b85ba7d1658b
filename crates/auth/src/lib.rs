//! `learnhub-auth`: pure role/permission model and access decisions.
//!
//! This crate is intentionally decoupled from HTTP, storage and async.

pub mod claims;
pub mod gate;
pub mod identity;
pub mod permissions;
pub mod roles;

pub use claims::{AccessClaims, TokenError, access_token_expired, decode_unverified, validate_claims};
pub use gate::{
    AccessDecision, AccessExplanation, DenialReason, Requirement, can_access_dashboard, can_tutor_course,
    decide, explain, has_role,
};
pub use identity::{Identity, IdentityError, IdentitySnapshot};
pub use permissions::{KNOWN_PERMISSIONS, Permission, PermissionError, PermissionFlags};
pub use roles::{DEFAULT_ROLE_PRIORITY, Role, UnknownRole, resolve_default_role};
