//! `learnhub-core`: shared building blocks for the session engine.
//!
//! This crate contains **pure** primitives (no IO, no async).

pub mod error;
pub mod id;

pub use error::DomainError;
pub use id::{ResourceId, SessionId, UserId};
