use core::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse-grained access category a user may hold one or more of.
///
/// The set is closed: the backend contract only knows these four roles.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Tutor,
    Student,
    Guardian,
}

/// Priority used to pick a default active role, highest first.
///
/// A tutor-capable user lands on the teaching surface unless the server
/// remembers another choice. This never reorders `assigned_roles`.
pub const DEFAULT_ROLE_PRIORITY: [Role; 4] = [Role::Tutor, Role::Student, Role::Guardian, Role::Admin];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown role '{0}'")]
pub struct UnknownRole(pub String);

impl Role {
    pub const ALL: [Role; 4] = [Role::Admin, Role::Tutor, Role::Student, Role::Guardian];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Tutor => "tutor",
            Role::Student => "student",
            Role::Guardian => "guardian",
        }
    }

    /// Rank in [`DEFAULT_ROLE_PRIORITY`]; lower wins.
    pub fn default_rank(&self) -> usize {
        DEFAULT_ROLE_PRIORITY
            .iter()
            .position(|r| r == self)
            .unwrap_or(DEFAULT_ROLE_PRIORITY.len())
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "tutor" => Ok(Role::Tutor),
            "student" => Ok(Role::Student),
            "guardian" => Ok(Role::Guardian),
            _ => Err(UnknownRole(s.to_string())),
        }
    }
}

/// Resolve the default active role for a set of assigned roles.
///
/// Returns `None` only when `assigned` is empty.
pub fn resolve_default_role(assigned: &[Role]) -> Option<Role> {
    assigned.iter().copied().min_by_key(Role::default_rank)
}
