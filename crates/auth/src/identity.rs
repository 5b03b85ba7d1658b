//! Authenticated identity (the user/role model).
//!
//! An [`Identity`] is an immutable snapshot. It is replaced wholesale whenever
//! the backend delivers a new one; the only derived copy is produced by
//! [`Identity::with_active_role`] after a confirmed role switch.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use learnhub_core::{ResourceId, UserId};

use crate::roles::resolve_default_role;
use crate::{PermissionFlags, Role};

/// Identity payload as returned by the backend.
///
/// Role and permission names stay raw here; [`Identity::materialize`] is the
/// single place they are validated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentitySnapshot {
    pub id: UserId,
    pub email: String,
    #[serde(default)]
    pub profile: serde_json::Value,
    pub roles: Vec<String>,
    /// Active role the server remembers for this user, if any.
    #[serde(default)]
    pub active_role: Option<String>,
    #[serde(default)]
    pub permissions: BTreeMap<String, bool>,
    #[serde(default)]
    pub qualified_resources: Vec<ResourceId>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdentityError {
    #[error("identity has no assigned roles")]
    NoRoles,

    #[error("role '{0}' is not assigned to this identity")]
    RoleNotAssigned(Role),
}

/// Materialized, validated identity.
///
/// # Invariants
/// - `assigned_roles` is non-empty, duplicate-free and keeps server order.
/// - `active_role` is always a member of `assigned_roles`.
/// - `qualified_resources` is only consulted while `tutor` is assigned.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Identity {
    id: UserId,
    email: String,
    profile: serde_json::Value,
    assigned_roles: Vec<Role>,
    active_role: Role,
    permissions: PermissionFlags,
    qualified_resources: BTreeSet<ResourceId>,
}

impl Identity {
    /// Validate a backend snapshot and resolve its active role.
    ///
    /// The active role is, in order: the server's remembered `active_role`
    /// if assigned, `preferred` if assigned, else the default priority.
    pub fn materialize(snapshot: IdentitySnapshot, preferred: Option<Role>) -> Result<Self, IdentityError> {
        let mut assigned_roles: Vec<Role> = Vec::with_capacity(snapshot.roles.len());
        for raw in &snapshot.roles {
            match raw.parse::<Role>() {
                Ok(role) if assigned_roles.contains(&role) => {
                    tracing::debug!(%role, "collapsing duplicate role");
                }
                Ok(role) => assigned_roles.push(role),
                Err(err) => tracing::warn!(error = %err, "skipping unknown role"),
            }
        }

        let server_choice = snapshot.active_role.as_deref().and_then(|raw| raw.parse::<Role>().ok());

        let active_role = [server_choice, preferred]
            .into_iter()
            .flatten()
            .find(|r| assigned_roles.contains(r))
            .or_else(|| resolve_default_role(&assigned_roles))
            .ok_or(IdentityError::NoRoles)?;

        Ok(Self {
            id: snapshot.id,
            email: snapshot.email,
            profile: snapshot.profile,
            assigned_roles,
            active_role,
            permissions: PermissionFlags::from_raw(snapshot.permissions),
            qualified_resources: snapshot.qualified_resources.into_iter().collect(),
        })
    }

    /// Copy of this identity with a different active role.
    pub fn with_active_role(&self, role: Role) -> Result<Self, IdentityError> {
        if !self.has_role(role) {
            return Err(IdentityError::RoleNotAssigned(role));
        }
        Ok(Self {
            active_role: role,
            ..self.clone()
        })
    }

    pub fn id(&self) -> &UserId {
        &self.id
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn profile(&self) -> &serde_json::Value {
        &self.profile
    }

    pub fn display_name(&self) -> Option<&str> {
        self.profile.get("display_name").and_then(|v| v.as_str())
    }

    /// Roles in server-assigned (display) order.
    pub fn assigned_roles(&self) -> &[Role] {
        &self.assigned_roles
    }

    pub fn active_role(&self) -> Role {
        self.active_role
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.assigned_roles.contains(&role)
    }

    pub fn permissions(&self) -> &PermissionFlags {
        &self.permissions
    }

    /// Resources this identity may tutor; empty unless `tutor` is assigned.
    pub fn qualified_resources(&self) -> impl Iterator<Item = &ResourceId> {
        let active = self.has_role(Role::Tutor);
        self.qualified_resources.iter().filter(move |_| active)
    }

    pub fn is_qualified_for(&self, resource: &ResourceId) -> bool {
        self.has_role(Role::Tutor) && self.qualified_resources.contains(resource)
    }
}
