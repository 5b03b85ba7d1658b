//! Access gate: pure role/permission decisions.
//!
//! - No IO
//! - No panics
//! - Never mutates the identity or ends the session

use std::collections::BTreeSet;

use serde::Serialize;

use learnhub_core::ResourceId;

use crate::{Identity, Permission, Role};

/// What a protected surface requires.
///
/// OR within each set, AND across the two sets. Empty sets impose nothing, so
/// `Requirement::authenticated()` admits any signed-in identity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Requirement {
    roles: BTreeSet<Role>,
    permissions: BTreeSet<Permission>,
}

impl Requirement {
    /// Any authenticated identity.
    pub fn authenticated() -> Self {
        Self::default()
    }

    /// Role membership plus the matching `can_access_<role>_dashboard` flag.
    pub fn dashboard(role: Role) -> Self {
        Self::authenticated()
            .with_roles([role])
            .with_permissions([Permission::dashboard(role)])
    }

    pub fn with_roles(mut self, roles: impl IntoIterator<Item = Role>) -> Self {
        self.roles.extend(roles);
        self
    }

    pub fn with_permissions(mut self, permissions: impl IntoIterator<Item = Permission>) -> Self {
        self.permissions.extend(permissions);
        self
    }

    pub fn roles(&self) -> &BTreeSet<Role> {
        &self.roles
    }

    pub fn permissions(&self) -> &BTreeSet<Permission> {
        &self.permissions
    }

    pub fn is_open(&self) -> bool {
        self.roles.is_empty() && self.permissions.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DenialReason {
    NotAuthenticated,
    MissingRole { required: Vec<Role> },
    MissingPermission { required: Vec<Permission> },
    NotQualified { resource: ResourceId },
}

impl core::fmt::Display for DenialReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            DenialReason::NotAuthenticated => f.write_str("not authenticated"),
            DenialReason::MissingRole { required } => {
                write!(f, "requires one of roles {}", join(required))
            }
            DenialReason::MissingPermission { required } => {
                write!(f, "requires one of permissions {}", join(required))
            }
            DenialReason::NotQualified { resource } => {
                write!(f, "not qualified to tutor '{resource}'")
            }
        }
    }
}

fn join<T: core::fmt::Display>(items: &[T]) -> String {
    items.iter().map(|i| i.to_string()).collect::<Vec<_>>().join(", ")
}

#[must_use]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessDecision {
    Granted,
    Denied(DenialReason),
}

impl AccessDecision {
    pub fn is_granted(&self) -> bool {
        matches!(self, AccessDecision::Granted)
    }

    pub fn denial(&self) -> Option<&DenialReason> {
        match self {
            AccessDecision::Granted => None,
            AccessDecision::Denied(reason) => Some(reason),
        }
    }
}

/// Decide whether `identity` satisfies `requirement`.
pub fn decide(identity: Option<&Identity>, requirement: &Requirement) -> AccessDecision {
    let Some(identity) = identity else {
        return AccessDecision::Denied(DenialReason::NotAuthenticated);
    };

    if requirement.is_open() {
        return AccessDecision::Granted;
    }

    let roles_ok = requirement.roles.is_empty() || requirement.roles.iter().any(|r| identity.has_role(*r));
    if !roles_ok {
        return AccessDecision::Denied(DenialReason::MissingRole {
            required: requirement.roles.iter().copied().collect(),
        });
    }

    let permissions_ok =
        requirement.permissions.is_empty() || identity.permissions().any_granted(&requirement.permissions);
    if !permissions_ok {
        return AccessDecision::Denied(DenialReason::MissingPermission {
            required: requirement.permissions.iter().cloned().collect(),
        });
    }

    AccessDecision::Granted
}

pub fn has_role(identity: Option<&Identity>, role: Role) -> bool {
    identity.is_some_and(|i| i.has_role(role))
}

/// Dashboard entry check: role membership alone is not enough once the
/// dashboard permission has been revoked.
pub fn can_access_dashboard(identity: Option<&Identity>, role: Role) -> AccessDecision {
    decide(identity, &Requirement::dashboard(role))
}

/// Per-course teaching check.
///
/// Independent of `can_access_tutor_dashboard`: seeing the dashboard does not
/// qualify a tutor for any specific course.
pub fn can_tutor_course(identity: Option<&Identity>, resource: &ResourceId) -> AccessDecision {
    let Some(identity) = identity else {
        return AccessDecision::Denied(DenialReason::NotAuthenticated);
    };
    if !identity.has_role(Role::Tutor) {
        return AccessDecision::Denied(DenialReason::MissingRole {
            required: vec![Role::Tutor],
        });
    }
    if identity.is_qualified_for(resource) {
        AccessDecision::Granted
    } else {
        AccessDecision::Denied(DenialReason::NotQualified {
            resource: resource.clone(),
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Decision Explanation (Audit Trail)
// ─────────────────────────────────────────────────────────────────────────────

/// Debuggable account of an access decision.
#[derive(Debug, Clone, Serialize)]
pub struct AccessExplanation {
    pub granted: bool,
    pub reason: String,
    pub required_roles: Vec<Role>,
    pub required_permissions: Vec<Permission>,
    pub assigned_roles: Vec<Role>,
    pub active_role: Option<Role>,
    pub granted_permissions: Vec<Permission>,
    pub denial: Option<DenialReason>,
}

/// Explain the decision [`decide`] would make.
pub fn explain(identity: Option<&Identity>, requirement: &Requirement) -> AccessExplanation {
    let decision = decide(identity, requirement);

    let reason = match &decision {
        AccessDecision::Granted if requirement.is_open() => "any authenticated identity is admitted".to_string(),
        AccessDecision::Granted => "role and permission requirements satisfied".to_string(),
        AccessDecision::Denied(reason) => format!("denied: {reason}"),
    };

    AccessExplanation {
        granted: decision.is_granted(),
        reason,
        required_roles: requirement.roles.iter().copied().collect(),
        required_permissions: requirement.permissions.iter().cloned().collect(),
        assigned_roles: identity.map(|i| i.assigned_roles().to_vec()).unwrap_or_default(),
        active_role: identity.map(Identity::active_role),
        granted_permissions: identity
            .map(|i| i.permissions().granted().cloned().collect())
            .unwrap_or_default(),
        denial: decision.denial().cloned(),
    }
}
