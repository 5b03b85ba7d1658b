use std::borrow::Cow;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Role;

/// Named, independently revocable capability (e.g. `can_export`).
///
/// Names are validated (`[a-z0-9_.]`, at most [`Permission::MAX_LEN`] bytes).
/// Well-formed names outside [`KNOWN_PERMISSIONS`] are accepted so the
/// backend can introduce flags before the client ships support for them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Permission(Cow<'static, str>);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PermissionError {
    #[error("permission name is empty")]
    Empty,

    #[error("permission name exceeds {max} bytes")]
    TooLong { max: usize },

    #[error("permission name '{0}' contains invalid characters")]
    InvalidCharacters(String),
}

impl Permission {
    pub const MAX_LEN: usize = 64;

    pub const CAN_ACCESS_STUDENT_DASHBOARD: Permission =
        Permission(Cow::Borrowed("can_access_student_dashboard"));
    pub const CAN_ACCESS_TUTOR_DASHBOARD: Permission =
        Permission(Cow::Borrowed("can_access_tutor_dashboard"));
    pub const CAN_ACCESS_GUARDIAN_DASHBOARD: Permission =
        Permission(Cow::Borrowed("can_access_guardian_dashboard"));
    pub const CAN_ACCESS_ADMIN_DASHBOARD: Permission =
        Permission(Cow::Borrowed("can_access_admin_dashboard"));
    pub const CAN_EXPORT: Permission = Permission(Cow::Borrowed("can_export"));
    pub const CAN_BULK_IMPORT: Permission = Permission(Cow::Borrowed("can_bulk_import"));
    pub const CAN_MANAGE_USERS: Permission = Permission(Cow::Borrowed("can_manage_users"));

    /// Parse and validate a permission name.
    pub fn new(name: impl Into<Cow<'static, str>>) -> Result<Self, PermissionError> {
        let name = name.into();
        if name.is_empty() {
            return Err(PermissionError::Empty);
        }
        if name.len() > Self::MAX_LEN {
            return Err(PermissionError::TooLong { max: Self::MAX_LEN });
        }
        let valid = name
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_' || b == b'.');
        if !valid {
            return Err(PermissionError::InvalidCharacters(name.into_owned()));
        }
        Ok(Self(name))
    }

    /// `can_access_<role>_dashboard` for the given role.
    pub fn dashboard(role: Role) -> Self {
        match role {
            Role::Student => Self::CAN_ACCESS_STUDENT_DASHBOARD,
            Role::Tutor => Self::CAN_ACCESS_TUTOR_DASHBOARD,
            Role::Guardian => Self::CAN_ACCESS_GUARDIAN_DASHBOARD,
            Role::Admin => Self::CAN_ACCESS_ADMIN_DASHBOARD,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_known(&self) -> bool {
        KNOWN_PERMISSIONS.iter().any(|known| known == self)
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Permission {
    type Error = PermissionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Permission> for String {
    fn from(value: Permission) -> Self {
        value.0.into_owned()
    }
}

/// Every permission the client has first-class support for.
///
/// Route gates and backend contract tests both read this list.
pub const KNOWN_PERMISSIONS: [Permission; 7] = [
    Permission::CAN_ACCESS_STUDENT_DASHBOARD,
    Permission::CAN_ACCESS_TUTOR_DASHBOARD,
    Permission::CAN_ACCESS_GUARDIAN_DASHBOARD,
    Permission::CAN_ACCESS_ADMIN_DASHBOARD,
    Permission::CAN_EXPORT,
    Permission::CAN_BULK_IMPORT,
    Permission::CAN_MANAGE_USERS,
];

/// Permission flags as delivered by the backend.
///
/// A missing flag reads as `false`. Flags are independent of role membership.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionFlags(BTreeMap<Permission, bool>);

impl PermissionFlags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build flags from raw backend keys, dropping malformed names.
    pub fn from_raw<I, K>(raw: I) -> Self
    where
        I: IntoIterator<Item = (K, bool)>,
        K: Into<String>,
    {
        let mut flags = BTreeMap::new();
        for (name, granted) in raw {
            let name = name.into();
            match Permission::new(name.clone()) {
                Ok(permission) => {
                    flags.insert(permission, granted);
                }
                Err(err) => {
                    tracing::warn!(permission = %name, error = %err, "dropping malformed permission flag");
                }
            }
        }
        Self(flags)
    }

    pub fn set(&mut self, permission: Permission, granted: bool) {
        self.0.insert(permission, granted);
    }

    pub fn is_granted(&self, permission: &Permission) -> bool {
        self.0.get(permission).copied().unwrap_or(false)
    }

    /// `true` when at least one of `required` is granted.
    pub fn any_granted<'a, I>(&self, required: I) -> bool
    where
        I: IntoIterator<Item = &'a Permission>,
    {
        required.into_iter().any(|p| self.is_granted(p))
    }

    /// Names whose flag is `true`, in sorted order.
    pub fn granted(&self) -> impl Iterator<Item = &Permission> {
        self.0.iter().filter(|(_, granted)| **granted).map(|(p, _)| p)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(Permission, bool)> for PermissionFlags {
    fn from_iter<T: IntoIterator<Item = (Permission, bool)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}
