use crate::error::{Error, Result};
use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

const MAX_KEY_LEN: usize = 128;

/// Permission key granted by roles: the catalog name, not a role.
///
/// Keys are upper snake case (`EDIT_EVENT_LOGISTICS`).
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct PermissionKey(String);

impl PermissionKey {
    /// Parses and validates a key.
    ///
    /// This trims whitespace and normalizes to uppercase, so
    /// `"edit_event_logistics"` and `"EDIT_EVENT_LOGISTICS"` name the same key.
    pub fn new(value: impl AsRef<str>) -> Result<Self> {
        let trimmed = value.as_ref().trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidPermission(
                "permission key must not be empty".to_string(),
            ));
        }
        if trimmed.len() > MAX_KEY_LEN {
            return Err(Error::InvalidPermission(format!(
                "permission key length must be <= {MAX_KEY_LEN}"
            )));
        }
        let normalized = trimmed.to_ascii_uppercase();
        if !normalized
            .chars()
            .all(|ch| matches!(ch, 'A'..='Z' | '0'..='9' | '_'))
        {
            return Err(Error::InvalidPermission(format!(
                "permission key {normalized} must contain only A-Z, 0-9 and _"
            )));
        }
        if normalized.starts_with('_') || normalized.ends_with('_') {
            return Err(Error::InvalidPermission(format!(
                "permission key {normalized} must not start or end with _"
            )));
        }
        Ok(Self(normalized))
    }

    /// Wraps a key that is already normalized, e.g. a compile-time constant.
    pub fn from_static(value: &'static str) -> Self {
        Self(value.to_string())
    }

    /// Returns the underlying string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PermissionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PermissionKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for PermissionKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for PermissionKey {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        Self::new(value)
    }
}

impl FromStr for PermissionKey {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        Self::new(value)
    }
}

/// Catalog entry for one permission.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Permission {
    /// Unique key.
    pub key: PermissionKey,
    /// When true, a grant on an ancestor entity satisfies checks on its descendants.
    pub inheritable: bool,
    /// Optional human-readable description.
    pub description: Option<String>,
}

impl Permission {
    /// Permission that extends to descendant entities.
    pub fn inheritable(key: PermissionKey) -> Self {
        Self {
            key,
            inheritable: true,
            description: None,
        }
    }

    /// Permission evaluated only at the exact entity named in a request.
    pub fn local(key: PermissionKey) -> Self {
        Self {
            key,
            inheritable: false,
            description: None,
        }
    }

    /// Attaches a description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}
