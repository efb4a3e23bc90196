use crate::types::{EntityRef, PrincipalId, RoleId, RoleName};
use chrono::{DateTime, Utc};
use std::fmt;
use uuid::Uuid;

/// Assignment identifier.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct AssignmentId(Uuid);

impl AssignmentId {
    /// Generates a random id.
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wraps an existing UUID.
    pub fn from_uuid(value: Uuid) -> Self {
        Self(value)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for AssignmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A role granted to a principal, globally or on one entity.
///
/// `scope` is `None` for global roles and `Some` for entity-scoped roles, so the
/// entity type and id are always present or absent together.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Assignment {
    pub id: AssignmentId,
    pub user_id: PrincipalId,
    pub role_id: RoleId,
    pub scope: Option<EntityRef>,
    pub granted_by: PrincipalId,
    pub granted_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

impl Assignment {
    /// Returns whether the grant is in force at `now`.
    ///
    /// An expiry equal to `now` counts as expired.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_none_or(|expires_at| expires_at > now)
    }

    /// Returns whether this grant covers the same `(user, role, scope)` tuple.
    pub fn same_grant(&self, user: &PrincipalId, role: &RoleId, scope: Option<&EntityRef>) -> bool {
        &self.user_id == user && &self.role_id == role && self.scope.as_ref() == scope
    }
}

/// Input to [`crate::AssignmentManager::assign_role`].
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AssignmentRequest {
    /// Principal receiving the role.
    pub user: PrincipalId,
    /// Role to grant.
    pub role: RoleName,
    /// Entity context; required for entity roles, forbidden for global roles.
    pub scope: Option<EntityRef>,
    /// Optional expiry.
    pub expires_at: Option<DateTime<Utc>>,
    /// Free-form notes kept with the grant.
    pub notes: Option<String>,
}

impl AssignmentRequest {
    /// Requests a global role.
    pub fn global(user: PrincipalId, role: RoleName) -> Self {
        Self {
            user,
            role,
            scope: None,
            expires_at: None,
            notes: None,
        }
    }

    /// Requests an entity-scoped role.
    pub fn on_entity(user: PrincipalId, role: RoleName, entity: EntityRef) -> Self {
        Self {
            scope: Some(entity),
            ..Self::global(user, role)
        }
    }

    /// Sets an expiry.
    pub fn expires_at(mut self, at: DateTime<Utc>) -> Self {
        self.expires_at = Some(at);
        self
    }

    /// Sets notes.
    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

/// Result of a successful assignment.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AssignOutcome {
    /// A new grant row was written.
    Created(Assignment),
    /// An existing active grant for the same tuple was refreshed in place.
    Refreshed(Assignment),
}

impl AssignOutcome {
    /// Returns the stored assignment.
    pub fn assignment(&self) -> &Assignment {
        match self {
            Self::Created(assignment) | Self::Refreshed(assignment) => assignment,
        }
    }

    /// Consumes the outcome and returns the stored assignment.
    pub fn into_assignment(self) -> Assignment {
        match self {
            Self::Created(assignment) | Self::Refreshed(assignment) => assignment,
        }
    }
}

/// Result of a successful revocation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RevokeOutcome {
    /// The grant was active and is now expired.
    Revoked(Assignment),
    /// The grant had already expired or been revoked; nothing changed.
    AlreadyInactive(Assignment),
}

impl RevokeOutcome {
    /// Returns the assignment as stored after the call.
    pub fn assignment(&self) -> &Assignment {
        match self {
            Self::Revoked(assignment) | Self::AlreadyInactive(assignment) => assignment,
        }
    }
}
