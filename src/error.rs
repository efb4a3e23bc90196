use crate::assignment::AssignmentId;
use crate::catalog::ScopeType;
use crate::types::{PrincipalId, RoleName};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Store-layer error type.
pub type StoreError = Box<dyn std::error::Error + Send + Sync>;

/// Crate result type.
pub type Result<T> = std::result::Result<T, Error>;

/// External collaborator the engine depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dependency {
    /// Assignment repository.
    AssignmentRepository,
    /// Entity hierarchy source.
    Hierarchy,
}

impl Dependency {
    /// Returns a stable name for logs and audit events.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AssignmentRepository => "assignment_repository",
            Self::Hierarchy => "hierarchy",
        }
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a dependency call did not produce a value.
#[derive(Debug, Error)]
pub enum DependencyFailure {
    /// The collaborator returned an error.
    #[error("{0}")]
    Failed(#[source] StoreError),
    /// The collaborator did not answer within the configured budget.
    #[error("timed out after {0:?}")]
    TimedOut(Duration),
}

/// Errors returned by this crate.
///
/// A denied permission check is never an error; see [`crate::Decision`].
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid identifier input.
    #[error("invalid id: {0}")]
    InvalidId(String),
    /// Invalid permission key input.
    #[error("invalid permission: {0}")]
    InvalidPermission(String),
    /// Entity type outside the closed [`crate::EntityType`] set.
    #[error("invalid entity type: {0}")]
    InvalidEntityType(String),
    /// Entity context does not match the role's scope type.
    #[error("role {role} is {expected} scoped; {detail}")]
    InvalidScope {
        role: RoleName,
        expected: ScopeType,
        detail: &'static str,
    },
    /// Requested expiry is not in the future.
    #[error("assignment expiry must be in the future")]
    InvalidExpiry,
    /// Unknown role name.
    #[error("role not found: {0}")]
    RoleNotFound(String),
    /// Unknown permission key.
    #[error("permission not found: {0}")]
    PermissionNotFound(String),
    /// Unknown assignment id.
    #[error("assignment not found: {0}")]
    AssignmentNotFound(AssignmentId),
    /// Role name already registered.
    #[error("role already defined: {0}")]
    DuplicateRole(String),
    /// Permission key already registered.
    #[error("permission already defined: {0}")]
    DuplicatePermission(String),
    /// System roles cannot be removed or have their permissions changed.
    #[error("system role {0} is immutable")]
    SystemRoleImmutable(RoleName),
    /// Acting principal lacks authority over the target scope.
    #[error("principal {actor} is not authorized to {action} in {scope}")]
    Unauthorized {
        actor: PrincipalId,
        action: &'static str,
        scope: String,
    },
    /// A collaborator failed or timed out; resolution failed closed.
    #[error("{dependency} unavailable during {operation}: {source}")]
    DependencyUnavailable {
        dependency: Dependency,
        operation: &'static str,
        #[source]
        source: DependencyFailure,
    },
}

impl Error {
    /// Returns true when the error comes from a degraded collaborator rather
    /// than from caller input or configuration.
    pub fn is_dependency_failure(&self) -> bool {
        matches!(self, Self::DependencyUnavailable { .. })
    }

    /// Returns true for lookups against unknown catalog or assignment keys.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::RoleNotFound(_) | Self::PermissionNotFound(_) | Self::AssignmentNotFound(_)
        )
    }
}
