use crate::defaults::MANAGE_ROLES;
use crate::error::Result;
use crate::permission::PermissionKey;
use std::time::Duration;

/// Scalar engine settings, loadable from a config file with the `serde` feature.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct EngineConfig {
    /// Budget for one repository or hierarchy call, in milliseconds.
    /// `None` waits indefinitely.
    pub dependency_timeout_ms: Option<u64>,
    /// Maximum number of ancestors visited by one hierarchy walk.
    pub max_hierarchy_depth: usize,
    /// Ignore parent links that violate [`crate::EntityType::parent_types`].
    pub enforce_parent_types: bool,
    /// Permission an actor needs on a scope to grant or revoke roles there.
    pub manage_roles_permission: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dependency_timeout_ms: Some(250),
            max_hierarchy_depth: 16,
            enforce_parent_types: true,
            manage_roles_permission: MANAGE_ROLES.to_string(),
        }
    }
}

impl EngineConfig {
    pub(crate) fn dependency_timeout(&self) -> Option<Duration> {
        self.dependency_timeout_ms.map(Duration::from_millis)
    }

    pub(crate) fn manage_roles_key(&self) -> Result<PermissionKey> {
        PermissionKey::new(&self.manage_roles_permission)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fail_closed_quickly() {
        let config = EngineConfig::default();
        assert_eq!(config.dependency_timeout(), Some(Duration::from_millis(250)));
        assert_eq!(config.manage_roles_key().unwrap().as_str(), MANAGE_ROLES);
        assert!(config.enforce_parent_types);
    }
}
