//! Permission catalog and role registry.
//!
//! The catalog is provisioned at setup time and read on every resolution.
//! Reads clone an [`Arc`] to an immutable [`CatalogSnapshot`]; administrative
//! writes build a new snapshot and swap it in, so a resolution always sees one
//! consistent view of roles and permissions.

use crate::error::{Error, Result};
use crate::permission::{Permission, PermissionKey};
use crate::types::{RoleId, RoleName};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

/// Where a role applies.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ScopeType {
    /// Platform-wide; assigned without entity context.
    Global,
    /// Bound to one entity instance; assigned with entity context.
    Entity,
}

impl fmt::Display for ScopeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Global => "globally",
            Self::Entity => "entity",
        })
    }
}

/// Role definition.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Role {
    /// Stable id referenced by assignments.
    pub id: RoleId,
    /// Unique name.
    pub name: RoleName,
    /// Assignment scope.
    pub scope_type: ScopeType,
    /// Reserved platform role; cannot be removed or edited.
    pub is_system: bool,
    /// Permissions granted by this role.
    pub permissions: BTreeSet<PermissionKey>,
}

impl Role {
    /// Creates a role whose id equals its name.
    pub fn new(name: RoleName, scope_type: ScopeType) -> Self {
        Self {
            id: RoleId::from_trusted(name.as_str().to_string()),
            name,
            scope_type,
            is_system: false,
            permissions: BTreeSet::new(),
        }
    }

    /// Creates a global role.
    pub fn global(name: RoleName) -> Self {
        Self::new(name, ScopeType::Global)
    }

    /// Creates an entity-scoped role.
    pub fn entity(name: RoleName) -> Self {
        Self::new(name, ScopeType::Entity)
    }

    /// Overrides the role id.
    pub fn with_id(mut self, id: RoleId) -> Self {
        self.id = id;
        self
    }

    /// Marks the role as system-reserved.
    pub fn system(mut self) -> Self {
        self.is_system = true;
        self
    }

    /// Adds permissions to the role.
    pub fn with_permissions(mut self, keys: impl IntoIterator<Item = PermissionKey>) -> Self {
        self.permissions.extend(keys);
        self
    }

    /// Returns whether this role triggers the system override.
    ///
    /// Only global system roles qualify.
    pub fn is_override(&self) -> bool {
        self.is_system && self.scope_type == ScopeType::Global
    }
}

/// Immutable view of the catalog.
#[derive(Debug, Default, Clone)]
pub struct CatalogSnapshot {
    permissions: HashMap<PermissionKey, Permission>,
    roles_by_name: HashMap<RoleName, Arc<Role>>,
    roles_by_id: HashMap<RoleId, Arc<Role>>,
}

impl CatalogSnapshot {
    /// Looks up a role by name.
    pub fn get_role(&self, name: &str) -> Result<Arc<Role>> {
        self.roles_by_name
            .get(name)
            .cloned()
            .ok_or_else(|| Error::RoleNotFound(name.to_string()))
    }

    /// Looks up a role by id.
    pub fn role_by_id(&self, id: &RoleId) -> Option<&Arc<Role>> {
        self.roles_by_id.get(id)
    }

    /// Lists roles sorted by name.
    pub fn list_roles(&self) -> Vec<Arc<Role>> {
        let mut roles: Vec<Arc<Role>> = self.roles_by_name.values().cloned().collect();
        roles.sort_by(|a, b| a.name.cmp(&b.name));
        roles
    }

    /// Returns whether the key is in the catalog.
    pub fn permission_exists(&self, key: &str) -> bool {
        self.permissions.contains_key(key)
    }

    /// Returns whether the key is inheritable; unknown keys are not.
    pub fn is_inheritable(&self, key: &str) -> bool {
        self.permissions
            .get(key)
            .is_some_and(|permission| permission.inheritable)
    }

    /// Looks up a catalog entry.
    pub fn permission(&self, key: &str) -> Result<&Permission> {
        self.permissions
            .get(key)
            .ok_or_else(|| Error::PermissionNotFound(key.to_string()))
    }

    /// Every key in the catalog.
    pub fn permission_keys(&self) -> BTreeSet<PermissionKey> {
        self.permissions.keys().cloned().collect()
    }

    fn insert_permission(&mut self, permission: Permission) -> Result<()> {
        if self.permissions.contains_key(&permission.key) {
            return Err(Error::DuplicatePermission(permission.key.to_string()));
        }
        self.permissions.insert(permission.key.clone(), permission);
        Ok(())
    }

    fn check_role_permissions(&self, role: &Role) -> Result<()> {
        match role
            .permissions
            .iter()
            .find(|key| !self.permissions.contains_key(*key))
        {
            Some(missing) => Err(Error::PermissionNotFound(missing.to_string())),
            None => Ok(()),
        }
    }

    fn insert_role(&mut self, role: Role) -> Result<()> {
        if self.roles_by_name.contains_key(&role.name) {
            return Err(Error::DuplicateRole(role.name.to_string()));
        }
        if self.roles_by_id.contains_key(&role.id) {
            return Err(Error::DuplicateRole(role.id.to_string()));
        }
        self.check_role_permissions(&role)?;
        let role = Arc::new(role);
        self.roles_by_id.insert(role.id.clone(), Arc::clone(&role));
        self.roles_by_name.insert(role.name.clone(), role);
        Ok(())
    }

    fn mutable_role(&self, name: &str) -> Result<Arc<Role>> {
        let role = self.get_role(name)?;
        if role.is_system {
            return Err(Error::SystemRoleImmutable(role.name.clone()));
        }
        Ok(role)
    }

    fn replace_permissions(
        &mut self,
        name: &str,
        permissions: BTreeSet<PermissionKey>,
    ) -> Result<Arc<Role>> {
        let current = self.mutable_role(name)?;
        let updated = Role {
            permissions,
            ..(*current).clone()
        };
        self.check_role_permissions(&updated)?;
        let updated = Arc::new(updated);
        self.roles_by_id
            .insert(updated.id.clone(), Arc::clone(&updated));
        self.roles_by_name
            .insert(updated.name.clone(), Arc::clone(&updated));
        Ok(updated)
    }

    fn delete_role(&mut self, name: &str) -> Result<Arc<Role>> {
        let role = self.mutable_role(name)?;
        self.roles_by_name.remove(&role.name);
        self.roles_by_id.remove(&role.id);
        Ok(role)
    }
}

/// Shared permission catalog and role registry.
#[derive(Debug, Default)]
pub struct Catalog {
    current: RwLock<Arc<CatalogSnapshot>>,
    writer: Mutex<()>,
}

impl Catalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a setup-time builder.
    pub fn builder() -> CatalogBuilder {
        CatalogBuilder::default()
    }

    /// Returns the current snapshot.
    pub fn snapshot(&self) -> Arc<CatalogSnapshot> {
        Arc::clone(&self.current.read())
    }

    /// Looks up a role by name.
    pub fn get_role(&self, name: &str) -> Result<Arc<Role>> {
        self.snapshot().get_role(name)
    }

    /// Looks up a role by id.
    pub fn role_by_id(&self, id: &RoleId) -> Option<Arc<Role>> {
        self.snapshot().role_by_id(id).cloned()
    }

    /// Lists roles sorted by name.
    pub fn list_roles(&self) -> Vec<Arc<Role>> {
        self.snapshot().list_roles()
    }

    /// Returns whether the key is in the catalog.
    pub fn permission_exists(&self, key: &str) -> bool {
        self.snapshot().permission_exists(key)
    }

    /// Returns whether the key is inheritable; unknown keys are not.
    pub fn is_inheritable(&self, key: &str) -> bool {
        self.snapshot().is_inheritable(key)
    }

    /// Looks up a catalog entry.
    pub fn permission(&self, key: &str) -> Result<Permission> {
        self.snapshot().permission(key).cloned()
    }

    /// Adds a permission.
    pub fn define_permission(&self, permission: Permission) -> Result<()> {
        self.write(|snapshot| snapshot.insert_permission(permission))
    }

    /// Adds a role; every granted permission must already be defined.
    pub fn define_role(&self, role: Role) -> Result<()> {
        self.write(|snapshot| snapshot.insert_role(role))
    }

    /// Replaces the permission set of a non-system role.
    pub fn set_role_permissions(
        &self,
        name: &str,
        permissions: impl IntoIterator<Item = PermissionKey>,
    ) -> Result<Arc<Role>> {
        let permissions: BTreeSet<PermissionKey> = permissions.into_iter().collect();
        self.write(|snapshot| snapshot.replace_permissions(name, permissions))
    }

    /// Removes a non-system role.
    pub fn remove_role(&self, name: &str) -> Result<Arc<Role>> {
        self.write(|snapshot| snapshot.delete_role(name))
    }

    fn write<T>(&self, apply: impl FnOnce(&mut CatalogSnapshot) -> Result<T>) -> Result<T> {
        let _writer = self.writer.lock();
        let mut next = (*self.snapshot()).clone();
        let output = apply(&mut next)?;
        *self.current.write() = Arc::new(next);
        Ok(output)
    }
}

/// Builder for [`Catalog`].
#[derive(Debug, Default)]
pub struct CatalogBuilder {
    permissions: Vec<Permission>,
    roles: Vec<Role>,
}

impl CatalogBuilder {
    /// Adds a permission.
    pub fn permission(mut self, permission: Permission) -> Self {
        self.permissions.push(permission);
        self
    }

    /// Adds a role.
    pub fn role(mut self, role: Role) -> Self {
        self.roles.push(role);
        self
    }

    /// Validates and builds the catalog.
    pub fn build(self) -> Result<Catalog> {
        let mut snapshot = CatalogSnapshot::default();
        for permission in self.permissions {
            snapshot.insert_permission(permission)?;
        }
        for role in self.roles {
            snapshot.insert_role(role)?;
        }
        Ok(Catalog {
            current: RwLock::new(Arc::new(snapshot)),
            writer: Mutex::new(()),
        })
    }
}
