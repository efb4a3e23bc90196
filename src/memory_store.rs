use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::assignment::{Assignment, AssignmentId};
use crate::error::StoreError;
use crate::store::{AssignmentRepository, HierarchySource};
use crate::types::{EntityRef, PrincipalId};

/// In-memory assignment repository and hierarchy source for tests and demos.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    assignments: RwLock<HashMap<AssignmentId, Assignment>>,
    parents: RwLock<HashMap<EntityRef, EntityRef>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the direct parent of an entity, replacing any previous link.
    pub fn set_parent(&self, child: EntityRef, parent: EntityRef) {
        self.inner.parents.write().insert(child, parent);
    }

    /// Removes the parent link of an entity.
    pub fn remove_parent(&self, child: &EntityRef) {
        self.inner.parents.write().remove(child);
    }

    /// Writes an assignment row directly, bypassing the assignment manager.
    ///
    /// Intended for seeding fixtures such as the first platform administrator.
    pub fn seed_assignment(&self, assignment: Assignment) {
        self.inner
            .assignments
            .write()
            .insert(assignment.id, assignment);
    }

    /// Number of rows, active or not.
    pub fn assignment_count(&self) -> usize {
        self.inner.assignments.read().len()
    }

    fn active_where(&self, keep: impl Fn(&Assignment) -> bool) -> Vec<Assignment> {
        let now = Utc::now();
        let guard = self.inner.assignments.read();
        let mut rows: Vec<Assignment> = guard
            .values()
            .filter(|assignment| assignment.is_active_at(now) && keep(assignment))
            .cloned()
            .collect();
        rows.sort_by_key(|assignment| assignment.granted_at);
        rows
    }
}

#[async_trait]
impl AssignmentRepository for MemoryStore {
    async fn find_active_assignments(
        &self,
        user: &PrincipalId,
    ) -> std::result::Result<Vec<Assignment>, StoreError> {
        Ok(self.active_where(|assignment| &assignment.user_id == user))
    }

    async fn find_active_assignments_for_entity(
        &self,
        user: &PrincipalId,
        entity: &EntityRef,
    ) -> std::result::Result<Vec<Assignment>, StoreError> {
        Ok(self.active_where(|assignment| {
            &assignment.user_id == user && assignment.scope.as_ref() == Some(entity)
        }))
    }

    async fn find_active_global_assignments(
        &self,
        user: &PrincipalId,
    ) -> std::result::Result<Vec<Assignment>, StoreError> {
        Ok(self.active_where(|assignment| {
            &assignment.user_id == user && assignment.scope.is_none()
        }))
    }

    async fn find_assignment(
        &self,
        id: AssignmentId,
    ) -> std::result::Result<Option<Assignment>, StoreError> {
        Ok(self.inner.assignments.read().get(&id).cloned())
    }

    async fn list_assignments_for_entity(
        &self,
        entity: &EntityRef,
    ) -> std::result::Result<Vec<Assignment>, StoreError> {
        let guard = self.inner.assignments.read();
        let mut rows: Vec<Assignment> = guard
            .values()
            .filter(|assignment| assignment.scope.as_ref() == Some(entity))
            .cloned()
            .collect();
        rows.sort_by_key(|assignment| assignment.granted_at);
        Ok(rows)
    }

    async fn insert(&self, assignment: Assignment) -> std::result::Result<(), StoreError> {
        let mut guard = self.inner.assignments.write();
        if guard.contains_key(&assignment.id) {
            return Err(format!("assignment {} already exists", assignment.id).into());
        }
        guard.insert(assignment.id, assignment);
        Ok(())
    }

    async fn update(&self, assignment: Assignment) -> std::result::Result<(), StoreError> {
        let mut guard = self.inner.assignments.write();
        match guard.get_mut(&assignment.id) {
            Some(row) => {
                *row = assignment;
                Ok(())
            }
            None => Err(format!("assignment {} does not exist", assignment.id).into()),
        }
    }

    async fn revoke(
        &self,
        id: AssignmentId,
        at: DateTime<Utc>,
    ) -> std::result::Result<bool, StoreError> {
        let mut guard = self.inner.assignments.write();
        Ok(match guard.get_mut(&id) {
            Some(row) => {
                row.expires_at = Some(at);
                true
            }
            None => false,
        })
    }
}

#[async_trait]
impl HierarchySource for MemoryStore {
    async fn parent(
        &self,
        entity: &EntityRef,
    ) -> std::result::Result<Option<EntityRef>, StoreError> {
        Ok(self.inner.parents.read().get(entity).cloned())
    }
}
