use crate::assignment::{Assignment, AssignmentId};
use crate::error::StoreError;
use crate::types::{EntityRef, PrincipalId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Read/write access to user-role-entity grants.
///
/// "Active" means `expires_at` is unset or in the future. The engine re-checks
/// activity itself, so an implementation that returns a just-expired row does
/// not grant access.
#[async_trait]
pub trait AssignmentRepository: Send + Sync {
    /// Returns every active assignment held by a principal, global and scoped.
    async fn find_active_assignments(
        &self,
        user: &PrincipalId,
    ) -> std::result::Result<Vec<Assignment>, StoreError>;

    /// Returns active assignments held by a principal on exactly one entity.
    async fn find_active_assignments_for_entity(
        &self,
        user: &PrincipalId,
        entity: &EntityRef,
    ) -> std::result::Result<Vec<Assignment>, StoreError>;

    /// Returns active global assignments held by a principal.
    async fn find_active_global_assignments(
        &self,
        user: &PrincipalId,
    ) -> std::result::Result<Vec<Assignment>, StoreError>;

    /// Fetches one assignment, active or not.
    async fn find_assignment(
        &self,
        id: AssignmentId,
    ) -> std::result::Result<Option<Assignment>, StoreError>;

    /// Returns all assignments scoped to an entity, including inactive rows.
    async fn list_assignments_for_entity(
        &self,
        entity: &EntityRef,
    ) -> std::result::Result<Vec<Assignment>, StoreError>;

    /// Inserts a new assignment.
    async fn insert(&self, assignment: Assignment) -> std::result::Result<(), StoreError>;

    /// Overwrites an existing assignment with the same id.
    async fn update(&self, assignment: Assignment) -> std::result::Result<(), StoreError>;

    /// Marks an assignment as expired at `at`.
    ///
    /// Returns false if no row with this id exists.
    async fn revoke(
        &self,
        id: AssignmentId,
        at: DateTime<Utc>,
    ) -> std::result::Result<bool, StoreError>;
}

/// Read access to entity parent links.
#[async_trait]
pub trait HierarchySource: Send + Sync {
    /// Returns the direct parent of an entity, if any.
    async fn parent(
        &self,
        entity: &EntityRef,
    ) -> std::result::Result<Option<EntityRef>, StoreError>;
}

#[async_trait]
impl<T> AssignmentRepository for std::sync::Arc<T>
where
    T: AssignmentRepository + ?Sized,
{
    async fn find_active_assignments(
        &self,
        user: &PrincipalId,
    ) -> std::result::Result<Vec<Assignment>, StoreError> {
        (**self).find_active_assignments(user).await
    }

    async fn find_active_assignments_for_entity(
        &self,
        user: &PrincipalId,
        entity: &EntityRef,
    ) -> std::result::Result<Vec<Assignment>, StoreError> {
        (**self).find_active_assignments_for_entity(user, entity).await
    }

    async fn find_active_global_assignments(
        &self,
        user: &PrincipalId,
    ) -> std::result::Result<Vec<Assignment>, StoreError> {
        (**self).find_active_global_assignments(user).await
    }

    async fn find_assignment(
        &self,
        id: AssignmentId,
    ) -> std::result::Result<Option<Assignment>, StoreError> {
        (**self).find_assignment(id).await
    }

    async fn list_assignments_for_entity(
        &self,
        entity: &EntityRef,
    ) -> std::result::Result<Vec<Assignment>, StoreError> {
        (**self).list_assignments_for_entity(entity).await
    }

    async fn insert(&self, assignment: Assignment) -> std::result::Result<(), StoreError> {
        (**self).insert(assignment).await
    }

    async fn update(&self, assignment: Assignment) -> std::result::Result<(), StoreError> {
        (**self).update(assignment).await
    }

    async fn revoke(
        &self,
        id: AssignmentId,
        at: DateTime<Utc>,
    ) -> std::result::Result<bool, StoreError> {
        (**self).revoke(id, at).await
    }
}

#[async_trait]
impl<T> HierarchySource for std::sync::Arc<T>
where
    T: HierarchySource + ?Sized,
{
    async fn parent(
        &self,
        entity: &EntityRef,
    ) -> std::result::Result<Option<EntityRef>, StoreError> {
        (**self).parent(entity).await
    }
}
