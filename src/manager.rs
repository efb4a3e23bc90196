//! Role grants and revocations.
//!
//! Every write is authorized through the same [`Engine`] that answers
//! permission checks, serialized per `(user, role, scope)` tuple, and
//! followed by a cache invalidation for the target principal.

use crate::assignment::{AssignOutcome, Assignment, AssignmentId, AssignmentRequest, RevokeOutcome};
use crate::audit::AuditEvent;
use crate::cache::{Cache, NoCache};
use crate::catalog::{Role, ScopeType};
use crate::engine::Engine;
use crate::error::{Dependency, Error, Result};
use crate::store::{AssignmentRepository, HierarchySource};
use crate::types::{EntityRef, PrincipalId, RoleId};
use chrono::Utc;
use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct WriteKey {
    user: PrincipalId,
    role: RoleId,
    scope: Option<EntityRef>,
}

impl WriteKey {
    fn of(assignment: &Assignment) -> Self {
        Self {
            user: assignment.user_id.clone(),
            role: assignment.role_id.clone(),
            scope: assignment.scope.clone(),
        }
    }
}

/// Grants and revokes role assignments.
pub struct AssignmentManager<R, H, C = NoCache> {
    engine: Arc<Engine<R, H, C>>,
    locks: DashMap<WriteKey, Arc<Mutex<()>>>,
}

impl<R, H, C> AssignmentManager<R, H, C>
where
    R: AssignmentRepository,
    H: HierarchySource,
    C: Cache,
{
    /// Creates a manager that authorizes through `engine`.
    pub fn new(engine: Arc<Engine<R, H, C>>) -> Self {
        Self {
            engine,
            locks: DashMap::new(),
        }
    }

    /// Returns the engine.
    pub fn engine(&self) -> &Arc<Engine<R, H, C>> {
        &self.engine
    }

    /// Grants a role.
    ///
    /// Granting a role the user already holds on the same scope refreshes
    /// the existing row instead of adding a second one.
    #[tracing::instrument(
        skip_all,
        fields(actor = %actor, user = %request.user, role = %request.role)
    )]
    pub async fn assign_role(
        &self,
        actor: &PrincipalId,
        request: AssignmentRequest,
    ) -> Result<AssignOutcome> {
        let role = self.engine.catalog().get_role(request.role.as_str())?;
        match (role.scope_type, &request.scope) {
            (ScopeType::Global, Some(_)) => {
                return Err(Error::InvalidScope {
                    role: role.name.clone(),
                    expected: ScopeType::Global,
                    detail: "an entity must not be supplied",
                });
            }
            (ScopeType::Entity, None) => {
                return Err(Error::InvalidScope {
                    role: role.name.clone(),
                    expected: ScopeType::Entity,
                    detail: "an entity is required",
                });
            }
            _ => {}
        }
        if request.expires_at.is_some_and(|at| at <= Utc::now()) {
            return Err(Error::InvalidExpiry);
        }
        self.authorize(actor, request.scope.as_ref(), "assign roles")
            .await?;

        let key = WriteKey {
            user: request.user.clone(),
            role: role.id.clone(),
            scope: request.scope.clone(),
        };
        let outcome = self
            .serialized(key, self.write_grant(actor, &role, request))
            .await?;

        let assignment = outcome.assignment();
        self.engine.invalidate_principal(&assignment.user_id).await;
        let event = match &outcome {
            AssignOutcome::Created(assignment) => AuditEvent::RoleGranted {
                actor: actor.clone(),
                assignment: assignment.clone(),
            },
            AssignOutcome::Refreshed(assignment) => AuditEvent::RoleGrantRefreshed {
                actor: actor.clone(),
                assignment: assignment.clone(),
            },
        };
        self.engine.audit_sink().record(event).await;
        tracing::info!(
            assignment_id = %assignment.id,
            refreshed = matches!(outcome, AssignOutcome::Refreshed(_)),
            "role assigned"
        );
        Ok(outcome)
    }

    /// Revokes an assignment by marking it expired now. The row is kept.
    #[tracing::instrument(skip_all, fields(actor = %actor, assignment_id = %id))]
    pub async fn revoke_role(&self, actor: &PrincipalId, id: AssignmentId) -> Result<RevokeOutcome> {
        let assignment = self.load(id).await?;
        self.authorize(actor, assignment.scope.as_ref(), "revoke roles")
            .await?;

        let outcome = self
            .serialized(WriteKey::of(&assignment), self.revoke_current(id))
            .await?;

        if let RevokeOutcome::Revoked(assignment) = &outcome {
            self.engine.invalidate_principal(&assignment.user_id).await;
            self.engine
                .audit_sink()
                .record(AuditEvent::RoleRevoked {
                    actor: actor.clone(),
                    assignment: assignment.clone(),
                })
                .await;
            tracing::info!(user = %assignment.user_id, "role revoked");
        } else {
            tracing::debug!("assignment already inactive");
        }
        Ok(outcome)
    }

    /// Lists active assignments scoped to `entity`.
    pub async fn list_assignments(&self, entity: &EntityRef) -> Result<Vec<Assignment>> {
        let rows = self
            .engine
            .budget()
            .call(
                Dependency::AssignmentRepository,
                "list_assignments_for_entity",
                self.engine.repository().list_assignments_for_entity(entity),
            )
            .await?;
        let now = Utc::now();
        Ok(rows
            .into_iter()
            .filter(|assignment| assignment.is_active_at(now))
            .collect())
    }

    /// Lists active assignments held by `user`, global and scoped.
    pub async fn list_user_assignments(&self, user: &PrincipalId) -> Result<Vec<Assignment>> {
        let rows = self
            .engine
            .budget()
            .call(
                Dependency::AssignmentRepository,
                "find_active_assignments",
                self.engine.repository().find_active_assignments(user),
            )
            .await?;
        let now = Utc::now();
        Ok(rows
            .into_iter()
            .filter(|assignment| assignment.is_active_at(now))
            .collect())
    }

    async fn revoke_current(&self, id: AssignmentId) -> Result<RevokeOutcome> {
        // Re-read under the lock; a concurrent write may have changed the row.
        let current = self.load(id).await?;
        let now = Utc::now();
        if !current.is_active_at(now) {
            return Ok(RevokeOutcome::AlreadyInactive(current));
        }
        let revoked = self
            .engine
            .budget()
            .call(
                Dependency::AssignmentRepository,
                "revoke",
                self.engine.repository().revoke(id, now),
            )
            .await?;
        if !revoked {
            return Err(Error::AssignmentNotFound(id));
        }
        Ok(RevokeOutcome::Revoked(Assignment {
            expires_at: Some(now),
            ..current
        }))
    }

    async fn load(&self, id: AssignmentId) -> Result<Assignment> {
        self.engine
            .budget()
            .call(
                Dependency::AssignmentRepository,
                "find_assignment",
                self.engine.repository().find_assignment(id),
            )
            .await?
            .ok_or(Error::AssignmentNotFound(id))
    }

    /// Entity grants need the manage-roles permission on the entity; global
    /// grants need the system override.
    async fn authorize(
        &self,
        actor: &PrincipalId,
        scope: Option<&EntityRef>,
        action: &'static str,
    ) -> Result<()> {
        let allowed = match scope {
            Some(entity) => self
                .engine
                .check(actor, entity, self.engine.manage_roles_permission())
                .await?
                .is_allowed(),
            None => self.engine.is_system_user(actor).await?,
        };
        if allowed {
            return Ok(());
        }
        let scope = scope.map_or_else(|| "global scope".to_string(), ToString::to_string);
        tracing::warn!(%actor, action, %scope, "rejected unauthorized role change");
        Err(Error::Unauthorized {
            actor: actor.clone(),
            action,
            scope,
        })
    }

    async fn write_grant(
        &self,
        actor: &PrincipalId,
        role: &Role,
        request: AssignmentRequest,
    ) -> Result<AssignOutcome> {
        let budget = self.engine.budget();
        let repository = self.engine.repository();
        let existing = match &request.scope {
            Some(entity) => {
                budget
                    .call(
                        Dependency::AssignmentRepository,
                        "find_active_assignments_for_entity",
                        repository.find_active_assignments_for_entity(&request.user, entity),
                    )
                    .await?
            }
            None => {
                budget
                    .call(
                        Dependency::AssignmentRepository,
                        "find_active_global_assignments",
                        repository.find_active_global_assignments(&request.user),
                    )
                    .await?
            }
        };

        let now = Utc::now();
        let current = existing.into_iter().find(|assignment| {
            assignment.is_active_at(now)
                && assignment.same_grant(&request.user, &role.id, request.scope.as_ref())
        });
        match current {
            Some(mut assignment) => {
                assignment.granted_by = actor.clone();
                assignment.granted_at = now;
                assignment.expires_at = request.expires_at;
                if request.notes.is_some() {
                    assignment.notes = request.notes;
                }
                budget
                    .call(
                        Dependency::AssignmentRepository,
                        "update",
                        repository.update(assignment.clone()),
                    )
                    .await?;
                Ok(AssignOutcome::Refreshed(assignment))
            }
            None => {
                let assignment = Assignment {
                    id: AssignmentId::new_v4(),
                    user_id: request.user,
                    role_id: role.id.clone(),
                    scope: request.scope,
                    granted_by: actor.clone(),
                    granted_at: now,
                    expires_at: request.expires_at,
                    notes: request.notes,
                };
                budget
                    .call(
                        Dependency::AssignmentRepository,
                        "insert",
                        repository.insert(assignment.clone()),
                    )
                    .await?;
                Ok(AssignOutcome::Created(assignment))
            }
        }
    }

    async fn serialized<T>(&self, key: WriteKey, write: impl Future<Output = Result<T>>) -> Result<T> {
        let lock = Arc::clone(self.locks.entry(key.clone()).or_default().value());
        let outcome = {
            let _guard = lock.lock().await;
            write.await
        };
        drop(lock);
        self.locks
            .remove_if(&key, |_, lock| Arc::strong_count(lock) == 1);
        outcome
    }
}
