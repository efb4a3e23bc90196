//! Structured events for an external audit collaborator.

use crate::assignment::Assignment;
use crate::error::Dependency;
use crate::types::{EntityRef, PrincipalId};
use async_trait::async_trait;

/// Audit event emitted by the engine and the assignment manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditEvent {
    /// A new assignment was written.
    RoleGranted {
        actor: PrincipalId,
        assignment: Assignment,
    },
    /// An existing active assignment was refreshed.
    RoleGrantRefreshed {
        actor: PrincipalId,
        assignment: Assignment,
    },
    /// An assignment was revoked.
    RoleRevoked {
        actor: PrincipalId,
        assignment: Assignment,
    },
    /// A parent link loop was found while walking up from `start`.
    ///
    /// `chain` holds the ancestors collected before the walk reached
    /// `revisited`, which was already on the path.
    CycleDetected {
        start: EntityRef,
        revisited: EntityRef,
        chain: Vec<EntityRef>,
    },
    /// A collaborator failed or timed out and a check failed closed.
    DependencyUnavailable {
        dependency: Dependency,
        operation: &'static str,
        reason: String,
    },
}

impl AuditEvent {
    /// Returns a stable action identifier.
    pub fn action(&self) -> &'static str {
        match self {
            Self::RoleGranted { .. } => "rbac.role.granted",
            Self::RoleGrantRefreshed { .. } => "rbac.role.refreshed",
            Self::RoleRevoked { .. } => "rbac.role.revoked",
            Self::CycleDetected { .. } => "rbac.hierarchy.cycle_detected",
            Self::DependencyUnavailable { .. } => "rbac.dependency.unavailable",
        }
    }
}

/// Receives audit events. Implementations must not fail the calling operation.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Records one event.
    async fn record(&self, event: AuditEvent);
}

/// Sink that writes events as structured `tracing` records.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAudit;

#[async_trait]
impl AuditSink for TracingAudit {
    async fn record(&self, event: AuditEvent) {
        let action = event.action();
        match event {
            AuditEvent::RoleGranted { actor, assignment }
            | AuditEvent::RoleGrantRefreshed { actor, assignment }
            | AuditEvent::RoleRevoked { actor, assignment } => {
                let scope = assignment
                    .scope
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_else(|| "global".to_string());
                tracing::info!(
                    target: "rs_entity_rbac::audit",
                    action,
                    %actor,
                    assignment_id = %assignment.id,
                    user = %assignment.user_id,
                    role = %assignment.role_id,
                    %scope,
                    expires_at = ?assignment.expires_at
                );
            }
            AuditEvent::CycleDetected {
                start,
                revisited,
                chain,
            } => {
                tracing::error!(
                    target: "rs_entity_rbac::audit",
                    action,
                    %start,
                    %revisited,
                    chain_len = chain.len(),
                    "entity hierarchy contains a cycle",
                );
            }
            AuditEvent::DependencyUnavailable {
                dependency,
                operation,
                reason,
            } => {
                tracing::warn!(
                    target: "rs_entity_rbac::audit",
                    action,
                    %dependency,
                    operation,
                    %reason
                );
            }
        }
    }
}

/// Sink that drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoAudit;

#[async_trait]
impl AuditSink for NoAudit {
    async fn record(&self, _event: AuditEvent) {}
}
