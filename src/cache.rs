use crate::permission::PermissionKey;
use crate::types::{EntityRef, PrincipalId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Shared capability set.
pub type CapabilitySet = Arc<BTreeSet<PermissionKey>>;

/// Cache interface for resolution results.
///
/// Writers pass the epoch they read before resolving. An implementation must
/// drop a write whose epoch predates the latest invalidation, so a resolution
/// that raced a grant or revoke cannot store a stale answer.
///
/// Writers also pass `valid_until`, the earliest expiry among the grants the
/// answer was built from. An entry must not be served at or after that
/// instant.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Returns the current invalidation epoch.
    async fn epoch(&self) -> u64;

    /// Gets a cached single-permission decision.
    async fn get_decision(
        &self,
        user: &PrincipalId,
        entity: &EntityRef,
        permission: &PermissionKey,
    ) -> Option<bool>;

    /// Stores a single-permission decision.
    async fn set_decision(
        &self,
        epoch: u64,
        valid_until: Option<DateTime<Utc>>,
        user: &PrincipalId,
        entity: &EntityRef,
        permission: &PermissionKey,
        allowed: bool,
    );

    /// Gets a cached capability set for a (user, entity) pair.
    async fn get_capabilities(
        &self,
        user: &PrincipalId,
        entity: &EntityRef,
    ) -> Option<CapabilitySet>;

    /// Stores a capability set for a (user, entity) pair.
    async fn set_capabilities(
        &self,
        epoch: u64,
        valid_until: Option<DateTime<Utc>>,
        user: &PrincipalId,
        entity: &EntityRef,
        capabilities: CapabilitySet,
    );

    /// Drops every entry for a principal.
    async fn invalidate_principal(&self, user: &PrincipalId);

    /// Drops every entry.
    async fn invalidate_all(&self);
}

/// No-op cache implementation.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCache;

#[async_trait]
impl Cache for NoCache {
    async fn epoch(&self) -> u64 {
        0
    }

    async fn get_decision(
        &self,
        _user: &PrincipalId,
        _entity: &EntityRef,
        _permission: &PermissionKey,
    ) -> Option<bool> {
        None
    }

    async fn set_decision(
        &self,
        _epoch: u64,
        _valid_until: Option<DateTime<Utc>>,
        _user: &PrincipalId,
        _entity: &EntityRef,
        _permission: &PermissionKey,
        _allowed: bool,
    ) {
    }

    async fn get_capabilities(
        &self,
        _user: &PrincipalId,
        _entity: &EntityRef,
    ) -> Option<CapabilitySet> {
        None
    }

    async fn set_capabilities(
        &self,
        _epoch: u64,
        _valid_until: Option<DateTime<Utc>>,
        _user: &PrincipalId,
        _entity: &EntityRef,
        _capabilities: CapabilitySet,
    ) {
    }

    async fn invalidate_principal(&self, _user: &PrincipalId) {}

    async fn invalidate_all(&self) {}
}
