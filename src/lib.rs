//! Entity-scoped RBAC with hierarchical permission inheritance.
//!
//! Roles are granted either globally or on one entity (an organization,
//! venue, event, ...). A permission marked inheritable flows from an entity
//! to its descendants, so a venue manager can edit the logistics of every
//! event at the venue without a grant per event. Everything is
//! deny-by-default: unknown principals, entities and permission keys deny,
//! and so does a repository or hierarchy source that fails or times out.
//!
//! [`Engine`] answers checks, [`AssignmentManager`] grants and revokes roles
//! through the same engine, and [`Catalog`] holds the role and permission
//! definitions.
//!
//! # Examples
//!
//! Checking a permission inherited from a venue (enable `memory-store`):
//! ```no_run
//! # #[cfg(feature = "memory-store")]
//! # async fn demo() -> rs_entity_rbac::Result<()> {
//! use rs_entity_rbac::{EngineBuilder, EntityId, EntityRef, MemoryStore, PrincipalId};
//! use rs_entity_rbac::defaults::{platform_catalog, EDIT_EVENT_LOGISTICS};
//!
//! let store = MemoryStore::new();
//! let venue = EntityRef::venue(EntityId::new("v1")?);
//! let event = EntityRef::event(EntityId::new("e1")?);
//! store.set_parent(event.clone(), venue);
//!
//! let engine = EngineBuilder::new(platform_catalog()?, store.clone(), store).build();
//! let user = PrincipalId::new("user_1")?;
//! let allowed = engine.has_permission(&user, &event, EDIT_EVENT_LOGISTICS).await;
//! # let _ = allowed;
//! # Ok(())
//! # }
//! ```
//!
//! Creating a process-local cache (enable `memory-cache`):
//! ```no_run
//! # #[cfg(feature = "memory-cache")]
//! # {
//! use rs_entity_rbac::MemoryCache;
//! use std::time::Duration;
//! let cache = MemoryCache::new(1024).with_ttl(Duration::from_secs(2));
//! # let _ = cache;
//! # }
//! ```
#![forbid(unsafe_code)]

mod assignment;
mod audit;
mod budget;
mod cache;
mod catalog;
mod config;
pub mod defaults;
mod engine;
mod error;
mod hierarchy;
mod manager;
mod permission;
mod store;
mod types;

#[cfg(feature = "memory-cache")]
mod memory_cache;

#[cfg(feature = "memory-store")]
mod memory_store;

#[cfg(feature = "axum")]
pub mod axum;

pub use crate::assignment::{
    AssignOutcome, Assignment, AssignmentId, AssignmentRequest, RevokeOutcome,
};
pub use crate::audit::{AuditEvent, AuditSink, NoAudit, TracingAudit};
pub use crate::cache::{Cache, CapabilitySet, NoCache};
pub use crate::catalog::{Catalog, CatalogBuilder, CatalogSnapshot, Role, ScopeType};
pub use crate::config::EngineConfig;
pub use crate::engine::{Decision, Engine, EngineBuilder};
pub use crate::error::{Dependency, DependencyFailure, Error, Result, StoreError};
pub use crate::hierarchy::{AncestorChain, AncestorWalk, HierarchyResolver, Truncation};
pub use crate::manager::AssignmentManager;
pub use crate::permission::{Permission, PermissionKey};
pub use crate::store::{AssignmentRepository, HierarchySource};
pub use crate::types::{EntityId, EntityRef, EntityType, PrincipalId, RoleId, RoleName};

#[cfg(feature = "memory-store")]
pub use crate::memory_store::MemoryStore;

#[cfg(feature = "memory-cache")]
pub use crate::memory_cache::MemoryCache;
