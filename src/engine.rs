use crate::assignment::Assignment;
use crate::audit::{AuditEvent, AuditSink, TracingAudit};
use crate::budget::CallBudget;
use crate::cache::{Cache, CapabilitySet, NoCache};
use crate::catalog::{Catalog, CatalogSnapshot, Role, ScopeType};
use crate::config::EngineConfig;
use crate::error::{Dependency, Error, Result};
use crate::hierarchy::{AncestorChain, HierarchyResolver};
use crate::permission::{Permission, PermissionKey};
use crate::store::{AssignmentRepository, HierarchySource};
use crate::types::{EntityRef, PrincipalId};
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

/// Authorization decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Permission is granted.
    Allow,
    /// Permission is denied.
    Deny,
}

impl Decision {
    /// Returns true for [`Decision::Allow`].
    pub fn is_allowed(self) -> bool {
        self == Self::Allow
    }
}

impl From<bool> for Decision {
    fn from(allowed: bool) -> Self {
        if allowed { Self::Allow } else { Self::Deny }
    }
}

/// Permission resolution engine.
///
/// Answers "may this principal do X on this entity" from global roles,
/// roles granted on the entity itself, and inheritable permissions granted
/// on its ancestors. Share it behind an [`Arc`]; every method takes `&self`.
pub struct Engine<R, H, C = NoCache> {
    catalog: Arc<Catalog>,
    repository: R,
    hierarchy: HierarchyResolver<H>,
    cache: C,
    budget: CallBudget,
    manage_roles: PermissionKey,
    audit: Arc<dyn AuditSink>,
}

/// Builder for [`Engine`].
pub struct EngineBuilder<R, H, C = NoCache> {
    catalog: Arc<Catalog>,
    repository: R,
    hierarchy: H,
    cache: C,
    dependency_timeout: Option<Duration>,
    max_hierarchy_depth: usize,
    enforce_parent_types: bool,
    manage_roles: PermissionKey,
    audit: Arc<dyn AuditSink>,
}

impl<R, H> EngineBuilder<R, H, NoCache> {
    /// Creates a new builder with default configuration.
    pub fn new(catalog: impl Into<Arc<Catalog>>, repository: R, hierarchy: H) -> Self {
        let defaults = EngineConfig::default();
        Self {
            catalog: catalog.into(),
            repository,
            hierarchy,
            cache: NoCache,
            dependency_timeout: defaults.dependency_timeout(),
            max_hierarchy_depth: defaults.max_hierarchy_depth,
            enforce_parent_types: defaults.enforce_parent_types,
            manage_roles: PermissionKey::from_static(crate::defaults::MANAGE_ROLES),
            audit: Arc::new(TracingAudit),
        }
    }
}

impl<R, H, C> EngineBuilder<R, H, C> {
    /// Applies every setting in `config`.
    pub fn config(mut self, config: &EngineConfig) -> Result<Self> {
        self.manage_roles = config.manage_roles_key()?;
        self.dependency_timeout = config.dependency_timeout();
        self.max_hierarchy_depth = config.max_hierarchy_depth;
        self.enforce_parent_types = config.enforce_parent_types;
        Ok(self)
    }

    /// Sets the budget for each repository and hierarchy call; `None` disables it.
    ///
    /// A budget relies on the tokio timer, so checks must then run inside a
    /// tokio runtime.
    pub fn dependency_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.dependency_timeout = timeout;
        self
    }

    /// Sets the maximum number of ancestors visited per walk.
    pub fn max_hierarchy_depth(mut self, depth: usize) -> Self {
        self.max_hierarchy_depth = depth;
        self
    }

    /// Enables or disables the entity parent-type table.
    pub fn enforce_parent_types(mut self, on: bool) -> Self {
        self.enforce_parent_types = on;
        self
    }

    /// Sets the permission required to grant or revoke roles within a scope.
    pub fn manage_roles_permission(mut self, key: PermissionKey) -> Self {
        self.manage_roles = key;
        self
    }

    /// Sets the audit sink.
    pub fn audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    /// Sets the cache implementation.
    pub fn cache<C2: Cache>(self, cache: C2) -> EngineBuilder<R, H, C2> {
        EngineBuilder {
            catalog: self.catalog,
            repository: self.repository,
            hierarchy: self.hierarchy,
            cache,
            dependency_timeout: self.dependency_timeout,
            max_hierarchy_depth: self.max_hierarchy_depth,
            enforce_parent_types: self.enforce_parent_types,
            manage_roles: self.manage_roles,
            audit: self.audit,
        }
    }

    /// Builds the engine.
    pub fn build(self) -> Engine<R, H, C>
    where
        H: HierarchySource,
    {
        let budget = CallBudget::new(self.dependency_timeout);
        Engine {
            catalog: self.catalog,
            repository: self.repository,
            hierarchy: HierarchyResolver::new(
                self.hierarchy,
                budget,
                self.max_hierarchy_depth,
                self.enforce_parent_types,
                Arc::clone(&self.audit),
            ),
            cache: self.cache,
            budget,
            manage_roles: self.manage_roles,
            audit: self.audit,
        }
    }
}

/// What one expansion has to find.
#[derive(Debug, Clone, Copy)]
enum Query<'a> {
    One {
        key: &'a PermissionKey,
        inheritable: bool,
    },
    All,
}

/// Active grants of one principal, indexed by scope.
#[derive(Debug, Default)]
struct Grants {
    system_override: bool,
    global: Vec<Arc<Role>>,
    scoped: HashMap<EntityRef, Vec<Arc<Role>>>,
    /// Earliest expiry among the indexed grants.
    valid_until: Option<DateTime<Utc>>,
}

/// Outcome of one expansion.
#[derive(Debug)]
struct Resolution {
    granted: BTreeSet<PermissionKey>,
    /// The answer may change once this instant passes.
    valid_until: Option<DateTime<Utc>>,
}

impl Grants {
    fn index(snapshot: &CatalogSnapshot, assignments: Vec<Assignment>, now: DateTime<Utc>) -> Self {
        let mut grants = Self::default();
        for assignment in assignments {
            if !assignment.is_active_at(now) {
                continue;
            }
            let Some(role) = snapshot.role_by_id(&assignment.role_id) else {
                tracing::debug!(
                    assignment_id = %assignment.id,
                    role = %assignment.role_id,
                    "skipping assignment for unknown role"
                );
                continue;
            };
            let expires_at = assignment.expires_at;
            match (role.scope_type, assignment.scope) {
                (ScopeType::Global, None) => {
                    grants.system_override |= role.is_override();
                    grants.global.push(Arc::clone(role));
                }
                (ScopeType::Entity, Some(entity)) => {
                    grants
                        .scoped
                        .entry(entity)
                        .or_default()
                        .push(Arc::clone(role));
                }
                _ => {
                    tracing::warn!(
                        assignment_id = %assignment.id,
                        role = %role.name,
                        "skipping assignment whose scope does not match its role"
                    );
                    continue;
                }
            }
            if let Some(expires_at) = expires_at {
                grants.valid_until = Some(
                    grants
                        .valid_until
                        .map_or(expires_at, |current| current.min(expires_at)),
                );
            }
        }
        grants
    }

    fn at(&self, entity: &EntityRef) -> &[Arc<Role>] {
        self.scoped.get(entity).map(Vec::as_slice).unwrap_or_default()
    }
}

fn absorb(
    snapshot: &CatalogSnapshot,
    role: &Role,
    query: Query<'_>,
    inherited: bool,
    granted: &mut BTreeSet<PermissionKey>,
) {
    match query {
        Query::One { key, .. } => {
            if role.permissions.contains(key) {
                granted.insert(key.clone());
            }
        }
        Query::All => granted.extend(
            role.permissions
                .iter()
                .filter(|key| !inherited || snapshot.is_inheritable(key.as_str()))
                .cloned(),
        ),
    }
}

fn satisfied(query: Query<'_>, granted: &BTreeSet<PermissionKey>) -> bool {
    match query {
        Query::One { key, .. } => granted.contains(key),
        Query::All => false,
    }
}

impl<R, H, C> Engine<R, H, C>
where
    R: AssignmentRepository,
    H: HierarchySource,
    C: Cache,
{
    /// Returns the catalog.
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Returns the permission required to grant and revoke roles.
    pub fn manage_roles_permission(&self) -> &PermissionKey {
        &self.manage_roles
    }

    pub(crate) fn repository(&self) -> &R {
        &self.repository
    }

    pub(crate) fn budget(&self) -> CallBudget {
        self.budget
    }

    pub(crate) fn audit_sink(&self) -> &dyn AuditSink {
        self.audit.as_ref()
    }

    /// Returns whether `user` holds `permission` on `entity`.
    ///
    /// Never fails: unknown keys and dependency failures deny. Dependency
    /// failures are also logged and sent to the audit sink.
    pub async fn has_permission(
        &self,
        user: &PrincipalId,
        entity: &EntityRef,
        permission: &str,
    ) -> bool {
        let Ok(key) = PermissionKey::new(permission) else {
            tracing::debug!(%user, %entity, permission, "denying malformed permission key");
            return false;
        };
        match self.check(user, entity, &key).await {
            Ok(decision) => decision.is_allowed(),
            Err(err) => {
                self.report_failure("has_permission", &err).await;
                false
            }
        }
    }

    /// String-typed form of [`Engine::has_permission`] for request handlers.
    ///
    /// Unparsable principal ids, entity types, entity ids or keys deny.
    pub async fn has_entity_permission(
        &self,
        principal: &str,
        entity_type: &str,
        entity_id: &str,
        permission: &str,
    ) -> bool {
        let (Ok(user), Ok(entity)) = (
            PrincipalId::new(principal),
            EntityRef::parse(entity_type, entity_id),
        ) else {
            tracing::debug!(principal, entity_type, entity_id, "denying malformed request");
            return false;
        };
        self.has_permission(&user, &entity, permission).await
    }

    /// Strict form of [`Engine::has_permission`].
    ///
    /// Returns [`Error::PermissionNotFound`] for keys outside the catalog and
    /// [`Error::DependencyUnavailable`] when a collaborator fails, so callers
    /// can tell a misconfiguration or outage apart from a deny.
    pub async fn check(
        &self,
        user: &PrincipalId,
        entity: &EntityRef,
        permission: &PermissionKey,
    ) -> Result<Decision> {
        // Read the epoch before the catalog and repository so a concurrent
        // write invalidates whatever this call stores.
        let epoch = self.cache.epoch().await;
        let snapshot = self.catalog.snapshot();
        let inheritable = snapshot.permission(permission.as_str())?.inheritable;

        if let Some(allowed) = self.cache.get_decision(user, entity, permission).await {
            tracing::debug!(%user, %entity, %permission, allowed, "decision cache hit");
            return Ok(allowed.into());
        }
        if let Some(capabilities) = self.cache.get_capabilities(user, entity).await {
            tracing::debug!(%user, %entity, %permission, "capability cache hit");
            return Ok(capabilities.contains(permission).into());
        }

        let resolution = self
            .expand(
                &snapshot,
                user,
                entity,
                Query::One {
                    key: permission,
                    inheritable,
                },
            )
            .await?;
        let allowed = resolution.granted.contains(permission);
        self.cache
            .set_decision(
                epoch,
                resolution.valid_until,
                user,
                entity,
                permission,
                allowed,
            )
            .await;
        tracing::trace!(%user, %entity, %permission, allowed, "resolved permission");
        Ok(allowed.into())
    }

    /// Returns every permission `user` holds on `entity`.
    ///
    /// Never fails; dependency failures yield an empty set.
    pub async fn get_capabilities(
        &self,
        user: &PrincipalId,
        entity: &EntityRef,
    ) -> BTreeSet<PermissionKey> {
        match self.capabilities(user, entity).await {
            Ok(capabilities) => (*capabilities).clone(),
            Err(err) => {
                self.report_failure("get_capabilities", &err).await;
                BTreeSet::new()
            }
        }
    }

    /// Strict form of [`Engine::get_capabilities`].
    pub async fn capabilities(
        &self,
        user: &PrincipalId,
        entity: &EntityRef,
    ) -> Result<CapabilitySet> {
        let epoch = self.cache.epoch().await;
        let snapshot = self.catalog.snapshot();
        if let Some(capabilities) = self.cache.get_capabilities(user, entity).await {
            tracing::debug!(%user, %entity, "capability cache hit");
            return Ok(capabilities);
        }

        let resolution = self.expand(&snapshot, user, entity, Query::All).await?;
        let capabilities = Arc::new(resolution.granted);
        self.cache
            .set_capabilities(
                epoch,
                resolution.valid_until,
                user,
                entity,
                Arc::clone(&capabilities),
            )
            .await;
        tracing::trace!(%user, %entity, count = capabilities.len(), "resolved capabilities");
        Ok(capabilities)
    }

    /// Returns whether `user` holds an active global system role.
    pub async fn is_system_user(&self, user: &PrincipalId) -> Result<bool> {
        let assignments = self
            .budget
            .call(
                Dependency::AssignmentRepository,
                "find_active_global_assignments",
                self.repository.find_active_global_assignments(user),
            )
            .await?;
        let snapshot = self.catalog.snapshot();
        let now = Utc::now();
        Ok(assignments.iter().any(|assignment| {
            assignment.scope.is_none()
                && assignment.is_active_at(now)
                && snapshot
                    .role_by_id(&assignment.role_id)
                    .is_some_and(|role| role.is_override())
        }))
    }

    /// Returns the ancestors of `entity`, nearest first.
    pub async fn ancestor_chain(&self, entity: &EntityRef) -> Result<AncestorChain> {
        self.hierarchy.ancestor_chain(entity).await
    }

    /// Adds a permission to the catalog.
    pub async fn define_permission(&self, permission: Permission) -> Result<()> {
        self.catalog.define_permission(permission)?;
        self.cache.invalidate_all().await;
        Ok(())
    }

    /// Adds a role to the catalog.
    pub async fn define_role(&self, role: Role) -> Result<()> {
        self.catalog.define_role(role)?;
        self.cache.invalidate_all().await;
        Ok(())
    }

    /// Replaces the permissions of a non-system role.
    pub async fn set_role_permissions(
        &self,
        name: &str,
        permissions: impl IntoIterator<Item = PermissionKey>,
    ) -> Result<Arc<Role>> {
        let role = self.catalog.set_role_permissions(name, permissions)?;
        self.cache.invalidate_all().await;
        tracing::info!(role = %role.name, "role permissions replaced");
        Ok(role)
    }

    /// Removes a non-system role. Existing assignments of it stop contributing.
    pub async fn remove_role(&self, name: &str) -> Result<Arc<Role>> {
        let role = self.catalog.remove_role(name)?;
        self.cache.invalidate_all().await;
        tracing::info!(role = %role.name, "role removed");
        Ok(role)
    }

    pub(crate) async fn invalidate_principal(&self, user: &PrincipalId) {
        self.cache.invalidate_principal(user).await;
    }

    async fn report_failure(&self, operation: &'static str, err: &Error) {
        match err {
            Error::DependencyUnavailable {
                dependency, source, ..
            } => {
                tracing::warn!(operation, %dependency, error = %source, "failing closed");
                self.audit
                    .record(AuditEvent::DependencyUnavailable {
                        dependency: *dependency,
                        operation,
                        reason: source.to_string(),
                    })
                    .await;
            }
            other => {
                tracing::debug!(operation, error = %other, "denying");
            }
        }
    }

    /// Shared expansion step behind single checks and capability listing.
    ///
    /// Returns the granted subset of what `query` asks for: the one key (or
    /// nothing) for [`Query::One`], the whole capability set for [`Query::All`].
    /// Unless the key is found first, inheritable queries walk the whole
    /// ancestor chain, so a cycle behind a deny is always reported.
    async fn expand(
        &self,
        snapshot: &CatalogSnapshot,
        user: &PrincipalId,
        entity: &EntityRef,
        query: Query<'_>,
    ) -> Result<Resolution> {
        let assignments = self
            .budget
            .call(
                Dependency::AssignmentRepository,
                "find_active_assignments",
                self.repository.find_active_assignments(user),
            )
            .await?;
        let grants = Grants::index(snapshot, assignments, Utc::now());
        let valid_until = grants.valid_until;

        if grants.system_override {
            let granted = match query {
                Query::One { key, .. } => BTreeSet::from([key.clone()]),
                Query::All => snapshot.permission_keys(),
            };
            return Ok(Resolution {
                granted,
                valid_until,
            });
        }

        let mut granted = BTreeSet::new();
        for role in grants.global.iter().chain(grants.at(entity)) {
            absorb(snapshot, role, query, false, &mut granted);
        }
        if satisfied(query, &granted)
            || matches!(
                query,
                Query::One {
                    inheritable: false,
                    ..
                }
            )
        {
            return Ok(Resolution {
                granted,
                valid_until,
            });
        }

        let mut walk = self.hierarchy.walk(entity);
        while let Some(ancestor) = walk.next().await? {
            for role in grants.at(&ancestor) {
                absorb(snapshot, role, query, true, &mut granted);
            }
            if satisfied(query, &granted) {
                break;
            }
        }
        Ok(Resolution {
            granted,
            valid_until,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assignment::AssignmentId;
    use crate::error::{DependencyFailure, StoreError};
    use crate::types::{EntityId, EntityType, RoleId, RoleName};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TestStore {
        assignments: Vec<Assignment>,
        parents: HashMap<EntityRef, EntityRef>,
        repository_down: bool,
        slow_hierarchy: Option<Duration>,
        repository_calls: AtomicUsize,
        parent_calls: AtomicUsize,
    }

    #[async_trait]
    impl AssignmentRepository for TestStore {
        async fn find_active_assignments(
            &self,
            user: &PrincipalId,
        ) -> std::result::Result<Vec<Assignment>, StoreError> {
            self.repository_calls.fetch_add(1, Ordering::SeqCst);
            if self.repository_down {
                return Err("repository offline".into());
            }
            Ok(self
                .assignments
                .iter()
                .filter(|assignment| &assignment.user_id == user)
                .cloned()
                .collect())
        }

        async fn find_active_assignments_for_entity(
            &self,
            _user: &PrincipalId,
            _entity: &EntityRef,
        ) -> std::result::Result<Vec<Assignment>, StoreError> {
            unreachable!("not used by resolution")
        }

        async fn find_active_global_assignments(
            &self,
            user: &PrincipalId,
        ) -> std::result::Result<Vec<Assignment>, StoreError> {
            Ok(self
                .assignments
                .iter()
                .filter(|assignment| &assignment.user_id == user && assignment.scope.is_none())
                .cloned()
                .collect())
        }

        async fn find_assignment(
            &self,
            _id: AssignmentId,
        ) -> std::result::Result<Option<Assignment>, StoreError> {
            unreachable!("not used by resolution")
        }

        async fn list_assignments_for_entity(
            &self,
            _entity: &EntityRef,
        ) -> std::result::Result<Vec<Assignment>, StoreError> {
            unreachable!("not used by resolution")
        }

        async fn insert(&self, _assignment: Assignment) -> std::result::Result<(), StoreError> {
            unreachable!("not used by resolution")
        }

        async fn update(&self, _assignment: Assignment) -> std::result::Result<(), StoreError> {
            unreachable!("not used by resolution")
        }

        async fn revoke(
            &self,
            _id: AssignmentId,
            _at: DateTime<Utc>,
        ) -> std::result::Result<bool, StoreError> {
            unreachable!("not used by resolution")
        }
    }

    #[async_trait]
    impl HierarchySource for TestStore {
        async fn parent(
            &self,
            entity: &EntityRef,
        ) -> std::result::Result<Option<EntityRef>, StoreError> {
            self.parent_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.slow_hierarchy {
                tokio::time::sleep(delay).await;
            }
            Ok(self.parents.get(entity).cloned())
        }
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<AuditEvent>>);

    #[async_trait]
    impl AuditSink for Recorder {
        async fn record(&self, event: AuditEvent) {
            self.0.lock().unwrap().push(event);
        }
    }

    fn key(value: &str) -> PermissionKey {
        PermissionKey::new(value).unwrap()
    }

    fn user(value: &str) -> PrincipalId {
        PrincipalId::new(value).unwrap()
    }

    fn venue(id: &str) -> EntityRef {
        EntityRef::venue(EntityId::new(id).unwrap())
    }

    fn event(id: &str) -> EntityRef {
        EntityRef::event(EntityId::new(id).unwrap())
    }

    fn catalog() -> Catalog {
        let name = |value: &str| RoleName::new(value).unwrap();
        Catalog::builder()
            .permission(Permission::inheritable(key("EDIT_EVENT_LOGISTICS")))
            .permission(Permission::inheritable(key("MANAGE_ROLES")))
            .permission(Permission::local(key("DELETE_VENUE")))
            .permission(Permission::local(key("VIEW_REPORTS")))
            .role(Role::entity(name("VenueManager")).with_permissions([key("EDIT_EVENT_LOGISTICS")]))
            .role(Role::entity(name("VenueOwner")).with_permissions([
                key("DELETE_VENUE"),
                key("MANAGE_ROLES"),
            ]))
            .role(Role::global(name("Analyst")).with_permissions([key("VIEW_REPORTS")]))
            .role(Role::global(name("SuperAdmin")).system())
            .build()
            .unwrap()
    }

    fn grant(
        user_id: &str,
        role: &str,
        scope: Option<EntityRef>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Assignment {
        Assignment {
            id: AssignmentId::new_v4(),
            user_id: user(user_id),
            role_id: RoleId::new(role).unwrap(),
            scope,
            granted_by: user("root"),
            granted_at: Utc::now(),
            expires_at,
            notes: None,
        }
    }

    fn venue_store() -> TestStore {
        let mut store = TestStore::default();
        store.parents.insert(event("e1"), venue("v1"));
        store
            .assignments
            .push(grant("u1", "VenueManager", Some(venue("v1")), None));
        store
    }

    #[tokio::test]
    async fn inheritable_permission_flows_from_venue_to_event() {
        let engine = EngineBuilder::new(catalog(), venue_store(), venue_store()).build();
        assert!(
            engine
                .has_permission(&user("u1"), &event("e1"), "EDIT_EVENT_LOGISTICS")
                .await
        );
    }

    #[tokio::test]
    async fn non_inheritable_permission_does_not_leak_to_child() {
        let mut store = venue_store();
        store
            .assignments
            .push(grant("u1", "VenueOwner", Some(venue("v1")), None));
        let mut links = TestStore::default();
        links.parents.insert(event("e1"), venue("v1"));
        let engine = EngineBuilder::new(catalog(), store, links).build();

        assert!(
            !engine
                .has_permission(&user("u1"), &event("e1"), "DELETE_VENUE")
                .await
        );
        assert!(
            engine
                .has_permission(&user("u1"), &venue("v1"), "DELETE_VENUE")
                .await
        );
        assert_eq!(engine.hierarchy.source().parent_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn expired_assignment_never_contributes() {
        let mut store = TestStore::default();
        store.assignments.push(grant(
            "u1",
            "VenueManager",
            Some(venue("v1")),
            Some(Utc::now() - chrono::Duration::seconds(1)),
        ));
        let engine = EngineBuilder::new(catalog(), store, TestStore::default()).build();

        assert!(
            !engine
                .has_permission(&user("u1"), &venue("v1"), "EDIT_EVENT_LOGISTICS")
                .await
        );
        assert!(engine.get_capabilities(&user("u1"), &venue("v1")).await.is_empty());
    }

    #[tokio::test]
    async fn global_role_applies_everywhere() {
        let mut store = TestStore::default();
        store.assignments.push(grant("u1", "Analyst", None, None));
        let engine = EngineBuilder::new(catalog(), store, TestStore::default()).build();

        assert!(
            engine
                .has_permission(&user("u1"), &event("anything"), "VIEW_REPORTS")
                .await
        );
    }

    #[tokio::test]
    async fn system_role_allows_every_catalog_key() {
        let mut store = TestStore::default();
        store.assignments.push(grant("root", "SuperAdmin", None, None));
        let engine = EngineBuilder::new(catalog(), store, TestStore::default()).build();
        let orphan = EntityRef::new(EntityType::SiteMap, EntityId::new("lonely").unwrap());

        for permission in engine.catalog().snapshot().permission_keys() {
            assert!(
                engine
                    .has_permission(&user("root"), &orphan, permission.as_str())
                    .await
            );
        }
        assert_eq!(
            engine.get_capabilities(&user("root"), &orphan).await,
            engine.catalog().snapshot().permission_keys()
        );
        assert!(engine.is_system_user(&user("root")).await.unwrap());
    }

    #[tokio::test]
    async fn unknown_inputs_deny() {
        let engine = EngineBuilder::new(catalog(), venue_store(), venue_store()).build();

        assert!(!engine.has_permission(&user("u1"), &venue("v1"), "NOT_A_PERMISSION").await);
        assert!(!engine.has_permission(&user("u1"), &venue("v1"), "bad key!").await);
        assert!(!engine.has_permission(&user("ghost"), &venue("v1"), "EDIT_EVENT_LOGISTICS").await);
        assert!(
            !engine
                .has_entity_permission("u1", "Stage", "v1", "EDIT_EVENT_LOGISTICS")
                .await
        );
        assert!(
            engine
                .has_entity_permission("u1", "Event", "e1", "edit_event_logistics")
                .await
        );
        assert!(matches!(
            engine
                .check(&user("u1"), &venue("v1"), &key("NOT_A_PERMISSION"))
                .await,
            Err(Error::PermissionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn capabilities_match_single_checks() {
        let mut store = venue_store();
        store
            .assignments
            .push(grant("u1", "VenueOwner", Some(venue("v1")), None));
        store.assignments.push(grant("u1", "Analyst", None, None));
        let engine = EngineBuilder::new(catalog(), store, venue_store()).build();

        for entity in [venue("v1"), event("e1"), event("e2")] {
            let capabilities = engine.get_capabilities(&user("u1"), &entity).await;
            for permission in engine.catalog().snapshot().permission_keys() {
                assert_eq!(
                    capabilities.contains(&permission),
                    engine
                        .has_permission(&user("u1"), &entity, permission.as_str())
                        .await,
                    "{permission} on {entity}"
                );
            }
        }
    }

    #[tokio::test]
    async fn repository_failure_fails_closed_and_is_reported() {
        let store = TestStore {
            repository_down: true,
            ..TestStore::default()
        };
        let recorder = Arc::new(Recorder::default());
        let engine = EngineBuilder::new(catalog(), store, TestStore::default())
            .audit(recorder.clone())
            .build();

        assert!(
            !engine
                .has_permission(&user("u1"), &venue("v1"), "EDIT_EVENT_LOGISTICS")
                .await
        );
        let err = engine
            .check(&user("u1"), &venue("v1"), &key("EDIT_EVENT_LOGISTICS"))
            .await
            .expect_err("must surface dependency failure");
        assert!(err.is_dependency_failure());
        assert!(matches!(
            recorder.0.lock().unwrap().as_slice(),
            [AuditEvent::DependencyUnavailable {
                dependency: Dependency::AssignmentRepository,
                ..
            }]
        ));
    }

    #[tokio::test]
    async fn slow_hierarchy_times_out_to_deny() {
        let mut links = TestStore::default();
        links.parents.insert(event("e1"), venue("v1"));
        links.slow_hierarchy = Some(Duration::from_millis(200));
        let engine = EngineBuilder::new(catalog(), venue_store(), links)
            .dependency_timeout(Some(Duration::from_millis(10)))
            .build();

        let result = engine
            .check(&user("u1"), &event("e1"), &key("EDIT_EVENT_LOGISTICS"))
            .await;
        assert!(matches!(
            result,
            Err(Error::DependencyUnavailable {
                dependency: Dependency::Hierarchy,
                source: DependencyFailure::TimedOut(_),
                ..
            })
        ));
        assert!(
            !engine
                .has_permission(&user("u1"), &event("e1"), "EDIT_EVENT_LOGISTICS")
                .await
        );
    }

    #[tokio::test]
    async fn cycle_resolves_to_deny() {
        let mut store = TestStore::default();
        store.parents.insert(event("a"), venue("b"));
        store.parents.insert(venue("b"), event("a"));
        store
            .assignments
            .push(grant("u1", "VenueManager", Some(venue("elsewhere")), None));
        let mut links = TestStore::default();
        links.parents = store.parents.clone();
        let recorder = Arc::new(Recorder::default());
        let engine = EngineBuilder::new(catalog(), store, links)
            .audit(recorder.clone())
            .build();

        assert!(
            !engine
                .has_permission(&user("u1"), &event("a"), "EDIT_EVENT_LOGISTICS")
                .await
        );
        assert!(
            recorder
                .0
                .lock()
                .unwrap()
                .iter()
                .any(|event| matches!(event, AuditEvent::CycleDetected { .. }))
        );
    }

    #[tokio::test]
    async fn inheritable_check_walks_to_the_root() {
        let mut links = TestStore::default();
        links.parents.insert(event("e1"), venue("v1"));
        links.parents.insert(
            venue("v1"),
            EntityRef::organization(EntityId::new("o1").unwrap()),
        );
        let engine = EngineBuilder::new(catalog(), venue_store(), links).build();

        let capabilities = engine.get_capabilities(&user("u1"), &event("e1")).await;
        assert!(capabilities.contains("EDIT_EVENT_LOGISTICS"));
        assert_eq!(engine.hierarchy.source().parent_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn cycle_is_reported_for_principal_without_grants() {
        let mut links = TestStore::default();
        links.parents.insert(event("a"), venue("b"));
        links.parents.insert(venue("b"), event("a"));
        let recorder = Arc::new(Recorder::default());
        let engine = EngineBuilder::new(catalog(), TestStore::default(), links)
            .audit(recorder.clone())
            .build();

        assert!(
            !engine
                .has_permission(&user("u1"), &event("a"), "EDIT_EVENT_LOGISTICS")
                .await
        );
        assert!(matches!(
            recorder.0.lock().unwrap().as_slice(),
            [AuditEvent::CycleDetected { .. }]
        ));
    }

    #[tokio::test]
    async fn earliest_grant_expiry_bounds_the_resolution() {
        let soon = Utc::now() + chrono::Duration::minutes(5);
        let later = Utc::now() + chrono::Duration::hours(1);
        let mut store = venue_store();
        store
            .assignments
            .push(grant("u1", "VenueOwner", Some(venue("v1")), Some(later)));
        store.assignments.push(grant("u1", "Analyst", None, Some(soon)));
        let engine = EngineBuilder::new(catalog(), store, venue_store()).build();

        let resolution = engine
            .expand(
                &engine.catalog.snapshot(),
                &user("u1"),
                &venue("v1"),
                Query::All,
            )
            .await
            .unwrap();
        assert_eq!(resolution.valid_until, Some(soon));
        assert!(resolution.granted.contains("VIEW_REPORTS"));
    }

    #[cfg(feature = "memory-cache")]
    #[tokio::test]
    async fn cached_decisions_skip_the_repository() {
        let engine = EngineBuilder::new(catalog(), venue_store(), venue_store())
            .cache(crate::MemoryCache::new(16))
            .build();

        for _ in 0..3 {
            assert!(
                engine
                    .has_permission(&user("u1"), &event("e1"), "EDIT_EVENT_LOGISTICS")
                    .await
            );
        }
        assert_eq!(engine.repository.repository_calls.load(Ordering::SeqCst), 1);

        let _ = engine.get_capabilities(&user("u1"), &venue("v1")).await;
        assert!(
            engine
                .has_permission(&user("u1"), &venue("v1"), "EDIT_EVENT_LOGISTICS")
                .await
        );
        assert_eq!(engine.repository.repository_calls.load(Ordering::SeqCst), 2);
    }

    #[cfg(feature = "memory-cache")]
    #[tokio::test]
    async fn catalog_writes_invalidate_cache() {
        let engine = EngineBuilder::new(catalog(), venue_store(), venue_store())
            .cache(crate::MemoryCache::new(16))
            .build();
        assert!(
            engine
                .has_permission(&user("u1"), &venue("v1"), "EDIT_EVENT_LOGISTICS")
                .await
        );

        engine
            .set_role_permissions("VenueManager", [key("VIEW_REPORTS")])
            .await
            .unwrap();

        assert!(
            !engine
                .has_permission(&user("u1"), &venue("v1"), "EDIT_EVENT_LOGISTICS")
                .await
        );
        assert!(matches!(
            engine.remove_role("SuperAdmin").await,
            Err(Error::SystemRoleImmutable(_))
        ));
    }
}
