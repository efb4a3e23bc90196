#![cfg(all(
    feature = "criterion-bench",
    feature = "memory-store",
    feature = "memory-cache"
))]

use chrono::Utc;
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use futures::executor::block_on;
use rs_entity_rbac::defaults::{EDIT_EVENT_LOGISTICS, platform_catalog};
use rs_entity_rbac::{
    Assignment, AssignmentId, Catalog, EngineBuilder, EntityId, EntityRef, MemoryCache,
    MemoryStore, Permission, PermissionKey, PrincipalId, Role, RoleId, RoleName,
};
use std::time::Duration;

fn grant(store: &MemoryStore, user: &PrincipalId, role: &str, scope: EntityRef) {
    store.seed_assignment(Assignment {
        id: AssignmentId::new_v4(),
        user_id: user.clone(),
        role_id: RoleId::new(role).unwrap(),
        scope: Some(scope),
        granted_by: PrincipalId::new("bench_admin").unwrap(),
        granted_at: Utc::now(),
        expires_at: None,
        notes: None,
    });
}

fn setup_flat_store() -> (MemoryStore, PrincipalId, EntityRef) {
    let store = MemoryStore::new();
    let principal = PrincipalId::new("principal_bench").unwrap();
    let venue = EntityRef::venue(EntityId::new("venue_bench").unwrap());
    grant(&store, &principal, "VenueManager", venue.clone());
    (store, principal, venue)
}

fn setup_deep_store(depth: usize) -> (MemoryStore, Catalog, PrincipalId, EntityRef) {
    let store = MemoryStore::new();
    let principal = PrincipalId::new("principal_deep_bench").unwrap();
    let root = EntityRef::venue(EntityId::new("venue_root").unwrap());
    let mut current = root.clone();
    for i in 0..depth {
        let child = EntityRef::event(EntityId::new(format!("event_{i}")).unwrap());
        store.set_parent(child.clone(), current);
        current = child;
    }
    grant(&store, &principal, "ChainManager", root);

    let key = PermissionKey::new(EDIT_EVENT_LOGISTICS).unwrap();
    let catalog = Catalog::builder()
        .permission(Permission::inheritable(key.clone()))
        .role(Role::entity(RoleName::new("ChainManager").unwrap()).with_permissions([key]))
        .build()
        .unwrap();
    (store, catalog, principal, current)
}

fn setup_fanout_store(grant_count: usize) -> (MemoryStore, PrincipalId, EntityRef) {
    let store = MemoryStore::new();
    let principal = PrincipalId::new("principal_fanout_bench").unwrap();
    for i in 0..grant_count {
        let venue = EntityRef::venue(EntityId::new(format!("venue_{i}")).unwrap());
        grant(&store, &principal, "EventStaff", venue);
    }
    let target = EntityRef::venue(EntityId::new(format!("venue_{}", grant_count - 1)).unwrap());
    (store, principal, target)
}

fn bench_flat(c: &mut Criterion) {
    let mut group = c.benchmark_group("check_flat");
    group.sample_size(30);
    group.throughput(Throughput::Elements(1));

    let (store, principal, venue) = setup_flat_store();
    let engine = EngineBuilder::new(platform_catalog().unwrap(), store.clone(), store)
        .dependency_timeout(None)
        .build();
    group.bench_function("check_no_cache", |b| {
        b.iter(|| {
            let allowed =
                block_on(engine.has_permission(&principal, &venue, EDIT_EVENT_LOGISTICS));
            black_box(allowed);
        });
    });
    group.bench_function("capabilities_no_cache", |b| {
        b.iter(|| {
            let capabilities = block_on(engine.get_capabilities(&principal, &venue));
            black_box(capabilities);
        });
    });

    let (store, principal, venue) = setup_flat_store();
    let engine = EngineBuilder::new(platform_catalog().unwrap(), store.clone(), store)
        .dependency_timeout(None)
        .cache(MemoryCache::new(8_192).with_ttl(Duration::from_secs(60)))
        .build();
    assert!(block_on(engine.has_permission(&principal, &venue, EDIT_EVENT_LOGISTICS)));
    group.bench_function("check_hot_cache", |b| {
        b.iter(|| {
            let allowed =
                block_on(engine.has_permission(&principal, &venue, EDIT_EVENT_LOGISTICS));
            black_box(allowed);
        });
    });
    group.bench_function("capabilities_hot_cache", |b| {
        b.iter(|| {
            let capabilities = block_on(engine.get_capabilities(&principal, &venue));
            black_box(capabilities);
        });
    });

    group.finish();
}

fn bench_hierarchy_depth(c: &mut Criterion) {
    let mut group = c.benchmark_group("check_inherited_depth");
    group.sample_size(30);
    group.throughput(Throughput::Elements(1));

    for depth in [1usize, 4, 8, 16] {
        let (store, catalog, principal, leaf) = setup_deep_store(depth);
        let engine = EngineBuilder::new(catalog, store.clone(), store)
            .dependency_timeout(None)
            .enforce_parent_types(false)
            .max_hierarchy_depth(depth + 2)
            .build();
        let id = BenchmarkId::from_parameter(depth);
        group.bench_with_input(id, &depth, |b, _| {
            b.iter(|| {
                let allowed =
                    block_on(engine.has_permission(&principal, &leaf, EDIT_EVENT_LOGISTICS));
                black_box(allowed);
            });
        });
    }

    group.finish();
}

fn bench_grant_fanout(c: &mut Criterion) {
    let mut group = c.benchmark_group("check_grant_fanout");
    group.sample_size(30);
    group.throughput(Throughput::Elements(1));

    for grant_count in [1usize, 8, 32, 128] {
        let (store, principal, target) = setup_fanout_store(grant_count);
        let engine = EngineBuilder::new(platform_catalog().unwrap(), store.clone(), store)
            .dependency_timeout(None)
            .build();

        let id = BenchmarkId::from_parameter(grant_count);
        group.bench_with_input(id, &grant_count, |b, _| {
            b.iter(|| {
                let allowed =
                    block_on(engine.has_permission(&principal, &target, "VIEW_EVENT_STAFF"));
                black_box(allowed);
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_flat, bench_hierarchy_depth, bench_grant_fanout);
criterion_main!(benches);
