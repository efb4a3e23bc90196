use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::cache::{Cache, CapabilitySet};
use crate::permission::PermissionKey;
use crate::types::{EntityRef, PrincipalId};

const DEFAULT_TTL: Duration = Duration::from_secs(5);
const DEFAULT_ENTRIES_PER_PRINCIPAL: usize = 1024;

/// In-memory resolution cache.
///
/// Entries are grouped into one partition per principal inside a [`DashMap`],
/// so lookups take a shard read lock and never wait on other lookups, and a
/// grant or revoke drops the principal's whole partition in one step. Entries
/// expire after a short TTL (5 seconds by default) as a backstop for missed
/// invalidations. An entry also expires when the earliest grant it was
/// built from does.
#[derive(Debug, Clone)]
pub struct MemoryCache {
    inner: Arc<Inner>,
    capacity: usize,
    entries_per_principal: usize,
    ttl: Duration,
}

#[derive(Debug, Default)]
struct Inner {
    partitions: DashMap<PrincipalId, Partition>,
    epoch: AtomicU64,
}

#[derive(Debug)]
struct Partition {
    decisions: HashMap<(EntityRef, PermissionKey), Entry<bool>>,
    capabilities: HashMap<EntityRef, Entry<CapabilitySet>>,
    touched_at: Instant,
}

impl Partition {
    fn new(now: Instant) -> Self {
        Self {
            decisions: HashMap::new(),
            capabilities: HashMap::new(),
            touched_at: now,
        }
    }

    fn len(&self) -> usize {
        self.decisions.len() + self.capabilities.len()
    }

    fn prune(&mut self, ttl: Duration, now: Instant, wall: DateTime<Utc>) {
        self.decisions.retain(|_, entry| entry.is_fresh(ttl, now, wall));
        self.capabilities
            .retain(|_, entry| entry.is_fresh(ttl, now, wall));
    }

    fn is_stale(&self, ttl: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.touched_at) > ttl
    }
}

#[derive(Debug, Clone)]
struct Entry<T> {
    value: T,
    stored_at: Instant,
    valid_until: Option<DateTime<Utc>>,
}

impl<T> Entry<T> {
    fn new(value: T, now: Instant, valid_until: Option<DateTime<Utc>>) -> Self {
        Self {
            value,
            stored_at: now,
            valid_until,
        }
    }

    fn is_fresh(&self, ttl: Duration, now: Instant, wall: DateTime<Utc>) -> bool {
        now.saturating_duration_since(self.stored_at) <= ttl
            && self.valid_until.is_none_or(|until| wall < until)
    }
}

impl MemoryCache {
    /// Creates a cache holding at most `capacity` principals.
    ///
    /// A capacity of zero disables caching.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner::default()),
            capacity,
            entries_per_principal: DEFAULT_ENTRIES_PER_PRINCIPAL,
            ttl: DEFAULT_TTL,
        }
    }

    /// Configures the time-to-live for entries.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Configures how many entries one principal may hold.
    pub fn with_entries_per_principal(mut self, limit: usize) -> Self {
        self.entries_per_principal = limit.max(1);
        self
    }

    /// Number of principals with cached entries.
    pub fn principal_count(&self) -> usize {
        self.inner.partitions.len()
    }

    fn current_epoch(&self) -> u64 {
        self.inner.epoch.load(Ordering::Acquire)
    }

    fn bump_epoch(&self) {
        self.inner.epoch.fetch_add(1, Ordering::AcqRel);
    }

    /// Frees a partition slot. Must not be called while holding a map guard.
    fn make_room(&self, now: Instant) {
        let ttl = self.ttl;
        self.inner
            .partitions
            .retain(|_, partition| !partition.is_stale(ttl, now));
        if self.inner.partitions.len() < self.capacity {
            return;
        }
        let oldest = self
            .inner
            .partitions
            .iter()
            .min_by_key(|partition| partition.touched_at)
            .map(|partition| partition.key().clone());
        if let Some(oldest) = oldest {
            self.inner.partitions.remove(&oldest);
        }
    }

    fn store(&self, epoch: u64, user: &PrincipalId, apply: impl FnOnce(&mut Partition, Instant)) {
        if self.capacity == 0 || epoch != self.current_epoch() {
            return;
        }
        let now = Instant::now();
        if !self.inner.partitions.contains_key(user)
            && self.inner.partitions.len() >= self.capacity
        {
            self.make_room(now);
        }

        let mut partition = self
            .inner
            .partitions
            .entry(user.clone())
            .or_insert_with(|| Partition::new(now));
        // Checked under the shard lock; invalidation bumps the epoch before
        // removing partitions.
        if epoch != self.current_epoch() {
            return;
        }
        if partition.len() >= self.entries_per_principal {
            partition.prune(self.ttl, now, Utc::now());
            if partition.len() >= self.entries_per_principal {
                partition.decisions.clear();
                partition.capabilities.clear();
            }
        }
        partition.touched_at = now;
        apply(&mut *partition, now);
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn epoch(&self) -> u64 {
        self.current_epoch()
    }

    async fn get_decision(
        &self,
        user: &PrincipalId,
        entity: &EntityRef,
        permission: &PermissionKey,
    ) -> Option<bool> {
        let partition = self.inner.partitions.get(user)?;
        let entry = partition
            .decisions
            .get(&(entity.clone(), permission.clone()))?;
        entry
            .is_fresh(self.ttl, Instant::now(), Utc::now())
            .then_some(entry.value)
    }

    async fn set_decision(
        &self,
        epoch: u64,
        valid_until: Option<DateTime<Utc>>,
        user: &PrincipalId,
        entity: &EntityRef,
        permission: &PermissionKey,
        allowed: bool,
    ) {
        self.store(epoch, user, |partition, now| {
            partition.decisions.insert(
                (entity.clone(), permission.clone()),
                Entry::new(allowed, now, valid_until),
            );
        });
    }

    async fn get_capabilities(
        &self,
        user: &PrincipalId,
        entity: &EntityRef,
    ) -> Option<CapabilitySet> {
        let partition = self.inner.partitions.get(user)?;
        let entry = partition.capabilities.get(entity)?;
        entry
            .is_fresh(self.ttl, Instant::now(), Utc::now())
            .then(|| Arc::clone(&entry.value))
    }

    async fn set_capabilities(
        &self,
        epoch: u64,
        valid_until: Option<DateTime<Utc>>,
        user: &PrincipalId,
        entity: &EntityRef,
        capabilities: CapabilitySet,
    ) {
        self.store(epoch, user, |partition, now| {
            partition
                .capabilities
                .insert(entity.clone(), Entry::new(capabilities, now, valid_until));
        });
    }

    async fn invalidate_principal(&self, user: &PrincipalId) {
        self.bump_epoch();
        self.inner.partitions.remove(user);
        tracing::debug!(%user, "invalidated cached resolutions for principal");
    }

    async fn invalidate_all(&self) {
        self.bump_epoch();
        self.inner.partitions.clear();
        tracing::debug!("invalidated all cached resolutions");
    }
}
