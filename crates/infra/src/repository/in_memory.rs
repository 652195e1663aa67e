//! In-memory saga repository with per-id locks.
//!
//! Intended for tests/dev and single-process deployments.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, trace};

use sagaflow_core::{CorrelationId, RepositoryError, SagaError, SagaInstance};

use super::{Checkout, Creator, InstanceHandle, Lease, Origin, SagaRepository};

/// A committed instance together with its storage metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredInstance<S> {
    pub instance: S,
    /// Incremented on every persist (1 after the first).
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Repository counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct RepositoryStats {
    pub checkouts: u64,
    pub created: u64,
    pub persisted: u64,
    pub deleted: u64,
    /// Leases released without persist or delete (missing, failed, cancelled).
    pub released_uncommitted: u64,
    /// Leases currently held.
    pub active_leases: u64,
}

#[derive(Debug, Default)]
struct Counters {
    checkouts: AtomicU64,
    created: AtomicU64,
    persisted: AtomicU64,
    deleted: AtomicU64,
    released_uncommitted: AtomicU64,
    acquired: AtomicU64,
    released: AtomicU64,
}

/// Per-id exclusivity guard stored inside a [`Lease`].
struct SlotGuard {
    _lock: OwnedMutexGuard<()>,
    committed: AtomicBool,
    counters: Arc<Counters>,
}

impl SlotGuard {
    fn new(lock: OwnedMutexGuard<()>, counters: Arc<Counters>) -> Self {
        counters.acquired.fetch_add(1, Ordering::SeqCst);
        Self {
            _lock: lock,
            committed: AtomicBool::new(false),
            counters,
        }
    }

    fn commit(&self) {
        self.committed.store(true, Ordering::SeqCst);
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        if !self.committed.load(Ordering::SeqCst) {
            self.counters
                .released_uncommitted
                .fetch_add(1, Ordering::SeqCst);
        }
        self.counters.released.fetch_add(1, Ordering::SeqCst);
    }
}

/// Weak references let idle per-id locks be dropped; while anyone holds or waits
/// on a lock its entry stays upgradable, so one id never has two live locks.
#[derive(Debug)]
struct LockTable {
    slots: HashMap<CorrelationId, Weak<AsyncMutex<()>>>,
    prune_at: usize,
}

const MIN_PRUNE_AT: usize = 64;

impl LockTable {
    fn new() -> Self {
        Self {
            slots: HashMap::new(),
            prune_at: MIN_PRUNE_AT,
        }
    }

    fn lock_for(&mut self, correlation_id: &CorrelationId) -> Arc<AsyncMutex<()>> {
        if let Some(lock) = self.slots.get(correlation_id).and_then(Weak::upgrade) {
            return lock;
        }

        if self.slots.len() >= self.prune_at {
            self.slots.retain(|_, slot| slot.strong_count() > 0);
            self.prune_at = (self.slots.len() * 2).max(MIN_PRUNE_AT);
        }

        let lock = Arc::new(AsyncMutex::new(()));
        self.slots
            .insert(correlation_id.clone(), Arc::downgrade(&lock));
        lock
    }
}

/// In-memory saga repository.
///
/// - Exclusivity is a `tokio` mutex per correlation id, never a global lock
/// - New instances become visible only when persisted
/// - Handles from another repository are rejected as stale
#[derive(Debug)]
pub struct InMemorySagaRepository<S> {
    instances: RwLock<HashMap<CorrelationId, StoredInstance<S>>>,
    locks: Mutex<LockTable>,
    counters: Arc<Counters>,
}

impl<S: SagaInstance> InMemorySagaRepository<S> {
    pub fn new() -> Self {
        Self {
            instances: RwLock::new(HashMap::new()),
            locks: Mutex::new(LockTable::new()),
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Seed a committed instance (bypasses exclusivity; for setup only).
    pub fn insert(&self, instance: S) -> Result<(), RepositoryError> {
        let now = Utc::now();
        let mut instances = self.write()?;
        instances.insert(
            instance.correlation_id().clone(),
            StoredInstance {
                instance,
                version: 1,
                created_at: now,
                updated_at: now,
            },
        );
        Ok(())
    }

    /// Committed snapshot of an instance.
    pub fn get(&self, correlation_id: &CorrelationId) -> Result<Option<StoredInstance<S>>, RepositoryError> {
        Ok(self.read()?.get(correlation_id).cloned())
    }

    pub fn contains(&self, correlation_id: &CorrelationId) -> Result<bool, RepositoryError> {
        Ok(self.read()?.contains_key(correlation_id))
    }

    pub fn len(&self) -> Result<usize, RepositoryError> {
        Ok(self.read()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, RepositoryError> {
        Ok(self.read()?.is_empty())
    }

    pub fn stats(&self) -> RepositoryStats {
        let c = &self.counters;
        let acquired = c.acquired.load(Ordering::SeqCst);
        let released = c.released.load(Ordering::SeqCst);
        RepositoryStats {
            checkouts: c.checkouts.load(Ordering::SeqCst),
            created: c.created.load(Ordering::SeqCst),
            persisted: c.persisted.load(Ordering::SeqCst),
            deleted: c.deleted.load(Ordering::SeqCst),
            released_uncommitted: c.released_uncommitted.load(Ordering::SeqCst),
            active_leases: acquired.saturating_sub(released),
        }
    }

    fn read(
        &self,
    ) -> Result<std::sync::RwLockReadGuard<'_, HashMap<CorrelationId, StoredInstance<S>>>, RepositoryError>
    {
        self.instances
            .read()
            .map_err(|_| RepositoryError::poisoned("saga instance map"))
    }

    fn write(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<CorrelationId, StoredInstance<S>>>, RepositoryError>
    {
        self.instances
            .write()
            .map_err(|_| RepositoryError::poisoned("saga instance map"))
    }

    fn lock_for(&self, correlation_id: &CorrelationId) -> Result<Arc<AsyncMutex<()>>, RepositoryError> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|_| RepositoryError::poisoned("saga lock table"))?;
        Ok(locks.lock_for(correlation_id))
    }

    fn owned_guard<'a>(&self, lease: &'a Lease) -> Result<&'a SlotGuard, RepositoryError> {
        lease
            .guard::<SlotGuard>()
            .filter(|g| Arc::ptr_eq(&g.counters, &self.counters))
            .ok_or_else(|| RepositoryError::StaleHandle(lease.correlation_id().clone()))
    }
}

impl<S: SagaInstance> Default for InMemorySagaRepository<S> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<S: SagaInstance> SagaRepository<S> for InMemorySagaRepository<S> {
    async fn fetch_or_create(
        &self,
        correlation_id: &CorrelationId,
        creator: Option<&Creator<'_, S>>,
    ) -> Result<Checkout<S>, SagaError> {
        let lock = self.lock_for(correlation_id)?;
        let guard = SlotGuard::new(lock.lock_owned().await, Arc::clone(&self.counters));
        self.counters.checkouts.fetch_add(1, Ordering::SeqCst);

        let existing = self
            .read()?
            .get(correlation_id)
            .map(|stored| (stored.instance.clone(), stored.version));

        if let Some((instance, version)) = existing {
            trace!(%correlation_id, version, "checked out existing saga instance");
            let lease = Lease::new(correlation_id.clone(), guard);
            return Ok(Checkout::Existing(InstanceHandle::new(
                instance,
                Origin::Existing,
                version,
                lease,
            )));
        }

        let Some(create) = creator else {
            trace!(%correlation_id, "no saga instance and no creator");
            return Ok(Checkout::Missing);
        };

        let instance = create(correlation_id.clone())?;
        self.counters.created.fetch_add(1, Ordering::SeqCst);
        debug!(%correlation_id, saga_type = S::saga_type(), "created saga instance");

        let lease = Lease::new(correlation_id.clone(), guard);
        Ok(Checkout::Created(InstanceHandle::new(
            instance,
            Origin::Created,
            0,
            lease,
        )))
    }

    async fn persist(&self, handle: InstanceHandle<S>) -> Result<(), RepositoryError> {
        let InstanceHandle {
            instance,
            origin,
            version,
            lease,
        } = handle;
        let guard = self.owned_guard(&lease)?;
        let correlation_id = lease.correlation_id().clone();
        let now = Utc::now();

        {
            let mut instances = self.write()?;
            match origin {
                Origin::Created => {
                    if instances.contains_key(&correlation_id) {
                        return Err(RepositoryError::StaleHandle(correlation_id));
                    }
                    instances.insert(
                        correlation_id.clone(),
                        StoredInstance {
                            instance,
                            version: 1,
                            created_at: now,
                            updated_at: now,
                        },
                    );
                }
                Origin::Existing => match instances.get_mut(&correlation_id) {
                    Some(stored) if stored.version == version => {
                        stored.instance = instance;
                        stored.version += 1;
                        stored.updated_at = now;
                    }
                    _ => return Err(RepositoryError::StaleHandle(correlation_id)),
                },
            }
        }

        guard.commit();
        self.counters.persisted.fetch_add(1, Ordering::SeqCst);
        trace!(%correlation_id, "persisted saga instance");
        Ok(())
    }

    async fn delete(&self, handle: InstanceHandle<S>) -> Result<(), RepositoryError> {
        let guard = self.owned_guard(&handle.lease)?;
        let correlation_id = handle.correlation_id().clone();

        if handle.origin == Origin::Existing {
            let mut instances = self.write()?;
            match instances.get(&correlation_id) {
                Some(stored) if stored.version == handle.version => {
                    instances.remove(&correlation_id);
                }
                _ => return Err(RepositoryError::StaleHandle(correlation_id)),
            }
        }

        guard.commit();
        self.counters.deleted.fetch_add(1, Ordering::SeqCst);
        trace!(%correlation_id, "deleted saga instance");
        Ok(())
    }
}
