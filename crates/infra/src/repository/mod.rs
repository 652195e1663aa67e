//! Repository collaborator boundary: exclusive load-or-create of saga instances.
//!
//! The coordinator never stores instances itself. It asks a repository to hand out
//! an instance under per-id exclusivity, lets the domain consumer mutate it, and
//! then tells the repository to persist, delete or release it.
//!
//! ## Exclusivity
//!
//! Exclusivity is carried by a [`Lease`] inside every [`InstanceHandle`]. The lease
//! is released when the handle is committed (`persist` / `delete`), explicitly
//! released, or dropped. Dropping covers cancellation: if the task processing a
//! message is cancelled mid-flight, the handle is dropped with it and the next
//! message for that id can proceed.

pub mod in_memory;
pub mod instrumented;

pub use in_memory::{InMemorySagaRepository, RepositoryStats, StoredInstance};
pub use instrumented::InstrumentedRepository;

use std::any::Any;

use async_trait::async_trait;

use sagaflow_core::{ConfigurationError, CorrelationId, RepositoryError, SagaError, SagaInstance};

/// Constructor handed to [`SagaRepository::fetch_or_create`] when creation is permitted.
pub type Creator<'a, S> = dyn Fn(CorrelationId) -> Result<S, ConfigurationError> + Send + Sync + 'a;

/// Proof of exclusive access to one correlation id.
///
/// Releasing happens exactly once: on drop.
pub struct Lease {
    correlation_id: CorrelationId,
    guard: Box<dyn Any + Send + Sync>,
}

impl Lease {
    /// Wrap a repository-specific guard (lock guard, transaction, ...).
    pub fn new(correlation_id: CorrelationId, guard: impl Any + Send + Sync) -> Self {
        Self {
            correlation_id,
            guard: Box::new(guard),
        }
    }

    pub fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    /// The repository-specific guard, if it is a `T`.
    pub fn guard<T: Any>(&self) -> Option<&T> {
        self.guard.downcast_ref::<T>()
    }
}

impl core::fmt::Debug for Lease {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Lease")
            .field("correlation_id", &self.correlation_id)
            .finish_non_exhaustive()
    }
}

/// Whether a checked-out instance was just created or already existed.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Origin {
    /// Created by this checkout; not visible to others until persisted.
    Created,
    /// Loaded from the store.
    Existing,
}

/// A checked-out saga instance plus the exclusivity lease on its id.
#[derive(Debug)]
pub struct InstanceHandle<S> {
    instance: S,
    origin: Origin,
    version: u64,
    lease: Lease,
}

impl<S: SagaInstance> InstanceHandle<S> {
    pub fn new(instance: S, origin: Origin, version: u64, lease: Lease) -> Self {
        Self {
            instance,
            origin,
            version,
            lease,
        }
    }

    pub fn correlation_id(&self) -> &CorrelationId {
        self.lease.correlation_id()
    }

    pub fn instance(&self) -> &S {
        &self.instance
    }

    pub fn instance_mut(&mut self) -> &mut S {
        &mut self.instance
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }

    pub fn is_new(&self) -> bool {
        self.origin == Origin::Created
    }

    /// Stored version at checkout (0 for new instances).
    pub fn version(&self) -> u64 {
        self.version
    }
}

/// Result of an exclusive fetch-or-create.
#[derive(Debug)]
pub enum Checkout<S> {
    /// No instance existed; one was created via the supplied creator.
    Created(InstanceHandle<S>),
    /// An instance existed and is now checked out.
    Existing(InstanceHandle<S>),
    /// No instance exists and no creator was supplied. No lease is held.
    Missing,
}

/// Storage-agnostic saga instance repository.
///
/// `fetch_or_create` returns a [`SagaError`] because it runs the caller's creator;
/// a failing creator is a configuration error and releases the id.
///
/// ## Contract
///
/// - `fetch_or_create` acquires per-id exclusivity before looking the id up. It is
///   held until the returned handle is persisted, deleted, released or dropped.
/// - Concurrent callers on the same id are serialized: at most one of them observes
///   `Created`; the others wait and then observe the winner's instance (or
///   `Missing` if the winner released without persisting).
/// - Distinct ids never contend with each other.
/// - `Missing` holds no exclusivity.
/// - Releasing a `Created` handle without persisting discards the new instance.
#[async_trait]
pub trait SagaRepository<S: SagaInstance>: Send + Sync {
    async fn fetch_or_create(
        &self,
        correlation_id: &CorrelationId,
        creator: Option<&Creator<'_, S>>,
    ) -> Result<Checkout<S>, SagaError>;

    /// Store the (possibly mutated) instance and release exclusivity.
    async fn persist(&self, handle: InstanceHandle<S>) -> Result<(), RepositoryError>;

    /// Remove the instance from the store and release exclusivity.
    async fn delete(&self, handle: InstanceHandle<S>) -> Result<(), RepositoryError>;

    /// Release exclusivity without writing anything.
    async fn release(&self, handle: InstanceHandle<S>) {
        drop(handle);
    }
}

#[async_trait]
impl<S, R> SagaRepository<S> for std::sync::Arc<R>
where
    S: SagaInstance,
    R: SagaRepository<S> + ?Sized,
{
    async fn fetch_or_create(
        &self,
        correlation_id: &CorrelationId,
        creator: Option<&Creator<'_, S>>,
    ) -> Result<Checkout<S>, SagaError> {
        (**self).fetch_or_create(correlation_id, creator).await
    }

    async fn persist(&self, handle: InstanceHandle<S>) -> Result<(), RepositoryError> {
        (**self).persist(handle).await
    }

    async fn delete(&self, handle: InstanceHandle<S>) -> Result<(), RepositoryError> {
        (**self).delete(handle).await
    }

    async fn release(&self, handle: InstanceHandle<S>) {
        (**self).release(handle).await
    }
}
