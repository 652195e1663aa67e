//! Infrastructure layer: saga repositories, consumer boundary and the lifecycle
//! coordinator that ties them to the policy core.

pub mod consumer;
pub mod coordinator;
pub mod repository;

pub use consumer::{FnConsumer, SagaConsumer, consumer_fn};
pub use coordinator::{Disposition, Finalization, LifecycleCoordinator, ProcessOutcome};
pub use repository::{
    Checkout, Creator, InMemorySagaRepository, InstanceHandle, InstrumentedRepository, Lease,
    Origin, RepositoryStats, SagaRepository, StoredInstance,
};

#[cfg(test)]
pub(crate) mod test_support;
