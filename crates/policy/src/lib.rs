//! Saga policy mechanics (pure decision core, no IO).
//!
//! - Correlation resolution: message → correlation id
//! - Instance construction for newly started sagas
//! - Initiating / observing capability per (saga type, message type)
//! - Removal predicate evaluated after each processed message
//!
//! Infra is responsible for exclusivity, persistence and invoking the domain
//! consumer; everything here is side-effect free and shared read-only.

pub mod definition;
pub mod factory;
pub mod message;
pub mod policy;
pub mod removal;
pub mod resolver;

pub use definition::{SagaDefinition, SagaDefinitionBuilder};
pub use factory::InstanceFactory;
pub use message::SagaMessage;
pub use policy::{InitiatingPolicy, ObservingPolicy, PolicyDecision, RejectReason, SagaPolicy};
pub use removal::RemovalPredicate;
pub use resolver::{CorrelationExtractor, CorrelationResolver};

#[cfg(test)]
pub(crate) mod test_support;
