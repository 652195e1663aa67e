//! `sagaflow-core`: saga correlation building blocks.
//!
//! This crate contains **pure** primitives (no infrastructure concerns): the
//! correlation identity, the saga instance contract and the error taxonomy shared
//! by the decision core and the effectful shell.

pub mod error;
pub mod id;
pub mod instance;

pub use error::{
    ConfigurationError, ConsumerError, CorrelationError, CorrelationFailure, RepositoryError,
    SagaError, SagaResult,
};
pub use id::CorrelationId;
pub use instance::SagaInstance;
