//! Policy variants: the capability contract per (saga type, message type).
//!
//! A message type either starts instances (initiating) or joins existing ones
//! (observing). There is no third case, so the contract is a closed enum rather
//! than a trait.
//!
//! Per-message state machine (conceptual, never persisted):
//!
//! ```text
//! ARRIVED ── no instance, can create ──────────────▶ CREATING ─▶ CREATED
//! ARRIVED ── instance found, can use existing ─────▶ USING ────▶ DONE
//! ARRIVED ── no instance, cannot create ───────────▶ REJECTED
//! ARRIVED ── instance found, initiating message ───▶ REJECTED (configuration)
//! ```

use sagaflow_core::{
    ConfigurationError, CorrelationError, CorrelationFailure, CorrelationId, SagaError,
    SagaInstance,
};

use crate::factory::InstanceFactory;
use crate::message::SagaMessage;
use crate::resolver::{CorrelationExtractor, CorrelationResolver};

/// Message may create a new instance; it can never join an existing one.
pub struct InitiatingPolicy<S, M> {
    resolver: CorrelationResolver<M>,
    factory: InstanceFactory<S>,
}

impl<S, M> Clone for InitiatingPolicy<S, M> {
    fn clone(&self) -> Self {
        Self {
            resolver: self.resolver.clone(),
            factory: self.factory.clone(),
        }
    }
}

impl<S: SagaInstance, M: SagaMessage> InitiatingPolicy<S, M> {
    pub fn new(resolver: CorrelationResolver<M>, factory: InstanceFactory<S>) -> Self {
        Self { resolver, factory }
    }

    pub fn resolver(&self) -> &CorrelationResolver<M> {
        &self.resolver
    }
}

/// Message may only be consumed by an existing instance.
pub struct ObservingPolicy<M> {
    extractor: CorrelationExtractor<M>,
}

impl<M> Clone for ObservingPolicy<M> {
    fn clone(&self) -> Self {
        Self {
            extractor: self.extractor.clone(),
        }
    }
}

impl<M: SagaMessage> ObservingPolicy<M> {
    pub fn new(extractor: CorrelationExtractor<M>) -> Self {
        Self { extractor }
    }
}

/// Policy variant applied to one message type of one saga type.
///
/// Immutable once configured; shared read-only across concurrent invocations.
pub enum SagaPolicy<S, M> {
    Initiating(InitiatingPolicy<S, M>),
    Observing(ObservingPolicy<M>),
}

impl<S, M> Clone for SagaPolicy<S, M> {
    fn clone(&self) -> Self {
        match self {
            Self::Initiating(p) => Self::Initiating(p.clone()),
            Self::Observing(p) => Self::Observing(p.clone()),
        }
    }
}

impl<S, M> core::fmt::Debug for SagaPolicy<S, M> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Initiating(p) => f
                .debug_struct("SagaPolicy::Initiating")
                .field("resolver", &p.resolver)
                .finish(),
            Self::Observing(_) => f.write_str("SagaPolicy::Observing"),
        }
    }
}

/// Outcome of consulting the policy for one message. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyDecision {
    CreateNew(CorrelationId),
    UseExisting(CorrelationId),
    Reject(RejectReason),
}

/// Why a message was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// The message does not correlate to any usable instance.
    Uncorrelated(CorrelationError),
    /// The policy contract forbids the requested capability.
    Misconfigured(ConfigurationError),
}

impl From<RejectReason> for SagaError {
    fn from(value: RejectReason) -> Self {
        match value {
            RejectReason::Uncorrelated(e) => SagaError::Correlation(e),
            RejectReason::Misconfigured(e) => SagaError::Configuration(e),
        }
    }
}

impl<S: SagaInstance, M: SagaMessage> SagaPolicy<S, M> {
    /// Initiating policy with an explicit id strategy and the default factory.
    pub fn initiating(resolver: CorrelationResolver<M>) -> Self {
        Self::Initiating(InitiatingPolicy::new(resolver, InstanceFactory::new()))
    }

    pub fn observing(extractor: CorrelationExtractor<M>) -> Self {
        Self::Observing(ObservingPolicy::new(extractor))
    }

    pub fn is_initiating(&self) -> bool {
        matches!(self, Self::Initiating(_))
    }

    /// Any message of an initiating type is a valid trigger.
    pub fn can_create_instance(&self, _message: &M) -> bool {
        self.is_initiating()
    }

    /// Id for a new instance. Only meaningful when creation is permitted.
    pub fn new_correlation_id(&self, message: &M) -> Result<CorrelationId, ConfigurationError> {
        match self {
            Self::Initiating(p) => p.resolver.resolve(message),
            Self::Observing(_) => Err(Self::creation_not_permitted()),
        }
    }

    pub fn create_instance(&self, correlation_id: CorrelationId) -> Result<S, ConfigurationError> {
        match self {
            Self::Initiating(p) => p.factory.create(correlation_id),
            Self::Observing(_) => Err(Self::creation_not_permitted()),
        }
    }

    /// Initiating message types fail here unconditionally: they only ever start
    /// new instances, so a duplicate start message is never merged into an
    /// unrelated existing one.
    pub fn can_use_existing_instance(&self, _message: &M) -> Result<bool, ConfigurationError> {
        match self {
            Self::Initiating(_) => Err(ConfigurationError::InitiatingCannotUseExisting {
                saga_type: S::saga_type(),
                message_type: M::message_type(),
            }),
            Self::Observing(_) => Ok(true),
        }
    }

    /// Id used for lookup-or-create: extracted for observing messages, resolved
    /// through the configured strategy for initiating ones.
    pub fn correlation_id(&self, message: &M) -> Result<CorrelationId, ConfigurationError> {
        match self {
            Self::Initiating(p) => p.resolver.resolve(message),
            Self::Observing(p) => p.extractor.extract(message),
        }
    }

    /// Decide what happens to `message` given whether an instance exists for
    /// `correlation_id`.
    pub fn decide(
        &self,
        message: &M,
        correlation_id: &CorrelationId,
        instance_exists: bool,
    ) -> PolicyDecision {
        if !instance_exists {
            if self.can_create_instance(message) {
                return PolicyDecision::CreateNew(correlation_id.clone());
            }
            return PolicyDecision::Reject(RejectReason::Uncorrelated(Self::uncorrelated(
                correlation_id,
                CorrelationFailure::InstanceNotFound,
            )));
        }

        match self.can_use_existing_instance(message) {
            Ok(true) => PolicyDecision::UseExisting(correlation_id.clone()),
            Ok(false) => PolicyDecision::Reject(RejectReason::Uncorrelated(Self::uncorrelated(
                correlation_id,
                CorrelationFailure::ExistingInstanceNotPermitted,
            ))),
            Err(e) => PolicyDecision::Reject(RejectReason::Misconfigured(e)),
        }
    }

    fn creation_not_permitted() -> ConfigurationError {
        ConfigurationError::CreationNotPermitted {
            saga_type: S::saga_type(),
            message_type: M::message_type(),
        }
    }

    fn uncorrelated(correlation_id: &CorrelationId, failure: CorrelationFailure) -> CorrelationError {
        CorrelationError::new(
            S::saga_type(),
            M::message_type(),
            correlation_id.clone(),
            failure,
        )
    }
}
