//! Error taxonomy for saga correlation and lifecycle processing.

use thiserror::Error;

use crate::id::CorrelationId;

/// Result type used across the saga engine.
pub type SagaResult<T> = Result<T, SagaError>;

/// Error returned by message processing.
///
/// Every variant is surfaced to the caller; none of them is retried by the engine.
#[derive(Debug, Error)]
pub enum SagaError {
    /// The saga type is misconfigured for the message being processed.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// The message does not correlate to an instance under the active policy.
    #[error(transparent)]
    Correlation(#[from] CorrelationError),

    /// The domain consumer failed after the instance was checked out.
    #[error(transparent)]
    Consumer(#[from] ConsumerError),

    /// The repository collaborator failed.
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl SagaError {
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    pub fn is_correlation(&self) -> bool {
        matches!(self, Self::Correlation(_))
    }

    pub fn is_consumer(&self) -> bool {
        matches!(self, Self::Consumer(_))
    }
}

/// Saga configuration failure. Fatal to the message being processed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigurationError {
    /// An initiating message type was asked to join an existing instance.
    #[error(
        "message type '{message_type}' initiates '{saga_type}' instances and can never be \
         matched to an existing instance"
    )]
    InitiatingCannotUseExisting {
        saga_type: &'static str,
        message_type: &'static str,
    },

    /// An observing message type was asked to create an instance.
    #[error("message type '{message_type}' cannot create '{saga_type}' instances")]
    CreationNotPermitted {
        saga_type: &'static str,
        message_type: &'static str,
    },

    /// The configured correlation extractor failed.
    #[error("correlation id extraction failed for '{message_type}': {reason}")]
    ExtractionFailed {
        message_type: &'static str,
        reason: String,
    },

    /// The configured correlation extractor produced a blank id.
    #[error("correlation id extracted from '{message_type}' is empty")]
    EmptyCorrelationId { message_type: &'static str },

    /// The instance factory produced an instance with the wrong identity.
    #[error("instance factory for '{saga_type}' returned id '{actual}', expected '{expected}'")]
    IdentityMismatch {
        saga_type: &'static str,
        expected: CorrelationId,
        actual: CorrelationId,
    },

    /// The removal predicate failed; the instance is kept.
    #[error("removal predicate for '{saga_type}' failed: {reason}")]
    RemovalPredicateFailed {
        saga_type: &'static str,
        reason: String,
    },

    /// No policy is registered for the message type.
    #[error("no policy registered for message type '{message_type}' on '{saga_type}'")]
    NoPolicy {
        saga_type: &'static str,
        message_type: &'static str,
    },

    /// A message type was registered more than once.
    #[error("message type '{message_type}' registered twice on '{saga_type}'")]
    DuplicatePolicy {
        saga_type: &'static str,
        message_type: &'static str,
    },
}

/// Why a message failed to correlate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrelationFailure {
    /// No instance exists and the policy does not permit creation.
    InstanceNotFound,
    /// An instance exists but the policy does not permit using it.
    ExistingInstanceNotPermitted,
}

impl core::fmt::Display for CorrelationFailure {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::InstanceNotFound => f.write_str("no instance found and creation not permitted"),
            Self::ExistingInstanceNotPermitted => {
                f.write_str("existing instance may not be used by this message")
            }
        }
    }
}

/// A message genuinely does not correlate under the active policy.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("'{message_type}' did not correlate to '{saga_type}' instance '{correlation_id}': {failure}")]
pub struct CorrelationError {
    pub saga_type: &'static str,
    pub message_type: &'static str,
    pub correlation_id: CorrelationId,
    pub failure: CorrelationFailure,
}

impl CorrelationError {
    pub fn new(
        saga_type: &'static str,
        message_type: &'static str,
        correlation_id: CorrelationId,
        failure: CorrelationFailure,
    ) -> Self {
        Self {
            saga_type,
            message_type,
            correlation_id,
            failure,
        }
    }
}

/// The domain consumer failed. The source error is carried unchanged.
#[derive(Debug, Error)]
#[error("consumer of '{message_type}' failed on '{saga_type}' instance '{correlation_id}'")]
pub struct ConsumerError {
    pub saga_type: &'static str,
    pub message_type: &'static str,
    pub correlation_id: CorrelationId,
    #[source]
    pub source: anyhow::Error,
}

impl ConsumerError {
    /// The error returned by the consumer.
    pub fn inner(&self) -> &anyhow::Error {
        &self.source
    }

    pub fn into_inner(self) -> anyhow::Error {
        self.source
    }
}

/// Repository collaborator failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RepositoryError {
    /// Backing storage failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// An internal lock was poisoned by a panicking thread.
    #[error("lock poisoned: {0}")]
    LockPoisoned(String),

    /// A handle was committed against an instance that no longer exists.
    #[error("stale handle for instance '{0}'")]
    StaleHandle(CorrelationId),
}

impl RepositoryError {
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn poisoned(msg: impl Into<String>) -> Self {
        Self::LockPoisoned(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn correlation_error_names_saga_message_and_id() {
        let err = CorrelationError::new(
            "saga.order",
            "order.shipped",
            CorrelationId::new("X2"),
            CorrelationFailure::InstanceNotFound,
        );
        let msg = err.to_string();
        assert!(msg.contains("saga.order"));
        assert!(msg.contains("order.shipped"));
        assert!(msg.contains("X2"));
    }

    #[test]
    fn consumer_error_keeps_source() {
        let err = ConsumerError {
            saga_type: "saga.order",
            message_type: "order.paid",
            correlation_id: CorrelationId::new("X1"),
            source: anyhow::anyhow!("payment gateway down"),
        };
        assert_eq!(err.inner().to_string(), "payment gateway down");

        let saga: SagaError = err.into();
        assert!(saga.is_consumer());
    }
}
