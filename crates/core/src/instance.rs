//! Saga instance contract: identity plus the instance metadata provider.

use crate::id::CorrelationId;

/// A mutable, uniquely-identified record representing one in-flight process.
///
/// The domain state fields are owned by the consuming workflow and are opaque to
/// the engine. Only the identity and the blank state are required here.
pub trait SagaInstance: Clone + Send + Sync + 'static {
    /// Stable saga type identifier (e.g. "saga.order_fulfillment").
    fn saga_type() -> &'static str;

    /// Immutable identity assigned at creation.
    fn correlation_id(&self) -> &CorrelationId;

    /// Freshly-initialized instance with the type's documented default state.
    fn initial(correlation_id: CorrelationId) -> Self;
}
