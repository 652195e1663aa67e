//! Instance factory: builds blank instances for newly started sagas.

use std::sync::Arc;

use sagaflow_core::{ConfigurationError, CorrelationId, SagaInstance};

type ConstructFn<S> = dyn Fn(CorrelationId) -> S + Send + Sync;

/// Constructs a new, empty instance for a given identity.
///
/// Defaults to [`SagaInstance::initial`]; a custom constructor can be registered
/// when the blank state depends on more than the id. Either way the produced
/// identity is checked against the requested one.
pub struct InstanceFactory<S> {
    construct: Option<Arc<ConstructFn<S>>>,
}

impl<S> Clone for InstanceFactory<S> {
    fn clone(&self) -> Self {
        Self {
            construct: self.construct.clone(),
        }
    }
}

impl<S> core::fmt::Debug for InstanceFactory<S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("InstanceFactory")
            .field("custom", &self.construct.is_some())
            .finish()
    }
}

impl<S> Default for InstanceFactory<S> {
    fn default() -> Self {
        Self { construct: None }
    }
}

impl<S: SagaInstance> InstanceFactory<S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn custom<F>(construct: F) -> Self
    where
        F: Fn(CorrelationId) -> S + Send + Sync + 'static,
    {
        Self {
            construct: Some(Arc::new(construct)),
        }
    }

    pub fn create(&self, correlation_id: CorrelationId) -> Result<S, ConfigurationError> {
        let instance = match &self.construct {
            Some(construct) => construct(correlation_id.clone()),
            None => S::initial(correlation_id.clone()),
        };

        if instance.correlation_id() != &correlation_id {
            return Err(ConfigurationError::IdentityMismatch {
                saga_type: S::saga_type(),
                expected: correlation_id,
                actual: instance.correlation_id().clone(),
            });
        }

        Ok(instance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::OrderSaga;

    #[test]
    fn default_factory_uses_initial_state() {
        let saga = InstanceFactory::<OrderSaga>::new()
            .create(CorrelationId::new("X1"))
            .unwrap();
        assert_eq!(saga, OrderSaga::initial(CorrelationId::new("X1")));
    }

    #[test]
    fn custom_factory_must_preserve_identity() {
        let factory = InstanceFactory::custom(|_id| OrderSaga::initial(CorrelationId::new("other")));
        let err = factory.create(CorrelationId::new("X1")).unwrap_err();
        assert!(matches!(err, ConfigurationError::IdentityMismatch { .. }));
    }
}
