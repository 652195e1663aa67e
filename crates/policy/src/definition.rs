//! Saga definition: the per-saga-type configuration surface.
//!
//! A definition binds each message type to exactly one policy variant and holds
//! the instance factory and removal predicate. It is built once at startup and
//! shared read-only (typically behind an `Arc`).

use std::any::{Any, TypeId};
use std::collections::{HashMap, HashSet};

use sagaflow_core::{ConfigurationError, SagaInstance};

use crate::factory::InstanceFactory;
use crate::message::SagaMessage;
use crate::policy::{InitiatingPolicy, SagaPolicy};
use crate::removal::RemovalPredicate;
use crate::resolver::{CorrelationExtractor, CorrelationResolver};

struct PolicyEntry {
    message_type: &'static str,
    initiating: bool,
    policy: Box<dyn Any + Send + Sync>,
}

/// Immutable configuration of one saga type.
pub struct SagaDefinition<S> {
    factory: InstanceFactory<S>,
    removal: RemovalPredicate<S>,
    policies: HashMap<TypeId, PolicyEntry>,
}

impl<S> core::fmt::Debug for SagaDefinition<S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut types: Vec<_> = self.policies.values().map(|e| e.message_type).collect();
        types.sort_unstable();
        f.debug_struct("SagaDefinition")
            .field("message_types", &types)
            .field("factory", &self.factory)
            .field("removal", &self.removal)
            .finish()
    }
}

impl<S: SagaInstance> SagaDefinition<S> {
    pub fn builder() -> SagaDefinitionBuilder<S> {
        SagaDefinitionBuilder::new()
    }

    pub fn saga_type(&self) -> &'static str {
        S::saga_type()
    }

    /// Policy registered for message type `M`.
    pub fn policy<M: SagaMessage>(&self) -> Result<&SagaPolicy<S, M>, ConfigurationError> {
        self.policies
            .get(&TypeId::of::<M>())
            .and_then(|entry| entry.policy.downcast_ref::<SagaPolicy<S, M>>())
            .ok_or(ConfigurationError::NoPolicy {
                saga_type: S::saga_type(),
                message_type: M::message_type(),
            })
    }

    pub fn removal(&self) -> &RemovalPredicate<S> {
        &self.removal
    }

    pub fn factory(&self) -> &InstanceFactory<S> {
        &self.factory
    }

    /// Registered message types that may start new instances, sorted.
    pub fn initiating_message_types(&self) -> Vec<&'static str> {
        let mut types: Vec<_> = self
            .policies
            .values()
            .filter(|e| e.initiating)
            .map(|e| e.message_type)
            .collect();
        types.sort_unstable();
        types
    }

    /// All registered message types, sorted.
    pub fn message_types(&self) -> Vec<&'static str> {
        let mut types: Vec<_> = self.policies.values().map(|e| e.message_type).collect();
        types.sort_unstable();
        types
    }
}

type PendingPolicy<S> = Box<dyn FnOnce(&InstanceFactory<S>) -> PolicyEntry + Send>;

/// Builder for [`SagaDefinition`].
///
/// Initiating policies pick up the factory configured on the builder, whatever
/// order the calls are made in.
pub struct SagaDefinitionBuilder<S> {
    factory: InstanceFactory<S>,
    removal: RemovalPredicate<S>,
    pending: Vec<(TypeId, PendingPolicy<S>)>,
    seen: HashSet<&'static str>,
    duplicate: Option<&'static str>,
}

impl<S: SagaInstance> SagaDefinitionBuilder<S> {
    pub fn new() -> Self {
        Self {
            factory: InstanceFactory::new(),
            removal: RemovalPredicate::never(),
            pending: Vec::new(),
            seen: HashSet::new(),
            duplicate: None,
        }
    }

    /// Register `M` as a message type that starts new instances.
    pub fn initiated_by<M: SagaMessage>(mut self, resolver: CorrelationResolver<M>) -> Self {
        self.register::<M>(Box::new(move |factory: &InstanceFactory<S>| PolicyEntry {
            message_type: M::message_type(),
            initiating: true,
            policy: Box::new(SagaPolicy::<S, M>::Initiating(InitiatingPolicy::new(
                resolver,
                factory.clone(),
            ))),
        }));
        self
    }

    /// Register `M` as a message type consumed only by existing instances.
    pub fn observes<M: SagaMessage>(mut self, extractor: CorrelationExtractor<M>) -> Self {
        self.register::<M>(Box::new(move |_: &InstanceFactory<S>| PolicyEntry {
            message_type: M::message_type(),
            initiating: false,
            policy: Box::new(SagaPolicy::<S, M>::observing(extractor)),
        }));
        self
    }

    pub fn with_factory(mut self, factory: InstanceFactory<S>) -> Self {
        self.factory = factory;
        self
    }

    pub fn remove_when(mut self, removal: RemovalPredicate<S>) -> Self {
        self.removal = removal;
        self
    }

    pub fn build(self) -> Result<SagaDefinition<S>, ConfigurationError> {
        if let Some(message_type) = self.duplicate {
            tracing::warn!(saga_type = S::saga_type(), message_type, "duplicate saga policy registration");
            return Err(ConfigurationError::DuplicatePolicy {
                saga_type: S::saga_type(),
                message_type,
            });
        }

        let policies = self
            .pending
            .into_iter()
            .map(|(type_id, make)| (type_id, make(&self.factory)))
            .collect();

        let definition = SagaDefinition {
            factory: self.factory,
            removal: self.removal,
            policies,
        };
        tracing::debug!(
            saga_type = S::saga_type(),
            message_types = ?definition.message_types(),
            removal = definition.removal.is_configured(),
            "saga definition built"
        );
        Ok(definition)
    }

    fn register<M: SagaMessage>(&mut self, make: PendingPolicy<S>) {
        if !self.seen.insert(M::message_type()) {
            self.duplicate.get_or_insert(M::message_type());
            return;
        }
        self.pending.push((TypeId::of::<M>(), make));
    }
}

impl<S: SagaInstance> Default for SagaDefinitionBuilder<S> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use sagaflow_core::CorrelationId;

    use super::*;
    use crate::test_support::{OrderSaga, OrderShipped, OrderSubmitted};

    fn shipped_extractor() -> CorrelationExtractor<OrderShipped> {
        CorrelationExtractor::from_fn(|m: &OrderShipped| CorrelationId::new(m.order_id.clone()))
    }

    #[test]
    fn policies_are_looked_up_by_message_type() {
        let definition = SagaDefinition::<OrderSaga>::builder()
            .initiated_by::<OrderSubmitted>(CorrelationResolver::Generate)
            .observes(shipped_extractor())
            .build()
            .unwrap();

        assert!(definition.policy::<OrderSubmitted>().unwrap().is_initiating());
        assert!(!definition.policy::<OrderShipped>().unwrap().is_initiating());
        assert_eq!(definition.message_types(), vec!["order.shipped", "order.submitted"]);
        assert_eq!(definition.initiating_message_types(), vec!["order.submitted"]);
    }

    #[test]
    fn unregistered_message_type_is_a_configuration_error() {
        let definition = SagaDefinition::<OrderSaga>::builder()
            .observes(shipped_extractor())
            .build()
            .unwrap();

        assert_eq!(
            definition.policy::<OrderSubmitted>().unwrap_err(),
            ConfigurationError::NoPolicy {
                saga_type: "saga.order",
                message_type: "order.submitted",
            }
        );
    }

    #[test]
    fn duplicate_registration_fails_to_build() {
        let err = SagaDefinition::<OrderSaga>::builder()
            .initiated_by::<OrderShipped>(CorrelationResolver::Generate)
            .observes(shipped_extractor())
            .build()
            .unwrap_err();

        assert_eq!(
            err,
            ConfigurationError::DuplicatePolicy {
                saga_type: "saga.order",
                message_type: "order.shipped",
            }
        );
    }

    #[test]
    fn initiating_policies_use_the_configured_factory() {
        let definition = SagaDefinition::<OrderSaga>::builder()
            .initiated_by::<OrderSubmitted>(CorrelationResolver::Generate)
            .with_factory(InstanceFactory::custom(|id| OrderSaga {
                id,
                items: 3,
                is_complete: false,
            }))
            .build()
            .unwrap();

        let saga = definition
            .policy::<OrderSubmitted>()
            .unwrap()
            .create_instance(CorrelationId::new("X1"))
            .unwrap();
        assert_eq!(saga.items, 3);
    }
}
