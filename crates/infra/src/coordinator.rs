//! Saga lifecycle coordination (application-level orchestration).
//!
//! One call per inbound message:
//!
//! ```text
//! Message
//!   ↓
//! 1. Resolve correlation id (pure, before any lock)
//!   ↓
//! 2. Fetch-or-create under per-id exclusivity (repository)
//!   ↓
//! 3. Consult the policy: create / use existing / reject
//!   ↓
//! 4. Hand the instance to the domain consumer
//!   ↓
//! 5. Evaluate the removal predicate → delete or persist (releases exclusivity)
//! ```
//!
//! Exclusivity is released on every exit path. Rejections and consumer failures
//! release without writing; cancellation drops the checked-out handle, which
//! releases its lease. Nothing here retries and no timeouts are imposed; both
//! belong to the transport and repository.

use std::sync::Arc;

use tracing::{Instrument, debug, error, info_span, warn};

use sagaflow_core::{
    ConsumerError, CorrelationId, RepositoryError, SagaError, SagaInstance, SagaResult,
};
use sagaflow_policy::{PolicyDecision, RejectReason, SagaDefinition, SagaMessage, SagaPolicy};

use crate::consumer::SagaConsumer;
use crate::repository::{Checkout, Creator, InstanceHandle, SagaRepository};

/// How the instance was obtained.
#[derive(Debug, Copy, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    Created,
    Used,
}

/// What happened to the instance after the consumer ran.
#[derive(Debug, Copy, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Finalization {
    Persisted,
    Removed,
}

/// Result of successfully processing one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutcome {
    pub correlation_id: CorrelationId,
    pub disposition: Disposition,
    pub finalization: Finalization,
}

/// Entry point for the dispatch layer.
///
/// Holds no mutable state of its own; one coordinator can serve any number of
/// concurrent messages. Messages for the same correlation id are serialized by
/// the repository, distinct ids proceed in parallel.
#[derive(Debug)]
pub struct LifecycleCoordinator<S, R> {
    definition: Arc<SagaDefinition<S>>,
    repository: R,
}

impl<S, R> LifecycleCoordinator<S, R> {
    pub fn new(definition: Arc<SagaDefinition<S>>, repository: R) -> Self {
        Self {
            definition,
            repository,
        }
    }

    pub fn definition(&self) -> &SagaDefinition<S> {
        &self.definition
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }
}

impl<S, R> LifecycleCoordinator<S, R>
where
    S: SagaInstance,
    R: SagaRepository<S>,
{
    /// Process a message using the policy registered for its type.
    pub async fn process<M, C>(&self, message: &M, consumer: &C) -> SagaResult<ProcessOutcome>
    where
        M: SagaMessage,
        C: SagaConsumer<S, M>,
    {
        let policy = self.definition.policy::<M>().inspect_err(|e| {
            warn!(saga_type = S::saga_type(), message_type = M::message_type(), error = %e, "no saga policy for message");
        })?;
        self.process_with(message, policy, consumer).await
    }

    /// Process a message under an explicit policy.
    pub async fn process_with<M, C>(
        &self,
        message: &M,
        policy: &SagaPolicy<S, M>,
        consumer: &C,
    ) -> SagaResult<ProcessOutcome>
    where
        M: SagaMessage,
        C: SagaConsumer<S, M>,
    {
        let saga_type = S::saga_type();
        let message_type = M::message_type();

        let correlation_id = policy.correlation_id(message).inspect_err(|e| {
            warn!(saga_type, message_type, error = %e, "correlation id resolution failed");
        })?;

        let span = info_span!(
            "saga.process",
            saga_type,
            message_type,
            correlation_id = %correlation_id,
        );

        self.run(message, policy, consumer, correlation_id)
            .instrument(span)
            .await
    }

    async fn run<M, C>(
        &self,
        message: &M,
        policy: &SagaPolicy<S, M>,
        consumer: &C,
        correlation_id: CorrelationId,
    ) -> SagaResult<ProcessOutcome>
    where
        M: SagaMessage,
        C: SagaConsumer<S, M>,
    {
        let create = |id: CorrelationId| policy.create_instance(id);
        let creator: Option<&Creator<'_, S>> = if policy.can_create_instance(message) {
            Some(&create as &Creator<'_, S>)
        } else {
            None
        };

        let checkout = self
            .repository
            .fetch_or_create(&correlation_id, creator)
            .await?;

        let exists = matches!(checkout, Checkout::Existing(_));
        let decision = policy.decide(message, &correlation_id, exists);

        let (mut handle, disposition) = match (checkout, decision) {
            (Checkout::Created(handle), _) => (handle, Disposition::Created),
            (Checkout::Existing(handle), PolicyDecision::UseExisting(_)) => {
                (handle, Disposition::Used)
            }
            (Checkout::Existing(handle), PolicyDecision::Reject(reason)) => {
                self.repository.release(handle).await;
                return Err(rejected(reason));
            }
            (Checkout::Missing, PolicyDecision::Reject(reason)) => return Err(rejected(reason)),
            (checkout, decision) => {
                if let Checkout::Existing(handle) = checkout {
                    self.repository.release(handle).await;
                }
                error!(?decision, "repository checkout contradicts policy decision");
                return Err(RepositoryError::storage(format!(
                    "checkout for '{correlation_id}' contradicts policy decision {decision:?}"
                ))
                .into());
            }
        };

        debug!(?disposition, version = handle.version(), "saga instance checked out");

        if let Err(source) = consumer.consume(handle.instance_mut(), message).await {
            self.repository.release(handle).await;
            warn!(error = %source, "saga consumer failed; stored instance left unchanged");
            return Err(self.consumer_error::<M>(correlation_id, source));
        }

        if handle.instance().correlation_id() != &correlation_id {
            let changed_to = handle.instance().correlation_id().clone();
            self.repository.release(handle).await;
            error!(%changed_to, "saga consumer changed instance identity");
            return Err(self.consumer_error::<M>(
                correlation_id,
                anyhow::anyhow!("consumer changed instance identity to '{changed_to}'"),
            ));
        }

        self.finalize(handle, disposition, correlation_id).await
    }

    async fn finalize(
        &self,
        handle: InstanceHandle<S>,
        disposition: Disposition,
        correlation_id: CorrelationId,
    ) -> SagaResult<ProcessOutcome> {
        match self.definition.removal().evaluate(handle.instance()) {
            Ok(true) => {
                self.repository.delete(handle).await?;
                debug!("saga instance removed");
                Ok(ProcessOutcome {
                    correlation_id,
                    disposition,
                    finalization: Finalization::Removed,
                })
            }
            Ok(false) => {
                self.repository.persist(handle).await?;
                debug!("saga instance persisted");
                Ok(ProcessOutcome {
                    correlation_id,
                    disposition,
                    finalization: Finalization::Persisted,
                })
            }
            Err(e) => {
                // Broken predicate: keep the instance. The predicate error takes
                // precedence over a failure to persist.
                error!(error = %e, "removal predicate failed; keeping saga instance");
                if let Err(persist_error) = self.repository.persist(handle).await {
                    error!(error = %persist_error, "persist after removal predicate failure failed");
                }
                Err(e.into())
            }
        }
    }

    fn consumer_error<M: SagaMessage>(
        &self,
        correlation_id: CorrelationId,
        source: anyhow::Error,
    ) -> SagaError {
        ConsumerError {
            saga_type: S::saga_type(),
            message_type: M::message_type(),
            correlation_id,
            source,
        }
        .into()
    }
}

fn rejected(reason: RejectReason) -> SagaError {
    match &reason {
        RejectReason::Uncorrelated(e) => warn!(failure = %e.failure, "message rejected: no usable saga instance"),
        RejectReason::Misconfigured(e) => warn!(error = %e, "message rejected: policy contract violated"),
    }
    reason.into()
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use sagaflow_core::{ConfigurationError, CorrelationFailure};
    use sagaflow_policy::{
        CorrelationExtractor, CorrelationResolver, InstanceFactory, RemovalPredicate,
    };

    use super::*;
    use crate::consumer::consumer_fn;
    use crate::repository::{InMemorySagaRepository, Origin};
    use crate::test_support::{ItemAdded, OrderSaga, OrderSubmitted, order_definition};

    fn coordinator(
        definition: SagaDefinition<OrderSaga>,
    ) -> LifecycleCoordinator<OrderSaga, Arc<InMemorySagaRepository<OrderSaga>>> {
        LifecycleCoordinator::new(Arc::new(definition), InMemorySagaRepository::arc())
    }

    #[tokio::test]
    async fn unregistered_message_type_is_rejected_before_checkout() {
        let definition = SagaDefinition::<OrderSaga>::builder()
            .initiated_by::<OrderSubmitted>(CorrelationResolver::Generate)
            .build()
            .unwrap();
        let coordinator = coordinator(definition);

        let err = coordinator
            .process(&ItemAdded::new("X1", 1), &consumer_fn(|_: &mut OrderSaga, _: &ItemAdded| Ok(())))
            .await
            .unwrap_err();

        assert!(err.is_configuration());
        assert_eq!(coordinator.repository().stats().checkouts, 0);
    }

    #[tokio::test]
    async fn extraction_failure_is_surfaced_as_configuration_error() {
        let definition = SagaDefinition::<OrderSaga>::builder()
            .initiated_by::<OrderSubmitted>(CorrelationResolver::extract(|_| {
                anyhow::bail!("token header absent")
            }))
            .build()
            .unwrap();
        let coordinator = coordinator(definition);

        let err = coordinator
            .process(
                &OrderSubmitted::new("X1"),
                &consumer_fn(|_: &mut OrderSaga, _: &OrderSubmitted| Ok(())),
            )
            .await
            .unwrap_err();

        match err {
            SagaError::Configuration(e) => assert!(e.to_string().contains("token header absent")),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(coordinator.repository().is_empty().unwrap());
    }

    #[tokio::test]
    async fn broken_removal_predicate_keeps_the_instance() {
        let definition = order_definition()
            .remove_when(RemovalPredicate::try_when(|_: &OrderSaga| {
                anyhow::bail!("predicate exploded")
            }))
            .build()
            .unwrap();
        let coordinator = coordinator(definition);
        let id = CorrelationId::new("X1");

        let err = coordinator
            .process(
                &OrderSubmitted::new("X1"),
                &consumer_fn(|saga: &mut OrderSaga, _: &OrderSubmitted| {
                    saga.is_complete = true;
                    Ok(())
                }),
            )
            .await
            .unwrap_err();

        assert!(err.is_configuration());
        let stored = coordinator.repository().get(&id).unwrap().unwrap();
        assert!(stored.instance.is_complete);
        assert_eq!(coordinator.repository().stats().active_leases, 0);
    }

    #[tokio::test]
    async fn consumer_may_not_change_identity() {
        let coordinator = coordinator(order_definition().build().unwrap());

        let err = coordinator
            .process(
                &OrderSubmitted::new("X1"),
                &consumer_fn(|saga: &mut OrderSaga, _: &OrderSubmitted| {
                    saga.id = CorrelationId::new("hijacked");
                    Ok(())
                }),
            )
            .await
            .unwrap_err();

        assert!(err.is_consumer());
        assert!(coordinator.repository().is_empty().unwrap());
        assert_eq!(coordinator.repository().stats().active_leases, 0);
    }

    #[tokio::test]
    async fn observing_message_without_instance_reports_correlation_failure() {
        let definition = SagaDefinition::<OrderSaga>::builder()
            .observes::<ItemAdded>(CorrelationExtractor::json_field("order_id"))
            .build()
            .unwrap();
        let coordinator = LifecycleCoordinator::new(Arc::new(definition), InMemorySagaRepository::arc());

        let err = coordinator
            .process(
                &ItemAdded::new("X9", 2),
                &consumer_fn(|_: &mut OrderSaga, _: &ItemAdded| Ok(())),
            )
            .await
            .unwrap_err();

        match err {
            SagaError::Correlation(e) => {
                assert_eq!(e.saga_type, "saga.order");
                assert_eq!(e.message_type, "order.item_added");
                assert_eq!(e.correlation_id, CorrelationId::new("X9"));
                assert_eq!(e.failure, CorrelationFailure::InstanceNotFound);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    /// Delegates to an in-memory repository but fails every persist.
    struct PersistFails(InMemorySagaRepository<OrderSaga>);

    #[async_trait]
    impl SagaRepository<OrderSaga> for PersistFails {
        async fn fetch_or_create(
            &self,
            correlation_id: &CorrelationId,
            creator: Option<&Creator<'_, OrderSaga>>,
        ) -> Result<Checkout<OrderSaga>, SagaError> {
            self.0.fetch_or_create(correlation_id, creator).await
        }

        async fn persist(&self, handle: InstanceHandle<OrderSaga>) -> Result<(), RepositoryError> {
            assert_eq!(handle.origin(), Origin::Created);
            Err(RepositoryError::storage("disk full"))
        }

        async fn delete(&self, handle: InstanceHandle<OrderSaga>) -> Result<(), RepositoryError> {
            self.0.delete(handle).await
        }
    }

    #[tokio::test]
    async fn removal_predicate_error_wins_over_persist_failure() {
        let definition = order_definition()
            .remove_when(RemovalPredicate::try_when(|_: &OrderSaga| {
                anyhow::bail!("predicate exploded")
            }))
            .build()
            .unwrap();
        let coordinator =
            LifecycleCoordinator::new(Arc::new(definition), PersistFails(InMemorySagaRepository::new()));

        let err = coordinator
            .process(
                &OrderSubmitted::new("X1"),
                &consumer_fn(|_: &mut OrderSaga, _: &OrderSubmitted| Ok(())),
            )
            .await
            .unwrap_err();

        match err {
            SagaError::Configuration(ConfigurationError::RemovalPredicateFailed { saga_type, reason }) => {
                assert_eq!(saga_type, "saga.order");
                assert!(reason.contains("predicate exploded"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        let stats = coordinator.repository().0.stats();
        assert_eq!(stats.active_leases, 0);
        assert!(coordinator.repository().0.is_empty().unwrap());
    }

    #[tokio::test]
    async fn failing_factory_releases_the_lease_and_stores_nothing() {
        let definition = order_definition()
            .with_factory(InstanceFactory::custom(|_| {
                OrderSaga::initial(CorrelationId::new("other"))
            }))
            .build()
            .unwrap();
        let coordinator = coordinator(definition);

        let err = coordinator
            .process(
                &OrderSubmitted::new("X1"),
                &consumer_fn(|_: &mut OrderSaga, _: &OrderSubmitted| {
                    panic!("consumer must not run without an instance")
                }),
            )
            .await
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "instance factory for 'saga.order' returned id 'other', expected 'X1'"
        );
        assert!(matches!(
            err,
            SagaError::Configuration(ConfigurationError::IdentityMismatch { .. })
        ));

        let stats = coordinator.repository().stats();
        assert_eq!(stats.created, 0);
        assert_eq!(stats.released_uncommitted, 1);
        assert_eq!(stats.active_leases, 0);
        assert!(coordinator.repository().is_empty().unwrap());
    }

    #[tokio::test]
    async fn shared_definition_and_repository_are_exposed() {
        let coordinator = coordinator(order_definition().build().unwrap());
        assert_eq!(coordinator.definition().saga_type(), "saga.order");
        assert!(coordinator.repository().is_empty().unwrap());
    }
}
