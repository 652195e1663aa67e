//! Instrumented repository wrapper that logs timing and outcome of every call.

use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, warn};

use sagaflow_core::{CorrelationId, RepositoryError, SagaError, SagaInstance};

use super::{Checkout, Creator, InstanceHandle, SagaRepository};

/// Decorator adding `tracing` instrumentation to any [`SagaRepository`].
///
/// Each operation emits one `debug` event with the operation name, correlation id,
/// elapsed time and outcome; failures are logged at `warn`. Time spent waiting for
/// a contended id shows up in `fetch_or_create`.
///
/// ```rust,ignore
/// let repo = InstrumentedRepository::new("orders", InMemorySagaRepository::<OrderSaga>::new());
/// let coordinator = LifecycleCoordinator::new(definition, repo);
/// ```
#[derive(Debug)]
pub struct InstrumentedRepository<R> {
    name: &'static str,
    inner: R,
}

impl<R> InstrumentedRepository<R> {
    pub fn new(name: &'static str, inner: R) -> Self {
        Self { name, inner }
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    #[inline]
    fn record(&self, operation: &'static str, correlation_id: &CorrelationId, started: Instant, outcome: &str) {
        debug!(
            repository = self.name,
            operation,
            %correlation_id,
            elapsed_us = started.elapsed().as_micros() as u64,
            outcome,
            "saga repository call"
        );
    }

    #[inline]
    fn record_error(&self, operation: &'static str, correlation_id: &CorrelationId, error: &dyn std::error::Error) {
        warn!(
            repository = self.name,
            operation,
            %correlation_id,
            error = %error,
            "saga repository call failed"
        );
    }
}

#[async_trait]
impl<S, R> SagaRepository<S> for InstrumentedRepository<R>
where
    S: SagaInstance,
    R: SagaRepository<S>,
{
    async fn fetch_or_create(
        &self,
        correlation_id: &CorrelationId,
        creator: Option<&Creator<'_, S>>,
    ) -> Result<Checkout<S>, SagaError> {
        let started = Instant::now();
        let result = self.inner.fetch_or_create(correlation_id, creator).await;
        match &result {
            Ok(Checkout::Created(_)) => self.record("fetch_or_create", correlation_id, started, "created"),
            Ok(Checkout::Existing(_)) => self.record("fetch_or_create", correlation_id, started, "existing"),
            Ok(Checkout::Missing) => self.record("fetch_or_create", correlation_id, started, "missing"),
            Err(e) => self.record_error("fetch_or_create", correlation_id, e),
        }
        result
    }

    async fn persist(&self, handle: InstanceHandle<S>) -> Result<(), RepositoryError> {
        let correlation_id = handle.correlation_id().clone();
        let started = Instant::now();
        let result = self.inner.persist(handle).await;
        match &result {
            Ok(()) => self.record("persist", &correlation_id, started, "ok"),
            Err(e) => self.record_error("persist", &correlation_id, e),
        }
        result
    }

    async fn delete(&self, handle: InstanceHandle<S>) -> Result<(), RepositoryError> {
        let correlation_id = handle.correlation_id().clone();
        let started = Instant::now();
        let result = self.inner.delete(handle).await;
        match &result {
            Ok(()) => self.record("delete", &correlation_id, started, "ok"),
            Err(e) => self.record_error("delete", &correlation_id, e),
        }
        result
    }

    async fn release(&self, handle: InstanceHandle<S>) {
        let correlation_id = handle.correlation_id().clone();
        let started = Instant::now();
        self.inner.release(handle).await;
        self.record("release", &correlation_id, started, "ok");
    }
}

#[cfg(test)]
mod tests {
    use sagaflow_core::ConfigurationError;

    use super::*;
    use crate::repository::InMemorySagaRepository;
    use crate::test_support::OrderSaga;

    #[tokio::test]
    async fn delegates_every_operation_to_the_inner_repository() {
        let repo = InstrumentedRepository::new("orders", InMemorySagaRepository::<OrderSaga>::new());
        let id = CorrelationId::new("X1");
        let create = |cid: CorrelationId| -> Result<OrderSaga, ConfigurationError> {
            Ok(OrderSaga::initial(cid))
        };

        let Checkout::Created(handle) = repo.fetch_or_create(&id, Some(&create)).await.unwrap() else {
            panic!("expected creation");
        };
        repo.persist(handle).await.unwrap();

        let Checkout::Existing(handle) = repo.fetch_or_create(&id, None).await.unwrap() else {
            panic!("expected existing");
        };
        repo.delete(handle).await.unwrap();

        let stats = repo.inner().stats();
        assert_eq!(stats.created, 1);
        assert_eq!(stats.persisted, 1);
        assert_eq!(stats.deleted, 1);
        assert_eq!(stats.active_leases, 0);
    }
}
