//! Domain consumer boundary: the workflow code that mutates a checked-out instance.

use std::sync::Arc;

use async_trait::async_trait;

use sagaflow_core::SagaInstance;
use sagaflow_policy::SagaMessage;

/// Applies one message to a checked-out saga instance.
///
/// The consumer owns the business state machine. It may mutate `instance` freely
/// (except its identity) and may fail; a failure leaves the stored instance
/// untouched and is returned to the caller unchanged.
#[async_trait]
pub trait SagaConsumer<S, M>: Send + Sync
where
    S: SagaInstance,
    M: SagaMessage,
{
    async fn consume(&self, instance: &mut S, message: &M) -> anyhow::Result<()>;
}

#[async_trait]
impl<S, M, C> SagaConsumer<S, M> for Arc<C>
where
    S: SagaInstance,
    M: SagaMessage,
    C: SagaConsumer<S, M> + ?Sized,
{
    async fn consume(&self, instance: &mut S, message: &M) -> anyhow::Result<()> {
        (**self).consume(instance, message).await
    }
}

/// Consumer backed by a synchronous closure.
#[derive(Debug, Clone)]
pub struct FnConsumer<F>(F);

/// Wrap a synchronous closure as a [`SagaConsumer`].
pub fn consumer_fn<S, M, F>(f: F) -> FnConsumer<F>
where
    F: Fn(&mut S, &M) -> anyhow::Result<()> + Send + Sync,
{
    FnConsumer(f)
}

#[async_trait]
impl<S, M, F> SagaConsumer<S, M> for FnConsumer<F>
where
    S: SagaInstance,
    M: SagaMessage,
    F: Fn(&mut S, &M) -> anyhow::Result<()> + Send + Sync,
{
    async fn consume(&self, instance: &mut S, message: &M) -> anyhow::Result<()> {
        (self.0)(instance, message)
    }
}
