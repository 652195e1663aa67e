//! Removal predicate: decides whether an instance is deleted after processing.

use std::sync::Arc;

use sagaflow_core::{ConfigurationError, SagaInstance};

type PredicateFn<S> = dyn Fn(&S) -> anyhow::Result<bool> + Send + Sync;

/// Optional condition over instance state, evaluated after every processed message.
///
/// Without a condition instances are never removed by this mechanism. Evaluation
/// only borrows the instance. A failing condition yields an error and the caller
/// keeps the instance.
pub struct RemovalPredicate<S> {
    predicate: Option<Arc<PredicateFn<S>>>,
}

impl<S> Clone for RemovalPredicate<S> {
    fn clone(&self) -> Self {
        Self {
            predicate: self.predicate.clone(),
        }
    }
}

impl<S> Default for RemovalPredicate<S> {
    fn default() -> Self {
        Self { predicate: None }
    }
}

impl<S> core::fmt::Debug for RemovalPredicate<S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RemovalPredicate")
            .field("configured", &self.predicate.is_some())
            .finish()
    }
}

impl<S: SagaInstance> RemovalPredicate<S> {
    /// Never remove.
    pub fn never() -> Self {
        Self::default()
    }

    /// Remove when `predicate` returns true.
    pub fn when<F>(predicate: F) -> Self
    where
        F: Fn(&S) -> bool + Send + Sync + 'static,
    {
        Self::try_when(move |s| Ok(predicate(s)))
    }

    /// Remove when `predicate` returns `Ok(true)`; errors keep the instance.
    pub fn try_when<F>(predicate: F) -> Self
    where
        F: Fn(&S) -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        Self {
            predicate: Some(Arc::new(predicate)),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.predicate.is_some()
    }

    pub fn evaluate(&self, instance: &S) -> Result<bool, ConfigurationError> {
        match &self.predicate {
            None => Ok(false),
            Some(predicate) => {
                predicate(instance).map_err(|e| ConfigurationError::RemovalPredicateFailed {
                    saga_type: S::saga_type(),
                    reason: format!("{e:#}"),
                })
            }
        }
    }
}
