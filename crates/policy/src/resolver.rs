//! Correlation resolution: deriving the instance identity for a message.
//!
//! Resolution never performs IO. Exclusivity downstream is keyed by the id, so the
//! id must be computable before any lock is acquired.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value as JsonValue;

use sagaflow_core::{ConfigurationError, CorrelationId};

use crate::message::SagaMessage;

type ExtractFn<M> = dyn Fn(&M) -> anyhow::Result<CorrelationId> + Send + Sync;

/// Reads a correlation id out of message content.
///
/// Extraction must be deterministic and total for valid messages. A failing or
/// blank extraction is a configuration error, never silently replaced by a
/// generated id.
pub struct CorrelationExtractor<M> {
    extract: Arc<ExtractFn<M>>,
}

impl<M> Clone for CorrelationExtractor<M> {
    fn clone(&self) -> Self {
        Self {
            extract: Arc::clone(&self.extract),
        }
    }
}

impl<M> core::fmt::Debug for CorrelationExtractor<M> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CorrelationExtractor").finish_non_exhaustive()
    }
}

impl<M: SagaMessage> CorrelationExtractor<M> {
    /// Fallible extractor.
    pub fn new<F>(extract: F) -> Self
    where
        F: Fn(&M) -> anyhow::Result<CorrelationId> + Send + Sync + 'static,
    {
        Self {
            extract: Arc::new(extract),
        }
    }

    /// Extractor that cannot fail (e.g. reads a typed id field).
    pub fn from_fn<F>(extract: F) -> Self
    where
        F: Fn(&M) -> CorrelationId + Send + Sync + 'static,
    {
        Self::new(move |m| Ok(extract(m)))
    }

    /// Extract from a named top-level field of the serialized message.
    ///
    /// String and number values are accepted; anything else fails.
    pub fn json_field(field: &'static str) -> Self
    where
        M: Serialize,
    {
        Self::new(move |m| {
            let value = serde_json::to_value(m)?;
            match value.get(field) {
                Some(JsonValue::String(s)) => Ok(CorrelationId::new(s.clone())),
                Some(JsonValue::Number(n)) => Ok(CorrelationId::new(n.to_string())),
                Some(other) => anyhow::bail!("field '{field}' is not a string or number: {other}"),
                None => anyhow::bail!("field '{field}' is missing"),
            }
        })
    }

    pub fn extract(&self, message: &M) -> Result<CorrelationId, ConfigurationError> {
        let id = (self.extract)(message).map_err(|e| ConfigurationError::ExtractionFailed {
            message_type: M::message_type(),
            reason: format!("{e:#}"),
        })?;

        if id.is_empty() {
            return Err(ConfigurationError::EmptyCorrelationId {
                message_type: M::message_type(),
            });
        }

        Ok(id)
    }
}

/// How a new instance's correlation id is obtained for an initiating message.
///
/// There is no default: `Extract` gives retry-idempotent ids (a
/// redelivered start message maps to the same instance), `Generate` gives a fresh
/// id per delivery.
pub enum CorrelationResolver<M> {
    /// Read the id from the message (e.g. a client-supplied correlation token).
    Extract(CorrelationExtractor<M>),
    /// Generate a fresh UUIDv7 per delivery.
    Generate,
}

impl<M> Clone for CorrelationResolver<M> {
    fn clone(&self) -> Self {
        match self {
            Self::Extract(e) => Self::Extract(e.clone()),
            Self::Generate => Self::Generate,
        }
    }
}

impl<M> core::fmt::Debug for CorrelationResolver<M> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Extract(_) => f.write_str("CorrelationResolver::Extract"),
            Self::Generate => f.write_str("CorrelationResolver::Generate"),
        }
    }
}

impl<M: SagaMessage> CorrelationResolver<M> {
    pub fn extract<F>(extract: F) -> Self
    where
        F: Fn(&M) -> anyhow::Result<CorrelationId> + Send + Sync + 'static,
    {
        Self::Extract(CorrelationExtractor::new(extract))
    }

    pub fn resolve(&self, message: &M) -> Result<CorrelationId, ConfigurationError> {
        match self {
            Self::Extract(extractor) => extractor.extract(message),
            Self::Generate => Ok(CorrelationId::generate()),
        }
    }

    /// Whether the same message always resolves to the same id.
    pub fn is_deterministic(&self) -> bool {
        matches!(self, Self::Extract(_))
    }
}

impl<M> From<CorrelationExtractor<M>> for CorrelationResolver<M> {
    fn from(value: CorrelationExtractor<M>) -> Self {
        Self::Extract(value)
    }
}
