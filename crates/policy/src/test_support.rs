//! Shared fixtures for unit tests.

use serde::Serialize;

use sagaflow_core::{CorrelationId, SagaInstance};

use crate::message::SagaMessage;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderSaga {
    pub id: CorrelationId,
    pub items: u32,
    pub is_complete: bool,
}

impl SagaInstance for OrderSaga {
    fn saga_type() -> &'static str {
        "saga.order"
    }

    fn correlation_id(&self) -> &CorrelationId {
        &self.id
    }

    fn initial(correlation_id: CorrelationId) -> Self {
        Self {
            id: correlation_id,
            items: 0,
            is_complete: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderSubmitted {
    pub order_id: String,
}

impl OrderSubmitted {
    pub fn new(order_id: impl Into<String>) -> Self {
        Self {
            order_id: order_id.into(),
        }
    }
}

impl SagaMessage for OrderSubmitted {
    fn message_type() -> &'static str {
        "order.submitted"
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderShipped {
    pub order_id: String,
    pub parcel: u64,
}

impl OrderShipped {
    pub fn new(order_id: impl Into<String>, parcel: u64) -> Self {
        Self {
            order_id: order_id.into(),
            parcel,
        }
    }
}

impl SagaMessage for OrderShipped {
    fn message_type() -> &'static str {
        "order.shipped"
    }
}
