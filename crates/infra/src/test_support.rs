//! Fixtures shared by repository, coordinator and integration tests.

use std::sync::Mutex;

use serde::Serialize;

use sagaflow_core::{CorrelationId, SagaInstance};
use sagaflow_policy::{
    CorrelationExtractor, CorrelationResolver, RemovalPredicate, SagaDefinitionBuilder, SagaMessage,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderSaga {
    pub id: CorrelationId,
    pub items: u32,
    pub is_complete: bool,
    pub notes: Vec<String>,
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
            notes: Vec::new(),
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
pub struct ItemAdded {
    pub order_id: String,
    pub quantity: u32,
}

impl ItemAdded {
    pub fn new(order_id: impl Into<String>, quantity: u32) -> Self {
        Self {
            order_id: order_id.into(),
            quantity,
        }
    }
}

impl SagaMessage for ItemAdded {
    fn message_type() -> &'static str {
        "order.item_added"
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderCompleted {
    pub order_id: String,
}

impl OrderCompleted {
    pub fn new(order_id: impl Into<String>) -> Self {
        Self {
            order_id: order_id.into(),
        }
    }
}

impl SagaMessage for OrderCompleted {
    fn message_type() -> &'static str {
        "order.completed"
    }
}

/// Order saga: started by `OrderSubmitted` (id taken from `order_id`), observed by
/// `ItemAdded` and `OrderCompleted`. No removal predicate.
pub fn order_definition() -> SagaDefinitionBuilder<OrderSaga> {
    SagaDefinitionBuilder::new()
        .initiated_by::<OrderSubmitted>(CorrelationResolver::Extract(
            CorrelationExtractor::json_field("order_id"),
        ))
        .observes::<ItemAdded>(CorrelationExtractor::json_field("order_id"))
        .observes::<OrderCompleted>(CorrelationExtractor::json_field("order_id"))
}

/// Same as [`order_definition`], removing instances once `is_complete` is set.
pub fn completing_order_definition() -> SagaDefinitionBuilder<OrderSaga> {
    order_definition().remove_when(RemovalPredicate::when(|saga: &OrderSaga| saga.is_complete))
}

/// Records which correlation ids a consumer was invoked with, in call order.
#[derive(Debug, Default)]
pub struct CallLog {
    calls: Mutex<Vec<CorrelationId>>,
}

impl CallLog {
    pub fn record(&self, id: &CorrelationId) {
        self.calls.lock().unwrap().push(id.clone());
    }

    pub fn calls(&self) -> Vec<CorrelationId> {
        self.calls.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}
