use serde::{Deserialize, Serialize};

use crate::{
    checkout_api::snapshots::{OrderSnapshot, PaymentSnapshot},
    db_types::{OrderId, OrderState},
};

/// Emitted when a payment reaches `Completed`, either at checkout or after a customer action was confirmed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentCompletedEvent {
    pub order: OrderSnapshot,
    pub payment: PaymentSnapshot,
}

impl PaymentCompletedEvent {
    pub fn new(order: OrderSnapshot, payment: PaymentSnapshot) -> Self {
        Self { order, payment }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentFailedEvent {
    pub order_id: OrderId,
    pub payment: PaymentSnapshot,
    pub reason: String,
}

impl PaymentFailedEvent {
    pub fn new(order_id: OrderId, payment: PaymentSnapshot, reason: String) -> Self {
        Self { order_id, payment, reason }
    }
}

/// Emitted when an order is cancelled or refused.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAnnulledEvent {
    pub order: OrderSnapshot,
    pub state: OrderState,
    pub reason: String,
}

impl OrderAnnulledEvent {
    pub fn new(order: OrderSnapshot, reason: String) -> Self {
        let state = order.state;
        Self { order, state, reason }
    }
}

/// Raised when the gateway reports that money the engine believed uncaptured was already captured. Someone should look
/// at this.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureAlertEvent {
    pub order_id: OrderId,
    pub payment_id: String,
    pub gateway_id: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventType {
    PaymentCompleted(PaymentCompletedEvent),
    PaymentFailed(PaymentFailedEvent),
    OrderAnnulled(OrderAnnulledEvent),
    CaptureAlert(CaptureAlertEvent),
}
