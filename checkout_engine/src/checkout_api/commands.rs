use serde::{Deserialize, Serialize};

use crate::db_types::{Money, OrderId, PaymentCredential};

/// Sent by the client once it has dealt with a customer action (e.g. 3-D Secure) on a payment intent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmPaymentRequest {
    /// If given, must match the intent of the order's current payment.
    pub payment_intent_id: Option<String>,
}

impl ConfirmPaymentRequest {
    pub fn for_intent(id: &str) -> Self {
        Self { payment_intent_id: Some(id.to_string()) }
    }
}

/// Every operation the checkout flow API offers, as a single dispatchable value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum CheckoutCommand {
    Checkout { order_id: OrderId, credential: PaymentCredential },
    ConfirmPayment { order_id: OrderId, request: ConfirmPaymentRequest },
    Accept { order_id: OrderId },
    Ready { order_id: OrderId },
    Fulfill { order_id: OrderId },
    Cancel { order_id: OrderId, reason: String },
    Refuse { order_id: OrderId, reason: String },
    Refund { order_id: OrderId, amount: Option<Money>, refund_application_fee: bool },
}

impl CheckoutCommand {
    pub fn order_id(&self) -> OrderId {
        match self {
            Self::Checkout { order_id, .. }
            | Self::ConfirmPayment { order_id, .. }
            | Self::Accept { order_id }
            | Self::Ready { order_id }
            | Self::Fulfill { order_id }
            | Self::Cancel { order_id, .. }
            | Self::Refuse { order_id, .. }
            | Self::Refund { order_id, .. } => *order_id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Checkout { .. } => "checkout",
            Self::ConfirmPayment { .. } => "confirm_payment",
            Self::Accept { .. } => "accept",
            Self::Ready { .. } => "ready",
            Self::Fulfill { .. } => "fulfill",
            Self::Cancel { .. } => "cancel",
            Self::Refuse { .. } => "refuse",
            Self::Refund { .. } => "refund",
        }
    }
}
