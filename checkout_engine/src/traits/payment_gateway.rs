use std::fmt::Display;

use chrono::{DateTime, Utc};
use gateway_tools::{IntentStatus, RefundStatus};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    db_types::{Money, Payment},
    gateway::FeeSplit,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GatewayErrorKind {
    /// The processor declined the payment (card declined, insufficient funds, ...).
    Rejected,
    /// The outcome is unknown: the call timed out, the connection dropped, or the processor had an internal error.
    Network,
    /// The request was malformed or referred to an object that does not exist.
    InvalidRequest,
    /// The charge or intent had already been captured.
    AlreadyCaptured,
}

impl Display for GatewayErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Rejected => "Payment rejected",
            Self::Network => "Gateway unreachable",
            Self::InvalidRequest => "Invalid gateway request",
            Self::AlreadyCaptured => "Already captured",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind}. {message}")]
pub struct GatewayError {
    pub kind: GatewayErrorKind,
    pub message: String,
}

impl GatewayError {
    pub fn new(kind: GatewayErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorKind::Rejected, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorKind::Network, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorKind::InvalidRequest, message)
    }

    pub fn already_captured(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorKind::AlreadyCaptured, message)
    }

    pub fn is_network(&self) -> bool {
        self.kind == GatewayErrorKind::Network
    }
}

/// Everything about the order that the gateway needs besides the payment itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChargeContext {
    pub description: String,
    pub fee_split: FeeSplit,
}

impl ChargeContext {
    pub fn new(order_number: &str, fee_split: FeeSplit) -> Self {
        Self { description: format!("Order {order_number}"), fee_split }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntentHandle {
    pub id: String,
    pub status: IntentStatus,
    pub client_secret: Option<String>,
    pub amount: Money,
    pub amount_received: Money,
    pub latest_charge: Option<String>,
}

impl IntentHandle {
    /// Funds are at least authorized.
    pub fn is_authorized(&self) -> bool {
        self.status.is_capturable_or_captured()
    }

    pub fn requires_action(&self) -> bool {
        self.status.needs_customer_action()
    }

    pub fn requires_confirmation(&self) -> bool {
        self.status == IntentStatus::RequiresConfirmation
    }

    pub fn is_captured(&self) -> bool {
        self.status == IntentStatus::Succeeded
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChargeHandle {
    pub id: String,
    pub amount: Money,
    pub paid: bool,
    pub captured: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureHandle {
    pub gateway_id: String,
    pub amount_captured: Money,
    pub captured_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefundHandle {
    pub id: String,
    pub amount: Money,
    pub status: RefundStatus,
}

/// Moves money through the external payment processor.
///
/// Implementations never change the payment they are handed. The caller records the returned handles on the payment
/// and drives the payment state machine.
///
/// Two parallel flows exist. The intent flow (`create_intent`, `confirm_intent`, `retrieve_intent`) supports customer
/// authentication steps, while the legacy charge flow (`authorize`, `retrieve_charge`) authorizes a card token in one
/// shot. `capture` and `refund` work for either flow, based on which gateway id the payment carries.
#[allow(async_fn_in_trait)]
pub trait PaymentGateway {
    /// Creates and confirms a payment intent for the payment's payment method. With `automatic_capture` off the funds
    /// are only authorized and must be captured later.
    async fn create_intent(
        &self,
        payment: &Payment,
        charge: &ChargeContext,
        automatic_capture: bool,
    ) -> Result<IntentHandle, GatewayError>;

    async fn confirm_intent(&self, payment: &Payment) -> Result<IntentHandle, GatewayError>;

    /// Reads the current intent from the processor. Has no side effects.
    async fn retrieve_intent(&self, payment: &Payment) -> Result<IntentHandle, GatewayError>;

    /// Authorizes (without capturing) a charge for the payment's card token.
    async fn authorize(&self, payment: &Payment, charge: &ChargeContext) -> Result<ChargeHandle, GatewayError>;

    /// Reads the current charge from the processor. Has no side effects.
    async fn retrieve_charge(&self, payment: &Payment) -> Result<ChargeHandle, GatewayError>;

    /// Captures previously authorized funds. Fails with [`GatewayErrorKind::AlreadyCaptured`] if they were already
    /// captured.
    async fn capture(&self, payment: &Payment) -> Result<CaptureHandle, GatewayError>;

    /// Refunds `amount`, or the full payment when `amount` is `None`.
    async fn refund(
        &self,
        payment: &Payment,
        amount: Option<Money>,
        refund_application_fee: bool,
    ) -> Result<RefundHandle, GatewayError>;
}
