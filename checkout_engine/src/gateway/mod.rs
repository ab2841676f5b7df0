//! The payment gateway client: fee splitting and the processor adapter.
mod fee_split;
mod stripe_gateway;

pub use fee_split::{FeeSplit, InvalidFeeSplit};
pub use stripe_gateway::StripeGateway;

use crate::{
    db_types::{Money, Payment},
    traits::GatewayError,
};

/// Checks a refund request against what the payment can still give back.
///
/// Returns the explicit amount to send, or `None` for a full refund. Asking for exactly the payment amount is sent as a
/// full refund.
pub fn resolve_refund_amount(payment: &Payment, amount: Option<Money>) -> Result<Option<Money>, GatewayError> {
    let refundable = payment.refundable_amount();
    match amount {
        None => Ok(None),
        Some(a) if !a.is_positive() => Err(GatewayError::invalid_request(format!("Refund amount {a} must be positive"))),
        Some(a) if a > refundable => Err(GatewayError::invalid_request(format!(
            "Refund amount {a} exceeds the captured amount {refundable} of payment {}",
            payment.id
        ))),
        Some(a) if a == payment.amount => Ok(None),
        Some(a) => Ok(Some(a)),
    }
}

/// The key that makes replays of the same operation on the same payment safe.
pub fn idempotency_key(payment: &Payment, operation: &str) -> String {
    format!("checkout-{}-{operation}", payment.id)
}
