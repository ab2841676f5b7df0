use std::fmt::Display;

use log::*;
use serde::{Deserialize, Serialize};

use super::TransitionError;
use crate::db_types::{Payment, PaymentState};

/// The events that move a single payment attempt through its lifecycle.
///
/// | From \ Transition | Process    | Complete  | Fail   | Refund   | RefundPartially   |
/// |-------------------|------------|-----------|--------|----------|-------------------|
/// | Cart              | Processing |           |        |          |                   |
/// | Processing        |            | Completed | Failed |          |                   |
/// | Completed         |            |           |        | Refunded | PartiallyRefunded |
///
/// `Failed`, `Refunded` and `PartiallyRefunded` accept no further transitions. A retry creates a new payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentTransition {
    Process,
    Complete,
    Fail,
    Refund,
    RefundPartially,
}

impl Display for PaymentTransition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Process => "process",
            Self::Complete => "complete",
            Self::Fail => "fail",
            Self::Refund => "refund",
            Self::RefundPartially => "partially refund",
        };
        f.write_str(s)
    }
}

impl PaymentTransition {
    pub fn target(self, from: PaymentState) -> Option<PaymentState> {
        use PaymentState::*;
        match (from, self) {
            (Cart, Self::Process) => Some(Processing),
            (Processing, Self::Complete) => Some(Completed),
            (Processing, Self::Fail) => Some(Failed),
            (Completed, Self::Refund) => Some(Refunded),
            (Completed, Self::RefundPartially) => Some(PartiallyRefunded),
            (Cart, Self::Complete | Self::Fail | Self::Refund | Self::RefundPartially) => None,
            (Processing, Self::Process | Self::Refund | Self::RefundPartially) => None,
            (Completed, Self::Process | Self::Complete | Self::Fail) => None,
            (Failed | Refunded | PartiallyRefunded, _) => None,
        }
    }
}

/// Applies `transition` to the payment. `cause` describes what triggered it and is only used for logging when the
/// transition is rejected.
pub fn transition_payment(
    payment: &mut Payment,
    transition: PaymentTransition,
    cause: &str,
) -> Result<PaymentState, TransitionError> {
    let from = payment.state;
    match transition.target(from) {
        Some(to) => {
            payment.state = to;
            payment.touch();
            debug!("💳️ Payment {} moved from {from} to {to}", payment.id);
            Ok(to)
        },
        None => {
            warn!("💳️ Rejected '{transition}' on payment {} in state {from}. Cause: {cause}", payment.id);
            Err(TransitionError::InvalidPaymentTransition { id: payment.id.clone(), from, transition })
        },
    }
}
