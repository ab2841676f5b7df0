//! The two coupled lifecycles of a checkout.
//!
//! Each machine is an explicit transition enum with an exhaustive `(state, transition)` table. A transition that the
//! table does not allow is rejected with a [`TransitionError`] and leaves the record untouched.
mod order_state;
mod payment_state;

pub use order_state::{transition_order, OrderTransition};
pub use payment_state::{transition_payment, PaymentTransition};
use thiserror::Error;

use crate::db_types::{OrderId, OrderState, PaymentId, PaymentState};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Order {id} cannot {transition} while it is {from}")]
    InvalidOrderTransition { id: OrderId, from: OrderState, transition: OrderTransition },
    #[error("Order {id} cannot {transition}. {reason}")]
    OrderGuardFailed { id: OrderId, transition: OrderTransition, reason: String },
    #[error("Payment {id} cannot {transition} while it is {from}")]
    InvalidPaymentTransition { id: PaymentId, from: PaymentState, transition: PaymentTransition },
}
