use std::fmt::Display;

use log::*;
use serde::{Deserialize, Serialize};

use super::TransitionError;
use crate::db_types::{Order, OrderState, PaymentState};

/// The events that move an order through its lifecycle.
///
/// | From \ Transition | Create | Accept   | Ready | Fulfill   | Cancel    | Refuse  |
/// |-------------------|--------|----------|-------|-----------|-----------|---------|
/// | Cart              | New    |          |       |           | Cancelled |         |
/// | New               |        | Accepted |       |           | Cancelled | Refused |
/// | Accepted          |        |          | Ready |           | Cancelled |         |
/// | Ready             |        |          |       | Fulfilled | Cancelled |         |
/// | Fulfilled         |        |          |       |           |           |         |
/// | Refused           |        |          |       |           |           |         |
/// | Cancelled         |        |          |       |           |           |         |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderTransition {
    Create,
    Accept,
    Ready,
    Fulfill,
    Cancel,
    Refuse,
}

impl Display for OrderTransition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Accept => "accept",
            Self::Ready => "ready",
            Self::Fulfill => "fulfill",
            Self::Cancel => "cancel",
            Self::Refuse => "refuse",
        };
        f.write_str(s)
    }
}

impl OrderTransition {
    /// The state reached by applying this transition to `from`, or `None` if the table forbids it.
    pub fn target(self, from: OrderState) -> Option<OrderState> {
        use OrderState::*;
        match (from, self) {
            (Cart, Self::Create) => Some(New),
            (New, Self::Accept) => Some(Accepted),
            (Accepted, Self::Ready) => Some(Ready),
            (Ready, Self::Fulfill) => Some(Fulfilled),
            (New, Self::Refuse) => Some(Refused),
            (Cart | New | Accepted | Ready, Self::Cancel) => Some(Cancelled),
            (Fulfilled | Refused | Cancelled, _) => None,
            (Cart, Self::Accept | Self::Ready | Self::Fulfill | Self::Refuse) => None,
            (New, Self::Create | Self::Ready | Self::Fulfill) => None,
            (Accepted, Self::Create | Self::Accept | Self::Fulfill | Self::Refuse) => None,
            (Ready, Self::Create | Self::Accept | Self::Ready | Self::Refuse) => None,
        }
    }

    fn check_guard(self, order: &Order) -> Result<(), String> {
        match self {
            Self::Create => {
                if !order.has_restaurant() {
                    return Err("No restaurant has been assigned to the order".into());
                }
                if order.items.is_empty() {
                    return Err("The order has no items".into());
                }
                Ok(())
            },
            Self::Accept => {
                if !order.has_restaurant() {
                    return Err("No restaurant has been assigned to the order".into());
                }
                match order.last_payment().map(|p| p.state) {
                    Some(PaymentState::Completed) => Ok(()),
                    Some(state) => Err(format!("The last payment is {state}, not Completed")),
                    None => Err("The order has no payment".into()),
                }
            },
            Self::Ready | Self::Fulfill | Self::Cancel | Self::Refuse => Ok(()),
        }
    }
}

/// Moves `order` to the next state if the transition table and the transition's guard allow it.
///
/// Nothing is persisted here. The caller commits the order together with the side effects of the transition.
pub fn transition_order(order: &mut Order, transition: OrderTransition) -> Result<OrderState, TransitionError> {
    let from = order.state;
    let Some(to) = transition.target(from) else {
        warn!("🛒️ Rejected '{transition}' on order {} in state {from}", order.id);
        return Err(TransitionError::InvalidOrderTransition { id: order.id, from, transition });
    };
    if let Err(reason) = transition.check_guard(order) {
        warn!("🛒️ Guard failed for '{transition}' on order {}: {reason}", order.id);
        return Err(TransitionError::OrderGuardFailed { id: order.id, transition, reason });
    }
    order.state = to;
    order.touch();
    debug!("🛒️ Order {} moved from {from} to {to} ({transition})", order.id);
    Ok(to)
}
