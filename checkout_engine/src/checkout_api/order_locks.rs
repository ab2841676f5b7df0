use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
};

use log::*;

use super::CheckoutError;
use crate::db_types::OrderId;

/// Registry of orders that have an operation in flight.
///
/// Claims are taken synchronously and never wait. A second claim on the same order fails straight away with
/// [`CheckoutError::ConcurrentModification`]. The claim is released when the returned [`OrderClaim`] is dropped.
#[derive(Debug, Clone, Default)]
pub struct OrderLocks {
    claimed: Arc<Mutex<HashSet<OrderId>>>,
}

impl OrderLocks {
    pub fn try_claim(&self, id: OrderId) -> Result<OrderClaim, CheckoutError> {
        let mut claimed = self.claimed.lock().unwrap_or_else(|e| e.into_inner());
        if claimed.insert(id) {
            trace!("🛒️ Claimed order {id}");
            Ok(OrderClaim { id, locks: self.clone() })
        } else {
            debug!("🛒️ Order {id} is already being worked on");
            Err(CheckoutError::ConcurrentModification(id))
        }
    }

    pub fn is_claimed(&self, id: OrderId) -> bool {
        self.claimed.lock().unwrap_or_else(|e| e.into_inner()).contains(&id)
    }

    fn release(&self, id: OrderId) {
        self.claimed.lock().unwrap_or_else(|e| e.into_inner()).remove(&id);
        trace!("🛒️ Released order {id}");
    }
}

#[derive(Debug)]
pub struct OrderClaim {
    id: OrderId,
    locks: OrderLocks,
}

impl OrderClaim {
    pub fn order_id(&self) -> OrderId {
        self.id
    }
}

impl Drop for OrderClaim {
    fn drop(&mut self) {
        self.locks.release(self.id);
    }
}
