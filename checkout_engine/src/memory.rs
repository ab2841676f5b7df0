//! An in-process [`CheckoutRepository`] backend.
//!
//! Orders live in a `HashMap` behind a tokio `RwLock`. Commits follow the same rules as the SQLite backend: the
//! version is checked, payment gateway ids must be unique across orders, and order numbers are never handed out twice.
use std::{collections::HashMap, fmt::Debug, sync::Arc};

use chrono::Utc;
use log::*;
use tokio::sync::RwLock;

use crate::{
    db_types::{NewOrder, Order, OrderId, Payment, PaymentId},
    traits::{format_order_number, CheckoutRepository, RepositoryError},
};

#[derive(Default)]
struct MemoryStore {
    orders: HashMap<OrderId, Order>,
    last_order_id: i64,
    last_order_number: i64,
}

impl MemoryStore {
    /// Returns the first gateway id in `order` that is already used by a payment of a different order.
    fn foreign_gateway_id<'a>(&self, order: &'a Order) -> Option<&'a str> {
        order.payments.iter().flat_map(|p| [p.payment_intent_id.as_deref(), p.charge_id.as_deref()]).flatten().find(
            |gateway_id| {
                self.orders.values().filter(|o| o.id != order.id).flat_map(|o| o.payments.iter()).any(|p| {
                    p.payment_intent_id.as_deref() == Some(*gateway_id) || p.charge_id.as_deref() == Some(*gateway_id)
                })
            },
        )
    }
}

#[derive(Clone, Default)]
pub struct MemoryRepository {
    store: Arc<RwLock<MemoryStore>>,
}

impl Debug for MemoryRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MemoryRepository")
    }
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of orders held.
    pub async fn order_count(&self) -> usize {
        self.store.read().await.orders.len()
    }
}

impl CheckoutRepository for MemoryRepository {
    fn url(&self) -> &str {
        "memory://"
    }

    async fn insert_order(&self, order: NewOrder) -> Result<Order, RepositoryError> {
        let mut store = self.store.write().await;
        store.last_order_id += 1;
        let id = OrderId(store.last_order_id);
        let mut order = order.into_order(id);
        order.recalculate_total();
        store.orders.insert(id, order.clone());
        debug!("🗃️ Cart {id} stored in memory");
        Ok(order)
    }

    async fn fetch_order(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        Ok(self.store.read().await.orders.get(&id).cloned())
    }

    async fn fetch_payment(&self, id: &PaymentId) -> Result<Option<Payment>, RepositoryError> {
        let store = self.store.read().await;
        let payment = store.orders.values().flat_map(|o| o.payments.iter()).find(|p| &p.id == id).cloned();
        Ok(payment)
    }

    async fn commit(&self, order: &Order) -> Result<Order, RepositoryError> {
        let mut store = self.store.write().await;
        let stored = store.orders.get(&order.id).ok_or(RepositoryError::OrderNotFound(order.id))?;
        if stored.version != order.version {
            warn!("🗃️ Stale commit for order {}: version {} is not {}", order.id, order.version, stored.version);
            return Err(RepositoryError::VersionConflict {
                id: order.id,
                expected: order.version,
                found: stored.version,
            });
        }
        if let Some(gateway_id) = store.foreign_gateway_id(order) {
            return Err(RepositoryError::DuplicateGatewayId(gateway_id.to_string()));
        }
        let mut committed = order.clone();
        committed.version += 1;
        committed.updated_at = Utc::now();
        store.orders.insert(order.id, committed.clone());
        trace!("🗃️ Order {} committed at version {}", order.id, committed.version);
        Ok(committed)
    }

    async fn next_order_number(&self) -> Result<String, RepositoryError> {
        let mut store = self.store.write().await;
        store.last_order_number += 1;
        Ok(format_order_number(store.last_order_number))
    }
}
