//! `SqliteRepository` is the SQLite implementation of [`CheckoutRepository`].
//!
//! Every write runs in its own transaction. A commit updates the order row under a version check and then upserts each
//! payment. If any statement fails, the transaction is rolled back when it is dropped.
use std::fmt::Debug;

use chrono::Utc;
use log::*;
use sqlx::SqlitePool;

use super::db::{db_url, new_pool, orders, payments};
use crate::{
    db_types::{NewOrder, Order, OrderId, Payment, PaymentId},
    traits::{CheckoutRepository, RepositoryError},
};

#[derive(Clone)]
pub struct SqliteRepository {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteRepository ({:?})", self.pool)
    }
}

impl CheckoutRepository for SqliteRepository {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn insert_order(&self, order: NewOrder) -> Result<Order, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::insert_order(order, &mut tx).await?;
        tx.commit().await?;
        Ok(order)
    }

    async fn fetch_order(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_order(id, &mut conn).await
    }

    async fn fetch_payment(&self, id: &PaymentId) -> Result<Option<Payment>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        payments::fetch_payment(id, &mut conn).await
    }

    async fn commit(&self, order: &Order) -> Result<Order, RepositoryError> {
        let mut committed = order.clone();
        committed.version += 1;
        committed.updated_at = Utc::now();
        let mut tx = self.pool.begin().await?;
        orders::update_order(&committed, order.version, &mut tx).await?;
        for (position, payment) in committed.payments.iter().enumerate() {
            payments::ensure_gateway_ids_are_unowned(payment, &mut tx).await?;
            payments::upsert_payment(payment, position, &mut tx).await?;
        }
        tx.commit().await?;
        debug!("🗃️ Order {} committed at version {} ({})", committed.id, committed.version, committed.state);
        Ok(committed)
    }

    async fn next_order_number(&self) -> Result<String, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let number = orders::next_order_number(&mut tx).await?;
        tx.commit().await?;
        Ok(number)
    }
}

impl SqliteRepository {
    /// Creates a new repository using the url in `CHECKOUT_DATABASE_URL`, or the default.
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        SqliteRepository::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        trace!("🗃️ Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
