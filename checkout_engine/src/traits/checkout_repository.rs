use thiserror::Error;

use crate::db_types::{NewOrder, Order, OrderId, Payment, PaymentId};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Order {0} does not exist")]
    OrderNotFound(OrderId),
    #[error("Order {id} was modified by someone else. Expected version {expected}, but found {found}")]
    VersionConflict { id: OrderId, expected: i64, found: i64 },
    #[error("Gateway id {0} already belongs to another order")]
    DuplicateGatewayId(String),
    #[error("Stored data could not be decoded. {0}")]
    CodecError(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(e: sqlx::Error) -> Self {
        RepositoryError::DatabaseError(e.to_string())
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(e: serde_json::Error) -> Self {
        RepositoryError::CodecError(e.to_string())
    }
}

/// Renders the `seq`-th order number in the externally visible format, e.g. `R000000042`.
pub fn format_order_number(seq: i64) -> String {
    format!("R{seq:09}")
}

/// Storage for orders, their items, adjustments and payments.
///
/// An order is always read and written as a whole. `commit` is the single write path after insertion: it persists the
/// order together with everything it owns in one atomic step, and only if nobody else has committed the order since it
/// was loaded.
#[allow(async_fn_in_trait)]
pub trait CheckoutRepository: Clone {
    /// The url of the backing store, for diagnostics.
    fn url(&self) -> &str;

    /// Stores a fresh cart and returns it with its assigned id and version.
    async fn insert_order(&self, order: NewOrder) -> Result<Order, RepositoryError>;

    async fn fetch_order(&self, id: OrderId) -> Result<Option<Order>, RepositoryError>;

    async fn fetch_payment(&self, id: &PaymentId) -> Result<Option<Payment>, RepositoryError>;

    /// Atomically persists `order`, its items, adjustments and payments.
    ///
    /// `order.version` must be the version that was loaded. On success the stored version is incremented and the
    /// updated order is returned. If the stored version differs, nothing is written and
    /// [`RepositoryError::VersionConflict`] is returned.
    async fn commit(&self, order: &Order) -> Result<Order, RepositoryError>;

    /// Hands out the next external order number. Numbers are never reused.
    async fn next_order_number(&self) -> Result<String, RepositoryError>;
}
