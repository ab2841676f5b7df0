use chrono::{DateTime, Utc};
use log::{debug, trace};
use sqlx::{FromRow, SqliteConnection};

use super::{decode, parse, payments};
use crate::{
    db_types::{Adjustment, Money, NewOrder, Order, OrderId, OrderItem, OrderState, RestaurantRef},
    traits::{format_order_number, RepositoryError},
};

/// An `orders` row. Items, adjustments and the restaurant are JSON documents.
#[derive(Debug, Clone, FromRow)]
struct OrderRow {
    id: i64,
    number: Option<String>,
    state: String,
    customer_id: String,
    restaurant: Option<String>,
    items: String,
    adjustments: String,
    total: i64,
    fee_total: i64,
    currency: String,
    reusable_packaging_enabled: bool,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl OrderRow {
    fn into_order(self) -> Result<Order, RepositoryError> {
        let restaurant = self.restaurant.as_deref().map(|r| decode::<RestaurantRef>("restaurant", r)).transpose()?;
        Ok(Order {
            id: OrderId(self.id),
            number: self.number,
            state: parse::<OrderState>("state", &self.state)?,
            customer_id: self.customer_id,
            restaurant,
            items: decode::<Vec<OrderItem>>("items", &self.items)?,
            adjustments: decode::<Vec<Adjustment>>("adjustments", &self.adjustments)?,
            total: Money::from(self.total),
            fee_total: Money::from(self.fee_total),
            currency: self.currency,
            reusable_packaging_enabled: self.reusable_packaging_enabled,
            payments: vec![],
            version: self.version,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Inserts a new cart and returns it with its assigned id. This is not atomic on its own.
pub async fn insert_order(order: NewOrder, conn: &mut SqliteConnection) -> Result<Order, RepositoryError> {
    let mut order = order.into_order(OrderId(0));
    order.recalculate_total();
    let restaurant = order.restaurant.as_ref().map(serde_json::to_string).transpose()?;
    let id: i64 = sqlx::query_scalar(
        r#"
            INSERT INTO orders (
                state,
                customer_id,
                restaurant,
                items,
                adjustments,
                total,
                fee_total,
                currency,
                reusable_packaging_enabled,
                version,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING id;
        "#,
    )
    .bind(order.state.to_string())
    .bind(&order.customer_id)
    .bind(restaurant)
    .bind(serde_json::to_string(&order.items)?)
    .bind(serde_json::to_string(&order.adjustments)?)
    .bind(order.total.value())
    .bind(order.fee_total.value())
    .bind(&order.currency)
    .bind(order.reusable_packaging_enabled)
    .bind(order.version)
    .bind(order.created_at)
    .bind(order.updated_at)
    .fetch_one(conn)
    .await?;
    order.id = OrderId(id);
    debug!("🗃️ Cart {} inserted for customer {}", order.id, order.customer_id);
    Ok(order)
}

/// Fetches the order together with all of its payments.
pub async fn fetch_order(id: OrderId, conn: &mut SqliteConnection) -> Result<Option<Order>, RepositoryError> {
    let row: Option<OrderRow> =
        sqlx::query_as("SELECT * FROM orders WHERE id = $1").bind(id.value()).fetch_optional(&mut *conn).await?;
    let Some(row) = row else {
        return Ok(None);
    };
    let mut order = row.into_order()?;
    order.payments = payments::fetch_payments_for_order(id, conn).await?;
    Ok(Some(order))
}

/// The stored version of the order, or `None` if it does not exist.
pub async fn fetch_version(id: OrderId, conn: &mut SqliteConnection) -> Result<Option<i64>, RepositoryError> {
    let version = sqlx::query_scalar("SELECT version FROM orders WHERE id = $1")
        .bind(id.value())
        .fetch_optional(conn)
        .await?;
    Ok(version)
}

/// Overwrites the order's own columns with `order`, which must carry the *new* version, as long as the stored version
/// is `expected_version`. Payments are written separately.
pub async fn update_order(
    order: &Order,
    expected_version: i64,
    conn: &mut SqliteConnection,
) -> Result<(), RepositoryError> {
    let restaurant = order.restaurant.as_ref().map(serde_json::to_string).transpose()?;
    let result = sqlx::query(
        r#"
            UPDATE orders SET
                number = $1,
                state = $2,
                restaurant = $3,
                items = $4,
                adjustments = $5,
                total = $6,
                fee_total = $7,
                currency = $8,
                reusable_packaging_enabled = $9,
                version = $10,
                updated_at = $11
            WHERE id = $12 AND version = $13
        "#,
    )
    .bind(&order.number)
    .bind(order.state.to_string())
    .bind(restaurant)
    .bind(serde_json::to_string(&order.items)?)
    .bind(serde_json::to_string(&order.adjustments)?)
    .bind(order.total.value())
    .bind(order.fee_total.value())
    .bind(&order.currency)
    .bind(order.reusable_packaging_enabled)
    .bind(order.version)
    .bind(order.updated_at)
    .bind(order.id.value())
    .bind(expected_version)
    .execute(&mut *conn)
    .await?;
    if result.rows_affected() == 1 {
        trace!("🗃️ Order {} updated to version {}", order.id, order.version);
        return Ok(());
    }
    match fetch_version(order.id, conn).await? {
        None => Err(RepositoryError::OrderNotFound(order.id)),
        Some(found) => {
            debug!("🗃️ Order {} is at version {found}, not {expected_version}", order.id);
            Err(RepositoryError::VersionConflict { id: order.id, expected: expected_version, found })
        },
    }
}

pub async fn next_order_number(conn: &mut SqliteConnection) -> Result<String, RepositoryError> {
    let seq: i64 = sqlx::query_scalar("INSERT INTO order_numbers DEFAULT VALUES RETURNING id").fetch_one(conn).await?;
    Ok(format_order_number(seq))
}
