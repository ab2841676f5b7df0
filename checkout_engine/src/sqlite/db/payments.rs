use chrono::{DateTime, Utc};
use log::{debug, trace};
use sqlx::{FromRow, SqliteConnection};

use super::{decode, parse};
use crate::{
    db_types::{Money, OrderId, Payment, PaymentCredential, PaymentId, PaymentState},
    traits::RepositoryError,
};

#[derive(Debug, Clone, FromRow)]
struct PaymentRow {
    id: String,
    order_id: i64,
    amount: i64,
    currency: String,
    state: String,
    credential: String,
    payment_intent_id: Option<String>,
    charge_id: Option<String>,
    client_secret: Option<String>,
    requires_action: bool,
    merchant_account_id: Option<String>,
    last_error: Option<String>,
    captured_at: Option<DateTime<Utc>>,
    refunded_at: Option<DateTime<Utc>>,
    refunded_amount: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = RepositoryError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        Ok(Payment {
            id: PaymentId(row.id),
            order_id: OrderId(row.order_id),
            amount: Money::from(row.amount),
            currency: row.currency,
            state: parse::<PaymentState>("state", &row.state)?,
            credential: decode::<PaymentCredential>("credential", &row.credential)?,
            payment_intent_id: row.payment_intent_id,
            charge_id: row.charge_id,
            client_secret: row.client_secret,
            requires_action: row.requires_action,
            merchant_account_id: row.merchant_account_id,
            last_error: row.last_error,
            captured_at: row.captured_at,
            refunded_at: row.refunded_at,
            refunded_amount: Money::from(row.refunded_amount),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// All the payments of an order, oldest first.
pub async fn fetch_payments_for_order(
    order_id: OrderId,
    conn: &mut SqliteConnection,
) -> Result<Vec<Payment>, RepositoryError> {
    let rows: Vec<PaymentRow> = sqlx::query_as("SELECT * FROM payments WHERE order_id = $1 ORDER BY position ASC")
        .bind(order_id.value())
        .fetch_all(conn)
        .await?;
    rows.into_iter().map(Payment::try_from).collect()
}

pub async fn fetch_payment(id: &PaymentId, conn: &mut SqliteConnection) -> Result<Option<Payment>, RepositoryError> {
    let row: Option<PaymentRow> =
        sqlx::query_as("SELECT * FROM payments WHERE id = $1").bind(id.as_str()).fetch_optional(conn).await?;
    row.map(Payment::try_from).transpose()
}

/// Fails with [`RepositoryError::DuplicateGatewayId`] if the payment's intent or charge id is already used by a payment
/// of a different order.
pub async fn ensure_gateway_ids_are_unowned(
    payment: &Payment,
    conn: &mut SqliteConnection,
) -> Result<(), RepositoryError> {
    for gateway_id in [payment.payment_intent_id.as_deref(), payment.charge_id.as_deref()].into_iter().flatten() {
        let owner: Option<i64> = sqlx::query_scalar(
            r#"
                SELECT order_id FROM payments
                WHERE order_id != $1 AND (payment_intent_id = $2 OR charge_id = $2)
                LIMIT 1
            "#,
        )
        .bind(payment.order_id.value())
        .bind(gateway_id)
        .fetch_optional(&mut *conn)
        .await?;
        if let Some(owner) = owner {
            debug!("🗃️ Gateway id {gateway_id} of payment {} is owned by order {owner}", payment.id);
            return Err(RepositoryError::DuplicateGatewayId(gateway_id.to_string()));
        }
    }
    Ok(())
}

/// Inserts the payment, or overwrites it if it already exists. `position` is its index in the order's payment list.
pub async fn upsert_payment(
    payment: &Payment,
    position: usize,
    conn: &mut SqliteConnection,
) -> Result<(), RepositoryError> {
    let position = i64::try_from(position).map_err(|e| RepositoryError::CodecError(e.to_string()))?;
    sqlx::query(
        r#"
            INSERT INTO payments (
                id,
                order_id,
                position,
                amount,
                currency,
                state,
                credential,
                payment_intent_id,
                charge_id,
                client_secret,
                requires_action,
                merchant_account_id,
                last_error,
                captured_at,
                refunded_at,
                refunded_amount,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            ON CONFLICT (id) DO UPDATE SET
                state = excluded.state,
                payment_intent_id = excluded.payment_intent_id,
                charge_id = excluded.charge_id,
                client_secret = excluded.client_secret,
                requires_action = excluded.requires_action,
                merchant_account_id = excluded.merchant_account_id,
                last_error = excluded.last_error,
                captured_at = excluded.captured_at,
                refunded_at = excluded.refunded_at,
                refunded_amount = excluded.refunded_amount,
                updated_at = excluded.updated_at
        "#,
    )
    .bind(payment.id.as_str())
    .bind(payment.order_id.value())
    .bind(position)
    .bind(payment.amount.value())
    .bind(&payment.currency)
    .bind(payment.state.to_string())
    .bind(serde_json::to_string(&payment.credential)?)
    .bind(&payment.payment_intent_id)
    .bind(&payment.charge_id)
    .bind(&payment.client_secret)
    .bind(payment.requires_action)
    .bind(&payment.merchant_account_id)
    .bind(&payment.last_error)
    .bind(payment.captured_at)
    .bind(payment.refunded_at)
    .bind(payment.refunded_amount.value())
    .bind(payment.created_at)
    .bind(payment.updated_at)
    .execute(conn)
    .await?;
    trace!("🗃️ Payment {} of order {} saved as {}", payment.id, payment.order_id, payment.state);
    Ok(())
}
