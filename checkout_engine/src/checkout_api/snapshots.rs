//! Plain, serializable views of orders and payments, handed to callers of the checkout flow API.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db_types::{
    Adjustment,
    AdjustmentOrigin,
    AdjustmentType,
    Money,
    Order,
    OrderId,
    OrderItem,
    OrderState,
    Payment,
    PaymentState,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemSnapshot {
    pub id: i64,
    pub variant_code: String,
    pub quantity: i64,
    pub unit_price: Money,
    pub subtotal: Money,
}

impl From<&OrderItem> for ItemSnapshot {
    fn from(item: &OrderItem) -> Self {
        Self {
            id: item.id,
            variant_code: item.variant_code.clone(),
            quantity: item.quantity,
            unit_price: item.unit_price,
            subtotal: item.subtotal(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustmentSnapshot {
    pub kind: AdjustmentType,
    pub amount: Money,
    pub label: String,
    /// `None` for order-level adjustments.
    pub item_id: Option<i64>,
}

impl From<&Adjustment> for AdjustmentSnapshot {
    fn from(a: &Adjustment) -> Self {
        let item_id = match a.origin {
            AdjustmentOrigin::Order => None,
            AdjustmentOrigin::Item(id) => Some(id),
        };
        Self { kind: a.kind, amount: a.amount, label: a.label.clone(), item_id }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentSnapshot {
    pub id: String,
    pub state: PaymentState,
    pub amount: Money,
    pub currency: String,
    pub payment_intent_id: Option<String>,
    pub charge_id: Option<String>,
    pub requires_action: bool,
    /// Only present while the customer still has to act on the payment.
    pub client_secret: Option<String>,
    pub last_error: Option<String>,
    pub captured: bool,
    pub refunded_amount: Money,
    pub updated_at: DateTime<Utc>,
}

impl From<&Payment> for PaymentSnapshot {
    fn from(p: &Payment) -> Self {
        let client_secret = if p.requires_action { p.client_secret.clone() } else { None };
        Self {
            id: p.id.to_string(),
            state: p.state,
            amount: p.amount,
            currency: p.currency.clone(),
            payment_intent_id: p.payment_intent_id.clone(),
            charge_id: p.charge_id.clone(),
            requires_action: p.requires_action,
            client_secret,
            last_error: p.last_error.clone(),
            captured: p.is_captured(),
            refunded_amount: p.refunded_amount,
            updated_at: p.updated_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderSnapshot {
    pub id: OrderId,
    pub number: Option<String>,
    pub state: OrderState,
    pub customer_id: String,
    pub restaurant_id: Option<i64>,
    pub items: Vec<ItemSnapshot>,
    pub adjustments: Vec<AdjustmentSnapshot>,
    pub total: Money,
    pub fee_total: Money,
    pub currency: String,
    pub payments: Vec<PaymentSnapshot>,
    pub version: i64,
}

impl OrderSnapshot {
    pub fn last_payment(&self) -> Option<&PaymentSnapshot> {
        self.payments.last()
    }

    pub fn adjustments_total(&self) -> Money {
        self.adjustments.iter().map(|a| a.amount).sum()
    }
}

impl From<&Order> for OrderSnapshot {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id,
            number: order.number.clone(),
            state: order.state,
            customer_id: order.customer_id.clone(),
            restaurant_id: order.restaurant.as_ref().map(|r| r.id),
            items: order.items.iter().map(ItemSnapshot::from).collect(),
            adjustments: order.adjustments.iter().map(AdjustmentSnapshot::from).collect(),
            total: order.total,
            fee_total: order.fee_total,
            currency: order.currency.clone(),
            payments: order.payments.iter().map(PaymentSnapshot::from).collect(),
            version: order.version,
        }
    }
}
