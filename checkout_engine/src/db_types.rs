//! Domain records shared by the checkout engine and its storage backends.
use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
pub use checkout_common::Money;
use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

//--------------------------------------        OrderId        ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct OrderId(pub i64);

impl From<i64> for OrderId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl OrderId {
    pub fn value(&self) -> i64 {
        self.0
    }
}

//--------------------------------------       PaymentId       ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct PaymentId(pub String);

impl PaymentId {
    /// Generates a fresh, random payment identifier.
    pub fn random() -> Self {
        Self(format!("pay_{:016x}", rand::random::<u64>()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for PaymentId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for PaymentId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl Display for PaymentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Error)]
#[error("Invalid value for {kind}: {value}")]
pub struct ConversionError {
    kind: &'static str,
    value: String,
}

impl ConversionError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self { kind, value: value.to_string() }
    }
}

//--------------------------------------      OrderState       ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderState {
    /// A mutable basket. No restaurant is required yet.
    Cart,
    /// Checked out and paid for (or authorized). Waiting for the restaurant to accept it.
    New,
    Accepted,
    Ready,
    Fulfilled,
    /// Rejected by the restaurant before acceptance.
    Refused,
    Cancelled,
}

impl OrderState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Fulfilled | Self::Refused | Self::Cancelled)
    }

    /// Items and adjustments can only change while the order is still a cart or a freshly placed order.
    pub fn allows_item_changes(&self) -> bool {
        matches!(self, Self::Cart | Self::New)
    }
}

impl Display for OrderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Cart => "Cart",
            Self::New => "New",
            Self::Accepted => "Accepted",
            Self::Ready => "Ready",
            Self::Fulfilled => "Fulfilled",
            Self::Refused => "Refused",
            Self::Cancelled => "Cancelled",
        };
        f.write_str(s)
    }
}

impl FromStr for OrderState {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Cart" => Ok(Self::Cart),
            "New" => Ok(Self::New),
            "Accepted" => Ok(Self::Accepted),
            "Ready" => Ok(Self::Ready),
            "Fulfilled" => Ok(Self::Fulfilled),
            "Refused" => Ok(Self::Refused),
            "Cancelled" => Ok(Self::Cancelled),
            s => Err(ConversionError::new("order state", s)),
        }
    }
}

//--------------------------------------     PaymentState      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentState {
    Cart,
    Processing,
    Completed,
    Failed,
    Refunded,
    PartiallyRefunded,
}

impl PaymentState {
    /// `Cart` and `Processing` payments are still in flight. An order may hold at most one of them.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Cart | Self::Processing)
    }
}

impl Display for PaymentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Cart => "Cart",
            Self::Processing => "Processing",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
            Self::Refunded => "Refunded",
            Self::PartiallyRefunded => "PartiallyRefunded",
        };
        f.write_str(s)
    }
}

impl FromStr for PaymentState {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Cart" => Ok(Self::Cart),
            "Processing" => Ok(Self::Processing),
            "Completed" => Ok(Self::Completed),
            "Failed" => Ok(Self::Failed),
            "Refunded" => Ok(Self::Refunded),
            "PartiallyRefunded" => Ok(Self::PartiallyRefunded),
            s => Err(ConversionError::new("payment state", s)),
        }
    }
}

//--------------------------------------     RestaurantRef     ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestaurantRef {
    pub id: i64,
    pub name: String,
    /// Whether the restaurant takes part in the reusable packaging deposit scheme.
    pub deposit_refund_enabled: bool,
}

//--------------------------------------       OrderItem       ---------------------------------------------------------
/// A purchased product variant. Packaging settings are copied from the product when the item is added, so later
/// catalogue changes do not affect placed orders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: i64,
    pub variant_code: String,
    pub quantity: i64,
    pub unit_price: Money,
    pub reusable_packaging_enabled: bool,
    /// Deposit units owed per item. May be fractional (e.g. one box shared by two portions).
    pub reusable_packaging_unit: f64,
}

impl OrderItem {
    pub fn new(id: i64, variant_code: &str, quantity: i64, unit_price: Money) -> Self {
        Self {
            id,
            variant_code: variant_code.to_string(),
            quantity,
            unit_price,
            reusable_packaging_enabled: false,
            reusable_packaging_unit: 0.0,
        }
    }

    pub fn with_reusable_packaging(mut self, units: f64) -> Self {
        self.reusable_packaging_enabled = true;
        self.reusable_packaging_unit = units;
        self
    }

    pub fn subtotal(&self) -> Money {
        self.unit_price * self.quantity
    }

    /// The subtotal, or `None` if it does not fit in a `Money`.
    pub fn checked_subtotal(&self) -> Option<Money> {
        self.unit_price.checked_mul(self.quantity)
    }

    pub fn deposit_units(&self) -> f64 {
        #[allow(clippy::cast_precision_loss)]
        let quantity = self.quantity as f64;
        quantity * self.reusable_packaging_unit
    }
}

//--------------------------------------      Adjustment       ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdjustmentType {
    Promotion,
    ReusablePackaging,
    GiveBack,
    Tax,
}

impl Display for AdjustmentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Promotion => "PROMOTION",
            Self::ReusablePackaging => "REUSABLE_PACKAGING",
            Self::GiveBack => "GIVE_BACK",
            Self::Tax => "TAX",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "level", content = "item_id", rename_all = "snake_case")]
pub enum AdjustmentOrigin {
    Order,
    Item(i64),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Adjustment {
    pub kind: AdjustmentType,
    /// Signed amount. Credits are negative.
    pub amount: Money,
    pub label: String,
    pub origin: AdjustmentOrigin,
}

impl Adjustment {
    pub fn for_order(kind: AdjustmentType, amount: Money, label: String) -> Self {
        Self { kind, amount, label, origin: AdjustmentOrigin::Order }
    }

    pub fn for_item(item_id: i64, kind: AdjustmentType, amount: Money, label: String) -> Self {
        Self { kind, amount, label, origin: AdjustmentOrigin::Item(item_id) }
    }
}

//--------------------------------------   PaymentCredential   ---------------------------------------------------------
/// What the client hands over at checkout to pay for the order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PaymentCredential {
    /// A single-use card token for the legacy direct-charge flow.
    Token(String),
    /// A payment method id. A payment intent is created and confirmed server-side.
    PaymentMethod(String),
    /// An intent that the client SDK already created and confirmed.
    ConfirmedIntent(String),
}

impl PaymentCredential {
    pub fn value(&self) -> &str {
        match self {
            Self::Token(v) | Self::PaymentMethod(v) | Self::ConfirmedIntent(v) => v.as_str(),
        }
    }
}

/// The two parallel ways a payment can be processed by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayMode {
    /// Payment intents (created, confirmed, captured across several round-trips).
    Intent,
    /// Legacy one-shot charges (authorized, then captured).
    Charge,
}

//--------------------------------------        Payment        ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub order_id: OrderId,
    pub amount: Money,
    pub currency: String,
    pub state: PaymentState,
    pub credential: PaymentCredential,
    pub payment_intent_id: Option<String>,
    pub charge_id: Option<String>,
    /// Returned to the client when the intent needs an additional authentication step.
    pub client_secret: Option<String>,
    pub requires_action: bool,
    /// Set when the charge lives on the merchant's connected account (the restaurant pays the processor fee).
    pub merchant_account_id: Option<String>,
    pub last_error: Option<String>,
    pub captured_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub refunded_amount: Money,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Payment {0} carries both a payment intent id and a charge id")]
pub struct MixedGatewayModes(pub PaymentId);

impl Payment {
    pub fn new(order_id: OrderId, amount: Money, currency: &str, credential: PaymentCredential) -> Self {
        let now = Utc::now();
        let payment_intent_id = match &credential {
            PaymentCredential::ConfirmedIntent(id) => Some(id.clone()),
            _ => None,
        };
        Self {
            id: PaymentId::random(),
            order_id,
            amount,
            currency: currency.to_string(),
            state: PaymentState::Cart,
            credential,
            payment_intent_id,
            charge_id: None,
            client_secret: None,
            requires_action: false,
            merchant_account_id: None,
            last_error: None,
            captured_at: None,
            refunded_at: None,
            refunded_amount: Money::ZERO,
            created_at: now,
            updated_at: now,
        }
    }

    /// Which gateway flow this payment follows, or `None` if it has not reached the gateway yet.
    pub fn gateway_mode(&self) -> Result<Option<GatewayMode>, MixedGatewayModes> {
        match (&self.payment_intent_id, &self.charge_id) {
            (Some(_), Some(_)) => Err(MixedGatewayModes(self.id.clone())),
            (Some(_), None) => Ok(Some(GatewayMode::Intent)),
            (None, Some(_)) => Ok(Some(GatewayMode::Charge)),
            (None, None) => Ok(None),
        }
    }

    /// The identifier of this payment at the gateway, whichever mode it uses.
    pub fn gateway_id(&self) -> Option<&str> {
        self.payment_intent_id.as_deref().or(self.charge_id.as_deref())
    }

    pub fn is_captured(&self) -> bool {
        self.captured_at.is_some()
    }

    /// The amount that is still refundable.
    pub fn refundable_amount(&self) -> Money {
        self.amount - self.refunded_amount
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

//--------------------------------------      OrderError       ---------------------------------------------------------
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OrderError {
    #[error("Order {0} is {1}. Items and adjustments can no longer change.")]
    Immutable(OrderId, OrderState),
    #[error("Order {0} already contains an item with id {1}")]
    DuplicateItem(OrderId, i64),
    #[error("Order {0} does not contain an item with id {1}")]
    UnknownItem(OrderId, i64),
    #[error("Order {0} item {1} has a non-positive quantity")]
    InvalidQuantity(OrderId, i64),
}

//--------------------------------------         Order         ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    /// Externally visible order reference. Assigned when checkout starts.
    pub number: Option<String>,
    pub state: OrderState,
    pub customer_id: String,
    pub restaurant: Option<RestaurantRef>,
    pub items: Vec<OrderItem>,
    pub adjustments: Vec<Adjustment>,
    pub total: Money,
    /// The marketplace's commission, included in `total`.
    pub fee_total: Money,
    pub currency: String,
    pub reusable_packaging_enabled: bool,
    /// Payment attempts, most recent last.
    pub payments: Vec<Payment>,
    /// Optimistic concurrency counter. Incremented by every successful commit.
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn items_total(&self) -> Money {
        self.items.iter().map(OrderItem::subtotal).sum()
    }

    pub fn adjustments_total(&self) -> Money {
        self.adjustments.iter().map(|a| a.amount).sum()
    }

    pub fn adjustments_total_for(&self, kind: AdjustmentType) -> Money {
        self.adjustments.iter().filter(|a| a.kind == kind).map(|a| a.amount).sum()
    }

    pub fn item_adjustments(&self, item_id: i64) -> impl Iterator<Item = &Adjustment> {
        self.adjustments.iter().filter(move |a| a.origin == AdjustmentOrigin::Item(item_id))
    }

    /// Recomputes `total` from items and adjustments. This is the only place that writes `total`.
    pub fn recalculate_total(&mut self) {
        self.total = self.items_total() + self.adjustments_total();
    }

    /// `true` when the stored total matches the items and adjustments it is made of.
    pub fn is_consistent(&self) -> bool {
        self.total == self.items_total() + self.adjustments_total()
    }

    pub fn has_restaurant(&self) -> bool {
        self.restaurant.is_some()
    }

    fn ensure_mutable(&self) -> Result<(), OrderError> {
        if self.state.allows_item_changes() {
            Ok(())
        } else {
            Err(OrderError::Immutable(self.id, self.state))
        }
    }

    pub fn add_item(&mut self, item: OrderItem) -> Result<(), OrderError> {
        self.ensure_mutable()?;
        if item.quantity <= 0 {
            return Err(OrderError::InvalidQuantity(self.id, item.id));
        }
        if self.items.iter().any(|i| i.id == item.id) {
            return Err(OrderError::DuplicateItem(self.id, item.id));
        }
        self.items.push(item);
        self.recalculate_total();
        Ok(())
    }

    pub fn add_adjustment(&mut self, adjustment: Adjustment) -> Result<(), OrderError> {
        self.ensure_mutable()?;
        if let AdjustmentOrigin::Item(item_id) = adjustment.origin {
            if !self.items.iter().any(|i| i.id == item_id) {
                return Err(OrderError::UnknownItem(self.id, item_id));
            }
        }
        self.adjustments.push(adjustment);
        self.recalculate_total();
        Ok(())
    }

    /// Removes every adjustment of the given kind, at order and item level. Returns how many were removed.
    pub fn remove_adjustments(&mut self, kind: AdjustmentType) -> Result<usize, OrderError> {
        self.ensure_mutable()?;
        let before = self.adjustments.len();
        self.adjustments.retain(|a| a.kind != kind);
        self.recalculate_total();
        Ok(before - self.adjustments.len())
    }

    pub fn last_payment(&self) -> Option<&Payment> {
        self.payments.last()
    }

    pub fn last_payment_mut(&mut self) -> Option<&mut Payment> {
        self.payments.last_mut()
    }

    /// The in-flight (`Cart` or `Processing`) payment, if any.
    pub fn active_payment(&self) -> Option<&Payment> {
        self.payments.iter().rev().find(|p| p.state.is_active())
    }

    /// The most recent payment that went through, if any.
    pub fn completed_payment(&self) -> Option<&Payment> {
        self.payments.iter().rev().find(|p| p.state == PaymentState::Completed)
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

//--------------------------------------        NewOrder       ---------------------------------------------------------
/// A cart as it is first persisted. Backends assign the id and version.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrder {
    pub customer_id: String,
    pub restaurant: Option<RestaurantRef>,
    pub items: Vec<OrderItem>,
    pub fee_total: Money,
    pub currency: String,
    pub reusable_packaging_enabled: bool,
}

impl NewOrder {
    pub fn new(customer_id: &str, currency: &str) -> Self {
        Self {
            customer_id: customer_id.to_string(),
            restaurant: None,
            items: vec![],
            fee_total: Money::ZERO,
            currency: currency.to_string(),
            reusable_packaging_enabled: false,
        }
    }

    pub fn with_restaurant(mut self, restaurant: RestaurantRef) -> Self {
        self.restaurant = Some(restaurant);
        self
    }

    pub fn with_item(mut self, item: OrderItem) -> Self {
        self.items.push(item);
        self
    }

    pub fn with_fee_total(mut self, fee_total: Money) -> Self {
        self.fee_total = fee_total;
        self
    }

    pub fn with_reusable_packaging(mut self, enabled: bool) -> Self {
        self.reusable_packaging_enabled = enabled;
        self
    }

    /// The sum of the item subtotals, or `None` if it does not fit in a `Money`.
    pub fn checked_items_total(&self) -> Option<Money> {
        self.items.iter().try_fold(Money::ZERO, |total, item| total.checked_add(item.checked_subtotal()?))
    }

    /// Builds the cart record for the given id.
    pub fn into_order(self, id: OrderId) -> Order {
        let now = Utc::now();
        let mut order = Order {
            id,
            number: None,
            state: OrderState::Cart,
            customer_id: self.customer_id,
            restaurant: self.restaurant,
            items: self.items,
            adjustments: vec![],
            total: Money::ZERO,
            fee_total: self.fee_total,
            currency: self.currency,
            reusable_packaging_enabled: self.reusable_packaging_enabled,
            payments: vec![],
            version: 0,
            created_at: now,
            updated_at: now,
        };
        order.recalculate_total();
        order
    }
}
