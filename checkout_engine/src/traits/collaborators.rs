use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db_types::{AdjustmentType, Money, OrderId};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Collaborator '{source_name}' failed: {message}")]
pub struct CollaboratorError {
    pub source_name: String,
    pub message: String,
}

impl CollaboratorError {
    pub fn new(source_name: &str, message: impl Into<String>) -> Self {
        Self { source_name: source_name.to_string(), message: message.into() }
    }
}

/// Tracks reusable packaging that customers have taken home and brought back.
#[allow(async_fn_in_trait)]
pub trait PackagingLedger {
    /// How many deposit units the customer has returned and can be credited for on this order.
    async fn units_returnable(&self, customer_id: &str, order_id: OrderId) -> Result<i64, CollaboratorError>;
}

/// Who bears the payment processor's fee on a restaurant's orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeeMode {
    /// Direct charge on the restaurant's connected account. The marketplace collects its commission as an application
    /// fee, and the processor fee is taken from the restaurant's share.
    RestaurantPaysFee,
    /// Destination charge on the marketplace account. The restaurant's share is transferred out, and the processor fee
    /// is taken from the marketplace's commission.
    MarketplacePaysFee,
}

/// The commercial terms agreed with each restaurant.
#[allow(async_fn_in_trait)]
pub trait RestaurantContracts {
    async fn fee_mode(&self, restaurant_id: i64) -> Result<FeeMode, CollaboratorError>;

    /// The restaurant's connected account at the payment processor, if it has one for the given mode.
    async fn merchant_account_id(&self, restaurant_id: i64, livemode: bool) -> Result<Option<String>, CollaboratorError>;
}

/// The values a label may refer to.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabelParams {
    pub units: Option<f64>,
    pub amount: Option<Money>,
    pub variant_code: Option<String>,
}

impl LabelParams {
    pub fn units(mut self, units: f64) -> Self {
        self.units = Some(units);
        self
    }

    pub fn amount(mut self, amount: Money) -> Self {
        self.amount = Some(amount);
        self
    }

    pub fn variant(mut self, code: &str) -> Self {
        self.variant_code = Some(code.to_string());
        self
    }
}

/// Renders the human-readable label stored on an adjustment. Labels are resolved once, when the adjustment is created.
pub trait AdjustmentLabeler {
    fn label(&self, kind: AdjustmentType, params: &LabelParams) -> String;
}
