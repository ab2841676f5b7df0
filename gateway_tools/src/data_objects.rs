use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

//--------------------------------------    PaymentIntent     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
    RequiresPaymentMethod,
    RequiresConfirmation,
    RequiresAction,
    Processing,
    RequiresCapture,
    Canceled,
    Succeeded,
}

impl IntentStatus {
    /// The funds are authorized (and possibly captured). The payment can be considered complete.
    pub fn is_capturable_or_captured(&self) -> bool {
        matches!(self, Self::RequiresCapture | Self::Succeeded)
    }

    /// The customer has to complete an additional step (e.g. 3-D Secure) on the client side.
    pub fn needs_customer_action(&self) -> bool {
        matches!(self, Self::RequiresAction)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferData {
    pub amount: Option<i64>,
    pub destination: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub amount: i64,
    #[serde(default)]
    pub amount_capturable: i64,
    #[serde(default)]
    pub amount_received: i64,
    pub application_fee_amount: Option<i64>,
    pub client_secret: Option<String>,
    pub created: i64,
    pub currency: String,
    pub latest_charge: Option<String>,
    #[serde(default)]
    pub livemode: bool,
    pub status: IntentStatus,
    pub transfer_data: Option<TransferData>,
}

impl PaymentIntent {
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.created, 0)
    }
}

//--------------------------------------        Charge        ---------------------------------------------------------
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Charge {
    pub id: String,
    pub amount: i64,
    #[serde(default)]
    pub amount_refunded: i64,
    pub application_fee_amount: Option<i64>,
    pub captured: bool,
    pub created: i64,
    pub currency: String,
    #[serde(default)]
    pub livemode: bool,
    pub paid: bool,
    #[serde(default)]
    pub refunded: bool,
    pub status: String,
}

//--------------------------------------        Refund        ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefundStatus {
    Pending,
    RequiresAction,
    Succeeded,
    Failed,
    Canceled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Refund {
    pub id: String,
    pub amount: i64,
    pub charge: Option<String>,
    pub currency: String,
    pub payment_intent: Option<String>,
    pub status: RefundStatus,
}

//--------------------------------------     Error body       ---------------------------------------------------------
/// The `error` object of a failed processor response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessorErrorBody {
    #[serde(rename = "type")]
    pub error_type: Option<String>,
    pub code: Option<String>,
    pub decline_code: Option<String>,
    pub message: Option<String>,
}

impl ProcessorErrorBody {
    pub fn is_card_error(&self) -> bool {
        self.error_type.as_deref() == Some("card_error")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ErrorEnvelope {
    pub error: ProcessorErrorBody,
}
