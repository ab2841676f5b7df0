//! Client for a Stripe-compatible payment processor REST API.
//!
//! The client is thin. It knows how to encode form parameters, attach the connected-account and
//! idempotency headers, and decode the processor's objects and error envelopes. Business rules (fee splitting,
//! state transitions) live in the checkout engine.
mod api;
mod config;
mod data_objects;
mod error;
mod helpers;

pub use api::{ProcessorApi, RequestOptions};
pub use config::GatewayConfig;
pub use data_objects::{Charge, IntentStatus, PaymentIntent, ProcessorErrorBody, Refund, RefundStatus, TransferData};
pub use error::ProcessorApiError;
pub use helpers::FormParams;
