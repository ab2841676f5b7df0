//! The checkout flow API is the only entry point that changes orders and payments.
//!
//! It ties the order and payment state machines, the packaging adjustments, the payment gateway and the repository
//! together, and hands plain [`snapshots`] back to callers.
mod checkout_flow_api;
mod commands;
mod errors;
mod order_locks;
pub mod snapshots;

pub use checkout_flow_api::CheckoutFlowApi;
pub use commands::{CheckoutCommand, ConfirmPaymentRequest};
pub use errors::CheckoutError;
pub use order_locks::{OrderClaim, OrderLocks};
