//! The seams between the checkout engine and the outside world.
//!
//! * [`CheckoutRepository`] persists orders and their payments. Only the checkout flow API talks to it.
//! * [`PaymentGateway`] moves money through the external payment processor.
//! * [`PackagingLedger`], [`RestaurantContracts`] and [`AdjustmentLabeler`] are read-only collaborators supplied by
//!   the host application.
mod checkout_repository;
mod collaborators;
mod payment_gateway;

pub use checkout_repository::{format_order_number, CheckoutRepository, RepositoryError};
pub use collaborators::{AdjustmentLabeler, CollaboratorError, FeeMode, LabelParams, PackagingLedger, RestaurantContracts};
pub use payment_gateway::{
    CaptureHandle,
    ChargeContext,
    ChargeHandle,
    GatewayError,
    GatewayErrorKind,
    IntentHandle,
    PaymentGateway,
    RefundHandle,
};
