//! Checkout Engine
//!
//! The checkout engine takes a food marketplace order from a mutable cart to a paid, accepted and fulfilled order. It
//! is storage- and host-agnostic.
//!
//! The library is divided into these main sections:
//! 1. The checkout flow API ([`CheckoutFlowApi`]). This is the only way orders and payments should be changed. Each
//!    operation loads an order, drives the order and payment state machines ([`mod@state_machines`]), talks to the
//!    payment processor and commits the result atomically. Callers get plain [`OrderSnapshot`]s back.
//! 2. The payment gateway ([`mod@gateway`]). [`StripeGateway`] implements [`traits::PaymentGateway`] on top of the
//!    `gateway_tools` REST client and splits the marketplace fee between the marketplace and the restaurant.
//! 3. Adjustments ([`mod@adjustments`]). The reusable packaging deposit and the give-back credit for returned packaging.
//! 4. Storage. Backends implement [`traits::CheckoutRepository`]. [`MemoryRepository`] and (with the `sqlite` feature)
//!    [`SqliteRepository`] are provided. The data types they store are defined in [`mod@db_types`].
//!
//! The engine also emits events when payments complete or fail, when orders are cancelled or refused, and when a
//! capture goes wrong. Hook into them with [`events::EventHooks`].
pub mod adjustments;
pub mod checkout_api;
pub mod config;
pub mod db_types;
pub mod events;
pub mod gateway;
mod memory;
pub mod state_machines;
pub mod traits;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

pub use checkout_api::{
    snapshots::{OrderSnapshot, PaymentSnapshot},
    CheckoutCommand,
    CheckoutError,
    CheckoutFlowApi,
    ConfirmPaymentRequest,
};
pub use config::EngineConfig;
pub use gateway::StripeGateway;
pub use memory::MemoryRepository;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteRepository;
