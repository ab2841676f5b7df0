//! Helpers for testing the checkout engine and the applications built on it.
mod fake_gateway;
mod fixtures;
#[cfg(feature = "sqlite")]
pub mod prepare_env;

pub use fake_gateway::{
    FakeCharge,
    FakeGateway,
    FakeIntent,
    GatewayOp,
    RecordedCall,
    ACTION_REQUIRED_PAYMENT_METHOD,
    DECLINED_PAYMENT_METHOD,
    DECLINED_TOKEN,
};
pub use fixtures::*;
