use std::env;

use checkout_common::{helpers::env_var_parsed, helpers::parse_boolean_flag, Money, DEFAULT_CURRENCY_CODE};
use log::*;

const DEFAULT_DEPOSIT_UNIT_PRICE: i64 = 100;
const DEFAULT_RECONCILE_ATTEMPTS: u32 = 3;

/// Engine-wide settings.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// The deposit charged for one unit of reusable packaging, in minor units.
    pub deposit_unit_price: Money,
    /// The currency the marketplace settles in. Carts in any other currency are turned away at checkout.
    pub currency: String,
    /// When false, intents are only authorized at checkout and captured on fulfilment.
    pub automatic_capture: bool,
    /// How many times an ambiguous gateway outcome is queried before the payment is given up as failed.
    pub reconcile_attempts: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            deposit_unit_price: Money::from(DEFAULT_DEPOSIT_UNIT_PRICE),
            currency: DEFAULT_CURRENCY_CODE.to_string(),
            automatic_capture: true,
            reconcile_attempts: DEFAULT_RECONCILE_ATTEMPTS,
        }
    }
}

impl EngineConfig {
    pub fn with_deposit_unit_price(mut self, price: Money) -> Self {
        self.deposit_unit_price = price;
        self
    }

    pub fn with_automatic_capture(mut self, automatic_capture: bool) -> Self {
        self.automatic_capture = automatic_capture;
        self
    }

    pub fn with_currency(mut self, currency: &str) -> Self {
        self.currency = currency.to_string();
        self
    }

    pub fn with_reconcile_attempts(mut self, attempts: u32) -> Self {
        self.reconcile_attempts = attempts;
        self
    }

    pub fn from_env_or_default() -> Self {
        let defaults = Self::default();
        let deposit_unit_price = env_var_parsed::<i64>("CHECKOUT_DEPOSIT_UNIT_PRICE")
            .unwrap_or_else(|e| {
                error!("🪛️ {e}. Using the default deposit price, {DEFAULT_DEPOSIT_UNIT_PRICE}, instead.");
                None
            })
            .map(Money::from)
            .unwrap_or(defaults.deposit_unit_price);
        let currency = env::var("CHECKOUT_CURRENCY").ok().unwrap_or(defaults.currency);
        let automatic_capture = parse_boolean_flag(env::var("CHECKOUT_AUTOMATIC_CAPTURE").ok(), true);
        let reconcile_attempts = env_var_parsed::<u32>("CHECKOUT_RECONCILE_ATTEMPTS")
            .unwrap_or_else(|e| {
                error!("🪛️ {e}. Using the default, {DEFAULT_RECONCILE_ATTEMPTS}, instead.");
                None
            })
            .unwrap_or(defaults.reconcile_attempts);
        Self { deposit_unit_price, currency, automatic_capture, reconcile_attempts }
    }
}
