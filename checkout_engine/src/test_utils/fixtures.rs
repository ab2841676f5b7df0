//! Ready-made collaborators, carts and engines for tests.
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicI64, AtomicUsize, Ordering},
        Arc,
    },
};

use super::FakeGateway;
use crate::{
    adjustments::{DefaultLabeler, PackagingAdjustmentProcessor},
    config::EngineConfig,
    db_types::{Money, NewOrder, OrderId, OrderItem, RestaurantRef},
    events::EventProducers,
    traits::{CollaboratorError, FeeMode, PackagingLedger, RestaurantContracts},
    CheckoutFlowApi,
};

pub const RESTAURANT_ID: i64 = 42;
pub const MERCHANT_ACCOUNT: &str = "acct_fake_restaurant";
pub const LIVE_MERCHANT_ACCOUNT: &str = "acct_live_restaurant";

/// A ledger that reports the same number of returnable units for every customer. The number can be changed while a
/// test runs.
#[derive(Debug, Clone, Default)]
pub struct FixedLedger {
    units: Arc<AtomicI64>,
    queries: Arc<AtomicUsize>,
}

impl FixedLedger {
    pub fn new(units: i64) -> Self {
        Self { units: Arc::new(AtomicI64::new(units)), queries: Arc::new(AtomicUsize::new(0)) }
    }

    pub fn set_units(&self, units: i64) {
        self.units.store(units, Ordering::SeqCst);
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

impl PackagingLedger for FixedLedger {
    async fn units_returnable(&self, _customer_id: &str, _order_id: OrderId) -> Result<i64, CollaboratorError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        Ok(self.units.load(Ordering::SeqCst))
    }
}

/// The same contract terms for every restaurant, with per-restaurant merchant accounts.
#[derive(Debug, Clone)]
pub struct StaticContracts {
    pub fee_mode: FeeMode,
    pub test_accounts: HashMap<i64, String>,
    pub live_accounts: HashMap<i64, String>,
}

impl StaticContracts {
    /// Direct charges on the restaurant's account.
    pub fn restaurant_pays_fee() -> Self {
        Self::with_accounts(FeeMode::RestaurantPaysFee)
    }

    /// Destination charges from the marketplace account.
    pub fn marketplace_pays_fee() -> Self {
        Self::with_accounts(FeeMode::MarketplacePaysFee)
    }

    /// No restaurant has a connected account, so the marketplace keeps everything.
    pub fn without_accounts(fee_mode: FeeMode) -> Self {
        Self { fee_mode, test_accounts: HashMap::new(), live_accounts: HashMap::new() }
    }

    fn with_accounts(fee_mode: FeeMode) -> Self {
        let test_accounts = HashMap::from([(RESTAURANT_ID, MERCHANT_ACCOUNT.to_string())]);
        let live_accounts = HashMap::from([(RESTAURANT_ID, LIVE_MERCHANT_ACCOUNT.to_string())]);
        Self { fee_mode, test_accounts, live_accounts }
    }
}

impl RestaurantContracts for StaticContracts {
    async fn fee_mode(&self, _restaurant_id: i64) -> Result<FeeMode, CollaboratorError> {
        Ok(self.fee_mode)
    }

    async fn merchant_account_id(&self, restaurant_id: i64, livemode: bool) -> Result<Option<String>, CollaboratorError> {
        let accounts = if livemode { &self.live_accounts } else { &self.test_accounts };
        Ok(accounts.get(&restaurant_id).cloned())
    }
}

pub fn restaurant(deposit_refund_enabled: bool) -> RestaurantRef {
    RestaurantRef { id: RESTAURANT_ID, name: "Chez Bocal".into(), deposit_refund_enabled }
}

/// Two burgers at 10.00 and a 1.50 marketplace fee. Total 20.00.
pub fn simple_cart(customer_id: &str) -> NewOrder {
    NewOrder::new(customer_id, "EUR")
        .with_restaurant(restaurant(false))
        .with_item(OrderItem::new(1, "BURGER", 2, Money::from(1000)))
        .with_fee_total(Money::from(150))
}

/// A cart from a restaurant in the deposit scheme. With a deposit price of 1.00 per unit, the soup (1 × 0.5 units,
/// rounded up to one container) carries a 1.00 deposit and the curries (2 × 1.0 units) carry 2.00. Items total 28.00.
pub fn packaging_cart(customer_id: &str) -> NewOrder {
    NewOrder::new(customer_id, "EUR")
        .with_restaurant(restaurant(true))
        .with_reusable_packaging(true)
        .with_item(OrderItem::new(1, "SOUP", 1, Money::from(600)).with_reusable_packaging(0.5))
        .with_item(OrderItem::new(2, "CURRY", 2, Money::from(1100)).with_reusable_packaging(1.0))
        .with_fee_total(Money::from(300))
}

/// A cart without a restaurant. It cannot be checked out.
pub fn draft_cart(customer_id: &str) -> NewOrder {
    NewOrder::new(customer_id, "EUR").with_item(OrderItem::new(1, "BURGER", 1, Money::from(1000)))
}

pub type TestFlowApi<B> = CheckoutFlowApi<B, FakeGateway, FixedLedger, StaticContracts>;

/// An engine over `db` with the given fake gateway, ledger and contracts, and no event hooks.
pub fn test_engine<B>(
    db: B,
    gateway: FakeGateway,
    ledger: FixedLedger,
    contracts: StaticContracts,
    config: EngineConfig,
) -> TestFlowApi<B> {
    test_engine_with_producers(db, gateway, ledger, contracts, config, EventProducers::default())
}

pub fn test_engine_with_producers<B>(
    db: B,
    gateway: FakeGateway,
    ledger: FixedLedger,
    contracts: StaticContracts,
    config: EngineConfig,
    producers: EventProducers,
) -> TestFlowApi<B> {
    let adjustments = PackagingAdjustmentProcessor::new(ledger, Box::new(DefaultLabeler), config.deposit_unit_price);
    CheckoutFlowApi::new(db, gateway, adjustments, contracts, config, producers)
}
