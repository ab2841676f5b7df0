use std::{collections::HashMap, fmt::Debug};

use checkout_engine::{
    db_types::OrderId,
    test_utils::{
        prepare_env::{create_database, random_db_path, run_migrations},
        test_engine,
        FakeGateway,
        FixedLedger,
        StaticContracts,
        TestFlowApi,
    },
    CheckoutError,
    EngineConfig,
    OrderSnapshot,
    SqliteRepository,
};
use cucumber::World;
use log::*;

#[derive(Default, Debug, World)]
pub struct CheckoutWorld {
    pub system: Option<CheckoutSystem>,
}

pub struct CheckoutSystem {
    pub db_path: String,
    pub api: TestFlowApi<SqliteRepository>,
    pub gateway: FakeGateway,
    pub ledger: FixedLedger,
    /// Each customer's current order.
    pub orders: HashMap<String, OrderId>,
    pub last_result: Option<Result<OrderSnapshot, CheckoutError>>,
}

impl Debug for CheckoutSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CheckoutSystem ({})", self.db_path)
    }
}

impl CheckoutWorld {
    pub fn system(&self) -> &CheckoutSystem {
        self.system.as_ref().expect("Checkout system not initialised")
    }

    pub fn system_mut(&mut self) -> &mut CheckoutSystem {
        self.system.as_mut().expect("Checkout system not initialised")
    }

    pub fn api(&self) -> &TestFlowApi<SqliteRepository> {
        &self.system().api
    }

    pub fn order_of(&self, customer: &str) -> OrderId {
        *self.system().orders.get(customer).unwrap_or_else(|| panic!("{customer} has no order"))
    }

    pub fn record(&mut self, result: Result<OrderSnapshot, CheckoutError>) {
        if let Err(e) = &result {
            debug!("🚀️ Operation failed: {e}");
        }
        self.system_mut().last_result = Some(result);
    }
}

impl CheckoutSystem {
    pub async fn new(config: EngineConfig) -> Self {
        let url = prepare_test_env().await;
        let db = SqliteRepository::new_with_url(&url, 5).await.expect("Error creating connection to database");
        debug!("🚀️ Created database: {url}");
        let gateway = FakeGateway::new();
        let ledger = FixedLedger::new(0);
        let api =
            test_engine(db, gateway.clone(), ledger.clone(), StaticContracts::restaurant_pays_fee(), config);
        Self { db_path: url, api, gateway, ledger, orders: HashMap::new(), last_result: None }
    }
}

pub async fn prepare_test_env() -> String {
    let path = random_db_path();
    create_database(&path).await;
    run_migrations(&path).await;
    path
}
