use checkout_engine::EngineConfig;
use cucumber::given;

use crate::cucumber::{checkout_world::CheckoutSystem, CheckoutWorld};

#[given("a fresh install")]
async fn fresh_database(world: &mut CheckoutWorld) {
    let system = CheckoutSystem::new(EngineConfig::default()).await;
    world.system = Some(system);
}

#[given("a fresh install that captures payments on fulfilment")]
async fn fresh_database_manual_capture(world: &mut CheckoutWorld) {
    let system = CheckoutSystem::new(EngineConfig::default().with_automatic_capture(false)).await;
    world.system = Some(system);
}

#[given(expr = "the packaging ledger reports {int} returnable unit(s)")]
async fn returnable_units(world: &mut CheckoutWorld, units: i64) {
    world.system().ledger.set_units(units);
}
