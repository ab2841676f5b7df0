use std::time::Duration;

use checkout_engine::{
    db_types::{OrderState, PaymentCredential, PaymentState},
    test_utils::*,
    CheckoutError,
    EngineConfig,
    MemoryRepository,
};
use log::*;

const DELAY: Duration = Duration::from_millis(50);

fn card() -> PaymentCredential {
    PaymentCredential::PaymentMethod("pm_card_visa".into())
}

fn engine(db: MemoryRepository, gateway: FakeGateway) -> TestFlowApi<MemoryRepository> {
    let _ = env_logger::try_init();
    test_engine(db, gateway, FixedLedger::new(0), StaticContracts::restaurant_pays_fee(), EngineConfig::default())
}

#[tokio::test]
async fn a_second_checkout_for_the_same_order_is_turned_away() {
    let gateway = FakeGateway::new().with_delay(DELAY);
    let api = engine(MemoryRepository::new(), gateway.clone());
    let cart = api.create_cart(simple_cart("alice")).await.unwrap();

    let (first, second) = tokio::join!(api.checkout(cart.id, card()), api.checkout(cart.id, card()));
    let first = first.unwrap();
    assert_eq!(first.state, OrderState::New);
    assert_eq!(second.unwrap_err(), CheckoutError::ConcurrentModification(cart.id));
    assert_eq!(gateway.call_count(GatewayOp::CreateIntent), 1);
    assert!(!api.locks().is_claimed(cart.id));

    // Once the first operation is done, the order can be worked on again
    let accepted = api.accept(cart.id).await.unwrap();
    assert_eq!(accepted.state, OrderState::Accepted);
}

#[tokio::test]
async fn cancel_during_checkout_is_turned_away() {
    let gateway = FakeGateway::new().with_delay(DELAY);
    let api = engine(MemoryRepository::new(), gateway.clone());
    let cart = api.create_cart(simple_cart("bob")).await.unwrap();
    let (checkout, cancel) = tokio::join!(api.checkout(cart.id, card()), api.cancel(cart.id, "Impatient"));
    assert_eq!(checkout.unwrap().state, OrderState::New);
    assert_eq!(cancel.unwrap_err(), CheckoutError::ConcurrentModification(cart.id));
    assert_eq!(gateway.call_count(GatewayOp::Refund), 0);
}

#[tokio::test]
async fn different_orders_do_not_block_each_other() {
    let gateway = FakeGateway::new().with_delay(DELAY);
    let api = engine(MemoryRepository::new(), gateway.clone());
    let a = api.create_cart(simple_cart("carol")).await.unwrap();
    let b = api.create_cart(simple_cart("dave")).await.unwrap();
    let (a, b) = tokio::join!(api.checkout(a.id, card()), api.checkout(b.id, card()));
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_eq!(a.state, OrderState::New);
    assert_eq!(b.state, OrderState::New);
    assert_ne!(a.number, b.number);
}

#[tokio::test]
async fn engines_sharing_a_repository_are_serialized_by_the_version_check() {
    let db = MemoryRepository::new();
    let gateway = FakeGateway::new().with_delay(DELAY);
    let api_a = engine(db.clone(), gateway.clone());
    let api_b = engine(db.clone(), gateway.clone());
    let cart = api_a.create_cart(simple_cart("erin")).await.unwrap();

    let (a, b) = tokio::join!(api_a.checkout(cart.id, card()), api_b.checkout(cart.id, card()));
    let results = [a, b];
    let placed = results.iter().filter(|r| r.is_ok()).count();
    let conflicts =
        results.iter().filter(|r| matches!(r, Err(CheckoutError::ConcurrentModification(id)) if *id == cart.id)).count();
    info!("🚀️ {placed} checkout placed, {conflicts} turned away");
    assert_eq!(placed, 1);
    assert_eq!(conflicts, 1);

    let order = api_a.fetch_order(cart.id).await.unwrap();
    assert_eq!(order.state, OrderState::New);
    assert_eq!(order.payments.len(), 1);
    assert_eq!(order.last_payment().unwrap().state, PaymentState::Completed);
    assert_eq!(order.version, 1);
}
