use checkout_engine::{
    db_types::{Money, Order, OrderId, OrderState, Payment, PaymentCredential, PaymentState},
    test_utils::{prepare_env::*, *},
    traits::{CheckoutRepository, RepositoryError},
    EngineConfig,
    MemoryRepository,
    SqliteRepository,
};
use gateway_tools::IntentStatus;
use log::*;
use sqlx::{migrate::MigrateDatabase, Sqlite};

async fn setup() -> SqliteRepository {
    let url = random_db_path();
    prepare_test_env(&url).await;
    SqliteRepository::new_with_url(&url, 5).await.expect("Error creating database")
}

async fn tear_down(db: SqliteRepository) {
    db.close().await;
    if let Err(e) = Sqlite::drop_database(db.url()).await {
        error!("🚀️ Failed to drop database {}: {e}", db.url());
    }
}

fn paid(order: &Order, intent_id: &str) -> Payment {
    let credential = PaymentCredential::PaymentMethod("pm_card_visa".into());
    let mut payment = Payment::new(order.id, order.total, &order.currency, credential);
    payment.payment_intent_id = Some(intent_id.to_string());
    payment.state = PaymentState::Completed;
    payment
}

#[tokio::test]
async fn orders_survive_a_round_trip() {
    let db = setup().await;
    let order = db.insert_order(packaging_cart("alice")).await.unwrap();
    assert!(order.id.value() > 0);
    assert_eq!(order.state, OrderState::Cart);
    assert_eq!(order.version, 0);
    assert_eq!(order.total, Money::from(2800));
    assert!(order.number.is_none());

    let fetched = db.fetch_order(order.id).await.unwrap().unwrap();
    assert_eq!(fetched.customer_id, "alice");
    assert_eq!(fetched.items, order.items);
    assert_eq!(fetched.restaurant, order.restaurant);
    assert_eq!(fetched.fee_total, Money::from(300));
    assert!(fetched.reusable_packaging_enabled);
    assert!(fetched.payments.is_empty());

    assert!(db.fetch_order(OrderId(9999)).await.unwrap().is_none());
    tear_down(db).await;
}

#[tokio::test]
async fn commits_are_versioned() {
    let db = setup().await;
    let order = db.insert_order(simple_cart("bob")).await.unwrap();
    let mut update = order.clone();
    update.state = OrderState::New;
    update.number = Some(db.next_order_number().await.unwrap());
    update.payments.push(paid(&order, "pi_commit_1"));
    let committed = db.commit(&update).await.unwrap();
    assert_eq!(committed.version, 1);

    let fetched = db.fetch_order(order.id).await.unwrap().unwrap();
    assert_eq!(fetched.version, 1);
    assert_eq!(fetched.state, OrderState::New);
    assert_eq!(fetched.number.as_deref(), Some("R000000001"));
    assert_eq!(fetched.payments.len(), 1);
    assert_eq!(fetched.payments[0].payment_intent_id.as_deref(), Some("pi_commit_1"));
    assert_eq!(fetched.payments[0].state, PaymentState::Completed);

    // Writing from the stale copy is refused and changes nothing
    let mut stale = order.clone();
    stale.state = OrderState::Cancelled;
    let err = db.commit(&stale).await.unwrap_err();
    assert_eq!(err, RepositoryError::VersionConflict { id: order.id, expected: 0, found: 1 });
    let fetched = db.fetch_order(order.id).await.unwrap().unwrap();
    assert_eq!(fetched.state, OrderState::New);

    let mut missing = order.clone();
    missing.id = OrderId(9999);
    assert_eq!(db.commit(&missing).await.unwrap_err(), RepositoryError::OrderNotFound(OrderId(9999)));
    tear_down(db).await;
}

#[tokio::test]
async fn payments_keep_their_order() {
    let db = setup().await;
    let mut order = db.insert_order(simple_cart("carol")).await.unwrap();
    for i in 0..3 {
        let mut payment = paid(&order, &format!("pi_order_{i}"));
        payment.state = PaymentState::Failed;
        payment.last_error = Some(format!("attempt {i}"));
        order.payments.push(payment);
    }
    let order = db.commit(&order).await.unwrap();
    let fetched = db.fetch_order(order.id).await.unwrap().unwrap();
    let errors: Vec<_> = fetched.payments.iter().map(|p| p.last_error.clone().unwrap()).collect();
    assert_eq!(errors, vec!["attempt 0", "attempt 1", "attempt 2"]);

    let payment = db.fetch_payment(&order.payments[1].id).await.unwrap().unwrap();
    assert_eq!(payment.payment_intent_id.as_deref(), Some("pi_order_1"));
    assert_eq!(payment.credential, order.payments[1].credential);
    tear_down(db).await;
}

#[tokio::test]
async fn gateway_ids_belong_to_one_payment() {
    let db = setup().await;
    let mut first = db.insert_order(simple_cart("dave")).await.unwrap();
    let mut second = db.insert_order(simple_cart("erin")).await.unwrap();
    first.payments.push(paid(&first, "pi_shared"));
    db.commit(&first).await.unwrap();
    second.payments.push(paid(&second, "pi_shared"));
    let err = db.commit(&second).await.unwrap_err();
    assert_eq!(err, RepositoryError::DuplicateGatewayId("pi_shared".into()));
    // The transaction was rolled back, so the order was not bumped either
    let fetched = db.fetch_order(second.id).await.unwrap().unwrap();
    assert_eq!(fetched.version, 0);
    assert!(fetched.payments.is_empty());
    tear_down(db).await;
}

#[tokio::test]
async fn carts_are_visible_from_every_pooled_connection() {
    let db = setup().await;
    let carts = [simple_cart("gus"), packaging_cart("hana"), simple_cart("ivo")];
    for (i, cart) in carts.into_iter().enumerate() {
        let inserted = db.insert_order(cart).await.unwrap();
        let fetched = db.fetch_order(inserted.id).await.unwrap();
        assert_eq!(fetched.map(|o| o.customer_id), Some(inserted.customer_id.clone()));
        // Hold two connections at once so that at least one of them is not the one that did the insert
        let mut a = db.pool().acquire().await.unwrap();
        let mut b = db.pool().acquire().await.unwrap();
        for conn in [&mut *a, &mut *b] {
            let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders").fetch_one(conn).await.unwrap();
            assert_eq!(count, i as i64 + 1);
        }
    }
    let number = db.next_order_number().await.unwrap();
    let mut conn = db.pool().acquire().await.unwrap();
    let issued: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM order_numbers").fetch_one(&mut *conn).await.unwrap();
    assert_eq!(number, "R000000001");
    assert_eq!(issued, 1);
    drop(conn);
    tear_down(db).await;
}

#[tokio::test]
async fn attempts_on_one_order_may_share_a_gateway_id() {
    let db = setup().await;
    let mut order = db.insert_order(simple_cart("jon")).await.unwrap();
    let mut abandoned = paid(&order, "pi_retried");
    abandoned.state = PaymentState::Failed;
    abandoned.last_error = Some("Superseded by a new checkout attempt".into());
    order.payments.push(abandoned);
    order.payments.push(paid(&order, "pi_retried"));
    let order = db.commit(&order).await.unwrap();
    let fetched = db.fetch_order(order.id).await.unwrap().unwrap();
    assert_eq!(fetched.payments.len(), 2);
    assert!(fetched.payments.iter().all(|p| p.payment_intent_id.as_deref() == Some("pi_retried")));

    let mut other = db.insert_order(simple_cart("kai")).await.unwrap();
    other.payments.push(paid(&other, "pi_retried"));
    let err = db.commit(&other).await.unwrap_err();
    assert_eq!(err, RepositoryError::DuplicateGatewayId("pi_retried".into()));
    tear_down(db).await;
}

/// Checks out with a client-side intent that needs authentication, then checks out again with the same intent once
/// the customer has authenticated.
async fn retry_with_the_same_intent<B: CheckoutRepository>(db: B) -> (OrderState, usize) {
    let gateway = FakeGateway::new();
    let contracts = StaticContracts::restaurant_pays_fee();
    let api = test_engine(db, gateway.clone(), FixedLedger::new(0), contracts, EngineConfig::default());
    let cart = api.create_cart(simple_cart("lea")).await.unwrap();
    let intent_id = gateway.create_external_intent(Money::from(2000), IntentStatus::RequiresAction);
    let credential = PaymentCredential::ConfirmedIntent(intent_id.clone());
    let pending = api.checkout(cart.id, credential.clone()).await.unwrap();
    assert_eq!(pending.state, OrderState::Cart);
    assert_eq!(pending.last_payment().unwrap().state, PaymentState::Processing);
    gateway.complete_customer_action(&intent_id);
    let order = api.checkout(cart.id, credential).await.unwrap();
    assert_eq!(order.last_payment().unwrap().state, PaymentState::Completed);
    (order.state, order.payments.len())
}

#[tokio::test]
async fn both_backends_accept_a_retry_with_the_same_intent() {
    let in_memory = retry_with_the_same_intent(MemoryRepository::new()).await;
    let db = setup().await;
    let in_sqlite = retry_with_the_same_intent(db.clone()).await;
    assert_eq!(in_memory, (OrderState::New, 2));
    assert_eq!(in_sqlite, in_memory);
    tear_down(db).await;
}

#[tokio::test]
async fn order_numbers_are_sequential() {
    let db = setup().await;
    assert_eq!(db.next_order_number().await.unwrap(), "R000000001");
    assert_eq!(db.next_order_number().await.unwrap(), "R000000002");
    assert_eq!(db.next_order_number().await.unwrap(), "R000000003");
    tear_down(db).await;
}

#[tokio::test]
async fn full_checkout_over_sqlite() {
    let db = setup().await;
    let gateway = FakeGateway::new();
    let config = EngineConfig::default().with_automatic_capture(false);
    let api = test_engine(db.clone(), gateway.clone(), FixedLedger::new(1), StaticContracts::restaurant_pays_fee(), config);
    let cart = api.create_cart(packaging_cart("frank")).await.unwrap();
    let order = api.checkout(cart.id, PaymentCredential::PaymentMethod("pm_card_visa".into())).await.unwrap();
    assert_eq!(order.state, OrderState::New);
    assert_eq!(order.total, Money::from(3000));
    api.accept(order.id).await.unwrap();
    api.ready(order.id).await.unwrap();
    let order = api.fulfill(order.id).await.unwrap();
    assert_eq!(order.state, OrderState::Fulfilled);

    let stored = db.fetch_order(order.id).await.unwrap().unwrap();
    assert_eq!(stored.version, order.version);
    assert_eq!(stored.adjustments.len(), 3);
    assert!(stored.is_consistent());
    let payment = stored.last_payment().unwrap();
    assert_eq!(payment.state, PaymentState::Completed);
    assert!(payment.is_captured());
    assert_eq!(payment.merchant_account_id.as_deref(), Some(MERCHANT_ACCOUNT));
    assert_eq!(gateway.call_count(GatewayOp::Capture), 1);
    tear_down(db).await;
}
