use checkout_engine::{
    db_types::{Money, OrderState, PaymentCredential, PaymentState},
    state_machines::TransitionError,
    test_utils::*,
    traits::GatewayErrorKind,
    CheckoutError,
    EngineConfig,
    MemoryRepository,
    OrderSnapshot,
};
use gateway_tools::IntentStatus;

fn engine_with(config: EngineConfig) -> (TestFlowApi<MemoryRepository>, FakeGateway) {
    let _ = env_logger::try_init();
    let gateway = FakeGateway::new();
    let api = test_engine(
        MemoryRepository::new(),
        gateway.clone(),
        FixedLedger::new(0),
        StaticContracts::restaurant_pays_fee(),
        config,
    );
    (api, gateway)
}

fn engine() -> (TestFlowApi<MemoryRepository>, FakeGateway) {
    engine_with(EngineConfig::default())
}

fn manual_capture() -> EngineConfig {
    EngineConfig::default().with_automatic_capture(false)
}

async fn placed_order(api: &TestFlowApi<MemoryRepository>, customer: &str) -> OrderSnapshot {
    let cart = api.create_cart(simple_cart(customer)).await.unwrap();
    let credential = PaymentCredential::PaymentMethod("pm_card_visa".into());
    let order = api.checkout(cart.id, credential).await.unwrap();
    assert_eq!(order.state, OrderState::New);
    order
}

fn gateway_error(err: CheckoutError) -> GatewayErrorKind {
    match err {
        CheckoutError::Gateway(e) => e.kind,
        other => panic!("Expected a gateway error, got {other:?}"),
    }
}

#[tokio::test]
async fn cancelling_a_paid_order_refunds_it_in_full() {
    let (api, gateway) = engine();
    let order = placed_order(&api, "alice").await;
    let order = api.cancel(order.id, "Customer changed their mind").await.unwrap();
    assert_eq!(order.state, OrderState::Cancelled);
    let payment = order.last_payment().unwrap();
    assert_eq!(payment.state, PaymentState::Refunded);
    assert_eq!(payment.refunded_amount, Money::from(2000));
    let calls = gateway.calls();
    let refund = calls.iter().find(|c| c.op == GatewayOp::Refund).unwrap();
    assert_eq!(refund.amount, None);
    let intent = gateway.intent(payment.payment_intent_id.as_deref().unwrap()).unwrap();
    assert_eq!(intent.refunded, Money::from(2000));
}

#[tokio::test]
async fn refusing_an_order_refunds_it() {
    let (api, gateway) = engine();
    let order = placed_order(&api, "bob").await;
    let order = api.refuse(order.id, "Kitchen closed").await.unwrap();
    assert_eq!(order.state, OrderState::Refused);
    assert_eq!(order.last_payment().unwrap().state, PaymentState::Refunded);
    assert_eq!(gateway.call_count(GatewayOp::Refund), 1);
}

#[tokio::test]
async fn accepted_orders_cannot_be_refused() {
    let (api, gateway) = engine();
    let order = placed_order(&api, "carol").await;
    api.accept(order.id).await.unwrap();
    let err = api.refuse(order.id, "Too late").await.unwrap_err();
    assert!(matches!(err, CheckoutError::Transition(TransitionError::InvalidOrderTransition { .. })), "{err:?}");
    assert_eq!(gateway.call_count(GatewayOp::Refund), 0);
}

#[tokio::test]
async fn a_failed_refund_leaves_the_order_untouched() {
    let (api, gateway) = engine();
    let order = placed_order(&api, "dave").await;
    gateway.fail_next(GatewayOp::Refund, GatewayErrorKind::InvalidRequest, 1);
    let err = api.cancel(order.id, "Customer changed their mind").await.unwrap_err();
    assert_eq!(gateway_error(err), GatewayErrorKind::InvalidRequest);
    let reloaded = api.fetch_order(order.id).await.unwrap();
    assert_eq!(reloaded.state, OrderState::New);
    assert_eq!(reloaded.version, order.version);
    assert_eq!(reloaded.last_payment().unwrap().state, PaymentState::Completed);

    // The next attempt goes through
    let order = api.cancel(order.id, "Customer changed their mind").await.unwrap();
    assert_eq!(order.state, OrderState::Cancelled);
}

#[tokio::test]
async fn cancelling_abandons_a_payment_that_waits_on_the_customer() {
    let (api, gateway) = engine();
    let cart = api.create_cart(simple_cart("erin")).await.unwrap();
    let credential = PaymentCredential::PaymentMethod(ACTION_REQUIRED_PAYMENT_METHOD.into());
    api.checkout(cart.id, credential).await.unwrap();
    let order = api.cancel(cart.id, "Timed out").await.unwrap();
    assert_eq!(order.state, OrderState::Cancelled);
    let payment = order.last_payment().unwrap();
    assert_eq!(payment.state, PaymentState::Failed);
    assert_eq!(payment.last_error.as_deref(), Some("Abandoned because the order was annulled. Timed out"));
    assert!(!payment.requires_action);
    assert_eq!(gateway.call_count(GatewayOp::Refund), 0);
}

#[tokio::test]
async fn cancelling_a_cart() {
    let (api, gateway) = engine();
    let cart = api.create_cart(simple_cart("frank")).await.unwrap();
    let order = api.cancel(cart.id, "Abandoned cart").await.unwrap();
    assert_eq!(order.state, OrderState::Cancelled);
    assert!(order.payments.is_empty());
    assert!(gateway.calls().is_empty());

    let err = api.cancel(cart.id, "Again").await.unwrap_err();
    assert!(matches!(err, CheckoutError::Transition(_)), "{err:?}");
    let err = api.checkout(cart.id, PaymentCredential::Token("tok_visa".into())).await.unwrap_err();
    assert!(matches!(err, CheckoutError::Transition(_)), "{err:?}");
}

#[tokio::test]
async fn partial_refunds() {
    let (api, gateway) = engine();
    let order = placed_order(&api, "gina").await;
    let refunded = api.refund(order.id, Some(Money::from(500)), false).await.unwrap();
    assert_eq!(refunded.state, OrderState::New);
    let payment = refunded.last_payment().unwrap();
    assert_eq!(payment.state, PaymentState::PartiallyRefunded);
    assert_eq!(payment.refunded_amount, Money::from(500));
    assert_eq!(gateway.calls().last().unwrap().amount, Some(Money::from(500)));

    // A partially refunded payment is settled. There is nothing left to refund through the engine.
    let err = api.refund(order.id, Some(Money::from(500)), false).await.unwrap_err();
    assert_eq!(err, CheckoutError::NoPayment(order.id));
    assert_eq!(gateway.call_count(GatewayOp::Refund), 1);
}

#[tokio::test]
async fn refunding_the_full_amount() {
    let (api, _gateway) = engine();
    let order = placed_order(&api, "hank").await;
    let refunded = api.refund(order.id, None, true).await.unwrap();
    assert_eq!(refunded.state, OrderState::New);
    assert_eq!(refunded.last_payment().unwrap().state, PaymentState::Refunded);
    assert_eq!(refunded.last_payment().unwrap().refunded_amount, Money::from(2000));
}

#[tokio::test]
async fn refunds_are_limited_to_what_was_paid() {
    let (api, _gateway) = engine();
    let order = placed_order(&api, "ivan").await;
    let err = api.refund(order.id, Some(Money::from(2001)), false).await.unwrap_err();
    assert_eq!(gateway_error(err), GatewayErrorKind::InvalidRequest);
    let err = api.refund(order.id, Some(Money::from(0)), false).await.unwrap_err();
    assert_eq!(gateway_error(err), GatewayErrorKind::InvalidRequest);
    let reloaded = api.fetch_order(order.id).await.unwrap();
    assert_eq!(reloaded.last_payment().unwrap().state, PaymentState::Completed);
}

#[tokio::test]
async fn refunding_an_unpaid_order() {
    let (api, _gateway) = engine();
    let cart = api.create_cart(simple_cart("jane")).await.unwrap();
    let err = api.refund(cart.id, None, true).await.unwrap_err();
    assert_eq!(err, CheckoutError::NoPayment(cart.id));
}

#[tokio::test]
async fn fulfilment_captures_an_authorized_intent() {
    let (api, gateway) = engine_with(manual_capture());
    let order = placed_order(&api, "kim").await;
    let payment = order.last_payment().unwrap();
    assert!(!payment.captured);
    let intent_id = payment.payment_intent_id.clone().unwrap();
    assert_eq!(gateway.intent(&intent_id).unwrap().status, IntentStatus::RequiresCapture);

    let err = api.fulfill(order.id).await.unwrap_err();
    assert!(matches!(err, CheckoutError::Transition(_)), "{err:?}");
    assert_eq!(gateway.call_count(GatewayOp::Capture), 0);

    api.accept(order.id).await.unwrap();
    api.ready(order.id).await.unwrap();
    let order = api.fulfill(order.id).await.unwrap();
    assert_eq!(order.state, OrderState::Fulfilled);
    assert!(order.last_payment().unwrap().captured);
    assert_eq!(gateway.call_count(GatewayOp::Capture), 1);
    assert_eq!(gateway.intent(&intent_id).unwrap().status, IntentStatus::Succeeded);
}

#[tokio::test]
async fn fulfilment_captures_an_authorized_charge() {
    let (api, gateway) = engine();
    let cart = api.create_cart(simple_cart("liam")).await.unwrap();
    let order = api.checkout(cart.id, PaymentCredential::Token("tok_visa".into())).await.unwrap();
    api.accept(order.id).await.unwrap();
    api.ready(order.id).await.unwrap();
    let order = api.fulfill(order.id).await.unwrap();
    assert_eq!(order.state, OrderState::Fulfilled);
    let charge = gateway.charge(order.last_payment().unwrap().charge_id.as_deref().unwrap()).unwrap();
    assert!(charge.captured);
}

#[tokio::test]
async fn captured_payments_are_not_captured_again() {
    let (api, gateway) = engine();
    let order = placed_order(&api, "mia").await;
    api.accept(order.id).await.unwrap();
    api.ready(order.id).await.unwrap();
    let order = api.fulfill(order.id).await.unwrap();
    assert_eq!(order.state, OrderState::Fulfilled);
    assert_eq!(gateway.call_count(GatewayOp::Capture), 0);
}

#[tokio::test]
async fn a_capture_made_elsewhere_blocks_fulfilment() {
    let (api, gateway) = engine_with(manual_capture());
    let order = placed_order(&api, "ned").await;
    api.accept(order.id).await.unwrap();
    let ready = api.ready(order.id).await.unwrap();
    gateway.capture_externally(order.last_payment().unwrap().payment_intent_id.as_deref().unwrap());
    let err = api.fulfill(order.id).await.unwrap_err();
    assert_eq!(gateway_error(err), GatewayErrorKind::AlreadyCaptured);
    let reloaded = api.fetch_order(order.id).await.unwrap();
    assert_eq!(reloaded.state, OrderState::Ready);
    assert_eq!(reloaded.version, ready.version);
    assert!(!reloaded.last_payment().unwrap().captured);
}

#[tokio::test]
async fn a_lost_capture_response_is_reconciled() {
    let (api, gateway) = engine_with(manual_capture());
    let order = placed_order(&api, "olga").await;
    api.accept(order.id).await.unwrap();
    api.ready(order.id).await.unwrap();
    gateway.lose_response_next(GatewayOp::Capture, 1);
    let order = api.fulfill(order.id).await.unwrap();
    assert_eq!(order.state, OrderState::Fulfilled);
    assert!(order.last_payment().unwrap().captured);
    assert_eq!(gateway.call_count(GatewayOp::Capture), 1);
    assert_eq!(gateway.call_count(GatewayOp::RetrieveIntent), 1);
}

#[tokio::test]
async fn a_lost_refund_response_is_replayed_without_refunding_twice() {
    let (api, gateway) = engine();
    let order = placed_order(&api, "pia").await;
    gateway.lose_response_next(GatewayOp::Refund, 1);
    let order = api.cancel(order.id, "Customer changed their mind").await.unwrap();
    assert_eq!(order.state, OrderState::Cancelled);
    let payment = order.last_payment().unwrap();
    assert_eq!(payment.state, PaymentState::Refunded);
    assert_eq!(payment.refunded_amount, Money::from(2000));
    assert_eq!(gateway.call_count(GatewayOp::Refund), 2);
    let intent = gateway.intent(payment.payment_intent_id.as_deref().unwrap()).unwrap();
    assert_eq!(intent.refunded, Money::from(2000));
}
