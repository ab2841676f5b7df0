use std::str::FromStr;

use checkout_engine::{
    db_types::{Money, OrderState, PaymentCredential, PaymentState},
    test_utils::{packaging_cart, simple_cart, GatewayOp},
    ConfirmPaymentRequest,
    OrderSnapshot,
};
use cucumber::{then, when};

use crate::cucumber::CheckoutWorld;

#[when(expr = "customer {word} fills a cart with two burgers")]
async fn burger_cart(world: &mut CheckoutWorld, customer: String) {
    let order = world.api().create_cart(simple_cart(&customer)).await.expect("Error creating cart");
    world.system_mut().orders.insert(customer, order.id);
}

#[when(expr = "customer {word} fills a cart with soup and curries in reusable packaging")]
async fn packaging_cart_step(world: &mut CheckoutWorld, customer: String) {
    let order = world.api().create_cart(packaging_cart(&customer)).await.expect("Error creating cart");
    world.system_mut().orders.insert(customer, order.id);
}

#[when(expr = "{word} checks out with payment method {word}")]
async fn checkout_payment_method(world: &mut CheckoutWorld, customer: String, method: String) {
    let id = world.order_of(&customer);
    let result = world.api().checkout(id, PaymentCredential::PaymentMethod(method)).await;
    world.record(result);
}

#[when(expr = "{word} checks out with card token {word}")]
async fn checkout_token(world: &mut CheckoutWorld, customer: String, token: String) {
    let id = world.order_of(&customer);
    let result = world.api().checkout(id, PaymentCredential::Token(token)).await;
    world.record(result);
}

#[when(expr = "{word} completes the authentication step")]
async fn complete_authentication(world: &mut CheckoutWorld, customer: String) {
    let order = current_order(world, &customer).await;
    let intent_id = order.last_payment().and_then(|p| p.payment_intent_id.clone()).expect("No payment intent");
    world.system().gateway.complete_customer_action(&intent_id);
}

#[when(expr = "{word} checks out again with the same payment intent")]
async fn checkout_same_intent(world: &mut CheckoutWorld, customer: String) {
    let order = current_order(world, &customer).await;
    let intent_id = order.last_payment().and_then(|p| p.payment_intent_id.clone()).expect("No payment intent");
    let result = world.api().checkout(order.id, PaymentCredential::ConfirmedIntent(intent_id)).await;
    world.record(result);
}

#[when(expr = "{word} confirms the payment")]
async fn confirm_payment(world: &mut CheckoutWorld, customer: String) {
    let id = world.order_of(&customer);
    let result = world.api().confirm_payment(id, ConfirmPaymentRequest::default()).await;
    world.record(result);
}

#[when(expr = "the restaurant accepts the order of {word}")]
async fn accept(world: &mut CheckoutWorld, customer: String) {
    let id = world.order_of(&customer);
    let result = world.api().accept(id).await;
    world.record(result);
}

#[when(expr = "the restaurant has the order of {word} ready")]
async fn ready(world: &mut CheckoutWorld, customer: String) {
    let id = world.order_of(&customer);
    let result = world.api().ready(id).await;
    world.record(result);
}

#[when(expr = "the restaurant hands the order over to {word}")]
async fn fulfill(world: &mut CheckoutWorld, customer: String) {
    let id = world.order_of(&customer);
    let result = world.api().fulfill(id).await;
    world.record(result);
}

#[when(expr = "{word} cancels the order because {string}")]
async fn cancel(world: &mut CheckoutWorld, customer: String, reason: String) {
    let id = world.order_of(&customer);
    let result = world.api().cancel(id, &reason).await;
    world.record(result);
}

#[when(expr = "the restaurant refuses the order of {word} because {string}")]
async fn refuse(world: &mut CheckoutWorld, customer: String, reason: String) {
    let id = world.order_of(&customer);
    let result = world.api().refuse(id, &reason).await;
    world.record(result);
}

#[when(expr = "{word} is refunded {int} cents")]
async fn partial_refund(world: &mut CheckoutWorld, customer: String, amount: i64) {
    let id = world.order_of(&customer);
    let result = world.api().refund(id, Some(Money::from(amount)), false).await;
    world.record(result);
}

#[then(expr = "the order of {word} is {word}")]
async fn order_state(world: &mut CheckoutWorld, customer: String, state: String) {
    let expected = OrderState::from_str(&state).expect("Not a valid order state");
    let order = current_order(world, &customer).await;
    assert_eq!(order.state, expected);
}

#[then(expr = "the last payment of {word} is {word}")]
async fn payment_state(world: &mut CheckoutWorld, customer: String, state: String) {
    let expected = PaymentState::from_str(&state).expect("Not a valid payment state");
    let order = current_order(world, &customer).await;
    let payment = order.last_payment().expect("The order has no payments");
    assert_eq!(payment.state, expected);
}

#[then(expr = "the order of {word} has {int} payment(s)")]
async fn payment_count(world: &mut CheckoutWorld, customer: String, count: usize) {
    let order = current_order(world, &customer).await;
    assert_eq!(order.payments.len(), count);
}

#[then(expr = "the order of {word} costs {int} cents")]
async fn order_total(world: &mut CheckoutWorld, customer: String, total: i64) {
    let order = current_order(world, &customer).await;
    assert_eq!(order.total, Money::from(total));
}

#[then(expr = "the order of {word} is numbered {word}")]
async fn order_number(world: &mut CheckoutWorld, customer: String, number: String) {
    let order = current_order(world, &customer).await;
    assert_eq!(order.number.as_deref(), Some(number.as_str()));
}

#[then(expr = "{word} has to authenticate the payment")]
async fn action_required(world: &mut CheckoutWorld, customer: String) {
    let order = current_order(world, &customer).await;
    let payment = order.last_payment().expect("The order has no payments");
    assert!(payment.requires_action);
    assert!(payment.client_secret.is_some());
}

#[then(expr = "the operation fails with {string}")]
async fn operation_failed(world: &mut CheckoutWorld, message: String) {
    match &world.system().last_result {
        Some(Err(e)) => assert!(e.to_string().contains(&message), "'{e}' does not mention '{message}'"),
        other => panic!("Expected the last operation to fail, but got {other:?}"),
    }
}

#[then(expr = "the last payment of {word} was declined with {string}")]
async fn payment_declined(world: &mut CheckoutWorld, customer: String, reason: String) {
    let order = current_order(world, &customer).await;
    let payment = order.last_payment().expect("The order has no payments");
    assert_eq!(payment.state, PaymentState::Failed);
    assert_eq!(payment.last_error.as_deref(), Some(reason.as_str()));
}

#[then(expr = "the payment gateway captured {int} payment(s)")]
async fn captures(world: &mut CheckoutWorld, count: usize) {
    assert_eq!(world.system().gateway.call_count(GatewayOp::Capture), count);
}

#[then(expr = "the payment gateway issued {int} refund(s)")]
async fn refunds(world: &mut CheckoutWorld, count: usize) {
    assert_eq!(world.system().gateway.call_count(GatewayOp::Refund), count);
}

async fn current_order(world: &CheckoutWorld, customer: &str) -> OrderSnapshot {
    let id = world.order_of(customer);
    world.api().fetch_order(id).await.expect("Error fetching order")
}
