//! A stateful, in-memory stand-in for the payment processor.
//!
//! `FakeGateway` keeps intents, charges and idempotency keys the way the real processor does, so replays return the
//! original result and a second capture fails with `AlreadyCaptured`. Tests can script failures per operation, make the
//! processor "lose" a response after performing the side effect, slow every call down, and play the customer's part in
//! an authentication step.
use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use gateway_tools::{IntentStatus, RefundStatus};
use log::*;

use crate::{
    db_types::{GatewayMode, Money, Payment, PaymentCredential, PaymentId},
    gateway::{idempotency_key, resolve_refund_amount, FeeSplit},
    traits::{
        CaptureHandle,
        ChargeContext,
        ChargeHandle,
        GatewayError,
        GatewayErrorKind,
        IntentHandle,
        PaymentGateway,
        RefundHandle,
    },
};

/// A payment method that the processor declines.
pub const DECLINED_PAYMENT_METHOD: &str = "pm_card_chargeDeclined";
/// A card token that the processor declines.
pub const DECLINED_TOKEN: &str = "tok_chargeDeclined";
/// A payment method that needs the customer to authenticate (3-D Secure) before it can be confirmed.
pub const ACTION_REQUIRED_PAYMENT_METHOD: &str = "pm_card_authenticationRequired";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayOp {
    CreateIntent,
    ConfirmIntent,
    RetrieveIntent,
    Authorize,
    RetrieveCharge,
    Capture,
    Refund,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub op: GatewayOp,
    pub payment_id: PaymentId,
    pub fee_split: Option<FeeSplit>,
    pub amount: Option<Money>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeIntent {
    pub id: String,
    pub amount: Money,
    pub status: IntentStatus,
    pub client_secret: String,
    pub amount_received: Money,
    pub refunded: Money,
    pub automatic_capture: bool,
    pub fee_split: FeeSplit,
}

impl FakeIntent {
    fn handle(&self) -> IntentHandle {
        IntentHandle {
            id: self.id.clone(),
            status: self.status,
            client_secret: Some(self.client_secret.clone()),
            amount: self.amount,
            amount_received: self.amount_received,
            latest_charge: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeCharge {
    pub id: String,
    pub amount: Money,
    pub paid: bool,
    pub captured: bool,
    pub refunded: Money,
    pub fee_split: FeeSplit,
}

impl FakeCharge {
    fn handle(&self) -> ChargeHandle {
        ChargeHandle { id: self.id.clone(), amount: self.amount, paid: self.paid, captured: self.captured }
    }
}

#[derive(Debug, Clone)]
enum Script {
    Fail(GatewayErrorKind),
    LoseResponse,
}

#[derive(Debug, Clone)]
enum Replay {
    Intent(String),
    Charge(String),
    Refund(RefundHandle),
}

#[derive(Default)]
struct FakeState {
    intents: HashMap<String, FakeIntent>,
    charges: HashMap<String, FakeCharge>,
    replays: HashMap<String, Replay>,
    scripts: HashMap<GatewayOp, VecDeque<Script>>,
    calls: Vec<RecordedCall>,
    counter: u64,
}

impl FakeState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.counter += 1;
        format!("{prefix}_fake{:08}", self.counter)
    }

    fn intent_mut(&mut self, payment: &Payment) -> Result<&mut FakeIntent, GatewayError> {
        let id = payment.payment_intent_id.as_deref().unwrap_or_default();
        self.intents
            .get_mut(id)
            .ok_or_else(|| GatewayError::invalid_request(format!("No such payment_intent: '{id}'")))
    }

    fn charge_mut(&mut self, payment: &Payment) -> Result<&mut FakeCharge, GatewayError> {
        let id = payment.charge_id.as_deref().unwrap_or_default();
        self.charges.get_mut(id).ok_or_else(|| GatewayError::invalid_request(format!("No such charge: '{id}'")))
    }
}

#[derive(Clone, Default)]
pub struct FakeGateway {
    state: Arc<Mutex<FakeState>>,
    delay: Option<Duration>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call sleeps for `delay` before it is handled.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().expect("FakeGateway state lock is poisoned")
    }

    /// The next `times` calls of `op` fail with `kind` without doing anything.
    pub fn fail_next(&self, op: GatewayOp, kind: GatewayErrorKind, times: usize) {
        let mut state = self.state();
        let queue = state.scripts.entry(op).or_default();
        queue.extend(std::iter::repeat(Script::Fail(kind)).take(times));
    }

    /// The next `times` calls of `op` take effect, but the caller only sees a network error.
    pub fn lose_response_next(&self, op: GatewayOp, times: usize) {
        let mut state = self.state();
        let queue = state.scripts.entry(op).or_default();
        queue.extend(std::iter::repeat(Script::LoseResponse).take(times));
    }

    /// Plays the customer completing the authentication step of an intent.
    pub fn complete_customer_action(&self, intent_id: &str) {
        if let Some(intent) = self.state().intents.get_mut(intent_id) {
            if intent.status == IntentStatus::RequiresAction {
                intent.status = IntentStatus::RequiresConfirmation;
            }
        }
    }

    /// Plays the customer failing the authentication step of an intent.
    pub fn fail_customer_action(&self, intent_id: &str) {
        if let Some(intent) = self.state().intents.get_mut(intent_id) {
            intent.status = IntentStatus::RequiresPaymentMethod;
        }
    }

    /// Creates an intent directly, as a client-side integration would, and returns its id.
    pub fn create_external_intent(&self, amount: Money, status: IntentStatus) -> String {
        let mut state = self.state();
        let id = state.next_id("pi");
        let amount_received = if status == IntentStatus::Succeeded { amount } else { Money::ZERO };
        let intent = FakeIntent {
            client_secret: format!("{id}_secret"),
            id: id.clone(),
            amount,
            status,
            amount_received,
            refunded: Money::ZERO,
            automatic_capture: false,
            fee_split: FeeSplit::MarketplaceRetainsAll,
        };
        state.intents.insert(id.clone(), intent);
        id
    }

    /// Captures an intent or charge behind the engine's back.
    pub fn capture_externally(&self, gateway_id: &str) {
        let mut state = self.state();
        if let Some(intent) = state.intents.get_mut(gateway_id) {
            intent.status = IntentStatus::Succeeded;
            intent.amount_received = intent.amount;
        }
        if let Some(charge) = state.charges.get_mut(gateway_id) {
            charge.captured = true;
        }
    }

    pub fn intent(&self, id: &str) -> Option<FakeIntent> {
        self.state().intents.get(id).cloned()
    }

    pub fn charge(&self, id: &str) -> Option<FakeCharge> {
        self.state().charges.get(id).cloned()
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state().calls.clone()
    }

    pub fn call_count(&self, op: GatewayOp) -> usize {
        self.state().calls.iter().filter(|c| c.op == op).count()
    }

    /// Sleeps, records the call and pops the next script for `op`. A scripted failure is returned as an error.
    async fn begin(&self, call: RecordedCall) -> Result<bool, GatewayError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state();
        let op = call.op;
        trace!("💳️ Fake gateway call: {op:?} for {}", call.payment_id);
        state.calls.push(call);
        match state.scripts.get_mut(&op).and_then(VecDeque::pop_front) {
            Some(Script::Fail(kind)) => Err(GatewayError::new(kind, format!("Scripted {op:?} failure"))),
            Some(Script::LoseResponse) => Ok(true),
            None => Ok(false),
        }
    }

    fn respond<T>(op: GatewayOp, lose_response: bool, result: Result<T, GatewayError>) -> Result<T, GatewayError> {
        match result {
            Ok(_) if lose_response => {
                debug!("💳️ Fake gateway dropped the response to {op:?}");
                Err(GatewayError::network(format!("Connection reset while waiting for the {op:?} response")))
            },
            other => other,
        }
    }

    fn call(op: GatewayOp, payment: &Payment) -> RecordedCall {
        RecordedCall { op, payment_id: payment.id.clone(), fee_split: None, amount: None }
    }
}

impl PaymentGateway for FakeGateway {
    async fn create_intent(
        &self,
        payment: &Payment,
        charge: &ChargeContext,
        automatic_capture: bool,
    ) -> Result<IntentHandle, GatewayError> {
        let op = GatewayOp::CreateIntent;
        let call = RecordedCall { fee_split: Some(charge.fee_split.clone()), ..Self::call(op, payment) };
        let lose = self.begin(call).await?;
        let mut state = self.state();
        let key = idempotency_key(payment, "create_intent");
        if let Some(Replay::Intent(id)) = state.replays.get(&key) {
            let replayed = state.intents.get(id).map(FakeIntent::handle);
            return replayed.ok_or_else(|| GatewayError::invalid_request("Replayed intent vanished"));
        }
        let PaymentCredential::PaymentMethod(method) = &payment.credential else {
            return Err(GatewayError::invalid_request("A payment intent needs a payment method"));
        };
        if method == DECLINED_PAYMENT_METHOD {
            return Self::respond(op, lose, Err(GatewayError::rejected("card_declined")));
        }
        let status = match (method.as_str(), automatic_capture) {
            (ACTION_REQUIRED_PAYMENT_METHOD, _) => IntentStatus::RequiresAction,
            (_, true) => IntentStatus::Succeeded,
            (_, false) => IntentStatus::RequiresCapture,
        };
        let id = state.next_id("pi");
        let intent = FakeIntent {
            client_secret: format!("{id}_secret"),
            id: id.clone(),
            amount: payment.amount,
            status,
            amount_received: if status == IntentStatus::Succeeded { payment.amount } else { Money::ZERO },
            refunded: Money::ZERO,
            automatic_capture,
            fee_split: charge.fee_split.clone(),
        };
        let handle = intent.handle();
        state.intents.insert(id.clone(), intent);
        state.replays.insert(key, Replay::Intent(id));
        Self::respond(op, lose, Ok(handle))
    }

    async fn confirm_intent(&self, payment: &Payment) -> Result<IntentHandle, GatewayError> {
        let op = GatewayOp::ConfirmIntent;
        let lose = self.begin(Self::call(op, payment)).await?;
        let mut state = self.state();
        let result = state.intent_mut(payment).map(|intent| {
            if intent.status == IntentStatus::RequiresConfirmation {
                if intent.automatic_capture {
                    intent.status = IntentStatus::Succeeded;
                    intent.amount_received = intent.amount;
                } else {
                    intent.status = IntentStatus::RequiresCapture;
                }
            }
            intent.handle()
        });
        Self::respond(op, lose, result)
    }

    async fn retrieve_intent(&self, payment: &Payment) -> Result<IntentHandle, GatewayError> {
        let op = GatewayOp::RetrieveIntent;
        let lose = self.begin(Self::call(op, payment)).await?;
        let result = self.state().intent_mut(payment).map(|intent| intent.handle());
        Self::respond(op, lose, result)
    }

    async fn authorize(&self, payment: &Payment, charge: &ChargeContext) -> Result<ChargeHandle, GatewayError> {
        let op = GatewayOp::Authorize;
        let call = RecordedCall { fee_split: Some(charge.fee_split.clone()), ..Self::call(op, payment) };
        let lose = self.begin(call).await?;
        let mut state = self.state();
        let key = idempotency_key(payment, "authorize");
        if let Some(Replay::Charge(id)) = state.replays.get(&key) {
            let replayed = state.charges.get(id).map(FakeCharge::handle);
            return replayed.ok_or_else(|| GatewayError::invalid_request("Replayed charge vanished"));
        }
        let PaymentCredential::Token(token) = &payment.credential else {
            return Err(GatewayError::invalid_request("A charge needs a card token"));
        };
        if token == DECLINED_TOKEN {
            return Self::respond(op, lose, Err(GatewayError::rejected("card_declined")));
        }
        let id = state.next_id("ch");
        let fake = FakeCharge {
            id: id.clone(),
            amount: payment.amount,
            paid: true,
            captured: false,
            refunded: Money::ZERO,
            fee_split: charge.fee_split.clone(),
        };
        let handle = fake.handle();
        state.charges.insert(id.clone(), fake);
        state.replays.insert(key, Replay::Charge(id));
        Self::respond(op, lose, Ok(handle))
    }

    async fn retrieve_charge(&self, payment: &Payment) -> Result<ChargeHandle, GatewayError> {
        let op = GatewayOp::RetrieveCharge;
        let lose = self.begin(Self::call(op, payment)).await?;
        let result = self.state().charge_mut(payment).map(|charge| charge.handle());
        Self::respond(op, lose, result)
    }

    async fn capture(&self, payment: &Payment) -> Result<CaptureHandle, GatewayError> {
        let op = GatewayOp::Capture;
        let lose = self.begin(Self::call(op, payment)).await?;
        let mut state = self.state();
        let mode = payment.gateway_mode().map_err(|e| GatewayError::invalid_request(e.to_string()))?;
        let result = match mode {
            Some(GatewayMode::Intent) => state.intent_mut(payment).and_then(|intent| match intent.status {
                IntentStatus::Succeeded => {
                    Err(GatewayError::already_captured(format!("Payment intent {} was already captured", intent.id)))
                },
                IntentStatus::RequiresCapture => {
                    intent.status = IntentStatus::Succeeded;
                    intent.amount_received = intent.amount;
                    Ok(CaptureHandle {
                        gateway_id: intent.id.clone(),
                        amount_captured: intent.amount,
                        captured_at: chrono::Utc::now(),
                    })
                },
                status => {
                    Err(GatewayError::invalid_request(format!("Intent {} cannot be captured ({status:?})", intent.id)))
                },
            }),
            Some(GatewayMode::Charge) => state.charge_mut(payment).and_then(|charge| {
                if charge.captured {
                    return Err(GatewayError::already_captured(format!("Charge {} was already captured", charge.id)));
                }
                charge.captured = true;
                Ok(CaptureHandle {
                    gateway_id: charge.id.clone(),
                    amount_captured: charge.amount,
                    captured_at: chrono::Utc::now(),
                })
            }),
            None => Err(GatewayError::invalid_request("The payment has not reached the gateway")),
        };
        Self::respond(op, lose, result)
    }

    async fn refund(
        &self,
        payment: &Payment,
        amount: Option<Money>,
        _refund_application_fee: bool,
    ) -> Result<RefundHandle, GatewayError> {
        let op = GatewayOp::Refund;
        let call = RecordedCall { amount, ..Self::call(op, payment) };
        let lose = self.begin(call).await?;
        let amount = resolve_refund_amount(payment, amount)?.unwrap_or(payment.refundable_amount());
        let mut state = self.state();
        let key = idempotency_key(payment, &format!("refund-{}", payment.refunded_amount.value()));
        if let Some(Replay::Refund(handle)) = state.replays.get(&key) {
            return Ok(handle.clone());
        }
        let refunded = match payment.gateway_mode().map_err(|e| GatewayError::invalid_request(e.to_string()))? {
            Some(GatewayMode::Intent) => state.intent_mut(payment).map(|intent| &mut intent.refunded)?,
            Some(GatewayMode::Charge) => state.charge_mut(payment).map(|charge| &mut charge.refunded)?,
            None => return Err(GatewayError::invalid_request("The payment has not reached the gateway")),
        };
        *refunded += amount;
        let id = state.next_id("re");
        let handle = RefundHandle { id, amount, status: RefundStatus::Succeeded };
        state.replays.insert(key, Replay::Refund(handle.clone()));
        Self::respond(op, lose, Ok(handle))
    }
}
