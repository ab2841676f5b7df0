use std::{fmt::Debug, future::Future};

use chrono::Utc;
use gateway_tools::IntentStatus;
use log::*;

use super::{
    commands::{CheckoutCommand, ConfirmPaymentRequest},
    order_locks::OrderLocks,
    snapshots::{OrderSnapshot, PaymentSnapshot},
    CheckoutError,
};
use crate::{
    adjustments::{verify_totals, PackagingAdjustmentProcessor},
    config::EngineConfig,
    db_types::{GatewayMode, Money, NewOrder, Order, OrderId, Payment, PaymentCredential, PaymentState},
    events::{CaptureAlertEvent, EventProducers, OrderAnnulledEvent, PaymentCompletedEvent, PaymentFailedEvent},
    gateway::FeeSplit,
    state_machines::{transition_order, transition_payment, OrderTransition, PaymentTransition},
    traits::{
        CaptureHandle,
        ChargeContext,
        ChargeHandle,
        CheckoutRepository,
        GatewayError,
        GatewayErrorKind,
        IntentHandle,
        PackagingLedger,
        PaymentGateway,
        RefundHandle,
        RestaurantContracts,
    },
};

/// What the gateway had to say about an attempt to take the customer's money.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Authorization {
    /// Funds are authorized. `captured` is true when they have also been captured.
    Authorized { captured: bool },
    /// The customer must complete an extra step on the client before the payment can continue.
    ActionRequired,
    /// The processor has not decided yet.
    Pending,
    Declined(String),
}

impl From<&IntentHandle> for Authorization {
    fn from(intent: &IntentHandle) -> Self {
        match intent.status {
            IntentStatus::Succeeded => Self::Authorized { captured: true },
            IntentStatus::RequiresCapture => Self::Authorized { captured: false },
            IntentStatus::RequiresAction => Self::ActionRequired,
            IntentStatus::RequiresConfirmation | IntentStatus::Processing => Self::Pending,
            IntentStatus::RequiresPaymentMethod | IntentStatus::Canceled => {
                Self::Declined(format!("Payment intent {} was not authorized ({:?})", intent.id, intent.status))
            },
        }
    }
}

impl From<&ChargeHandle> for Authorization {
    fn from(charge: &ChargeHandle) -> Self {
        if charge.paid {
            Self::Authorized { captured: charge.captured }
        } else {
            Self::Declined(format!("Charge {} was not paid", charge.id))
        }
    }
}

/// `CheckoutFlowApi` drives orders from cart to completion.
///
/// Every operation follows the same shape. The order is claimed in the per-order lock registry, loaded, changed in
/// memory (adjustments, payment state, gateway calls, order state) and finally written back with a single
/// [`CheckoutRepository::commit`]. If any step before the commit fails, nothing is written and the order keeps its
/// previous state.
///
/// | Operation         | Order transition                | Gateway                                    |
/// |-------------------|---------------------------------|--------------------------------------------|
/// | `checkout`        | Cart → New (if authorized)      | create intent / confirm intent / authorize |
/// | `confirm_payment` | Cart → New (if now authorized)  | retrieve and, if needed, confirm intent    |
/// | `accept`          | New → Accepted                  | none                                       |
/// | `ready`           | Accepted → Ready                | none                                       |
/// | `fulfill`         | Ready → Fulfilled               | capture, if not captured yet               |
/// | `cancel`          | any live state → Cancelled      | full refund of a completed payment         |
/// | `refuse`          | New → Refused                   | full refund of a completed payment         |
/// | `refund`          | none                            | full or partial refund                     |
///
/// Gateway calls whose outcome is unknown (timeouts, dropped connections, processor errors) are reconciled by
/// querying the processor, or by replaying the call under the same idempotency key, up to
/// [`EngineConfig::reconcile_attempts`] times.
pub struct CheckoutFlowApi<B, G, L, R> {
    db: B,
    gateway: G,
    adjustments: PackagingAdjustmentProcessor<L>,
    contracts: R,
    config: EngineConfig,
    livemode: bool,
    locks: OrderLocks,
    producers: EventProducers,
}

impl<B, G, L, R> Debug for CheckoutFlowApi<B, G, L, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CheckoutFlowApi")
    }
}

impl<B, G, L, R> CheckoutFlowApi<B, G, L, R> {
    pub fn new(
        db: B,
        gateway: G,
        adjustments: PackagingAdjustmentProcessor<L>,
        contracts: R,
        config: EngineConfig,
        producers: EventProducers,
    ) -> Self {
        Self { db, gateway, adjustments, contracts, config, livemode: false, locks: OrderLocks::default(), producers }
    }

    /// Use the restaurants' live-mode merchant accounts.
    pub fn with_livemode(mut self, livemode: bool) -> Self {
        self.livemode = livemode;
        self
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    pub fn db_mut(&mut self) -> &mut B {
        &mut self.db
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn locks(&self) -> &OrderLocks {
        &self.locks
    }
}

impl<B, G, L, R> CheckoutFlowApi<B, G, L, R>
where
    B: CheckoutRepository,
    G: PaymentGateway,
    L: PackagingLedger,
    R: RestaurantContracts,
{
    /// Stores a new cart.
    pub async fn create_cart(&self, order: NewOrder) -> Result<OrderSnapshot, CheckoutError> {
        if order.checked_items_total().is_none() {
            return Err(CheckoutError::Validation(format!(
                "The items of the cart for customer {} are worth more than can be charged",
                order.customer_id
            )));
        }
        let order = self.db.insert_order(order).await?;
        debug!("🛒️ Cart {} created for customer {}", order.id, order.customer_id);
        Ok(OrderSnapshot::from(&order))
    }

    pub async fn fetch_order(&self, order_id: OrderId) -> Result<OrderSnapshot, CheckoutError> {
        let order = self.load(order_id).await?;
        Ok(OrderSnapshot::from(&order))
    }

    /// Runs a command. Each command holds the per-order claim for its whole duration, so a second command for the same
    /// order fails with [`CheckoutError::ConcurrentModification`] until the first one returns.
    pub async fn dispatch(&self, command: CheckoutCommand) -> Result<OrderSnapshot, CheckoutError> {
        trace!("🛒️ Dispatching {} for order {}", command.name(), command.order_id());
        match command {
            CheckoutCommand::Checkout { order_id, credential } => self.checkout(order_id, credential).await,
            CheckoutCommand::ConfirmPayment { order_id, request } => self.confirm_payment(order_id, request).await,
            CheckoutCommand::Accept { order_id } => self.accept(order_id).await,
            CheckoutCommand::Ready { order_id } => self.ready(order_id).await,
            CheckoutCommand::Fulfill { order_id } => self.fulfill(order_id).await,
            CheckoutCommand::Cancel { order_id, reason } => self.cancel(order_id, &reason).await,
            CheckoutCommand::Refuse { order_id, reason } => self.refuse(order_id, &reason).await,
            CheckoutCommand::Refund { order_id, amount, refund_application_fee } => {
                self.refund(order_id, amount, refund_application_fee).await
            },
        }
    }

    /// Pays for a cart.
    ///
    /// The credential is validated, packaging adjustments are rebuilt and the totals checked before the gateway is
    /// called. A new payment is created for the order total and sent to the gateway:
    /// * authorized: the payment is `Completed` and the order becomes `New`.
    /// * customer action required: the payment stays `Processing` with a client secret and the order stays a cart.
    ///   Call [`Self::confirm_payment`] once the customer is done.
    /// * declined: the payment is `Failed` with the reason in `last_error`. The order stays a cart.
    ///
    /// Declines are reported through the returned snapshot. Other gateway failures are recorded on the payment the
    /// same way and also returned as an error.
    pub async fn checkout(
        &self,
        order_id: OrderId,
        credential: PaymentCredential,
    ) -> Result<OrderSnapshot, CheckoutError> {
        validate_credential(&credential)?;
        let _claim = self.locks.try_claim(order_id)?;
        let mut order = self.load(order_id).await?;
        if !order.currency.eq_ignore_ascii_case(&self.config.currency) {
            return Err(CheckoutError::Validation(format!(
                "Order {} is in {}, but payments are taken in {}",
                order.id, order.currency, self.config.currency
            )));
        }
        verify_totals(&order)?;
        // Check the transition up front so that a cart that cannot be placed is never charged
        transition_order(&mut order.clone(), OrderTransition::Create)?;
        self.supersede_active_payment(&mut order)?;
        self.adjustments.process(&mut order).await?;
        if !order.total.is_positive() {
            return Err(CheckoutError::Validation(format!("Order {} has nothing to pay ({})", order.id, order.total)));
        }
        if order.number.is_none() {
            order.number = Some(self.db.next_order_number().await?);
        }
        let charge = self.charge_context(&order).await?;
        let mut payment = Payment::new(order.id, order.total, &order.currency, credential);
        payment.merchant_account_id = charge.fee_split.merchant_account().map(String::from);
        transition_payment(&mut payment, PaymentTransition::Process, "checkout")?;
        info!("🛒️ Checking out order {} for {} {} with payment {}", order.id, order.total, order.currency, payment.id);
        let result = self.authorize(&mut payment, &charge).await;
        self.settle(order, payment, result).await
    }

    /// Picks up a payment that was waiting on the customer, or whose outcome was unknown.
    ///
    /// Idempotent: a payment that is already `Completed` is returned as is, without calling the gateway.
    pub async fn confirm_payment(
        &self,
        order_id: OrderId,
        request: ConfirmPaymentRequest,
    ) -> Result<OrderSnapshot, CheckoutError> {
        let _claim = self.locks.try_claim(order_id)?;
        let mut order = self.load(order_id).await?;
        let payment = order.last_payment().ok_or(CheckoutError::NoPayment(order_id))?;
        if let (Some(requested), Some(actual)) = (&request.payment_intent_id, &payment.payment_intent_id) {
            if requested != actual {
                return Err(CheckoutError::Validation(format!(
                    "Payment intent {requested} does not belong to order {order_id}"
                )));
            }
        }
        match payment.state {
            PaymentState::Completed => {
                debug!("🛒️ Payment {} for order {order_id} is already complete", payment.id);
                return Ok(OrderSnapshot::from(&order));
            },
            PaymentState::Processing => {},
            state => {
                return Err(CheckoutError::Validation(format!(
                    "Payment {} is {state}. There is nothing to confirm.",
                    payment.id
                )))
            },
        }
        let Some(mut payment) = order.payments.pop() else {
            return Err(CheckoutError::NoPayment(order_id));
        };
        let result = match payment.gateway_mode()? {
            Some(GatewayMode::Intent) => match self.advance_intent(&payment).await {
                Ok(intent) => {
                    record_intent(&mut payment, &intent);
                    Ok(Authorization::from(&intent))
                },
                Err(e) => Err(e),
            },
            Some(GatewayMode::Charge) => {
                let p = &payment;
                let first = self.gateway.retrieve_charge(p).await;
                self.reconcile("retrieve_charge", first, move || self.gateway.retrieve_charge(p))
                    .await
                    .map(|charge| Authorization::from(&charge))
            },
            None => Err(GatewayError::invalid_request(format!("Payment {} never reached the gateway", payment.id))),
        };
        self.settle(order, payment, result).await
    }

    /// The restaurant accepts a placed and paid order.
    pub async fn accept(&self, order_id: OrderId) -> Result<OrderSnapshot, CheckoutError> {
        self.simple_transition(order_id, OrderTransition::Accept).await
    }

    /// The restaurant has prepared the order.
    pub async fn ready(&self, order_id: OrderId) -> Result<OrderSnapshot, CheckoutError> {
        self.simple_transition(order_id, OrderTransition::Ready).await
    }

    /// Hands the order over, capturing the payment first if it was only authorized.
    ///
    /// If the gateway reports that the money was already captured, something has gone badly wrong: the error is logged,
    /// a [`CaptureAlertEvent`] is published and the error is returned. The order is not fulfilled.
    pub async fn fulfill(&self, order_id: OrderId) -> Result<OrderSnapshot, CheckoutError> {
        let _claim = self.locks.try_claim(order_id)?;
        let mut order = self.load(order_id).await?;
        transition_order(&mut order.clone(), OrderTransition::Fulfill)?;
        if let Some(payment) = order.payments.iter_mut().rev().find(|p| p.state == PaymentState::Completed) {
            if !payment.is_captured() {
                match self.capture(payment).await {
                    Ok(capture) => {
                        info!("🛒️ Captured {} for payment {} of order {order_id}", capture.amount_captured, payment.id);
                        payment.captured_at = Some(capture.captured_at);
                        payment.touch();
                    },
                    Err(e) if e.kind == GatewayErrorKind::AlreadyCaptured => {
                        error!(
                            "🛒️ Payment {} of order {order_id} was already captured at the gateway, but not on our side. \
                             {e}",
                            payment.id
                        );
                        let alert = CaptureAlertEvent {
                            order_id,
                            payment_id: payment.id.to_string(),
                            gateway_id: payment.gateway_id().map(String::from),
                            message: e.message.clone(),
                        };
                        self.producers.publish_capture_alert(alert).await;
                        return Err(e.into());
                    },
                    Err(e) => return Err(e.into()),
                }
            }
        }
        transition_order(&mut order, OrderTransition::Fulfill)?;
        let order = self.db.commit(&order).await?;
        Ok(OrderSnapshot::from(&order))
    }

    /// Cancels the order, refunding a completed payment in full (application fee included) first.
    ///
    /// If the refund fails, the order is left exactly as it was and the gateway error is returned.
    pub async fn cancel(&self, order_id: OrderId, reason: &str) -> Result<OrderSnapshot, CheckoutError> {
        self.annul(order_id, OrderTransition::Cancel, reason).await
    }

    /// The restaurant turns a placed order down. Refunds like [`Self::cancel`].
    pub async fn refuse(&self, order_id: OrderId, reason: &str) -> Result<OrderSnapshot, CheckoutError> {
        self.annul(order_id, OrderTransition::Refuse, reason).await
    }

    /// Refunds some or all of the order's completed payment without changing the order state.
    pub async fn refund(
        &self,
        order_id: OrderId,
        amount: Option<Money>,
        refund_application_fee: bool,
    ) -> Result<OrderSnapshot, CheckoutError> {
        let _claim = self.locks.try_claim(order_id)?;
        let mut order = self.load(order_id).await?;
        let payment = order
            .payments
            .iter_mut()
            .rev()
            .find(|p| p.state == PaymentState::Completed)
            .ok_or(CheckoutError::NoPayment(order_id))?;
        let refund = self.refund_payment(payment, amount, refund_application_fee).await?;
        record_refund(payment, &refund)?;
        let order = self.db.commit(&order).await?;
        Ok(OrderSnapshot::from(&order))
    }

    //----------------------------------------     Internals     -------------------------------------------------------

    async fn load(&self, order_id: OrderId) -> Result<Order, CheckoutError> {
        let order = self.db.fetch_order(order_id).await?.ok_or(CheckoutError::OrderNotFound(order_id))?;
        for payment in &order.payments {
            payment.gateway_mode()?;
        }
        Ok(order)
    }

    async fn simple_transition(
        &self,
        order_id: OrderId,
        transition: OrderTransition,
    ) -> Result<OrderSnapshot, CheckoutError> {
        let _claim = self.locks.try_claim(order_id)?;
        let mut order = self.load(order_id).await?;
        transition_order(&mut order, transition)?;
        let order = self.db.commit(&order).await?;
        Ok(OrderSnapshot::from(&order))
    }

    async fn annul(
        &self,
        order_id: OrderId,
        transition: OrderTransition,
        reason: &str,
    ) -> Result<OrderSnapshot, CheckoutError> {
        let _claim = self.locks.try_claim(order_id)?;
        let mut order = self.load(order_id).await?;
        transition_order(&mut order.clone(), transition)?;
        if let Some(payment) = order.payments.last_mut() {
            match payment.state {
                PaymentState::Completed => {
                    let refund = self.refund_payment(payment, None, true).await.map_err(|e| {
                        warn!("🛒️ Refund for order {order_id} failed, so it will not {transition}. {e}");
                        e
                    })?;
                    record_refund(payment, &refund)?;
                },
                PaymentState::Processing => {
                    payment.last_error = Some(format!("Abandoned because the order was annulled. {reason}"));
                    payment.requires_action = false;
                    transition_payment(payment, PaymentTransition::Fail, "order annulled")?;
                },
                _ => {},
            }
        }
        transition_order(&mut order, transition)?;
        let order = self.db.commit(&order).await?;
        info!("🛒️ Order {order_id} is now {}. {reason}", order.state);
        let event = OrderAnnulledEvent::new(OrderSnapshot::from(&order), reason.to_string());
        self.producers.publish_order_annulled(event).await;
        Ok(OrderSnapshot::from(&order))
    }

    /// A new checkout replaces a payment that is still waiting on the customer.
    fn supersede_active_payment(&self, order: &mut Order) -> Result<(), CheckoutError> {
        if let Some(payment) = order.payments.iter_mut().find(|p| p.state.is_active()) {
            info!("🛒️ Payment {} of order {} is superseded by a new checkout", payment.id, payment.order_id);
            payment.last_error = Some("Superseded by a new checkout attempt".to_string());
            payment.requires_action = false;
            transition_payment(payment, PaymentTransition::Fail, "superseded by a new checkout")?;
        }
        Ok(())
    }

    async fn charge_context(&self, order: &Order) -> Result<ChargeContext, CheckoutError> {
        let fee_split = match &order.restaurant {
            None => FeeSplit::MarketplaceRetainsAll,
            Some(restaurant) => {
                let fee_mode = self.contracts.fee_mode(restaurant.id).await?;
                let account = self.contracts.merchant_account_id(restaurant.id, self.livemode).await?;
                FeeSplit::compute(order.total, order.fee_total, fee_mode, account.as_deref())?
            },
        };
        trace!(
            "🛒️ Fee split for order {}: {fee_split:?}, marketplace keeps {}",
            order.id,
            fee_split.marketplace_share(order.total)
        );
        let number = order.number.as_deref().unwrap_or("draft");
        Ok(ChargeContext::new(number, fee_split))
    }

    async fn authorize(&self, payment: &mut Payment, charge: &ChargeContext) -> Result<Authorization, GatewayError> {
        match payment.credential {
            PaymentCredential::Token(_) => {
                let p = &*payment;
                let first = self.gateway.authorize(p, charge).await;
                let handle = self.reconcile("authorize", first, move || self.gateway.authorize(p, charge)).await?;
                payment.charge_id = Some(handle.id.clone());
                Ok(Authorization::from(&handle))
            },
            PaymentCredential::PaymentMethod(_) => {
                let p = &*payment;
                let automatic = self.config.automatic_capture;
                let first = self.gateway.create_intent(p, charge, automatic).await;
                let handle = self
                    .reconcile("create_intent", first, move || self.gateway.create_intent(p, charge, automatic))
                    .await?;
                record_intent(payment, &handle);
                Ok(Authorization::from(&handle))
            },
            PaymentCredential::ConfirmedIntent(_) => {
                let handle = self.advance_intent(payment).await?;
                record_intent(payment, &handle);
                Ok(Authorization::from(&handle))
            },
        }
    }

    /// Reads the payment's intent and confirms it if it is waiting for confirmation.
    async fn advance_intent(&self, payment: &Payment) -> Result<IntentHandle, GatewayError> {
        let first = self.gateway.retrieve_intent(payment).await;
        let intent = self.reconcile("retrieve_intent", first, move || self.gateway.retrieve_intent(payment)).await?;
        if intent.amount != payment.amount {
            return Err(GatewayError::invalid_request(format!(
                "Payment intent {} is for {}, but the order total is {}",
                intent.id, intent.amount, payment.amount
            )));
        }
        if !intent.requires_confirmation() {
            return Ok(intent);
        }
        let first = self.gateway.confirm_intent(payment).await;
        self.reconcile("confirm_intent", first, move || self.gateway.retrieve_intent(payment)).await
    }

    async fn capture(&self, payment: &Payment) -> Result<CaptureHandle, GatewayError> {
        let mut last = match self.gateway.capture(payment).await {
            Err(e) if e.is_network() => e,
            other => return other,
        };
        let attempts = self.config.reconcile_attempts;
        for attempt in 1..=attempts {
            warn!("🛒️ Capture of payment {} is unresolved ({last}). Reconciling, attempt {attempt}", payment.id);
            let captured = match payment.gateway_mode() {
                Ok(Some(GatewayMode::Intent)) => self.gateway.retrieve_intent(payment).await.map(|intent| {
                    intent.is_captured().then(|| CaptureHandle {
                        gateway_id: intent.id,
                        amount_captured: intent.amount_received,
                        captured_at: Utc::now(),
                    })
                }),
                Ok(Some(GatewayMode::Charge)) => self.gateway.retrieve_charge(payment).await.map(|charge| {
                    charge.captured.then(|| CaptureHandle {
                        gateway_id: charge.id,
                        amount_captured: charge.amount,
                        captured_at: Utc::now(),
                    })
                }),
                Ok(None) | Err(_) => {
                    return Err(GatewayError::invalid_request(format!("Payment {} cannot be captured", payment.id)))
                },
            };
            match captured {
                Ok(Some(capture)) => return Ok(capture),
                Ok(None) => match self.gateway.capture(payment).await {
                    Err(e) if e.is_network() => last = e,
                    other => return other,
                },
                Err(e) if e.is_network() => last = e,
                Err(e) => return Err(e),
            }
        }
        Err(unresolved("capture", attempts, &last))
    }

    async fn refund_payment(
        &self,
        payment: &Payment,
        amount: Option<Money>,
        refund_application_fee: bool,
    ) -> Result<RefundHandle, GatewayError> {
        let first = self.gateway.refund(payment, amount, refund_application_fee).await;
        self.reconcile("refund", first, move || self.gateway.refund(payment, amount, refund_application_fee)).await
    }

    /// Resolves a gateway call whose outcome is unknown.
    ///
    /// `query` either reads the object back from the processor or replays the original call under the same idempotency
    /// key. Definite answers (success or any non-network error) are returned as soon as they arrive.
    async fn reconcile<T, F, Fut>(
        &self,
        operation: &str,
        first: Result<T, GatewayError>,
        mut query: F,
    ) -> Result<T, GatewayError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        let mut last = match first {
            Err(e) if e.is_network() => e,
            other => return other,
        };
        let attempts = self.config.reconcile_attempts;
        for attempt in 1..=attempts {
            warn!("🛒️ Outcome of {operation} is unknown ({last}). Reconciling, attempt {attempt} of {attempts}");
            match query().await {
                Err(e) if e.is_network() => last = e,
                other => return other,
            }
        }
        Err(unresolved(operation, attempts, &last))
    }

    /// Records the gateway's verdict on the payment and the order, then commits both.
    async fn settle(
        &self,
        mut order: Order,
        mut payment: Payment,
        result: Result<Authorization, GatewayError>,
    ) -> Result<OrderSnapshot, CheckoutError> {
        match result {
            Ok(Authorization::Authorized { captured }) => {
                if captured {
                    payment.captured_at = Some(Utc::now());
                }
                payment.requires_action = false;
                payment.client_secret = None;
                transition_payment(&mut payment, PaymentTransition::Complete, "gateway authorized the payment")?;
                order.payments.push(payment);
                if OrderTransition::Create.target(order.state).is_some() {
                    transition_order(&mut order, OrderTransition::Create)?;
                }
                let order = self.db.commit(&order).await?;
                info!("🛒️ Order {} is paid and placed as {}", order.id, order.number.as_deref().unwrap_or_default());
                let snapshot = OrderSnapshot::from(&order);
                if let Some(payment) = snapshot.last_payment() {
                    let event = PaymentCompletedEvent::new(snapshot.clone(), payment.clone());
                    self.producers.publish_payment_completed(event).await;
                }
                Ok(snapshot)
            },
            Ok(Authorization::ActionRequired | Authorization::Pending) => {
                debug!(
                    "🛒️ Payment {} for order {} is waiting (action required: {})",
                    payment.id, order.id, payment.requires_action
                );
                order.payments.push(payment);
                let order = self.db.commit(&order).await?;
                Ok(OrderSnapshot::from(&order))
            },
            Ok(Authorization::Declined(reason)) => {
                let order = self.fail_payment(order, payment, reason).await?;
                Ok(OrderSnapshot::from(&order))
            },
            Err(e) if e.kind == GatewayErrorKind::Rejected => {
                let order = self.fail_payment(order, payment, e.message).await?;
                Ok(OrderSnapshot::from(&order))
            },
            Err(e) => {
                self.fail_payment(order, payment, e.to_string()).await?;
                Err(e.into())
            },
        }
    }

    async fn fail_payment(&self, mut order: Order, mut payment: Payment, reason: String) -> Result<Order, CheckoutError> {
        info!("🛒️ Payment {} for order {} failed. {reason}", payment.id, order.id);
        payment.last_error = Some(reason.clone());
        payment.requires_action = false;
        payment.client_secret = None;
        transition_payment(&mut payment, PaymentTransition::Fail, &reason)?;
        let snapshot = PaymentSnapshot::from(&payment);
        order.payments.push(payment);
        let order = self.db.commit(&order).await?;
        self.producers.publish_payment_failed(PaymentFailedEvent::new(order.id, snapshot, reason)).await;
        Ok(order)
    }
}

fn validate_credential(credential: &PaymentCredential) -> Result<(), CheckoutError> {
    let value = credential.value();
    if value.trim().is_empty() {
        return Err(CheckoutError::Validation("The payment credential is empty".into()));
    }
    if value.chars().any(char::is_whitespace) {
        return Err(CheckoutError::Validation(format!("'{value}' is not a valid payment credential")));
    }
    if let PaymentCredential::ConfirmedIntent(id) = credential {
        if !id.starts_with("pi_") {
            return Err(CheckoutError::Validation(format!("'{id}' is not a payment intent id")));
        }
    }
    Ok(())
}

fn record_intent(payment: &mut Payment, intent: &IntentHandle) {
    payment.payment_intent_id = Some(intent.id.clone());
    payment.requires_action = intent.requires_action();
    if intent.client_secret.is_some() {
        payment.client_secret = intent.client_secret.clone();
    }
    payment.touch();
}

fn record_refund(payment: &mut Payment, refund: &RefundHandle) -> Result<(), CheckoutError> {
    payment.refunded_amount += refund.amount;
    payment.refunded_at = Some(Utc::now());
    let transition = if payment.refunded_amount >= payment.amount {
        PaymentTransition::Refund
    } else {
        PaymentTransition::RefundPartially
    };
    transition_payment(payment, transition, "refund issued")?;
    info!("🛒️ Refunded {} of payment {} ({})", refund.amount, payment.id, refund.id);
    Ok(())
}

fn unresolved(operation: &str, attempts: u32, last: &GatewayError) -> GatewayError {
    error!("🛒️ Could not resolve the outcome of {operation} after {attempts} attempts. {last}");
    GatewayError::network(format!(
        "The outcome of {operation} is unknown after {attempts} reconciliation attempts. {}",
        last.message
    ))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn credentials_are_checked_before_use() {
        assert!(validate_credential(&PaymentCredential::Token("tok_visa".into())).is_ok());
        assert!(validate_credential(&PaymentCredential::Token("  ".into())).is_err());
        assert!(validate_credential(&PaymentCredential::PaymentMethod("pm card".into())).is_err());
        assert!(validate_credential(&PaymentCredential::ConfirmedIntent("ch_123".into())).is_err());
        assert!(validate_credential(&PaymentCredential::ConfirmedIntent("pi_123".into())).is_ok());
    }

    #[test]
    fn intent_statuses_map_to_authorizations() {
        let intent = |status| IntentHandle {
            id: "pi_1".into(),
            status,
            client_secret: None,
            amount: Money::from(100),
            amount_received: Money::ZERO,
            latest_charge: None,
        };
        assert_eq!(Authorization::from(&intent(IntentStatus::Succeeded)), Authorization::Authorized { captured: true });
        assert_eq!(Authorization::from(&intent(IntentStatus::RequiresCapture)), Authorization::Authorized {
            captured: false
        });
        assert_eq!(Authorization::from(&intent(IntentStatus::RequiresAction)), Authorization::ActionRequired);
        assert_eq!(Authorization::from(&intent(IntentStatus::RequiresConfirmation)), Authorization::Pending);
        assert!(matches!(Authorization::from(&intent(IntentStatus::Canceled)), Authorization::Declined(_)));
    }

    #[test]
    fn refunds_move_the_payment_on() {
        let mut payment = Payment::new(OrderId(1), Money::from(1000), "EUR", PaymentCredential::Token("tok".into()));
        payment.state = PaymentState::Completed;
        let partial = RefundHandle {
            id: "re_1".into(),
            amount: Money::from(300),
            status: gateway_tools::RefundStatus::Succeeded,
        };
        record_refund(&mut payment, &partial).unwrap();
        assert_eq!(payment.state, PaymentState::PartiallyRefunded);
        assert_eq!(payment.refundable_amount(), Money::from(700));
    }
}
