use std::{future::Future, time::Duration};

use chrono::Utc;
use gateway_tools::{
    Charge,
    FormParams,
    GatewayConfig,
    PaymentIntent,
    ProcessorApi,
    ProcessorApiError,
    RequestOptions,
};
use log::*;

use super::{idempotency_key, resolve_refund_amount};
use crate::{
    db_types::{GatewayMode, Money, Payment, PaymentCredential},
    traits::{
        CaptureHandle,
        ChargeContext,
        ChargeHandle,
        GatewayError,
        IntentHandle,
        PaymentGateway,
        RefundHandle,
    },
};

const ALREADY_CAPTURED_CODE: &str = "charge_already_captured";

/// [`PaymentGateway`] backed by a Stripe-compatible processor.
///
/// Every call runs under the configured deadline. A call that misses its deadline is reported as a
/// [`GatewayErrorKind::Network`](crate::traits::GatewayErrorKind::Network) error, since the processor may or may not
/// have acted on it. Mutating calls carry an idempotency key, so replaying them is safe.
#[derive(Clone)]
pub struct StripeGateway {
    api: ProcessorApi,
    call_timeout: Duration,
}

impl StripeGateway {
    pub fn new(config: GatewayConfig) -> Result<Self, ProcessorApiError> {
        let call_timeout = config.timeout;
        let api = ProcessorApi::new(config)?;
        Ok(Self { api, call_timeout })
    }

    pub fn livemode(&self) -> bool {
        self.api.config().livemode
    }

    async fn call<T, F>(&self, operation: &str, fut: F) -> Result<T, GatewayError>
    where F: Future<Output = Result<T, ProcessorApiError>> {
        match tokio::time::timeout(self.call_timeout, fut).await {
            Ok(result) => result.map_err(|e| {
                let err = map_processor_error(e);
                debug!("💳️ {operation} failed. {err}");
                err
            }),
            Err(_) => {
                warn!("💳️ {operation} did not complete within {}ms", self.call_timeout.as_millis());
                Err(GatewayError::network(format!("{operation} timed out")))
            },
        }
    }

    fn options(payment: &Payment, operation: Option<&str>) -> RequestOptions {
        let options = RequestOptions::new().on_account(payment.merchant_account_id.clone());
        match operation {
            Some(op) => options.with_idempotency_key(idempotency_key(payment, op)),
            None => options,
        }
    }

    fn base_params(payment: &Payment, charge: &ChargeContext) -> Result<FormParams, GatewayError> {
        FormParams::new()
            .push_amount("amount", payment.amount)
            .map(|p| p.push("currency", payment.currency.to_lowercase()).push("description", &charge.description))
            .map_err(map_processor_error)
    }
}

fn intent_id(payment: &Payment) -> Result<&str, GatewayError> {
    payment
        .payment_intent_id
        .as_deref()
        .ok_or_else(|| GatewayError::invalid_request(format!("Payment {} has no payment intent", payment.id)))
}

fn charge_id(payment: &Payment) -> Result<&str, GatewayError> {
    payment
        .charge_id
        .as_deref()
        .ok_or_else(|| GatewayError::invalid_request(format!("Payment {} has no charge", payment.id)))
}

fn gateway_mode(payment: &Payment) -> Result<GatewayMode, GatewayError> {
    payment
        .gateway_mode()
        .map_err(|e| GatewayError::invalid_request(e.to_string()))?
        .ok_or_else(|| GatewayError::invalid_request(format!("Payment {} has not reached the gateway", payment.id)))
}

impl PaymentGateway for StripeGateway {
    async fn create_intent(
        &self,
        payment: &Payment,
        charge: &ChargeContext,
        automatic_capture: bool,
    ) -> Result<IntentHandle, GatewayError> {
        let PaymentCredential::PaymentMethod(method) = &payment.credential else {
            return Err(GatewayError::invalid_request("A payment intent needs a payment method"));
        };
        let mut params = Self::base_params(payment, charge)?
            .push("payment_method", method)
            .push("confirmation_method", "manual")
            .push("confirm", true);
        if !automatic_capture {
            params = params.push("capture_method", "manual");
        }
        let params = charge.fee_split.apply(params).map_err(map_processor_error)?;
        let options = RequestOptions::new()
            .on_account(charge.fee_split.merchant_account().map(String::from))
            .with_idempotency_key(idempotency_key(payment, "create_intent"));
        let intent = self.call("create_intent", self.api.create_payment_intent(&params, &options)).await?;
        Ok(intent_handle(intent))
    }

    async fn confirm_intent(&self, payment: &Payment) -> Result<IntentHandle, GatewayError> {
        let id = intent_id(payment)?;
        let options = Self::options(payment, Some("confirm_intent"));
        let intent = self.call("confirm_intent", self.api.confirm_payment_intent(id, &options)).await?;
        Ok(intent_handle(intent))
    }

    async fn retrieve_intent(&self, payment: &Payment) -> Result<IntentHandle, GatewayError> {
        let id = intent_id(payment)?;
        let options = Self::options(payment, None);
        let intent = self.call("retrieve_intent", self.api.retrieve_payment_intent(id, &options)).await?;
        Ok(intent_handle(intent))
    }

    async fn authorize(&self, payment: &Payment, charge: &ChargeContext) -> Result<ChargeHandle, GatewayError> {
        let PaymentCredential::Token(token) = &payment.credential else {
            return Err(GatewayError::invalid_request("No card token provided"));
        };
        let params = Self::base_params(payment, charge)?.push("source", token).push("capture", false);
        let params = charge.fee_split.apply(params).map_err(map_processor_error)?;
        let options = RequestOptions::new()
            .on_account(charge.fee_split.merchant_account().map(String::from))
            .with_idempotency_key(idempotency_key(payment, "authorize"));
        let charge = self.call("authorize", self.api.create_charge(&params, &options)).await?;
        Ok(charge_handle(charge))
    }

    async fn retrieve_charge(&self, payment: &Payment) -> Result<ChargeHandle, GatewayError> {
        let id = charge_id(payment)?;
        let options = Self::options(payment, None);
        let charge = self.call("retrieve_charge", self.api.retrieve_charge(id, &options)).await?;
        Ok(charge_handle(charge))
    }

    async fn capture(&self, payment: &Payment) -> Result<CaptureHandle, GatewayError> {
        match gateway_mode(payment)? {
            GatewayMode::Intent => {
                let current = self.retrieve_intent(payment).await?;
                if current.is_captured() {
                    return Err(GatewayError::already_captured(format!("Payment intent {} was already captured", current.id)));
                }
                let params = FormParams::new()
                    .push_amount("amount_to_capture", payment.amount)
                    .map_err(map_processor_error)?;
                let options = Self::options(payment, Some("capture"));
                let intent =
                    self.call("capture", self.api.capture_payment_intent(&current.id, &params, &options)).await?;
                Ok(CaptureHandle {
                    gateway_id: intent.id,
                    amount_captured: Money::from(intent.amount_received),
                    captured_at: Utc::now(),
                })
            },
            GatewayMode::Charge => {
                let current = self.retrieve_charge(payment).await?;
                if current.captured {
                    return Err(GatewayError::already_captured(format!("Charge {} was already captured", current.id)));
                }
                let options = Self::options(payment, Some("capture"));
                let charge = self.call("capture", self.api.capture_charge(&current.id, &options)).await?;
                Ok(CaptureHandle {
                    gateway_id: charge.id,
                    amount_captured: Money::from(charge.amount),
                    captured_at: Utc::now(),
                })
            },
        }
    }

    async fn refund(
        &self,
        payment: &Payment,
        amount: Option<Money>,
        refund_application_fee: bool,
    ) -> Result<RefundHandle, GatewayError> {
        let amount = resolve_refund_amount(payment, amount)?;
        let params = match gateway_mode(payment)? {
            GatewayMode::Intent => FormParams::new().push("payment_intent", intent_id(payment)?),
            GatewayMode::Charge => FormParams::new().push("charge", charge_id(payment)?),
        };
        let params = match amount {
            Some(a) => params.push_amount("amount", a).map_err(map_processor_error)?,
            None => params,
        };
        let params = params.push("refund_application_fee", refund_application_fee);
        // Keyed on what was refunded before, so retries replay while a later partial refund gets a fresh key
        let operation = format!("refund-{}", payment.refunded_amount.value());
        let options = Self::options(payment, Some(&operation));
        let refund = self.call("refund", self.api.create_refund(&params, &options)).await?;
        Ok(RefundHandle { id: refund.id, amount: Money::from(refund.amount), status: refund.status })
    }
}

fn intent_handle(intent: PaymentIntent) -> IntentHandle {
    IntentHandle {
        amount: Money::from(intent.amount),
        amount_received: Money::from(intent.amount_received),
        id: intent.id,
        status: intent.status,
        client_secret: intent.client_secret,
        latest_charge: intent.latest_charge,
    }
}

fn charge_handle(charge: Charge) -> ChargeHandle {
    ChargeHandle { id: charge.id, amount: Money::from(charge.amount), paid: charge.paid, captured: charge.captured }
}

/// Classifies a processor client error.
///
/// | Source                                  | Kind              |
/// |-----------------------------------------|-------------------|
/// | code `charge_already_captured`          | AlreadyCaptured   |
/// | HTTP 402 or a `card_error`              | Rejected          |
/// | HTTP 429 or 5xx                         | Network           |
/// | any other HTTP error (400, 404, ...)    | InvalidRequest    |
/// | timeout, transport or undecodable body  | Network           |
/// | bad parameters or client setup          | InvalidRequest    |
pub fn map_processor_error(e: ProcessorApiError) -> GatewayError {
    let message = e.to_string();
    match e {
        ProcessorApiError::ProcessorError { status, body } => {
            if body.code.as_deref() == Some(ALREADY_CAPTURED_CODE) {
                GatewayError::already_captured(message)
            } else if status == 402 || body.is_card_error() {
                let reason = body.decline_code.or(body.message).unwrap_or(message);
                GatewayError::rejected(reason)
            } else if status == 429 || status >= 500 {
                GatewayError::network(message)
            } else {
                GatewayError::invalid_request(message)
            }
        },
        ProcessorApiError::Timeout | ProcessorApiError::Transport(_) | ProcessorApiError::JsonError(_) => {
            GatewayError::network(message)
        },
        ProcessorApiError::Initialization(_) | ProcessorApiError::InvalidParameters(_) => {
            GatewayError::invalid_request(message)
        },
    }
}
