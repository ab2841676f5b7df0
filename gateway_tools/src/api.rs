use std::sync::Arc;

use log::*;
use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION},
    Client,
    Method,
    RequestBuilder,
};
use serde::de::DeserializeOwned;

use crate::{
    config::GatewayConfig,
    data_objects::ErrorEnvelope,
    Charge,
    FormParams,
    PaymentIntent,
    ProcessorApiError,
    Refund,
};

/// Per-request options that the processor reads from headers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOptions {
    /// Issue the request on behalf of a connected (merchant) account.
    pub connected_account: Option<String>,
    /// Replaying a request with the same key returns the original result instead of repeating the side effect.
    pub idempotency_key: Option<String>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_account(mut self, account: Option<String>) -> Self {
        self.connected_account = account;
        self
    }

    pub fn with_idempotency_key<S: Into<String>>(mut self, key: S) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }
}

#[derive(Clone)]
pub struct ProcessorApi {
    config: GatewayConfig,
    client: Arc<Client>,
}

impl ProcessorApi {
    pub fn new(config: GatewayConfig) -> Result<Self, ProcessorApiError> {
        let mut headers = HeaderMap::with_capacity(1);
        let bearer = format!("Bearer {}", config.secret_key.reveal());
        let mut val = HeaderValue::from_str(&bearer).map_err(|e| ProcessorApiError::Initialization(e.to_string()))?;
        val.set_sensitive(true);
        headers.insert(AUTHORIZATION, val);
        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(|e| ProcessorApiError::Initialization(e.to_string()))?;
        Ok(Self { config, client: Arc::new(client) })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/v1{path}", self.config.api_url)
    }

    fn request(&self, method: Method, path: &str, options: &RequestOptions) -> Result<RequestBuilder, ProcessorApiError> {
        let mut req = self.client.request(method, self.url(path));
        if let Some(account) = &options.connected_account {
            let val = HeaderValue::from_str(account)
                .map_err(|e| ProcessorApiError::InvalidParameters(format!("Invalid account id {account}. {e}")))?;
            req = req.header("Stripe-Account", val);
        }
        if let Some(key) = &options.idempotency_key {
            let val = HeaderValue::from_str(key)
                .map_err(|e| ProcessorApiError::InvalidParameters(format!("Invalid idempotency key {key}. {e}")))?;
            req = req.header("Idempotency-Key", val);
        }
        Ok(req)
    }

    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, ProcessorApiError> {
        let response = req.send().await.map_err(|e| {
            if e.is_timeout() {
                ProcessorApiError::Timeout
            } else {
                ProcessorApiError::Transport(e.to_string())
            }
        })?;
        let status = response.status();
        if status.is_success() {
            trace!("💳️ Processor call successful. {status}");
            response.json::<T>().await.map_err(|e| ProcessorApiError::JsonError(e.to_string()))
        } else {
            let status = status.as_u16();
            let text = response.text().await.map_err(|e| ProcessorApiError::Transport(e.to_string()))?;
            let body = serde_json::from_str::<ErrorEnvelope>(&text).map(|e| e.error).unwrap_or_else(|_| {
                warn!("💳️ Processor error response was not a valid error envelope: {text}");
                Default::default()
            });
            debug!("💳️ Processor call failed with status {status}: {body:?}");
            Err(ProcessorApiError::ProcessorError { status, body })
        }
    }

    pub async fn post_form<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &FormParams,
        options: &RequestOptions,
    ) -> Result<T, ProcessorApiError> {
        trace!("💳️ POST {path} ({} params)", params.as_slice().len());
        let req = self.request(Method::POST, path, options)?.form(params.as_slice());
        self.send(req).await
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str, options: &RequestOptions) -> Result<T, ProcessorApiError> {
        trace!("💳️ GET {path}");
        let req = self.request(Method::GET, path, options)?;
        self.send(req).await
    }

    //----------------------------------------   Payment intents   ----------------------------------------------------

    pub async fn create_payment_intent(
        &self,
        params: &FormParams,
        options: &RequestOptions,
    ) -> Result<PaymentIntent, ProcessorApiError> {
        let intent = self.post_form::<PaymentIntent>("/payment_intents", params, options).await?;
        info!("💳️ Created payment intent {} with status {:?}", intent.id, intent.status);
        Ok(intent)
    }

    pub async fn retrieve_payment_intent(
        &self,
        id: &str,
        options: &RequestOptions,
    ) -> Result<PaymentIntent, ProcessorApiError> {
        let path = format!("/payment_intents/{id}");
        self.get(&path, options).await
    }

    pub async fn confirm_payment_intent(
        &self,
        id: &str,
        options: &RequestOptions,
    ) -> Result<PaymentIntent, ProcessorApiError> {
        let path = format!("/payment_intents/{id}/confirm");
        let intent = self.post_form::<PaymentIntent>(&path, &FormParams::new(), options).await?;
        info!("💳️ Confirmed payment intent {id}. Status is now {:?}", intent.status);
        Ok(intent)
    }

    pub async fn capture_payment_intent(
        &self,
        id: &str,
        params: &FormParams,
        options: &RequestOptions,
    ) -> Result<PaymentIntent, ProcessorApiError> {
        let path = format!("/payment_intents/{id}/capture");
        let intent = self.post_form::<PaymentIntent>(&path, params, options).await?;
        info!("💳️ Captured payment intent {id}");
        Ok(intent)
    }

    //----------------------------------------       Charges       ----------------------------------------------------

    pub async fn create_charge(&self, params: &FormParams, options: &RequestOptions) -> Result<Charge, ProcessorApiError> {
        let charge = self.post_form::<Charge>("/charges", params, options).await?;
        info!("💳️ Created charge {} (captured: {})", charge.id, charge.captured);
        Ok(charge)
    }

    pub async fn retrieve_charge(&self, id: &str, options: &RequestOptions) -> Result<Charge, ProcessorApiError> {
        let path = format!("/charges/{id}");
        self.get(&path, options).await
    }

    pub async fn capture_charge(&self, id: &str, options: &RequestOptions) -> Result<Charge, ProcessorApiError> {
        let path = format!("/charges/{id}/capture");
        let charge = self.post_form::<Charge>(&path, &FormParams::new(), options).await?;
        info!("💳️ Captured charge {id}");
        Ok(charge)
    }

    //----------------------------------------       Refunds       ----------------------------------------------------

    pub async fn create_refund(&self, params: &FormParams, options: &RequestOptions) -> Result<Refund, ProcessorApiError> {
        let refund = self.post_form::<Refund>("/refunds", params, options).await?;
        info!("💳️ Created refund {} for {} with status {:?}", refund.id, refund.amount, refund.status);
        Ok(refund)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn urls_are_versioned() {
        let api = ProcessorApi::new(GatewayConfig::new("http://localhost:12111/", "sk_test_x")).unwrap();
        assert_eq!(api.url("/payment_intents/pi_1"), "http://localhost:12111/v1/payment_intents/pi_1");
    }

    #[test]
    fn request_options_builder() {
        let opts = RequestOptions::new().on_account(Some("acct_1".into())).with_idempotency_key("payment-1-create");
        assert_eq!(opts.connected_account.as_deref(), Some("acct_1"));
        assert_eq!(opts.idempotency_key.as_deref(), Some("payment-1-create"));
    }
}
