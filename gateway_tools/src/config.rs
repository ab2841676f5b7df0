use std::time::Duration;

use checkout_common::{
    helpers::{env_var_parsed, parse_boolean_flag},
    Secret,
};
use log::*;

const DEFAULT_API_URL: &str = "https://api.stripe.com";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

/// Connection settings for the payment processor.
///
/// The secret key is passed explicitly to every [`crate::ProcessorApi`] instance. There is no process-wide key.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Base URL of the processor REST API, without a trailing slash.
    pub api_url: String,
    pub secret_key: Secret<String>,
    /// Whether the key belongs to the processor's live environment. Used to pick the merchant's connected account.
    pub livemode: bool,
    /// Deadline for a single call to the processor.
    pub timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            secret_key: Secret::default(),
            livemode: false,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl GatewayConfig {
    pub fn new(api_url: &str, secret_key: &str) -> Self {
        Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            secret_key: Secret::new(secret_key.to_string()),
            ..Default::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_livemode(mut self, livemode: bool) -> Self {
        self.livemode = livemode;
        self
    }

    pub fn new_from_env_or_default() -> Self {
        let api_url = std::env::var("CHECKOUT_GATEWAY_API_URL").unwrap_or_else(|_| {
            info!("💳️ CHECKOUT_GATEWAY_API_URL not set, using {DEFAULT_API_URL}");
            DEFAULT_API_URL.to_string()
        });
        let secret_key = std::env::var("CHECKOUT_GATEWAY_SECRET_KEY").unwrap_or_else(|_| {
            warn!("💳️ CHECKOUT_GATEWAY_SECRET_KEY not set, using (probably useless) default");
            "sk_test_00000000000000".to_string()
        });
        let livemode = parse_boolean_flag(std::env::var("CHECKOUT_GATEWAY_LIVEMODE").ok(), false);
        let timeout = env_var_parsed::<u64>("CHECKOUT_GATEWAY_TIMEOUT_MS")
            .unwrap_or_else(|e| {
                error!("💳️ {e}. Using the default gateway timeout instead.");
                None
            })
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_TIMEOUT);
        if livemode && secret_key.starts_with("sk_test") {
            warn!("💳️ Live mode is enabled, but the secret key looks like a test key.");
        }
        Self::new(&api_url, &secret_key).with_livemode(livemode).with_timeout(timeout)
    }
}
