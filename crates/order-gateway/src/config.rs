//! # Gateway Configuration
//!
//! Payment provider settings. Secrets are loaded from environment variables.

use order_core::OrderError;
use std::env;
use std::time::Duration;

const DEFAULT_API_BASE_URL: &str = "https://api.payments.example.com";

/// Outbound calls never wait longer than this
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Replay window for webhook timestamps
pub const WEBHOOK_TOLERANCE_SECS: u64 = 180;

/// Payment provider configuration
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Bearer token for the provider API
    pub api_key: String,

    /// Shared secret used to sign webhooks (optionally `whsec_` prefixed, base64)
    pub webhook_secret: String,

    /// API base URL (overridden in tests)
    pub api_base_url: String,

    /// ISO currency every checkout is created in
    pub currency: String,

    /// Recorded on payment rows
    pub provider_name: String,

    pub request_timeout: Duration,

    pub webhook_tolerance_secs: u64,
}

impl GatewayConfig {
    /// Load configuration from environment variables.
    ///
    /// Required env vars:
    /// - `PAYMENT_API_KEY`
    /// - `PAYMENT_WEBHOOK_SECRET`
    ///
    /// Optional: `PAYMENT_API_BASE_URL`, `PAYMENT_CURRENCY` (USD).
    pub fn from_env() -> Result<Self, OrderError> {
        dotenvy::dotenv().ok();

        let api_key = env::var("PAYMENT_API_KEY")
            .map_err(|_| OrderError::Configuration("PAYMENT_API_KEY not set".to_string()))?;

        let webhook_secret = env::var("PAYMENT_WEBHOOK_SECRET").map_err(|_| {
            OrderError::Configuration("PAYMENT_WEBHOOK_SECRET not set".to_string())
        })?;

        if api_key.trim().is_empty() || webhook_secret.trim().is_empty() {
            return Err(OrderError::Configuration(
                "payment credentials must not be empty".to_string(),
            ));
        }

        let mut config = Self::new(api_key, webhook_secret);
        if let Ok(url) = env::var("PAYMENT_API_BASE_URL") {
            config = config.with_api_base_url(url);
        }
        if let Ok(currency) = env::var("PAYMENT_CURRENCY") {
            config.currency = currency.to_uppercase();
        }
        Ok(config)
    }

    /// Create config with explicit values (for testing)
    pub fn new(api_key: impl Into<String>, webhook_secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            webhook_secret: webhook_secret.into(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            currency: "USD".to_string(),
            provider_name: "checkout".to_string(),
            request_timeout: REQUEST_TIMEOUT,
            webhook_tolerance_secs: WEBHOOK_TOLERANCE_SECS,
        }
    }

    /// Get authorization header value
    pub fn auth_header(&self) -> String {
        format!("Bearer {}", self.api_key)
    }

    /// Builder: set custom API base URL (for testing)
    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = currency.into();
        self
    }
}
