//! # Payment Strategy Trait
//!
//! Outbound seam to the payment provider. The HTTP implementation lives in
//! `order-gateway`; tests plug in fakes.
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │            PaymentStrategy (trait)            │
//! │  ├── create_checkout()  POST /checkouts       │
//! │  ├── refund()           POST /checkouts/{id}/refund
//! │  └── provider_name()                          │
//! └───────────────────────────────────────────────┘
//! ```

use crate::error::OrderResult;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Hosted checkout request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckoutRequest {
    pub order_id: Uuid,
    pub order_number: String,
    pub amount_cents: i64,
    pub currency: String,
    pub success_url: String,
    pub cancel_url: String,
    pub failure_url: String,
    pub metadata: HashMap<String, String>,
}

/// Provider's answer to a checkout request
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderCheckout {
    pub id: String,
    pub redirect_url: String,
    pub raw: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RefundRequest {
    pub checkout_id: String,
    pub amount_cents: i64,
    pub idempotency_key: String,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProviderRefund {
    pub id: String,
    pub status: String,
    pub raw: serde_json::Value,
}

/// Core trait for payment provider implementations.
#[async_trait]
pub trait PaymentStrategy: Send + Sync {
    /// Create a hosted checkout session.
    ///
    /// Non-2xx answers map to `OrderError::ExternalService`, transport
    /// failures and timeouts to `OrderError::Network`.
    async fn create_checkout(&self, request: &CheckoutRequest) -> OrderResult<ProviderCheckout>;

    /// Refund a completed checkout, passing `idempotency_key` through.
    async fn refund(&self, request: &RefundRequest) -> OrderResult<ProviderRefund>;

    /// Get the provider name (for logging and payment rows).
    fn provider_name(&self) -> &str;
}

/// Type alias for a shared payment strategy (dynamic dispatch)
pub type BoxedPaymentStrategy = Arc<dyn PaymentStrategy>;

/// Redirect targets handed to the provider
#[derive(Debug, Clone)]
pub struct CheckoutUrls {
    /// Base URL of the storefront (e.g., "https://order.example.com")
    pub base_url: String,
    pub success_path: String,
    pub cancel_path: String,
    pub failure_path: String,
}

impl CheckoutUrls {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            success_path: "/checkout/success".to_string(),
            cancel_path: "/checkout/cancel".to_string(),
            failure_path: "/checkout/failed".to_string(),
        }
    }

    pub fn success_url(&self, order_id: Uuid) -> String {
        format!("{}{}?order_id={}", self.base_url, self.success_path, order_id)
    }

    pub fn cancel_url(&self, order_id: Uuid) -> String {
        format!("{}{}?order_id={}", self.base_url, self.cancel_path, order_id)
    }

    pub fn failure_url(&self, order_id: Uuid) -> String {
        format!("{}{}?order_id={}", self.base_url, self.failure_path, order_id)
    }
}

impl Default for CheckoutUrls {
    fn default() -> Self {
        Self::new("http://localhost:8080")
    }
}
