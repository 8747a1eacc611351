//! # Hosted Checkout Client
//!
//! `PaymentStrategy` over the provider's REST API:
//!
//! - `POST /checkouts` `{amount, currency, successUrl, cancelUrl, failureUrl, metadata}`
//!   → `{id, redirectUrl}`
//! - `POST /checkouts/{id}/refund` with `Idempotency-Key` → `{id, status}`

use crate::config::GatewayConfig;
use async_trait::async_trait;
use order_core::{
    CheckoutRequest, OrderError, OrderResult, PaymentStrategy, ProviderCheckout, ProviderRefund,
    RefundRequest,
};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, error, info, instrument};

/// Provider client for hosted checkout sessions and refunds
pub struct CheckoutApiClient {
    config: GatewayConfig,
    client: Client,
}

impl CheckoutApiClient {
    pub fn new(config: GatewayConfig) -> OrderResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| OrderError::Configuration(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    /// Create from environment variables
    pub fn from_env() -> OrderResult<Self> {
        Self::new(GatewayConfig::from_env()?)
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    fn network_error(&self, err: reqwest::Error) -> OrderError {
        if err.is_timeout() {
            OrderError::Network(format!(
                "{} did not answer within {:?}",
                self.config.provider_name, self.config.request_timeout
            ))
        } else {
            OrderError::Network(err.to_string())
        }
    }

    /// Read a response body, mapping non-2xx to `ExternalService`
    async fn read<T: DeserializeOwned>(&self, response: Response) -> OrderResult<(T, serde_json::Value)> {
        let status = response.status();
        let body = response.text().await.map_err(|e| self.network_error(e))?;

        if !status.is_success() {
            error!(%status, %body, "payment provider error");
            let message = serde_json::from_str::<ProviderErrorResponse>(&body)
                .ok()
                .and_then(ProviderErrorResponse::into_message)
                .unwrap_or_else(|| format!("HTTP {}: {}", status, body));
            return Err(OrderError::ExternalService {
                provider: self.config.provider_name.clone(),
                message,
            });
        }

        let raw: serde_json::Value = serde_json::from_str(&body).map_err(|e| {
            OrderError::Serialization(format!("failed to parse provider response: {}", e))
        })?;
        let parsed = serde_json::from_value(raw.clone()).map_err(|e| {
            OrderError::Serialization(format!("unexpected provider response: {}", e))
        })?;
        Ok((parsed, raw))
    }
}

#[async_trait]
impl PaymentStrategy for CheckoutApiClient {
    #[instrument(skip(self, request), fields(order_number = %request.order_number, amount = request.amount_cents))]
    async fn create_checkout(&self, request: &CheckoutRequest) -> OrderResult<ProviderCheckout> {
        let mut metadata = request.metadata.clone();
        metadata.insert("order_id".to_string(), request.order_id.to_string());
        metadata.insert("order_number".to_string(), request.order_number.clone());

        let body = CreateCheckoutBody {
            amount: request.amount_cents,
            currency: &request.currency,
            success_url: &request.success_url,
            cancel_url: &request.cancel_url,
            failure_url: &request.failure_url,
            metadata,
        };

        let url = format!("{}/checkouts", self.config.api_base_url);
        debug!(%url, "creating checkout session");

        let response = self
            .client
            .post(&url)
            .header("Authorization", self.config.auth_header())
            .json(&body)
            .send()
            .await
            .map_err(|e| self.network_error(e))?;

        let (checkout, raw): (CheckoutResponse, _) = self.read(response).await?;

        info!(checkout_id = %checkout.id, "created checkout session");

        Ok(ProviderCheckout {
            id: checkout.id,
            redirect_url: checkout.redirect_url,
            raw,
        })
    }

    #[instrument(skip(self, request), fields(checkout_id = %request.checkout_id, amount = request.amount_cents))]
    async fn refund(&self, request: &RefundRequest) -> OrderResult<ProviderRefund> {
        let url = format!(
            "{}/checkouts/{}/refund",
            self.config.api_base_url, request.checkout_id
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", self.config.auth_header())
            .header("Idempotency-Key", &request.idempotency_key)
            .json(&RefundBody {
                amount: request.amount_cents,
                reason: request.reason.as_deref(),
            })
            .send()
            .await
            .map_err(|e| self.network_error(e))?;

        let (refund, raw): (RefundResponse, _) = self.read(response).await?;

        info!(refund_id = %refund.id, status = %refund.status, "refund requested");

        Ok(ProviderRefund {
            id: refund.id,
            status: refund.status,
            raw,
        })
    }

    fn provider_name(&self) -> &str {
        &self.config.provider_name
    }
}

// =============================================================================
// Provider API Types
// =============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateCheckoutBody<'a> {
    amount: i64,
    currency: &'a str,
    success_url: &'a str,
    cancel_url: &'a str,
    failure_url: &'a str,
    metadata: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CheckoutResponse {
    id: String,
    redirect_url: String,
}

#[derive(Debug, Serialize)]
struct RefundBody<'a> {
    amount: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct RefundResponse {
    id: String,
    #[serde(default = "default_refund_status")]
    status: String,
}

fn default_refund_status() -> String {
    "pending".to_string()
}

/// Accepts `{"message": ...}` and `{"error": {"message": ...}}`
#[derive(Debug, Deserialize)]
struct ProviderErrorResponse {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<ProviderErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorDetail {
    message: String,
}

impl ProviderErrorResponse {
    fn into_message(self) -> Option<String> {
        self.error.map(|e| e.message).or(self.message)
    }
}
