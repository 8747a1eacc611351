//! # order-gateway
//!
//! Payment provider integration for tablecart-rs.
//!
//! This crate provides:
//!
//! 1. **CheckoutApiClient** - `PaymentStrategy` over the provider's hosted
//!    checkout REST API (`reqwest`, 30s timeout, no internal retries)
//!
//! 2. **PaymentService** - creates checkout sessions and refunds, writing the
//!    local row before every provider call
//!
//! 3. **WebhookProcessor** - verifies signed deliveries, persists every raw
//!    event and applies it idempotently
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use order_gateway::{CheckoutApiClient, GatewayConfig, PaymentService};
//!
//! let config = GatewayConfig::from_env()?;
//! let client = Arc::new(CheckoutApiClient::new(config.clone())?);
//! let payments = PaymentService::new(store, client, audit, CheckoutUrls::new(base_url), &config.currency);
//!
//! let handle = payments.create_checkout(order_id).await?;
//! // Redirect the customer to handle.redirect_url
//! ```
//!
//! ## Webhook Handling
//!
//! ```rust,ignore
//! let headers = WebhookHeaders::from_pairs(pairs);
//! match processor.process(&body, &headers).await? {
//!     WebhookOutcome::Processed | WebhookOutcome::AlreadyProcessed | WebhookOutcome::Ignored => {}
//! }
//! ```

pub mod client;
pub mod config;
pub mod service;
pub mod signature;
pub mod webhook;

#[cfg(test)]
mod testing;

// Re-exports
pub use client::CheckoutApiClient;
pub use config::GatewayConfig;
pub use service::{CheckoutHandle, PaymentService};
pub use signature::{WebhookHeaders, WebhookVerifier};
pub use webhook::{WebhookOutcome, WebhookProcessor};
