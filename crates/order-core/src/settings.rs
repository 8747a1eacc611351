//! # Settings Store
//!
//! Restaurant-wide pricing settings (fees, thresholds, prep defaults).
//! Loaded from `config/pricing.toml` by the API binary.

use crate::error::OrderResult;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Pricing configuration consumed by the calculator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingSettings {
    /// Flat fee for delivery orders
    #[serde(default)]
    pub delivery_fee_cents: i64,

    /// Subtotal at or above which delivery is free
    #[serde(default)]
    pub free_delivery_threshold_cents: Option<i64>,

    /// Service fee as a percentage of the subtotal
    #[serde(default)]
    pub service_fee_percent: Decimal,

    /// Prep estimate used when no item declares its own
    #[serde(default = "default_base_prep_minutes")]
    pub base_prep_minutes: u32,

    /// Prefix for human-readable order numbers
    #[serde(default = "default_order_number_prefix")]
    pub order_number_prefix: String,
}

fn default_base_prep_minutes() -> u32 {
    15
}

fn default_order_number_prefix() -> String {
    "ORD".to_string()
}

impl Default for PricingSettings {
    fn default() -> Self {
        Self {
            delivery_fee_cents: 0,
            free_delivery_threshold_cents: None,
            service_fee_percent: Decimal::ZERO,
            base_prep_minutes: default_base_prep_minutes(),
            order_number_prefix: default_order_number_prefix(),
        }
    }
}

impl PricingSettings {
    /// Builder: set delivery fee and optional free-delivery threshold
    pub fn with_delivery_fee(mut self, fee_cents: i64, free_threshold_cents: Option<i64>) -> Self {
        self.delivery_fee_cents = fee_cents;
        self.free_delivery_threshold_cents = free_threshold_cents;
        self
    }

    /// Builder: set service fee percent
    pub fn with_service_fee_percent(mut self, percent: Decimal) -> Self {
        self.service_fee_percent = percent;
        self
    }

    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(toml_str)
    }
}

/// Settings Store collaborator
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn pricing_settings(&self) -> OrderResult<PricingSettings>;
}

/// Settings fixed at startup
#[derive(Debug, Clone, Default)]
pub struct StaticSettings {
    settings: PricingSettings,
}

impl StaticSettings {
    pub fn new(settings: PricingSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl SettingsStore for StaticSettings {
    async fn pricing_settings(&self) -> OrderResult<PricingSettings> {
        Ok(self.settings.clone())
    }
}
