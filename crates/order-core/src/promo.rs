//! # Promo Codes
//!
//! Promo code records, the usage ledger and the validator used by pricing.
//!
//! A code that does not exist and a code that exists but does not qualify
//! both yield "no discount". The rejection reason is only logged.

use crate::error::OrderResult;
use crate::order::OrderType;
use crate::pricing::percent_of;
use crate::store::OrderStore;
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscountType {
    /// `discount_value` is a percentage of the subtotal
    Percentage,
    /// `discount_value` is an amount in cents
    Fixed,
}

/// Order types a promo applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PromoScope {
    #[default]
    All,
    Delivery,
    Pickup,
    DineIn,
}

impl PromoScope {
    pub fn covers(&self, order_type: OrderType) -> bool {
        match self {
            PromoScope::All => true,
            PromoScope::Delivery => order_type == OrderType::Delivery,
            PromoScope::Pickup => order_type == OrderType::Pickup,
            PromoScope::DineIn => order_type == OrderType::DineIn,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromoCode {
    /// Stored uppercase
    pub code: String,
    #[serde(default)]
    pub description: String,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    #[serde(default)]
    pub max_discount_cents: Option<i64>,
    #[serde(default)]
    pub min_order_cents: i64,
    /// Global cap on redemptions
    #[serde(default)]
    pub usage_limit: Option<u32>,
    #[serde(default)]
    pub per_user_limit: Option<u32>,
    #[serde(default)]
    pub usage_count: u32,
    #[serde(default)]
    pub starts_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ends_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub applies_to: PromoScope,
    #[serde(default)]
    pub first_order_only: bool,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

impl PromoCode {
    pub fn percentage(code: &str, percent: i64) -> Self {
        Self::new(code, DiscountType::Percentage, Decimal::from(percent))
    }

    pub fn fixed(code: &str, cents: i64) -> Self {
        Self::new(code, DiscountType::Fixed, Decimal::from(cents))
    }

    fn new(code: &str, discount_type: DiscountType, discount_value: Decimal) -> Self {
        Self {
            code: normalize_code(code),
            description: String::new(),
            discount_type,
            discount_value,
            max_discount_cents: None,
            min_order_cents: 0,
            usage_limit: None,
            per_user_limit: None,
            usage_count: 0,
            starts_at: None,
            ends_at: None,
            applies_to: PromoScope::All,
            first_order_only: false,
            active: true,
        }
    }

    pub fn with_min_order(mut self, cents: i64) -> Self {
        self.min_order_cents = cents;
        self
    }

    pub fn with_max_discount(mut self, cents: i64) -> Self {
        self.max_discount_cents = Some(cents);
        self
    }

    pub fn with_usage_limit(mut self, limit: u32) -> Self {
        self.usage_limit = Some(limit);
        self
    }

    pub fn with_per_user_limit(mut self, limit: u32) -> Self {
        self.per_user_limit = Some(limit);
        self
    }

    pub fn with_window(mut self, starts_at: Option<DateTime<Utc>>, ends_at: Option<DateTime<Utc>>) -> Self {
        self.starts_at = starts_at;
        self.ends_at = ends_at;
        self
    }

    pub fn applying_to(mut self, scope: PromoScope) -> Self {
        self.applies_to = scope;
        self
    }

    pub fn first_order_only(mut self) -> Self {
        self.first_order_only = true;
        self
    }

    /// Both bounds inclusive; a missing bound is open
    pub fn is_within_window(&self, now: DateTime<Utc>) -> bool {
        self.starts_at.map_or(true, |start| now >= start)
            && self.ends_at.map_or(true, |end| now <= end)
    }

    pub fn usage_exhausted(&self) -> bool {
        self.usage_limit
            .map_or(false, |limit| self.usage_count >= limit)
    }

    /// Discount for `subtotal_cents`, capped at `max_discount_cents` and
    /// never more than the subtotal itself
    pub fn discount_for(&self, subtotal_cents: i64) -> i64 {
        let raw = match self.discount_type {
            DiscountType::Percentage => percent_of(subtotal_cents, self.discount_value),
            DiscountType::Fixed => self.discount_value.round().to_i64().unwrap_or(0),
        };
        let capped = match self.max_discount_cents {
            Some(cap) => raw.min(cap),
            None => raw,
        };
        capped.clamp(0, subtotal_cents.max(0))
    }
}

/// Promo file loaded at startup
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromoCatalog {
    #[serde(default)]
    pub promos: Vec<PromoCode>,
}

impl PromoCatalog {
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        let mut catalog: Self = toml::from_str(toml_str)?;
        for promo in &mut catalog.promos {
            promo.code = normalize_code(&promo.code);
        }
        Ok(catalog)
    }
}

/// Ledger row, one per (promo, user, order)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromoCodeUsage {
    pub id: Uuid,
    pub code: String,
    pub user_id: String,
    pub order_id: Uuid,
    pub discount_cents: i64,
    pub used_at: DateTime<Utc>,
}

/// Lookups are case-insensitive
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// Why a code gave no discount
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromoRejection {
    Unknown,
    Inactive,
    OutsideWindow,
    BelowMinimum { min_order_cents: i64 },
    WrongOrderType,
    UsageLimitReached,
    PerUserLimitReached,
    NotFirstOrder,
}

/// A promo that qualified
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedPromo {
    pub code: String,
    pub discount_cents: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromoDecision {
    Applied(AppliedPromo),
    Rejected(PromoRejection),
}

/// Order facts a promo is judged against
#[derive(Debug, Clone, Copy)]
pub struct PromoContext<'a> {
    pub subtotal_cents: i64,
    pub order_type: OrderType,
    pub user_id: Option<&'a str>,
    pub now: DateTime<Utc>,
}

/// Evaluates promo codes against order context
#[derive(Clone)]
pub struct PromoValidator {
    store: Arc<dyn OrderStore>,
}

impl PromoValidator {
    pub fn new(store: Arc<dyn OrderStore>) -> Self {
        Self { store }
    }

    /// Full decision including the rejection reason
    pub async fn evaluate(&self, code: &str, ctx: PromoContext<'_>) -> OrderResult<PromoDecision> {
        let code = normalize_code(code);
        let Some(promo) = self.store.find_promo_code(&code).await? else {
            return Ok(PromoDecision::Rejected(PromoRejection::Unknown));
        };

        if !promo.active {
            return Ok(PromoDecision::Rejected(PromoRejection::Inactive));
        }
        if !promo.is_within_window(ctx.now) {
            return Ok(PromoDecision::Rejected(PromoRejection::OutsideWindow));
        }
        if ctx.subtotal_cents < promo.min_order_cents {
            return Ok(PromoDecision::Rejected(PromoRejection::BelowMinimum {
                min_order_cents: promo.min_order_cents,
            }));
        }
        if !promo.applies_to.covers(ctx.order_type) {
            return Ok(PromoDecision::Rejected(PromoRejection::WrongOrderType));
        }
        if promo.usage_exhausted() {
            return Ok(PromoDecision::Rejected(PromoRejection::UsageLimitReached));
        }

        if let Some(user_id) = ctx.user_id {
            if let Some(limit) = promo.per_user_limit {
                let used = self.store.count_promo_usage(&promo.code, user_id).await?;
                if used >= limit {
                    return Ok(PromoDecision::Rejected(PromoRejection::PerUserLimitReached));
                }
            }
            if promo.first_order_only && self.store.count_prior_orders(user_id).await? > 0 {
                return Ok(PromoDecision::Rejected(PromoRejection::NotFirstOrder));
            }
        }

        Ok(PromoDecision::Applied(AppliedPromo {
            discount_cents: promo.discount_for(ctx.subtotal_cents),
            code: promo.code,
        }))
    }

    /// Discount or nothing; rejections never surface as errors
    pub async fn discount(&self, code: &str, ctx: PromoContext<'_>) -> OrderResult<Option<AppliedPromo>> {
        match self.evaluate(code, ctx).await? {
            PromoDecision::Applied(applied) => Ok(Some(applied)),
            PromoDecision::Rejected(reason) => {
                debug!(code = %normalize_code(code), ?reason, "promo code not applied");
                Ok(None)
            }
        }
    }
}
