//! # Pricing Calculator
//!
//! Turns a cart into an itemized price breakdown. All amounts are integer
//! cents. Given the same cart and the same catalog/settings snapshot the
//! result is always identical.

use crate::catalog::ItemCatalog;
use crate::error::{OrderError, OrderResult};
use crate::order::OrderType;
use crate::promo::{AppliedPromo, PromoContext, PromoValidator};
use crate::settings::{PricingSettings, SettingsStore};
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;

/// One requested line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub item_id: String,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    #[serde(default)]
    pub modifier_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub special_instructions: Option<String>,
}

fn default_quantity() -> u32 {
    1
}

impl CartLine {
    pub fn new(item_id: impl Into<String>, quantity: u32) -> Self {
        Self {
            item_id: item_id.into(),
            quantity,
            modifier_ids: Vec::new(),
            special_instructions: None,
        }
    }

    pub fn with_modifier(mut self, modifier_id: impl Into<String>) -> Self {
        self.modifier_ids.push(modifier_id.into());
        self
    }
}

/// What the customer wants priced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    pub order_type: OrderType,
    pub items: Vec<CartLine>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub promo_code: Option<String>,
    #[serde(default)]
    pub tip_cents: i64,
}

impl Cart {
    pub fn new(order_type: OrderType) -> Self {
        Self {
            order_type,
            items: Vec::new(),
            promo_code: None,
            tip_cents: 0,
        }
    }

    pub fn with_line(mut self, line: CartLine) -> Self {
        self.items.push(line);
        self
    }

    pub fn with_promo(mut self, code: impl Into<String>) -> Self {
        self.promo_code = Some(code.into());
        self
    }

    pub fn with_tip(mut self, tip_cents: i64) -> Self {
        self.tip_cents = tip_cents;
        self
    }

    pub fn validate(&self) -> OrderResult<()> {
        if self.items.is_empty() {
            return Err(OrderError::validation("items", "cart has no items"));
        }
        if self.tip_cents < 0 {
            return Err(OrderError::validation("tip_cents", "tip cannot be negative"));
        }
        if let Some(line) = self.items.iter().find(|l| l.item_id.trim().is_empty()) {
            return Err(OrderError::validation(
                "items.item_id",
                format!("empty item id (quantity {})", line.quantity),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricedModifier {
    pub modifier_id: String,
    pub name: String,
    pub price_delta_cents: i64,
}

/// A cart line resolved against the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricedLine {
    pub item_id: String,
    pub name: String,
    pub unit_price_cents: i64,
    pub modifiers: Vec<PricedModifier>,
    pub quantity: u32,
    pub line_subtotal_cents: i64,
    pub prep_minutes: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub special_instructions: Option<String>,
}

/// Itemized breakdown
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingResult {
    pub order_type: OrderType,
    pub lines: Vec<PricedLine>,
    pub subtotal_cents: i64,
    pub discount_cents: i64,
    pub delivery_fee_cents: i64,
    pub service_fee_cents: i64,
    pub tip_cents: i64,
    pub total_cents: i64,
    pub estimated_prep_minutes: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub promo: Option<AppliedPromo>,
}

/// `round(cents × percent / 100)`, halves away from zero
pub fn percent_of(cents: i64, percent: Decimal) -> i64 {
    (Decimal::from(cents) * percent / Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .unwrap_or(0)
}

/// `(base + Σ deltas) × qty`
pub fn line_subtotal(unit_price_cents: i64, modifier_deltas: &[i64], quantity: u32) -> i64 {
    (unit_price_cents + modifier_deltas.iter().sum::<i64>()) * i64::from(quantity)
}

/// Flat fee for delivery, waived at or above the free-delivery threshold
pub fn delivery_fee(order_type: OrderType, subtotal_cents: i64, settings: &PricingSettings) -> i64 {
    if order_type != OrderType::Delivery {
        return 0;
    }
    match settings.free_delivery_threshold_cents {
        Some(threshold) if subtotal_cents >= threshold => 0,
        _ => settings.delivery_fee_cents,
    }
}

pub fn service_fee(subtotal_cents: i64, settings: &PricingSettings) -> i64 {
    percent_of(subtotal_cents, settings.service_fee_percent)
}

/// `max(0, subtotal − discount + fees) + tip`; the tip is never discounted
pub fn order_total(
    subtotal_cents: i64,
    discount_cents: i64,
    delivery_fee_cents: i64,
    service_fee_cents: i64,
    tip_cents: i64,
) -> i64 {
    (subtotal_cents - discount_cents + delivery_fee_cents + service_fee_cents).max(0) + tip_cents
}

/// Pure breakdown over already-resolved lines
pub fn summarize(
    order_type: OrderType,
    lines: Vec<PricedLine>,
    settings: &PricingSettings,
    promo: Option<AppliedPromo>,
    tip_cents: i64,
) -> PricingResult {
    let subtotal_cents: i64 = lines.iter().map(|l| l.line_subtotal_cents).sum();
    let delivery_fee_cents = delivery_fee(order_type, subtotal_cents, settings);
    let service_fee_cents = service_fee(subtotal_cents, settings);
    let discount_cents = promo.as_ref().map_or(0, |p| p.discount_cents);
    let longest_prep = lines.iter().map(|l| l.prep_minutes).max().unwrap_or(0);
    let estimated_prep_minutes = if longest_prep == 0 {
        settings.base_prep_minutes
    } else {
        longest_prep
    };

    PricingResult {
        order_type,
        total_cents: order_total(
            subtotal_cents,
            discount_cents,
            delivery_fee_cents,
            service_fee_cents,
            tip_cents,
        ),
        lines,
        subtotal_cents,
        discount_cents,
        delivery_fee_cents,
        service_fee_cents,
        tip_cents,
        estimated_prep_minutes,
        promo,
    }
}

/// Prices carts against the catalog, settings and promo codes
#[derive(Clone)]
pub struct PricingCalculator {
    catalog: Arc<dyn ItemCatalog>,
    settings: Arc<dyn SettingsStore>,
    promos: PromoValidator,
}

impl PricingCalculator {
    pub fn new(
        catalog: Arc<dyn ItemCatalog>,
        settings: Arc<dyn SettingsStore>,
        promos: PromoValidator,
    ) -> Self {
        Self {
            catalog,
            settings,
            promos,
        }
    }

    pub async fn settings(&self) -> OrderResult<PricingSettings> {
        self.settings.pricing_settings().await
    }

    /// Price a cart, applying its promo code if it qualifies
    #[instrument(skip(self, cart), fields(order_type = %cart.order_type, lines = cart.items.len()))]
    pub async fn quote(&self, cart: &Cart, user_id: Option<&str>) -> OrderResult<PricingResult> {
        self.price(cart, user_id, true, Utc::now()).await
    }

    /// Price a cart ignoring its promo code
    pub async fn quote_without_promo(&self, cart: &Cart) -> OrderResult<PricingResult> {
        self.price(cart, None, false, Utc::now()).await
    }

    async fn price(
        &self,
        cart: &Cart,
        user_id: Option<&str>,
        apply_promo: bool,
        now: DateTime<Utc>,
    ) -> OrderResult<PricingResult> {
        cart.validate()?;
        let settings = self.settings.pricing_settings().await?;

        let mut lines = Vec::with_capacity(cart.items.len());
        for line in &cart.items {
            lines.push(self.resolve_line(line).await?);
        }
        let subtotal_cents: i64 = lines.iter().map(|l| l.line_subtotal_cents).sum();

        let promo = match (&cart.promo_code, apply_promo) {
            (Some(code), true) if !code.trim().is_empty() => {
                let ctx = PromoContext {
                    subtotal_cents,
                    order_type: cart.order_type,
                    user_id,
                    now,
                };
                self.promos.discount(code, ctx).await?
            }
            _ => None,
        };

        Ok(summarize(cart.order_type, lines, &settings, promo, cart.tip_cents))
    }

    async fn resolve_line(&self, line: &CartLine) -> OrderResult<PricedLine> {
        let item = self
            .catalog
            .get_item(&line.item_id)
            .await?
            .filter(|item| item.active)
            .ok_or_else(|| OrderError::ItemUnavailable {
                item_id: line.item_id.clone(),
            })?;

        let mut modifiers = Vec::with_capacity(line.modifier_ids.len());
        for modifier_id in &line.modifier_ids {
            let modifier = item.modifier(modifier_id).ok_or_else(|| OrderError::ItemUnavailable {
                item_id: format!("{}/{}", item.id, modifier_id),
            })?;
            modifiers.push(PricedModifier {
                modifier_id: modifier.id.clone(),
                name: modifier.name.clone(),
                price_delta_cents: modifier.price_delta_cents,
            });
        }

        let quantity = line.quantity.max(1);
        let deltas: Vec<i64> = modifiers.iter().map(|m| m.price_delta_cents).collect();

        Ok(PricedLine {
            line_subtotal_cents: line_subtotal(item.price_cents, &deltas, quantity),
            item_id: item.id,
            name: item.name,
            unit_price_cents: item.price_cents,
            modifiers,
            quantity,
            prep_minutes: item.prep_minutes,
            special_instructions: line.special_instructions.clone(),
        })
    }
}
