//! In-memory order store.
//!
//! All tables live behind one `RwLock`; every write method holds the write
//! guard for its whole body, which makes each call a serializable
//! transaction. Useful for tests and single-node development.

use crate::order::{Order, OrderItem, OrderStatus, PaymentStatus, StatusEvent};
use crate::payment::{Payment, PaymentEvent, PaymentRecordStatus, Refund, RefundStatus};
use crate::promo::{normalize_code, PromoCode, PromoCodeUsage};
use crate::store::{
    Changed, Conditional, NewOrder, OrderStore, PaymentChange, StoreError, StoreResult,
};
use crate::strategy::ProviderCheckout;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    orders: HashMap<Uuid, Order>,
    order_numbers: HashSet<String>,
    order_items: HashMap<Uuid, Vec<OrderItem>>,
    status_events: Vec<StatusEvent>,
    promo_codes: HashMap<String, PromoCode>,
    promo_usage: Vec<PromoCodeUsage>,
    payments: Vec<Payment>,
    refunds: Vec<Refund>,
    payment_events: Vec<PaymentEvent>,
}

/// In-memory storage implementation.
#[derive(Clone, Default)]
pub struct MemoryOrderStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply `write` to a refund that is still pending and was never
    /// acknowledged by the provider
    async fn settle_unsent_refund(
        &self,
        refund_id: Uuid,
        write: impl FnOnce(&mut Refund),
    ) -> StoreResult<Conditional<Refund>> {
        let mut tables = self.tables.write().await;
        let refund = tables
            .refunds
            .iter_mut()
            .find(|r| r.id == refund_id)
            .ok_or(StoreError::NotFound)?;

        if refund.status != RefundStatus::Pending || refund.provider_refund_id.is_some() {
            return Ok(Conditional::Skipped(refund.clone()));
        }
        let before = refund.clone();
        write(&mut *refund);
        refund.updated_at = Utc::now();
        Ok(Conditional::Updated(Changed {
            before,
            after: refund.clone(),
        }))
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn commit_new_order(&self, new_order: NewOrder) -> StoreResult<Option<Changed<PromoCode>>> {
        let mut tables = self.tables.write().await;
        let order_id = new_order.order.id;

        // Check every guard before the first write.
        if tables.order_numbers.contains(&new_order.order.order_number) {
            return Err(StoreError::Conflict(format!(
                "order number {} already exists",
                new_order.order.order_number
            )));
        }
        if tables.orders.contains_key(&order_id) {
            return Err(StoreError::Conflict(format!("order {} already exists", order_id)));
        }
        if let Some(code) = &new_order.promo_code {
            let promo = tables
                .promo_codes
                .get(code)
                .ok_or_else(|| StoreError::PromoExhausted { code: code.clone() })?;
            if promo.usage_exhausted() {
                return Err(StoreError::PromoExhausted { code: code.clone() });
            }
        }

        let redeemed = match &new_order.promo_code {
            Some(code) => tables.promo_codes.get_mut(code).map(|promo| {
                let before = promo.clone();
                promo.usage_count += 1;
                Changed {
                    before,
                    after: promo.clone(),
                }
            }),
            None => None,
        };
        if let Some(usage) = new_order.promo_usage {
            tables.promo_usage.push(usage);
        }
        tables
            .order_numbers
            .insert(new_order.order.order_number.clone());
        tables.order_items.insert(order_id, new_order.items);
        tables.status_events.push(new_order.initial_event);
        tables.orders.insert(order_id, new_order.order);
        Ok(redeemed)
    }

    async fn get_order(&self, order_id: Uuid) -> StoreResult<Option<Order>> {
        Ok(self.tables.read().await.orders.get(&order_id).cloned())
    }

    async fn get_order_items(&self, order_id: Uuid) -> StoreResult<Vec<OrderItem>> {
        Ok(self
            .tables
            .read()
            .await
            .order_items
            .get(&order_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn apply_transition(
        &self,
        order: &Order,
        expected: OrderStatus,
        event: StatusEvent,
    ) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let stored = tables.orders.get_mut(&order.id).ok_or(StoreError::NotFound)?;
        if stored.status != expected {
            return Err(StoreError::Conflict(format!(
                "order {} is {} (expected {})",
                order.order_number, stored.status, expected
            )));
        }
        let payment_status = stored.payment_status;
        *stored = order.clone();
        stored.payment_status = payment_status;
        tables.status_events.push(event);
        Ok(())
    }

    async fn set_payment_status(
        &self,
        order_id: Uuid,
        status: PaymentStatus,
    ) -> StoreResult<Changed<Order>> {
        let mut tables = self.tables.write().await;
        let order = tables.orders.get_mut(&order_id).ok_or(StoreError::NotFound)?;
        let before = order.clone();
        order.payment_status = status;
        order.updated_at = Utc::now();
        Ok(Changed {
            before,
            after: order.clone(),
        })
    }

    async fn list_status_events(&self, order_id: Uuid) -> StoreResult<Vec<StatusEvent>> {
        Ok(self
            .tables
            .read()
            .await
            .status_events
            .iter()
            .filter(|e| e.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn count_prior_orders(&self, user_id: &str) -> StoreResult<u32> {
        let tables = self.tables.read().await;
        let count = tables
            .orders
            .values()
            .filter(|o| o.user_id.as_deref() == Some(user_id))
            .filter(|o| o.status != OrderStatus::Cancelled)
            .count();
        Ok(count as u32)
    }

    async fn upsert_promo_code(&self, mut promo: PromoCode) -> StoreResult<()> {
        promo.code = normalize_code(&promo.code);
        let mut tables = self.tables.write().await;
        tables.promo_codes.insert(promo.code.clone(), promo);
        Ok(())
    }

    async fn find_promo_code(&self, code: &str) -> StoreResult<Option<PromoCode>> {
        Ok(self
            .tables
            .read()
            .await
            .promo_codes
            .get(&normalize_code(code))
            .cloned())
    }

    async fn count_promo_usage(&self, code: &str, user_id: &str) -> StoreResult<u32> {
        let code = normalize_code(code);
        let tables = self.tables.read().await;
        let count = tables
            .promo_usage
            .iter()
            .filter(|u| u.code == code && u.user_id == user_id)
            .count();
        Ok(count as u32)
    }

    async fn insert_payment(&self, payment: Payment) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if tables
            .payments
            .iter()
            .any(|p| p.order_id == payment.order_id && p.is_active())
        {
            return Err(StoreError::Conflict(format!(
                "order {} already has an active payment session",
                payment.order_id
            )));
        }
        if let Some(checkout_id) = &payment.provider_checkout_id {
            if tables
                .payments
                .iter()
                .any(|p| p.provider_checkout_id.as_ref() == Some(checkout_id))
            {
                return Err(StoreError::Conflict(format!(
                    "checkout {} already recorded",
                    checkout_id
                )));
            }
        }
        tables.payments.push(payment);
        Ok(())
    }

    async fn attach_checkout(
        &self,
        payment_id: Uuid,
        checkout: &ProviderCheckout,
    ) -> StoreResult<Conditional<Payment>> {
        let mut tables = self.tables.write().await;
        if tables
            .payments
            .iter()
            .any(|p| p.provider_checkout_id.as_deref() == Some(checkout.id.as_str()))
        {
            return Err(StoreError::Conflict(format!(
                "checkout {} already recorded",
                checkout.id
            )));
        }
        let payment = tables
            .payments
            .iter_mut()
            .find(|p| p.id == payment_id)
            .ok_or(StoreError::NotFound)?;

        if payment.status != PaymentRecordStatus::Pending || payment.provider_checkout_id.is_some() {
            return Ok(Conditional::Skipped(payment.clone()));
        }
        let before = payment.clone();
        payment.provider_checkout_id = Some(checkout.id.clone());
        payment.redirect_url = Some(checkout.redirect_url.clone());
        payment.raw_response = Some(checkout.raw.clone());
        payment.updated_at = Utc::now();
        Ok(Conditional::Updated(Changed {
            before,
            after: payment.clone(),
        }))
    }

    async fn abandon_payment(&self, payment_id: Uuid, reason: String) -> StoreResult<Conditional<Payment>> {
        let mut tables = self.tables.write().await;
        let payment = tables
            .payments
            .iter_mut()
            .find(|p| p.id == payment_id)
            .ok_or(StoreError::NotFound)?;

        if payment.status != PaymentRecordStatus::Pending || payment.provider_checkout_id.is_some() {
            return Ok(Conditional::Skipped(payment.clone()));
        }
        let before = payment.clone();
        payment.status = PaymentRecordStatus::Failed;
        payment.failure_reason = Some(reason);
        payment.updated_at = Utc::now();
        Ok(Conditional::Updated(Changed {
            before,
            after: payment.clone(),
        }))
    }

    async fn find_payment_by_checkout_id(&self, checkout_id: &str) -> StoreResult<Option<Payment>> {
        Ok(self
            .tables
            .read()
            .await
            .payments
            .iter()
            .find(|p| p.provider_checkout_id.as_deref() == Some(checkout_id))
            .cloned())
    }

    async fn list_payments(&self, order_id: Uuid) -> StoreResult<Vec<Payment>> {
        Ok(self
            .tables
            .read()
            .await
            .payments
            .iter()
            .filter(|p| p.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn compare_and_set_payment(
        &self,
        checkout_id: &str,
        from: &[PaymentRecordStatus],
        to: PaymentRecordStatus,
        change: PaymentChange,
    ) -> StoreResult<Conditional<Payment>> {
        let mut tables = self.tables.write().await;
        let payment = tables
            .payments
            .iter_mut()
            .find(|p| p.provider_checkout_id.as_deref() == Some(checkout_id))
            .ok_or(StoreError::NotFound)?;

        if !from.contains(&payment.status) {
            return Ok(Conditional::Skipped(payment.clone()));
        }
        let before = payment.clone();
        payment.status = to;
        if change.failure_reason.is_some() {
            payment.failure_reason = change.failure_reason;
        }
        if change.raw_response.is_some() {
            payment.raw_response = change.raw_response;
        }
        payment.updated_at = Utc::now();
        Ok(Conditional::Updated(Changed {
            before,
            after: payment.clone(),
        }))
    }

    async fn insert_refund(&self, refund: Refund) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if tables
            .refunds
            .iter()
            .any(|r| r.order_id == refund.order_id && r.status.is_in_flight())
        {
            return Err(StoreError::Conflict(format!(
                "order {} already has a refund in progress",
                refund.order_id
            )));
        }
        tables.refunds.push(refund);
        Ok(())
    }

    async fn submit_refund(
        &self,
        refund_id: Uuid,
        provider_refund_id: String,
    ) -> StoreResult<Conditional<Refund>> {
        self.settle_unsent_refund(refund_id, |refund| {
            refund.provider_refund_id = Some(provider_refund_id);
            refund.status = RefundStatus::Processing;
        })
        .await
    }

    async fn reject_refund(&self, refund_id: Uuid, message: String) -> StoreResult<Conditional<Refund>> {
        self.settle_unsent_refund(refund_id, |refund| {
            refund.status = RefundStatus::Failed;
            refund.failure_message = Some(message);
        })
        .await
    }

    async fn list_refunds(&self, order_id: Uuid) -> StoreResult<Vec<Refund>> {
        Ok(self
            .tables
            .read()
            .await
            .refunds
            .iter()
            .filter(|r| r.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn compare_and_set_refund(
        &self,
        provider_refund_id: &str,
        from: &[RefundStatus],
        to: RefundStatus,
        failure_message: Option<String>,
    ) -> StoreResult<Conditional<Refund>> {
        let mut tables = self.tables.write().await;
        let refund = tables
            .refunds
            .iter_mut()
            .find(|r| r.provider_refund_id.as_deref() == Some(provider_refund_id))
            .ok_or(StoreError::NotFound)?;

        if !from.contains(&refund.status) {
            return Ok(Conditional::Skipped(refund.clone()));
        }
        let before = refund.clone();
        refund.status = to;
        if failure_message.is_some() {
            refund.failure_message = failure_message;
        }
        refund.updated_at = Utc::now();
        Ok(Conditional::Updated(Changed {
            before,
            after: refund.clone(),
        }))
    }

    async fn insert_payment_event(&self, event: PaymentEvent) -> StoreResult<()> {
        self.tables.write().await.payment_events.push(event);
        Ok(())
    }

    async fn record_event_outcome(
        &self,
        event_id: Uuid,
        order_id: Option<Uuid>,
        outcome: &str,
        error: Option<String>,
    ) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let event = tables
            .payment_events
            .iter_mut()
            .find(|e| e.id == event_id)
            .ok_or(StoreError::NotFound)?;
        event.order_id = order_id;
        event.outcome = Some(outcome.to_string());
        event.error = error;
        event.processed_at = Some(Utc::now());
        Ok(())
    }

    async fn list_payment_events(&self) -> StoreResult<Vec<PaymentEvent>> {
        Ok(self.tables.read().await.payment_events.clone())
    }
}
