//! # Order Store
//!
//! Storage abstraction injected into every engine component.
//!
//! Each method is one transaction. Methods that guard an invariant under
//! concurrency (`commit_new_order`, `apply_transition`, `insert_payment`,
//! `attach_checkout`, `abandon_payment`, `compare_and_set_payment`,
//! `insert_refund`, `submit_refund`, `reject_refund`,
//! `compare_and_set_refund`) must check and write atomically inside the
//! backend, never as a read-then-write in the caller. There is no
//! whole-row update: a write can only move a row along its status machine.

use crate::order::{Order, OrderItem, OrderStatus, PaymentStatus, StatusEvent};
use crate::payment::{Payment, PaymentEvent, PaymentRecordStatus, Refund, RefundStatus};
use crate::promo::{PromoCode, PromoCodeUsage};
use crate::strategy::ProviderCheckout;
use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Not found")]
    NotFound,

    /// A uniqueness or compare-and-set guard rejected the write
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Promo usage limit was reached between validation and commit
    #[error("Promo code {code} has reached its usage limit")]
    PromoExhausted { code: String },

    #[error("Backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Everything written when an order is created
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub initial_event: StatusEvent,
    /// Promo whose `usage_count` is incremented
    pub promo_code: Option<String>,
    /// Ledger row, only when the user is known
    pub promo_usage: Option<PromoCodeUsage>,
}

/// A row as it was before a write and as the write left it
#[derive(Debug, Clone, PartialEq)]
pub struct Changed<T> {
    pub before: T,
    pub after: T,
}

/// Result of a conditional update
#[derive(Debug, Clone, PartialEq)]
pub enum Conditional<T> {
    /// Guard matched, row updated
    Updated(Changed<T>),
    /// Guard did not match, row returned untouched
    Skipped(T),
}

/// New values for a payment compare-and-set
#[derive(Debug, Clone, Default)]
pub struct PaymentChange {
    pub failure_reason: Option<String>,
    pub raw_response: Option<serde_json::Value>,
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    // ---- orders ----

    /// Insert order, items, initial status event, promo usage and increment
    /// the promo usage counter. All or nothing.
    ///
    /// Fails with `Conflict` on a duplicate order number and with
    /// `PromoExhausted` when the promo hit its usage limit. Returns the promo
    /// counter change, if a promo was redeemed.
    async fn commit_new_order(&self, new_order: NewOrder) -> StoreResult<Option<Changed<PromoCode>>>;

    async fn get_order(&self, order_id: Uuid) -> StoreResult<Option<Order>>;

    async fn get_order_items(&self, order_id: Uuid) -> StoreResult<Vec<OrderItem>>;

    /// Replace the order if its stored status is still `expected`, and append
    /// `event`. `Conflict` otherwise. The stored `payment_status` is kept;
    /// only `set_payment_status` writes it.
    async fn apply_transition(
        &self,
        order: &Order,
        expected: OrderStatus,
        event: StatusEvent,
    ) -> StoreResult<()>;

    async fn set_payment_status(
        &self,
        order_id: Uuid,
        status: PaymentStatus,
    ) -> StoreResult<Changed<Order>>;

    async fn list_status_events(&self, order_id: Uuid) -> StoreResult<Vec<StatusEvent>>;

    /// Non-cancelled orders placed by this user
    async fn count_prior_orders(&self, user_id: &str) -> StoreResult<u32>;

    // ---- promo codes ----

    async fn upsert_promo_code(&self, promo: PromoCode) -> StoreResult<()>;

    async fn find_promo_code(&self, code: &str) -> StoreResult<Option<PromoCode>>;

    async fn count_promo_usage(&self, code: &str, user_id: &str) -> StoreResult<u32>;

    // ---- payments ----

    /// `Conflict` if the order already has an active (pending or succeeded) payment
    async fn insert_payment(&self, payment: Payment) -> StoreResult<()>;

    /// Record the provider session on a pending payment that has none yet.
    /// Skipped once the row was abandoned or already attached.
    async fn attach_checkout(
        &self,
        payment_id: Uuid,
        checkout: &ProviderCheckout,
    ) -> StoreResult<Conditional<Payment>>;

    /// Fail a pending payment that never got a provider session
    async fn abandon_payment(&self, payment_id: Uuid, reason: String) -> StoreResult<Conditional<Payment>>;

    async fn find_payment_by_checkout_id(&self, checkout_id: &str) -> StoreResult<Option<Payment>>;

    async fn list_payments(&self, order_id: Uuid) -> StoreResult<Vec<Payment>>;

    /// Move the payment with this checkout id to `to` if its current status
    /// is one of `from`. `NotFound` if no such payment.
    async fn compare_and_set_payment(
        &self,
        checkout_id: &str,
        from: &[PaymentRecordStatus],
        to: PaymentRecordStatus,
        change: PaymentChange,
    ) -> StoreResult<Conditional<Payment>>;

    // ---- refunds ----

    /// `Conflict` if the order already has a pending or processing refund
    async fn insert_refund(&self, refund: Refund) -> StoreResult<()>;

    /// Pending refund without a provider id → `Processing` with this id
    async fn submit_refund(
        &self,
        refund_id: Uuid,
        provider_refund_id: String,
    ) -> StoreResult<Conditional<Refund>>;

    /// Pending refund without a provider id → `Failed`
    async fn reject_refund(&self, refund_id: Uuid, message: String) -> StoreResult<Conditional<Refund>>;

    async fn list_refunds(&self, order_id: Uuid) -> StoreResult<Vec<Refund>>;

    /// Same contract as `compare_and_set_payment`, keyed by provider refund id
    async fn compare_and_set_refund(
        &self,
        provider_refund_id: &str,
        from: &[RefundStatus],
        to: RefundStatus,
        failure_message: Option<String>,
    ) -> StoreResult<Conditional<Refund>>;

    // ---- payment events ----

    async fn insert_payment_event(&self, event: PaymentEvent) -> StoreResult<()>;

    /// Fill in the processing outcome. Nothing else on the row changes.
    async fn record_event_outcome(
        &self,
        event_id: Uuid,
        order_id: Option<Uuid>,
        outcome: &str,
        error: Option<String>,
    ) -> StoreResult<()>;

    async fn list_payment_events(&self) -> StoreResult<Vec<PaymentEvent>>;
}
