//! # Order Lifecycle
//!
//! Creates orders from carts and moves them through the status machine.
//!
//! ```text
//! create:     Cart ──► quote ──► NewOrder ──► store.commit_new_order
//!                                   ▲              │ Conflict (order number)
//!                                   └── retry ◄────┘ PromoExhausted → re-quote
//!
//! transition: load ──► transition table ──► actor check ──► apply_status
//!                                                              │
//!                                      store.apply_transition ◄┘ (CAS on status)
//! ```

use crate::actor::Actor;
use crate::audit::{self, AuditEntry, AuditLogger};
use crate::error::{OrderError, OrderResult};
use crate::order::{
    AddressSnapshot, CustomerSnapshot, Order, OrderDetail, OrderItem, OrderItemModifier,
    OrderStatus, OrderType, PaymentStatus, StatusEvent,
};
use crate::pricing::{Cart, PricingCalculator, PricingResult};
use crate::promo::PromoCodeUsage;
use crate::store::{NewOrder, OrderStore, StoreError};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Attempts at a unique order number before giving up
pub const MAX_ORDER_NUMBER_ATTEMPTS: u32 = 5;

/// Everything needed to place an order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    #[serde(flatten)]
    pub cart: Cart,
    pub customer: CustomerSnapshot,
    #[serde(default)]
    pub delivery_address: Option<AddressSnapshot>,
    #[serde(default)]
    pub table_number: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl OrderRequest {
    pub fn new(cart: Cart, customer: CustomerSnapshot) -> Self {
        Self {
            cart,
            customer,
            delivery_address: None,
            table_number: None,
            notes: None,
        }
    }

    pub fn with_address(mut self, address: AddressSnapshot) -> Self {
        self.delivery_address = Some(address);
        self
    }

    pub fn with_table(mut self, table_number: impl Into<String>) -> Self {
        self.table_number = Some(table_number.into());
        self
    }

    pub fn validate(&self) -> OrderResult<()> {
        self.cart.validate()?;
        if self.customer.name.trim().is_empty() {
            return Err(OrderError::validation("customer.name", "customer name is required"));
        }
        if self.cart.order_type == OrderType::Delivery && self.delivery_address.is_none() {
            return Err(OrderError::validation(
                "delivery_address",
                "delivery orders need an address",
            ));
        }
        Ok(())
    }
}

/// `{prefix}-{YYYYMMDD}-{6 random uppercase characters}`
pub fn generate_order_number(prefix: &str, now: DateTime<Utc>) -> String {
    let random = Uuid::new_v4().simple().to_string().to_uppercase();
    format!("{}-{}-{}", prefix, now.format("%Y%m%d"), &random[..6])
}

/// Snapshot a priced cart into the rows written at creation
fn build_new_order(
    request: &OrderRequest,
    pricing: &PricingResult,
    user_id: Option<&str>,
    order_number: String,
    now: DateTime<Utc>,
) -> NewOrder {
    let order_id = Uuid::new_v4();

    let items = pricing
        .lines
        .iter()
        .map(|line| {
            let item_id = Uuid::new_v4();
            OrderItem {
                id: item_id,
                order_id,
                item_id: line.item_id.clone(),
                name: line.name.clone(),
                unit_price_cents: line.unit_price_cents,
                quantity: line.quantity,
                line_subtotal_cents: line.line_subtotal_cents,
                special_instructions: line.special_instructions.clone(),
                modifiers: line
                    .modifiers
                    .iter()
                    .map(|m| OrderItemModifier {
                        id: Uuid::new_v4(),
                        order_item_id: item_id,
                        modifier_id: m.modifier_id.clone(),
                        name: m.name.clone(),
                        price_delta_cents: m.price_delta_cents,
                    })
                    .collect(),
            }
        })
        .collect();

    let order = Order {
        id: order_id,
        order_number,
        user_id: user_id.map(str::to_string),
        order_type: request.cart.order_type,
        status: OrderStatus::PendingPayment,
        payment_status: PaymentStatus::Pending,
        subtotal_cents: pricing.subtotal_cents,
        discount_cents: pricing.discount_cents,
        delivery_fee_cents: pricing.delivery_fee_cents,
        service_fee_cents: pricing.service_fee_cents,
        tip_cents: pricing.tip_cents,
        total_cents: pricing.total_cents,
        customer: request.customer.clone(),
        delivery_address: request.delivery_address.clone(),
        table_number: request.table_number.clone(),
        notes: request.notes.clone(),
        promo_code_used: pricing.promo.as_ref().map(|p| p.code.clone()),
        estimated_prep_minutes: pricing.estimated_prep_minutes,
        estimated_ready_at: now + Duration::minutes(i64::from(pricing.estimated_prep_minutes)),
        created_at: now,
        updated_at: now,
        accepted_at: None,
        actual_ready_at: None,
        delivered_at: None,
        cancelled_at: None,
        cancellation_reason: None,
        cancelled_by: None,
    };

    let promo_usage = match (&pricing.promo, user_id) {
        (Some(promo), Some(user_id)) => Some(PromoCodeUsage {
            id: Uuid::new_v4(),
            code: promo.code.clone(),
            user_id: user_id.to_string(),
            order_id,
            discount_cents: promo.discount_cents,
            used_at: now,
        }),
        _ => None,
    };

    NewOrder {
        initial_event: StatusEvent::new(
            order_id,
            None,
            OrderStatus::PendingPayment,
            Actor::System,
            Some("order created".to_string()),
        ),
        promo_code: pricing.promo.as_ref().map(|p| p.code.clone()),
        promo_usage,
        order,
        items,
    }
}

/// Who may move an order where. The transition table is checked first.
fn authorize_transition(order: &Order, to: OrderStatus, actor: &Actor) -> OrderResult<()> {
    match actor {
        Actor::Customer { user_id } => {
            if to != OrderStatus::Cancelled {
                return Err(OrderError::PermissionDenied(format!(
                    "customers cannot move orders to {}",
                    to
                )));
            }
            if order.user_id.as_deref() != Some(user_id.as_str()) {
                return Err(OrderError::PermissionDenied(
                    "customers can only cancel their own orders".to_string(),
                ));
            }
        }
        Actor::Staff { .. } | Actor::System => {}
    }

    // Payment confirmation places orders; only a manager may do it by hand.
    if to == OrderStatus::Placed && !actor.is_elevated() {
        return Err(OrderError::PermissionDenied(
            "only payment confirmation or a manager can place an order".to_string(),
        ));
    }

    if to == OrderStatus::Cancelled && order.status.cancel_requires_elevation() && !actor.is_elevated()
    {
        return Err(OrderError::PermissionDenied(format!(
            "cancelling an order in {} requires a manager",
            order.status
        )));
    }
    Ok(())
}

/// Order creation and status transitions
#[derive(Clone)]
pub struct OrderLifecycle {
    store: Arc<dyn OrderStore>,
    pricing: PricingCalculator,
    audit: Arc<dyn AuditLogger>,
}

impl OrderLifecycle {
    pub fn new(
        store: Arc<dyn OrderStore>,
        pricing: PricingCalculator,
        audit: Arc<dyn AuditLogger>,
    ) -> Self {
        Self {
            store,
            pricing,
            audit,
        }
    }

    pub fn pricing(&self) -> &PricingCalculator {
        &self.pricing
    }

    /// Price a cart without creating anything
    pub async fn quote(&self, cart: &Cart, user_id: Option<&str>) -> OrderResult<PricingResult> {
        self.pricing.quote(cart, user_id).await
    }

    /// Price and persist a new order in `PENDING_PAYMENT`.
    ///
    /// Order, items, initial status event and promo usage are committed in
    /// one store call. A promo that ran out between quote and commit is
    /// dropped and the order re-priced without it.
    #[instrument(skip(self, request), fields(order_type = %request.cart.order_type, user_id = ?user_id))]
    pub async fn create(&self, request: OrderRequest, user_id: Option<&str>) -> OrderResult<OrderDetail> {
        request.validate()?;
        let settings = self.pricing.settings().await?;
        let mut pricing = self.pricing.quote(&request.cart, user_id).await?;

        let mut attempt = 0;
        loop {
            attempt += 1;
            let now = Utc::now();
            let order_number = generate_order_number(&settings.order_number_prefix, now);
            let new_order = build_new_order(&request, &pricing, user_id, order_number, now);
            let detail = OrderDetail {
                order: new_order.order.clone(),
                items: new_order.items.clone(),
            };

            match self.store.commit_new_order(new_order).await {
                Ok(redeemed) => {
                    info!(
                        order_id = %detail.order.id,
                        order_number = %detail.order.order_number,
                        total_cents = detail.order.total_cents,
                        "order created"
                    );
                    audit::record(
                        self.audit.as_ref(),
                        AuditEntry::new("order.created", "order", detail.order.id, &Actor::System)
                            .with_after(&detail.order),
                    )
                    .await;
                    if let Some(change) = redeemed {
                        audit::record(
                            self.audit.as_ref(),
                            AuditEntry::new("promo.redeemed", "promo_code", &change.after.code, &Actor::System)
                                .with_before(&change.before)
                                .with_after(&change.after),
                        )
                        .await;
                    }
                    return Ok(detail);
                }
                Err(StoreError::Conflict(reason)) if attempt < MAX_ORDER_NUMBER_ATTEMPTS => {
                    warn!(attempt, %reason, "order number collision, retrying");
                }
                Err(StoreError::PromoExhausted { code }) if pricing.promo.is_some() => {
                    info!(%code, "promo code ran out before commit, pricing without it");
                    pricing = self.pricing.quote_without_promo(&request.cart).await?;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Move an order to `to` on behalf of `actor`
    #[instrument(skip(self, actor, reason), fields(actor = %actor.label()))]
    pub async fn transition(
        &self,
        order_id: Uuid,
        to: OrderStatus,
        actor: &Actor,
        reason: Option<String>,
    ) -> OrderResult<Order> {
        let current = self.load_order(order_id).await?;

        if !current.status.can_transition_to(to) {
            info!(
                order_number = %current.order_number,
                from = %current.status,
                %to,
                "rejected illegal transition"
            );
            return Err(OrderError::InvalidState(format!(
                "order {} cannot move from {} to {}",
                current.order_number, current.status, to
            )));
        }
        authorize_transition(&current, to, actor)?;

        let mut updated = current.clone();
        updated.apply_status(to, actor, reason.clone(), Utc::now());
        let event = StatusEvent::new(order_id, Some(current.status), to, actor.clone(), reason);
        self.store
            .apply_transition(&updated, current.status, event)
            .await?;

        info!(
            order_number = %updated.order_number,
            from = %current.status,
            %to,
            "order status changed"
        );
        audit::record(
            self.audit.as_ref(),
            AuditEntry::new("order.status_changed", "order", order_id, actor)
                .with_before(&current)
                .with_after(&updated),
        )
        .await;

        Ok(updated)
    }

    pub async fn get(&self, order_id: Uuid) -> OrderResult<OrderDetail> {
        let order = self.load_order(order_id).await?;
        let items = self.store.get_order_items(order_id).await?;
        Ok(OrderDetail { order, items })
    }

    /// Status history, oldest first
    pub async fn status_events(&self, order_id: Uuid) -> OrderResult<Vec<StatusEvent>> {
        self.load_order(order_id).await?;
        Ok(self.store.list_status_events(order_id).await?)
    }

    async fn load_order(&self, order_id: Uuid) -> OrderResult<Order> {
        self.store
            .get_order(order_id)
            .await?
            .ok_or_else(|| OrderError::not_found("order", order_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::StaffRole;
    use crate::audit::TracingAuditLogger;
    use crate::catalog::{CatalogItem, MenuCatalog};
    use crate::memory::MemoryOrderStore;
    use crate::order::CancelledBy;
    use crate::pricing::CartLine;
    use crate::promo::{PromoCode, PromoValidator};
    use crate::settings::{PricingSettings, StaticSettings};
    use crate::store::{Changed, Conditional, PaymentChange, StoreResult};
    use crate::payment::{Payment, PaymentEvent, PaymentRecordStatus, Refund, RefundStatus};
    use crate::strategy::ProviderCheckout;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Memory store whose next commits fail with queued errors
    struct FailingCommits {
        inner: MemoryOrderStore,
        failures: Mutex<VecDeque<StoreError>>,
        commits: Mutex<Vec<NewOrder>>,
    }

    impl FailingCommits {
        fn new(inner: MemoryOrderStore, failures: Vec<StoreError>) -> Self {
            Self {
                inner,
                failures: Mutex::new(failures.into()),
                commits: Mutex::new(Vec::new()),
            }
        }

        fn attempts(&self) -> Vec<NewOrder> {
            self.commits.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl OrderStore for FailingCommits {
        async fn commit_new_order(&self, new_order: NewOrder) -> StoreResult<Option<Changed<PromoCode>>> {
            self.commits.lock().unwrap().push(new_order.clone());
            let failure = self.failures.lock().unwrap().pop_front();
            match failure {
                Some(err) => Err(err),
                None => self.inner.commit_new_order(new_order).await,
            }
        }
        async fn get_order(&self, order_id: Uuid) -> StoreResult<Option<Order>> {
            self.inner.get_order(order_id).await
        }
        async fn get_order_items(&self, order_id: Uuid) -> StoreResult<Vec<OrderItem>> {
            self.inner.get_order_items(order_id).await
        }
        async fn apply_transition(&self, order: &Order, expected: OrderStatus, event: StatusEvent) -> StoreResult<()> {
            self.inner.apply_transition(order, expected, event).await
        }
        async fn set_payment_status(&self, order_id: Uuid, status: PaymentStatus) -> StoreResult<Changed<Order>> {
            self.inner.set_payment_status(order_id, status).await
        }
        async fn list_status_events(&self, order_id: Uuid) -> StoreResult<Vec<StatusEvent>> {
            self.inner.list_status_events(order_id).await
        }
        async fn count_prior_orders(&self, user_id: &str) -> StoreResult<u32> {
            self.inner.count_prior_orders(user_id).await
        }
        async fn upsert_promo_code(&self, promo: PromoCode) -> StoreResult<()> {
            self.inner.upsert_promo_code(promo).await
        }
        async fn find_promo_code(&self, code: &str) -> StoreResult<Option<PromoCode>> {
            self.inner.find_promo_code(code).await
        }
        async fn count_promo_usage(&self, code: &str, user_id: &str) -> StoreResult<u32> {
            self.inner.count_promo_usage(code, user_id).await
        }
        async fn insert_payment(&self, payment: Payment) -> StoreResult<()> {
            self.inner.insert_payment(payment).await
        }
        async fn attach_checkout(&self, payment_id: Uuid, checkout: &ProviderCheckout) -> StoreResult<Conditional<Payment>> {
            self.inner.attach_checkout(payment_id, checkout).await
        }
        async fn abandon_payment(&self, payment_id: Uuid, reason: String) -> StoreResult<Conditional<Payment>> {
            self.inner.abandon_payment(payment_id, reason).await
        }
        async fn find_payment_by_checkout_id(&self, checkout_id: &str) -> StoreResult<Option<Payment>> {
            self.inner.find_payment_by_checkout_id(checkout_id).await
        }
        async fn list_payments(&self, order_id: Uuid) -> StoreResult<Vec<Payment>> {
            self.inner.list_payments(order_id).await
        }
        async fn compare_and_set_payment(
            &self,
            checkout_id: &str,
            from: &[PaymentRecordStatus],
            to: PaymentRecordStatus,
            change: PaymentChange,
        ) -> StoreResult<Conditional<Payment>> {
            self.inner.compare_and_set_payment(checkout_id, from, to, change).await
        }
        async fn insert_refund(&self, refund: Refund) -> StoreResult<()> {
            self.inner.insert_refund(refund).await
        }
        async fn submit_refund(&self, refund_id: Uuid, provider_refund_id: String) -> StoreResult<Conditional<Refund>> {
            self.inner.submit_refund(refund_id, provider_refund_id).await
        }
        async fn reject_refund(&self, refund_id: Uuid, message: String) -> StoreResult<Conditional<Refund>> {
            self.inner.reject_refund(refund_id, message).await
        }
        async fn list_refunds(&self, order_id: Uuid) -> StoreResult<Vec<Refund>> {
            self.inner.list_refunds(order_id).await
        }
        async fn compare_and_set_refund(
            &self,
            provider_refund_id: &str,
            from: &[RefundStatus],
            to: RefundStatus,
            failure_message: Option<String>,
        ) -> StoreResult<Conditional<Refund>> {
            self.inner
                .compare_and_set_refund(provider_refund_id, from, to, failure_message)
                .await
        }
        async fn insert_payment_event(&self, event: PaymentEvent) -> StoreResult<()> {
            self.inner.insert_payment_event(event).await
        }
        async fn record_event_outcome(
            &self,
            event_id: Uuid,
            order_id: Option<Uuid>,
            outcome: &str,
            error: Option<String>,
        ) -> StoreResult<()> {
            self.inner.record_event_outcome(event_id, order_id, outcome, error).await
        }
        async fn list_payment_events(&self) -> StoreResult<Vec<PaymentEvent>> {
            self.inner.list_payment_events().await
        }
    }

    fn menu() -> MenuCatalog {
        MenuCatalog::new()
            .with_item(CatalogItem::new("burger", "Burger", 1200).with_prep_minutes(12))
            .with_item(CatalogItem::new("fries", "Fries", 400).with_modifier("cheese", "Cheese", 150))
    }

    /// Lifecycle whose commits go through `FailingCommits`
    async fn flaky_lifecycle(failures: Vec<StoreError>) -> (OrderLifecycle, Arc<FailingCommits>) {
        let inner = MemoryOrderStore::new();
        inner
            .upsert_promo_code(PromoCode::fixed("SAVE5", 500))
            .await
            .unwrap();
        let store = Arc::new(FailingCommits::new(inner, failures));
        let pricing = PricingCalculator::new(
            Arc::new(menu()),
            Arc::new(StaticSettings::new(PricingSettings::default())),
            PromoValidator::new(store.clone()),
        );
        (
            OrderLifecycle::new(store.clone(), pricing, Arc::new(TracingAuditLogger)),
            store,
        )
    }

    fn lifecycle() -> (OrderLifecycle, Arc<MemoryOrderStore>) {
        let store = Arc::new(MemoryOrderStore::new());
        let pricing = PricingCalculator::new(
            Arc::new(menu()),
            Arc::new(StaticSettings::new(
                PricingSettings::default().with_delivery_fee(300, None),
            )),
            PromoValidator::new(store.clone()),
        );
        (
            OrderLifecycle::new(store.clone(), pricing, Arc::new(TracingAuditLogger)),
            store,
        )
    }

    fn pickup_request() -> OrderRequest {
        let cart = Cart::new(OrderType::Pickup)
            .with_line(CartLine::new("burger", 2))
            .with_line(CartLine::new("fries", 1).with_modifier("cheese"));
        OrderRequest::new(
            cart,
            CustomerSnapshot {
                name: "Ada".to_string(),
                ..Default::default()
            },
        )
    }

    async fn walk(lifecycle: &OrderLifecycle, order_id: Uuid, path: &[OrderStatus]) {
        let staff = Actor::staff("s1", StaffRole::Staff);
        for status in path {
            let actor = if *status == OrderStatus::Placed {
                Actor::System
            } else {
                staff.clone()
            };
            lifecycle
                .transition(order_id, *status, &actor, None)
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_create_persists_order_and_initial_event() {
        let (lifecycle, store) = lifecycle();

        let detail = lifecycle.create(pickup_request(), Some("u1")).await.unwrap();

        assert_eq!(detail.order.status, OrderStatus::PendingPayment);
        assert_eq!(detail.order.payment_status, PaymentStatus::Pending);
        assert_eq!(detail.order.subtotal_cents, 2400 + 550);
        assert_eq!(detail.order.total_cents, 2950);
        assert_eq!(detail.items.len(), 2);
        assert_eq!(detail.items[1].modifiers[0].order_item_id, detail.items[1].id);
        assert_eq!(
            detail.order.estimated_ready_at - detail.order.created_at,
            Duration::minutes(12)
        );

        let events = store.list_status_events(detail.order.id).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].previous_status, None);
        assert_eq!(events[0].new_status, OrderStatus::PendingPayment);
        assert_eq!(events[0].actor, Actor::System);

        assert_eq!(lifecycle.get(detail.order.id).await.unwrap(), detail);
    }

    #[tokio::test]
    async fn test_delivery_requires_address() {
        let (lifecycle, _) = lifecycle();
        let mut request = pickup_request();
        request.cart.order_type = OrderType::Delivery;

        let err = lifecycle.create(request, None).await.unwrap_err();
        assert!(matches!(err, OrderError::Validation { ref field, .. } if field == "delivery_address"));
    }

    #[tokio::test]
    async fn test_promo_usage_recorded_on_create() {
        let (lifecycle, store) = lifecycle();
        store
            .upsert_promo_code(PromoCode::fixed("WELCOME", 500).with_per_user_limit(1))
            .await
            .unwrap();
        let mut request = pickup_request();
        request.cart.promo_code = Some("welcome".to_string());

        let first = lifecycle.create(request.clone(), Some("u1")).await.unwrap();
        assert_eq!(first.order.discount_cents, 500);
        assert_eq!(first.order.promo_code_used.as_deref(), Some("WELCOME"));
        assert_eq!(store.count_promo_usage("WELCOME", "u1").await.unwrap(), 1);
        assert_eq!(
            store.find_promo_code("WELCOME").await.unwrap().unwrap().usage_count,
            1
        );

        // Second use by the same user gets no discount, but the order goes through.
        let second = lifecycle.create(request, Some("u1")).await.unwrap();
        assert_eq!(second.order.discount_cents, 0);
        assert_eq!(second.order.promo_code_used, None);
    }

    #[tokio::test]
    async fn test_first_order_only_promo() {
        let (lifecycle, store) = lifecycle();
        store
            .upsert_promo_code(PromoCode::fixed("FIRST", 300).first_order_only())
            .await
            .unwrap();
        let mut request = pickup_request();
        request.cart.promo_code = Some("FIRST".to_string());

        let first = lifecycle.create(request.clone(), Some("u2")).await.unwrap();
        assert_eq!(first.order.discount_cents, 300);

        let second = lifecycle.create(request, Some("u2")).await.unwrap();
        assert_eq!(second.order.discount_cents, 0);
    }

    #[tokio::test]
    async fn test_status_walk_records_events() {
        let (lifecycle, _) = lifecycle();
        let order_id = lifecycle.create(pickup_request(), None).await.unwrap().order.id;

        walk(
            &lifecycle,
            order_id,
            &[
                OrderStatus::Placed,
                OrderStatus::Accepted,
                OrderStatus::InPrep,
                OrderStatus::Ready,
                OrderStatus::Completed,
            ],
        )
        .await;

        let order = lifecycle.get(order_id).await.unwrap().order;
        assert_eq!(order.status, OrderStatus::Completed);
        assert!(order.accepted_at.is_some());
        assert!(order.actual_ready_at.is_some());
        assert!(order.delivered_at.is_some());

        let events = lifecycle.status_events(order_id).await.unwrap();
        assert_eq!(events.len(), 6);
        for pair in events.windows(2) {
            assert_eq!(pair[1].previous_status, Some(pair[0].new_status));
        }
    }

    #[tokio::test]
    async fn test_illegal_transition_rejected() {
        let (lifecycle, _) = lifecycle();
        let order_id = lifecycle.create(pickup_request(), None).await.unwrap().order.id;
        walk(&lifecycle, order_id, &[OrderStatus::Placed]).await;

        let err = lifecycle
            .transition(order_id, OrderStatus::InPrep, &Actor::System, None)
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::InvalidState(_)));
        assert_eq!(lifecycle.status_events(order_id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_cancel_in_prep_needs_manager() {
        let (lifecycle, _) = lifecycle();
        let order_id = lifecycle.create(pickup_request(), None).await.unwrap().order.id;
        walk(
            &lifecycle,
            order_id,
            &[OrderStatus::Placed, OrderStatus::Accepted, OrderStatus::InPrep],
        )
        .await;

        let err = lifecycle
            .transition(
                order_id,
                OrderStatus::Cancelled,
                &Actor::staff("s1", StaffRole::Staff),
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::PermissionDenied(_)));

        let order = lifecycle
            .transition(
                order_id,
                OrderStatus::Cancelled,
                &Actor::staff("m1", StaffRole::Manager),
                Some("kitchen fire".to_string()),
            )
            .await
            .unwrap();
        assert_eq!(order.status, OrderStatus::Cancelled);
        assert_eq!(order.cancelled_by, Some(CancelledBy::Staff));
        assert_eq!(order.cancellation_reason.as_deref(), Some("kitchen fire"));
    }

    #[tokio::test]
    async fn test_customer_permissions() {
        let (lifecycle, _) = lifecycle();
        let order_id = lifecycle.create(pickup_request(), Some("u1")).await.unwrap().order.id;
        walk(&lifecycle, order_id, &[OrderStatus::Placed]).await;

        let owner = Actor::customer("u1");
        let err = lifecycle
            .transition(order_id, OrderStatus::Accepted, &owner, None)
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::PermissionDenied(_)));

        let err = lifecycle
            .transition(order_id, OrderStatus::Cancelled, &Actor::customer("u2"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::PermissionDenied(_)));

        let order = lifecycle
            .transition(order_id, OrderStatus::Cancelled, &owner, None)
            .await
            .unwrap();
        assert_eq!(order.cancelled_by, Some(CancelledBy::Customer));
    }

    #[tokio::test]
    async fn test_order_number_collision_retries() {
        let (lifecycle, store) = flaky_lifecycle(vec![
            StoreError::Conflict("order number taken".into()),
            StoreError::Conflict("order number taken".into()),
        ])
        .await;

        let detail = lifecycle.create(pickup_request(), Some("u1")).await.unwrap();

        let attempts = store.attempts();
        assert_eq!(attempts.len(), 3);
        assert_eq!(attempts[2].order.order_number, detail.order.order_number);
        assert!(store.get_order(detail.order.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_order_number_collisions_give_up() {
        let failures = (0..MAX_ORDER_NUMBER_ATTEMPTS)
            .map(|_| StoreError::Conflict("order number taken".into()))
            .collect();
        let (lifecycle, store) = flaky_lifecycle(failures).await;

        let err = lifecycle.create(pickup_request(), Some("u1")).await.unwrap_err();
        assert!(matches!(err, OrderError::InvalidState(_)));
        assert_eq!(store.attempts().len(), MAX_ORDER_NUMBER_ATTEMPTS as usize);
    }

    #[tokio::test]
    async fn test_exhausted_promo_at_commit_reprices_without_it() {
        let (lifecycle, store) = flaky_lifecycle(vec![StoreError::PromoExhausted {
            code: "SAVE5".into(),
        }])
        .await;
        let mut request = pickup_request();
        request.cart.promo_code = Some("SAVE5".to_string());

        let detail = lifecycle.create(request, Some("u1")).await.unwrap();

        let attempts = store.attempts();
        assert_eq!(attempts.len(), 2);
        assert_eq!(attempts[0].order.discount_cents, 500);
        assert_eq!(attempts[0].promo_code.as_deref(), Some("SAVE5"));
        assert_eq!(attempts[1].promo_code, None);
        assert!(attempts[1].promo_usage.is_none());
        assert_eq!(detail.order.discount_cents, 0);
        assert_eq!(detail.order.promo_code_used, None);
        assert_eq!(detail.order.total_cents, attempts[0].order.total_cents + 500);
    }

    #[tokio::test]
    async fn test_only_elevated_actors_place_orders() {
        let (lifecycle, _) = lifecycle();
        let order_id = lifecycle.create(pickup_request(), None).await.unwrap().order.id;

        let err = lifecycle
            .transition(order_id, OrderStatus::Placed, &Actor::staff("s1", StaffRole::Staff), None)
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::PermissionDenied(_)));
        assert_eq!(lifecycle.status_events(order_id).await.unwrap().len(), 1);

        let order = lifecycle
            .transition(
                order_id,
                OrderStatus::Placed,
                &Actor::staff("m1", StaffRole::Manager),
                Some("paid in cash".to_string()),
            )
            .await
            .unwrap();
        assert_eq!(order.status, OrderStatus::Placed);
    }

    #[tokio::test]
    async fn test_missing_order() {
        let (lifecycle, _) = lifecycle();
        let err = lifecycle
            .transition(Uuid::new_v4(), OrderStatus::Placed, &Actor::System, None)
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 404);
    }

    #[test]
    fn test_order_number_format() {
        let now = DateTime::parse_from_rfc3339("2026-03-07T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let number = generate_order_number("ORD", now);

        let parts: Vec<&str> = number.split('-').collect();
        assert_eq!(parts[0], "ORD");
        assert_eq!(parts[1], "20260307");
        assert_eq!(parts[2].len(), 6);
        assert!(parts[2].chars().all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
        assert_ne!(number, generate_order_number("ORD", now));
    }
}
