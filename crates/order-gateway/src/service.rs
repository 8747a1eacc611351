//! # Payment Service
//!
//! Outbound payment operations: hosted checkout creation and refunds.
//! The local row is always written before the provider is called, so a
//! crash in between leaves a recoverable pending record instead of an
//! untracked provider-side session. Provider answers are recorded with
//! guarded store writes that only move a row forward from `pending`; a
//! late answer never overwrites a row that has since been settled.

use crate::config::REQUEST_TIMEOUT;
use chrono::Utc;
use order_core::audit::{self, AuditEntry, AuditLogger};
use order_core::{
    Actor, BoxedPaymentStrategy, Changed, CheckoutRequest, CheckoutUrls, Conditional, Order,
    OrderError, OrderResult, OrderStatus, OrderStore, Payment, PaymentRecordStatus, PaymentStatus,
    Refund, RefundRequest, RefundStatus,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Where to send the customer to pay
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutHandle {
    pub payment_id: Uuid,
    pub checkout_id: String,
    pub redirect_url: String,
}

/// Checkout and refund operations against the configured provider
#[derive(Clone)]
pub struct PaymentService {
    store: Arc<dyn OrderStore>,
    gateway: BoxedPaymentStrategy,
    audit: Arc<dyn AuditLogger>,
    urls: CheckoutUrls,
    currency: String,
    /// Age after which a pending payment with no provider session is
    /// considered abandoned. No provider call outlives the request timeout.
    abandon_after: Duration,
}

impl PaymentService {
    pub fn new(
        store: Arc<dyn OrderStore>,
        gateway: BoxedPaymentStrategy,
        audit: Arc<dyn AuditLogger>,
        urls: CheckoutUrls,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            store,
            gateway,
            audit,
            urls,
            currency: currency.into(),
            abandon_after: REQUEST_TIMEOUT,
        }
    }

    pub fn with_abandon_after(mut self, abandon_after: Duration) -> Self {
        self.abandon_after = abandon_after;
        self
    }

    /// Open a hosted checkout for an order awaiting payment.
    ///
    /// Calling again while a session is pending returns that session. A
    /// pending row whose provider call never completed blocks new sessions
    /// until it is older than the request timeout; it is then failed and
    /// replaced.
    #[instrument(skip(self))]
    pub async fn create_checkout(&self, order_id: Uuid) -> OrderResult<CheckoutHandle> {
        let order = self.load_order(order_id).await?;

        if order.status != OrderStatus::PendingPayment || order.payment_status == PaymentStatus::Paid {
            return Err(OrderError::InvalidState(format!(
                "order {} is not awaiting payment ({}, {:?})",
                order.order_number, order.status, order.payment_status
            )));
        }
        if order.total_cents <= 0 {
            return Err(OrderError::InvalidState(format!(
                "order {} has nothing to charge",
                order.order_number
            )));
        }

        let payments = self.store.list_payments(order_id).await?;
        if let Some(existing) = payments
            .iter()
            .find(|p| p.status == PaymentRecordStatus::Pending)
        {
            match (&existing.provider_checkout_id, &existing.redirect_url) {
                (Some(checkout_id), Some(redirect_url)) => {
                    info!(order_number = %order.order_number, %checkout_id, "reusing pending checkout");
                    return Ok(CheckoutHandle {
                        payment_id: existing.id,
                        checkout_id: checkout_id.clone(),
                        redirect_url: redirect_url.clone(),
                    });
                }
                _ if self.is_abandoned(existing) => {
                    let abandoned = self
                        .abandon(&order, existing.id, "checkout session was never confirmed")
                        .await?;
                    if !abandoned {
                        return Err(OrderError::InvalidState(format!(
                            "checkout for order {} changed concurrently, retry",
                            order.order_number
                        )));
                    }
                }
                _ => {
                    return Err(OrderError::InvalidState(format!(
                        "a checkout for order {} is already being created",
                        order.order_number
                    )))
                }
            }
        }

        let payment = Payment::pending(
            order_id,
            self.gateway.provider_name(),
            order.total_cents,
            &self.currency,
        );
        self.store.insert_payment(payment.clone()).await?;
        audit::record(
            self.audit.as_ref(),
            AuditEntry::new("payment.created", "payment", payment.id, &Actor::System)
                .with_after(&payment),
        )
        .await;

        let request = CheckoutRequest {
            order_id,
            order_number: order.order_number.clone(),
            amount_cents: order.total_cents,
            currency: self.currency.clone(),
            success_url: self.urls.success_url(order_id),
            cancel_url: self.urls.cancel_url(order_id),
            failure_url: self.urls.failure_url(order_id),
            metadata: HashMap::from([("payment_id".to_string(), payment.id.to_string())]),
        };

        let checkout = match self.gateway.create_checkout(&request).await {
            Ok(checkout) => checkout,
            Err(err) => {
                warn!(order_number = %order.order_number, error = %err, "checkout creation failed");
                self.abandon(&order, payment.id, &err.to_string()).await?;
                return Err(err);
            }
        };

        match self.store.attach_checkout(payment.id, &checkout).await? {
            Conditional::Updated(change) => {
                self.audit_change("payment.checkout_created", "payment", payment.id, &change)
                    .await;
            }
            Conditional::Skipped(current) => {
                // Our row was failed as abandoned while the provider was answering.
                warn!(
                    order_number = %order.order_number,
                    checkout_id = %checkout.id,
                    status = ?current.status,
                    "provider session arrived after its payment was abandoned"
                );
                return Err(OrderError::InvalidState(format!(
                    "checkout for order {} was superseded, start a new one",
                    order.order_number
                )));
            }
        }

        // A new session after a failed attempt puts the order back to pending.
        if order.payment_status == PaymentStatus::Failed {
            let change = self
                .store
                .set_payment_status(order_id, PaymentStatus::Pending)
                .await?;
            self.audit_change("order.payment_status_changed", "order", order_id, &change)
                .await;
        }

        info!(
            order_number = %order.order_number,
            checkout_id = %checkout.id,
            amount_cents = order.total_cents,
            "checkout created"
        );

        Ok(CheckoutHandle {
            payment_id: payment.id,
            checkout_id: checkout.id,
            redirect_url: checkout.redirect_url,
        })
    }

    /// Refund part or all of an order's completed payment.
    ///
    /// `amount_cents` defaults to everything still refundable. Refunds are
    /// serialized: while one is pending or processing, new ones are
    /// rejected.
    #[instrument(skip(self, reason, actor), fields(actor = %actor.label()))]
    pub async fn initiate_refund(
        &self,
        order_id: Uuid,
        amount_cents: Option<i64>,
        reason: Option<String>,
        actor: &Actor,
    ) -> OrderResult<Refund> {
        let (order, payment, checkout_id) = self.refundable_payment(order_id, actor).await?;
        let refunds = self.store.list_refunds(order_id).await?;

        if let Some(in_flight) = refunds.iter().find(|r| r.status.is_in_flight()) {
            let detail = if in_flight.provider_refund_id.is_none() {
                "is awaiting the provider and can be resent"
            } else {
                "is in progress"
            };
            return Err(OrderError::InvalidState(format!(
                "order {} already has a refund of {} cents that {}",
                order.order_number, in_flight.amount_cents, detail
            )));
        }

        let already_refunded: i64 = refunds
            .iter()
            .filter(|r| r.status == RefundStatus::Succeeded)
            .map(|r| r.amount_cents)
            .sum();
        let refundable = payment.amount_cents - already_refunded;
        let amount = amount_cents.unwrap_or(refundable);

        if amount <= 0 {
            return Err(OrderError::validation(
                "amount_cents",
                "refund amount must be positive",
            ));
        }
        if amount > refundable {
            return Err(OrderError::InvalidState(format!(
                "refund of {} cents exceeds the {} cents refundable on order {}",
                amount, refundable, order.order_number
            )));
        }

        let refund = Refund::pending(&payment, amount, reason, actor.clone());
        self.store.insert_refund(refund.clone()).await?;
        audit::record(
            self.audit.as_ref(),
            AuditEntry::new("refund.requested", "refund", refund.id, actor).with_after(&refund),
        )
        .await;

        self.send_refund(refund, checkout_id, actor).await
    }

    /// Re-send a refund whose provider call never got an answer, with its
    /// original idempotency key, so the provider applies it at most once.
    #[instrument(skip(self, actor), fields(actor = %actor.label()))]
    pub async fn resend_refund(&self, order_id: Uuid, actor: &Actor) -> OrderResult<Refund> {
        let (order, _, checkout_id) = self.refundable_payment(order_id, actor).await?;
        let unsent = self
            .store
            .list_refunds(order_id)
            .await?
            .into_iter()
            .find(|r| r.status == RefundStatus::Pending && r.provider_refund_id.is_none())
            .ok_or_else(|| {
                OrderError::InvalidState(format!(
                    "order {} has no refund awaiting the provider",
                    order.order_number
                ))
            })?;

        info!(refund_id = %unsent.id, "re-sending unconfirmed refund");
        self.send_refund(unsent, checkout_id, actor).await
    }

    /// Permission, order and completed-payment checks shared by refunds
    async fn refundable_payment(
        &self,
        order_id: Uuid,
        actor: &Actor,
    ) -> OrderResult<(Order, Payment, String)> {
        if !actor.is_elevated() {
            return Err(OrderError::PermissionDenied(
                "refunds require a manager".to_string(),
            ));
        }

        let order = self.load_order(order_id).await?;
        if order.payment_status == PaymentStatus::Refunded {
            return Err(OrderError::InvalidState(format!(
                "order {} is already refunded",
                order.order_number
            )));
        }

        let payment = self
            .store
            .list_payments(order_id)
            .await?
            .into_iter()
            .find(|p| p.status == PaymentRecordStatus::Succeeded)
            .ok_or_else(|| {
                OrderError::InvalidState(format!(
                    "order {} has no completed payment",
                    order.order_number
                ))
            })?;
        let checkout_id = payment.provider_checkout_id.clone().ok_or_else(|| {
            OrderError::Internal(format!("payment {} has no checkout id", payment.id))
        })?;
        Ok((order, payment, checkout_id))
    }

    async fn send_refund(&self, refund: Refund, checkout_id: String, actor: &Actor) -> OrderResult<Refund> {
        let request = RefundRequest {
            checkout_id,
            amount_cents: refund.amount_cents,
            idempotency_key: refund.idempotency_key.clone(),
            reason: refund.reason.clone(),
        };

        match self.gateway.refund(&request).await {
            Ok(provider_refund) => match self.store.submit_refund(refund.id, provider_refund.id).await? {
                Conditional::Updated(change) => {
                    self.audit_as("refund.submitted", "refund", refund.id, actor, &change)
                        .await;
                    info!(refund_id = %refund.id, amount_cents = refund.amount_cents, "refund submitted");
                    Ok(change.after)
                }
                Conditional::Skipped(current) => {
                    debug!(refund_id = %refund.id, status = ?current.status, "refund already acknowledged");
                    Ok(current)
                }
            },
            Err(OrderError::ExternalService { provider, message }) => {
                match self.store.reject_refund(refund.id, message.clone()).await? {
                    Conditional::Updated(change) => {
                        self.audit_as("refund.failed", "refund", refund.id, actor, &change)
                            .await;
                        warn!(refund_id = %refund.id, %message, "provider rejected refund");
                    }
                    Conditional::Skipped(current) => {
                        warn!(refund_id = %refund.id, status = ?current.status, %message, "provider rejected an already settled refund");
                    }
                }
                Err(OrderError::ExternalService { provider, message })
            }
            Err(err) => {
                warn!(refund_id = %refund.id, error = %err, "refund outcome unknown, left pending");
                Err(err)
            }
        }
    }

    fn is_abandoned(&self, payment: &Payment) -> bool {
        (Utc::now() - payment.created_at)
            .to_std()
            .is_ok_and(|age| age >= self.abandon_after)
    }

    /// Fail a pending payment that has no provider session. False when the
    /// row had already moved on.
    async fn abandon(&self, order: &Order, payment_id: Uuid, reason: &str) -> OrderResult<bool> {
        match self.store.abandon_payment(payment_id, reason.to_string()).await? {
            Conditional::Updated(change) => {
                warn!(order_number = %order.order_number, %payment_id, %reason, "payment abandoned");
                self.audit_change("payment.abandoned", "payment", payment_id, &change)
                    .await;
                Ok(true)
            }
            Conditional::Skipped(current) => {
                debug!(%payment_id, status = ?current.status, "payment already moved on");
                Ok(false)
            }
        }
    }

    async fn audit_change<T: Serialize + Sync>(
        &self,
        action: &str,
        entity_type: &str,
        entity_id: Uuid,
        change: &Changed<T>,
    ) {
        self.audit_as(action, entity_type, entity_id, &Actor::System, change)
            .await;
    }

    async fn audit_as<T: Serialize + Sync>(
        &self,
        action: &str,
        entity_type: &str,
        entity_id: Uuid,
        actor: &Actor,
        change: &Changed<T>,
    ) {
        audit::record(
            self.audit.as_ref(),
            AuditEntry::new(action, entity_type, entity_id, actor)
                .with_before(&change.before)
                .with_after(&change.after),
        )
        .await;
    }

    async fn load_order(&self, order_id: Uuid) -> OrderResult<Order> {
        self.store
            .get_order(order_id)
            .await?
            .ok_or_else(|| OrderError::not_found("order", order_id))
    }
}
