//! # Webhook Processor
//!
//! Applies provider callbacks to local payment, refund and order state.
//!
//! ```text
//! raw body + headers
//!   │
//!   ├─► verify signature ─► persist PaymentEvent (always, with signature_valid)
//!   │                         │
//!   │            invalid ─────┴─► SecurityError, nothing else touched
//!   │
//!   └─► dispatch on event type
//!         payment.succeeded  CAS payment → succeeded, order paid, PLACED, notify
//!         payment.failed     CAS payment → failed, order payment_status failed
//!         refund.succeeded   CAS refund → succeeded, order refunded
//!         refund.failed      CAS refund → failed
//!         anything else      ignored
//! ```
//!
//! Deliveries are at-least-once. Every state change is a compare-and-set in
//! the store, so a duplicate (even a concurrent one) finds the row already
//! moved and returns `AlreadyProcessed` without side effects.

use crate::signature::{WebhookHeaders, WebhookVerifier};
use chrono::Utc;
use order_core::audit::{self, AuditEntry, AuditLogger};
use order_core::{
    Actor, Changed, Conditional, NotificationDispatcher, Order, OrderError, OrderLifecycle,
    OrderResult, OrderStatus, OrderStore, PaymentChange, PaymentEvent, PaymentRecordStatus,
    PaymentStatus, RefundStatus, StoreError, WebhookEnvelope, WebhookEventKind, WebhookPayload,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// What processing a delivery did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookOutcome {
    Processed,
    /// Duplicate delivery; state already reflects this event
    AlreadyProcessed,
    /// Event type we do not act on
    Ignored,
}

impl WebhookOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookOutcome::Processed => "processed",
            WebhookOutcome::AlreadyProcessed => "already_processed",
            WebhookOutcome::Ignored => "ignored",
        }
    }
}

type Dispatched = (WebhookOutcome, Option<Uuid>);

pub struct WebhookProcessor {
    store: Arc<dyn OrderStore>,
    lifecycle: OrderLifecycle,
    notifier: Arc<dyn NotificationDispatcher>,
    audit: Arc<dyn AuditLogger>,
    verifier: WebhookVerifier,
}

impl WebhookProcessor {
    pub fn new(
        store: Arc<dyn OrderStore>,
        lifecycle: OrderLifecycle,
        notifier: Arc<dyn NotificationDispatcher>,
        audit: Arc<dyn AuditLogger>,
        verifier: WebhookVerifier,
    ) -> Self {
        Self {
            store,
            lifecycle,
            notifier,
            audit,
            verifier,
        }
    }

    pub async fn process(&self, raw_body: &[u8], headers: &WebhookHeaders) -> OrderResult<WebhookOutcome> {
        self.process_at(raw_body, headers, Utc::now().timestamp()).await
    }

    /// Process against an explicit clock (unix seconds)
    #[instrument(skip(self, raw_body, headers), fields(webhook_id = ?headers.id))]
    pub async fn process_at(
        &self,
        raw_body: &[u8],
        headers: &WebhookHeaders,
        now: i64,
    ) -> OrderResult<WebhookOutcome> {
        let body = String::from_utf8_lossy(raw_body).into_owned();
        let verification = self.verifier.verify_at(headers, raw_body, now);
        let envelope = serde_json::from_slice::<WebhookEnvelope>(raw_body);
        let event_type = envelope
            .as_ref()
            .map(|e| e.event_type.clone())
            .unwrap_or_else(|_| "unparseable".to_string());

        let event = PaymentEvent::received(
            headers.id.clone(),
            event_type,
            body.clone(),
            verification.is_ok(),
        );
        let event_id = event.id;
        self.store.insert_payment_event(event).await?;

        if let Err(err) = verification {
            // Full detail stays in our logs; the caller only learns it was rejected.
            warn!(error = %err, payload = %body, "rejected webhook");
            self.store
                .record_event_outcome(event_id, None, "rejected", Some(err.to_string()))
                .await?;
            return Err(err);
        }

        let envelope = match envelope {
            Ok(envelope) => envelope,
            Err(parse_err) => {
                let err = OrderError::validation("body", format!("malformed webhook: {}", parse_err));
                self.store
                    .record_event_outcome(event_id, None, "failed", Some(err.to_string()))
                    .await?;
                return Err(err);
            }
        };

        match self.dispatch(&envelope).await {
            Ok((outcome, order_id)) => {
                info!(event_type = %envelope.event_type, outcome = outcome.as_str(), "webhook handled");
                self.store
                    .record_event_outcome(event_id, order_id, outcome.as_str(), None)
                    .await?;
                Ok(outcome)
            }
            Err(err) => {
                error!(event_type = %envelope.event_type, error = %err, "webhook processing failed");
                self.store
                    .record_event_outcome(event_id, None, "failed", Some(err.to_string()))
                    .await?;
                Err(err)
            }
        }
    }

    async fn dispatch(&self, envelope: &WebhookEnvelope) -> OrderResult<Dispatched> {
        let payload = &envelope.payload;
        match envelope.kind() {
            WebhookEventKind::PaymentSucceeded => self.payment_succeeded(payload).await,
            WebhookEventKind::PaymentFailed => self.payment_failed(payload).await,
            WebhookEventKind::RefundSucceeded => {
                self.refund_settled(payload, RefundStatus::Succeeded).await
            }
            WebhookEventKind::RefundFailed => self.refund_settled(payload, RefundStatus::Failed).await,
            WebhookEventKind::Unknown(event_type) => {
                debug!(%event_type, "ignoring webhook event type");
                Ok((WebhookOutcome::Ignored, None))
            }
        }
    }

    async fn payment_succeeded(&self, payload: &WebhookPayload) -> OrderResult<Dispatched> {
        let change = PaymentChange {
            failure_reason: None,
            raw_response: Some(serde_json::to_value(payload)?),
        };
        let transition = self
            .store
            .compare_and_set_payment(
                &payload.id,
                &[PaymentRecordStatus::Pending, PaymentRecordStatus::Failed],
                PaymentRecordStatus::Succeeded,
                change,
            )
            .await;

        let payment = match transition {
            Ok(Conditional::Updated(change)) => change,
            Ok(Conditional::Skipped(payment)) => {
                info!(checkout_id = %payload.id, "payment already confirmed");
                // A previous delivery may have stopped before placing the order.
                self.place_order(payment.order_id).await?;
                return Ok((WebhookOutcome::AlreadyProcessed, Some(payment.order_id)));
            }
            Err(StoreError::NotFound) => return Err(OrderError::not_found("payment", &payload.id)),
            Err(err) => return Err(err.into()),
        };

        self.audit_change("payment.succeeded", "payment", payment.after.id, &payment)
            .await;
        let order = self
            .store
            .set_payment_status(payment.after.order_id, PaymentStatus::Paid)
            .await?;
        self.audit_payment_status(&order).await;
        let order = order.after;

        if order.status != OrderStatus::PendingPayment {
            warn!(
                order_number = %order.order_number,
                status = %order.status,
                "payment confirmed for an order no longer awaiting payment"
            );
        }
        self.place_order(order.id).await?;
        Ok((WebhookOutcome::Processed, Some(order.id)))
    }

    /// Move a paid order from PENDING_PAYMENT to PLACED and notify once.
    /// Returns false when the order was not (or no longer) awaiting payment.
    async fn place_order(&self, order_id: Uuid) -> OrderResult<bool> {
        let order = self
            .store
            .get_order(order_id)
            .await?
            .ok_or_else(|| OrderError::not_found("order", order_id))?;
        if order.status != OrderStatus::PendingPayment {
            return Ok(false);
        }

        match self
            .lifecycle
            .transition(
                order_id,
                OrderStatus::Placed,
                &Actor::System,
                Some("payment confirmed".to_string()),
            )
            .await
        {
            Ok(_) => {}
            // A concurrent delivery placed it first.
            Err(OrderError::InvalidState(reason)) => {
                debug!(%order_id, %reason, "order already moved on");
                return Ok(false);
            }
            Err(err) => return Err(err),
        }

        if let Err(err) = self.notifier.notify(order_id, OrderStatus::Placed).await {
            warn!(%order_id, error = %err, "order placed but notification failed");
        }
        Ok(true)
    }

    async fn payment_failed(&self, payload: &WebhookPayload) -> OrderResult<Dispatched> {
        let change = PaymentChange {
            failure_reason: payload.failure_reason.clone(),
            raw_response: Some(serde_json::to_value(payload)?),
        };
        let transition = self
            .store
            .compare_and_set_payment(
                &payload.id,
                &[PaymentRecordStatus::Pending],
                PaymentRecordStatus::Failed,
                change,
            )
            .await;

        let payment = match transition {
            Ok(Conditional::Updated(change)) => change,
            Ok(Conditional::Skipped(payment)) => {
                info!(checkout_id = %payload.id, status = ?payment.status, "payment failure already applied or superseded");
                return Ok((WebhookOutcome::AlreadyProcessed, Some(payment.order_id)));
            }
            Err(StoreError::NotFound) => return Err(OrderError::not_found("payment", &payload.id)),
            Err(err) => return Err(err.into()),
        };

        self.audit_change("payment.failed", "payment", payment.after.id, &payment)
            .await;
        let order = self
            .store
            .set_payment_status(payment.after.order_id, PaymentStatus::Failed)
            .await?;
        self.audit_payment_status(&order).await;
        info!(
            checkout_id = %payload.id,
            reason = payload.failure_reason.as_deref().unwrap_or("unspecified"),
            "payment failed"
        );
        Ok((WebhookOutcome::Processed, Some(order.after.id)))
    }

    async fn refund_settled(&self, payload: &WebhookPayload, to: RefundStatus) -> OrderResult<Dispatched> {
        let failure_message = match to {
            RefundStatus::Failed => payload
                .failure_reason
                .clone()
                .or_else(|| Some("refund failed at provider".to_string())),
            _ => None,
        };
        let transition = self
            .store
            .compare_and_set_refund(
                &payload.id,
                &[RefundStatus::Pending, RefundStatus::Processing],
                to,
                failure_message,
            )
            .await;

        let refund = match transition {
            Ok(Conditional::Updated(change)) => change,
            Ok(Conditional::Skipped(refund)) => {
                info!(refund_id = %payload.id, "refund already settled");
                return Ok((WebhookOutcome::AlreadyProcessed, Some(refund.order_id)));
            }
            Err(StoreError::NotFound) => return Err(OrderError::not_found("refund", &payload.id)),
            Err(err) => return Err(err.into()),
        };

        let action = if to == RefundStatus::Succeeded {
            "refund.succeeded"
        } else {
            "refund.failed"
        };
        self.audit_change(action, "refund", refund.after.id, &refund).await;
        if to == RefundStatus::Succeeded {
            let order = self
                .store
                .set_payment_status(refund.after.order_id, PaymentStatus::Refunded)
                .await?;
            self.audit_payment_status(&order).await;
        }
        Ok((WebhookOutcome::Processed, Some(refund.after.order_id)))
    }

    async fn audit_change<T: Serialize + Sync>(
        &self,
        action: &str,
        entity_type: &str,
        entity_id: Uuid,
        change: &Changed<T>,
    ) {
        audit::record(
            self.audit.as_ref(),
            AuditEntry::new(action, entity_type, entity_id, &Actor::System)
                .with_before(&change.before)
                .with_after(&change.after),
        )
        .await;
    }

    async fn audit_payment_status(&self, order: &Changed<Order>) {
        self.audit_change("order.payment_status_changed", "order", order.after.id, order)
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::PaymentService;
    use crate::testing::{engine, mark_paid, FakeGateway, Fixture, RecordingAudit, RecordingNotifier};
    use order_core::{CheckoutUrls, StaffRole, TracingAuditLogger};

    const SECRET: &str = "whsec_dGVzdC1zZWNyZXQ=";
    const NOW: i64 = 1_760_000_000;

    fn processor(fixture: &Fixture, notifier: Arc<RecordingNotifier>) -> WebhookProcessor {
        WebhookProcessor::new(
            fixture.store.clone(),
            fixture.lifecycle.clone(),
            notifier,
            Arc::new(TracingAuditLogger),
            WebhookVerifier::new(SECRET, 180),
        )
    }

    fn signed(secret: &str, id: &str, body: &str) -> WebhookHeaders {
        let sig = WebhookVerifier::new(secret, 180).sign(id, NOW, body.as_bytes());
        WebhookHeaders {
            id: Some(id.to_string()),
            timestamp: Some(NOW.to_string()),
            signature: Some(format!("v1,{}", sig)),
        }
    }

    fn event(event_type: &str, id: &str) -> String {
        format!(r#"{{"type":"{}","payload":{{"id":"{}"}}}}"#, event_type, id)
    }

    #[tokio::test]
    async fn test_duplicate_success_notifies_once() {
        let fixture = engine();
        let notifier = Arc::new(RecordingNotifier::default());
        let processor = processor(&fixture, notifier.clone());
        let order = fixture.pending_order().await;
        fixture.open_checkout(&order, "chk_1").await;

        let body = event("payment.succeeded", "chk_1");
        let headers = signed(SECRET, "msg_1", &body);

        let first = processor.process_at(body.as_bytes(), &headers, NOW).await.unwrap();
        assert_eq!(first, WebhookOutcome::Processed);
        let placed = fixture.order(order.id).await;
        assert_eq!(placed.status, OrderStatus::Placed);
        assert_eq!(placed.payment_status, PaymentStatus::Paid);

        let second = processor.process_at(body.as_bytes(), &headers, NOW).await.unwrap();
        assert_eq!(second, WebhookOutcome::AlreadyProcessed);
        assert_eq!(fixture.order(order.id).await.status, OrderStatus::Placed);

        assert_eq!(notifier.calls(), vec![(order.id, OrderStatus::Placed)]);
        let events = fixture.store.list_status_events(order.id).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].actor, Actor::System);

        let deliveries = fixture.store.list_payment_events().await.unwrap();
        assert_eq!(deliveries.len(), 2);
        assert_eq!(deliveries[0].outcome.as_deref(), Some("processed"));
        assert_eq!(deliveries[1].outcome.as_deref(), Some("already_processed"));
        assert_eq!(deliveries[0].order_id, Some(order.id));
    }

    #[tokio::test]
    async fn test_concurrent_duplicates_notify_once() {
        let fixture = engine();
        let notifier = Arc::new(RecordingNotifier::default());
        let processor = processor(&fixture, notifier.clone());
        let order = fixture.pending_order().await;
        fixture.open_checkout(&order, "chk_1").await;

        let body = event("payment.succeeded", "chk_1");
        let headers = signed(SECRET, "msg_1", &body);

        let (a, b) = tokio::join!(
            processor.process_at(body.as_bytes(), &headers, NOW),
            processor.process_at(body.as_bytes(), &headers, NOW),
        );
        let mut outcomes = vec![a.unwrap(), b.unwrap()];
        outcomes.sort_by_key(|o| o.as_str());
        assert_eq!(
            outcomes,
            vec![WebhookOutcome::AlreadyProcessed, WebhookOutcome::Processed]
        );
        assert_eq!(notifier.calls().len(), 1);
        assert_eq!(fixture.store.list_status_events(order.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_wrong_secret_never_mutates_state() {
        let fixture = engine();
        let notifier = Arc::new(RecordingNotifier::default());
        let processor = processor(&fixture, notifier.clone());
        let order = fixture.pending_order().await;
        fixture.open_checkout(&order, "chk_1").await;

        let body = event("payment.succeeded", "chk_1");
        let headers = signed("whsec_b3RoZXItc2VjcmV0", "msg_1", &body);

        let err = processor
            .process_at(body.as_bytes(), &headers, NOW)
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::Security(_)));

        let order = fixture.order(order.id).await;
        assert_eq!(order.status, OrderStatus::PendingPayment);
        assert_eq!(order.payment_status, PaymentStatus::Pending);
        let payments = fixture.store.list_payments(order.id).await.unwrap();
        assert_eq!(payments[0].status, PaymentRecordStatus::Pending);
        assert!(notifier.calls().is_empty());

        let deliveries = fixture.store.list_payment_events().await.unwrap();
        assert_eq!(deliveries.len(), 1);
        assert!(!deliveries[0].signature_valid);
        assert_eq!(deliveries[0].raw_body, body);
        assert_eq!(deliveries[0].outcome.as_deref(), Some("rejected"));
    }

    #[tokio::test]
    async fn test_stale_delivery_rejected() {
        let fixture = engine();
        let processor = processor(&fixture, Arc::new(RecordingNotifier::default()));

        let body = event("payment.succeeded", "chk_1");
        let headers = signed(SECRET, "msg_1", &body);

        let err = processor
            .process_at(body.as_bytes(), &headers, NOW + 181)
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::Security(_)));
    }

    #[tokio::test]
    async fn test_unknown_event_is_ignored() {
        let fixture = engine();
        let processor = processor(&fixture, Arc::new(RecordingNotifier::default()));

        let body = event("dispute.opened", "dp_1");
        let headers = signed(SECRET, "msg_9", &body);

        let outcome = processor.process_at(body.as_bytes(), &headers, NOW).await.unwrap();
        assert_eq!(outcome, WebhookOutcome::Ignored);

        let deliveries = fixture.store.list_payment_events().await.unwrap();
        assert_eq!(deliveries[0].event_type, "dispute.opened");
        assert_eq!(deliveries[0].outcome.as_deref(), Some("ignored"));
        assert_eq!(deliveries[0].provider_event_id.as_deref(), Some("msg_9"));
    }

    #[tokio::test]
    async fn test_payment_failed_keeps_order_status() {
        let fixture = engine();
        let processor = processor(&fixture, Arc::new(RecordingNotifier::default()));
        let order = fixture.pending_order().await;
        fixture.open_checkout(&order, "chk_1").await;

        let body = r#"{"type":"payment.failed","payload":{"id":"chk_1","failureReason":"card_declined"}}"#;
        let headers = signed(SECRET, "msg_2", body);

        let outcome = processor.process_at(body.as_bytes(), &headers, NOW).await.unwrap();
        assert_eq!(outcome, WebhookOutcome::Processed);

        let updated = fixture.order(order.id).await;
        assert_eq!(updated.status, OrderStatus::PendingPayment);
        assert_eq!(updated.payment_status, PaymentStatus::Failed);
        let payments = fixture.store.list_payments(order.id).await.unwrap();
        assert_eq!(payments[0].failure_reason.as_deref(), Some("card_declined"));
    }

    #[tokio::test]
    async fn test_unknown_checkout_is_not_found() {
        let fixture = engine();
        let processor = processor(&fixture, Arc::new(RecordingNotifier::default()));

        let body = event("payment.succeeded", "chk_missing");
        let headers = signed(SECRET, "msg_3", &body);

        let err = processor
            .process_at(body.as_bytes(), &headers, NOW)
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 404);

        let deliveries = fixture.store.list_payment_events().await.unwrap();
        assert_eq!(deliveries[0].outcome.as_deref(), Some("failed"));
        assert!(deliveries[0].error.is_some());
    }

    #[tokio::test]
    async fn test_refund_settlement() {
        let fixture = engine();
        let processor = processor(&fixture, Arc::new(RecordingNotifier::default()));
        let payments = PaymentService::new(
            fixture.store.clone(),
            Arc::new(FakeGateway::default()),
            Arc::new(TracingAuditLogger),
            CheckoutUrls::default(),
            "USD",
        );
        let order = fixture.pending_order().await;
        mark_paid(&fixture, order.id, "chk_paid").await;

        let refund = payments
            .initiate_refund(order.id, None, None, &Actor::staff("a1", StaffRole::Admin))
            .await
            .unwrap();
        let refund_id = refund.provider_refund_id.unwrap();

        let body = event("refund.succeeded", &refund_id);
        let headers = signed(SECRET, "msg_4", &body);
        let outcome = processor.process_at(body.as_bytes(), &headers, NOW).await.unwrap();
        assert_eq!(outcome, WebhookOutcome::Processed);
        assert_eq!(
            fixture.order(order.id).await.payment_status,
            PaymentStatus::Refunded
        );
        let refunds = fixture.store.list_refunds(order.id).await.unwrap();
        assert_eq!(refunds[0].status, RefundStatus::Succeeded);

        // A late failure for the same refund changes nothing.
        let body = event("refund.failed", &refund_id);
        let headers = signed(SECRET, "msg_5", &body);
        let outcome = processor.process_at(body.as_bytes(), &headers, NOW).await.unwrap();
        assert_eq!(outcome, WebhookOutcome::AlreadyProcessed);
        let refunds = fixture.store.list_refunds(order.id).await.unwrap();
        assert_eq!(refunds[0].status, RefundStatus::Succeeded);
    }

    #[tokio::test]
    async fn test_malformed_body() {
        let fixture = engine();
        let processor = processor(&fixture, Arc::new(RecordingNotifier::default()));

        let body = "not json";
        let headers = signed(SECRET, "msg_6", body);
        let err = processor
            .process_at(body.as_bytes(), &headers, NOW)
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::Validation { .. }));

        let deliveries = fixture.store.list_payment_events().await.unwrap();
        assert_eq!(deliveries[0].event_type, "unparseable");
        assert!(deliveries[0].signature_valid);
    }

    #[tokio::test]
    async fn test_out_of_range_timestamp_is_rejected_and_logged() {
        let fixture = engine();
        let notifier = Arc::new(RecordingNotifier::default());
        let processor = processor(&fixture, notifier.clone());
        let order = fixture.pending_order().await;
        fixture.open_checkout(&order, "chk_1").await;

        let body = event("payment.succeeded", "chk_1");
        let sig = WebhookVerifier::new(SECRET, 180).sign("msg_1", i64::MIN, body.as_bytes());
        let headers = WebhookHeaders {
            id: Some("msg_1".to_string()),
            timestamp: Some(i64::MIN.to_string()),
            signature: Some(format!("v1,{}", sig)),
        };

        let err = processor
            .process_at(body.as_bytes(), &headers, NOW)
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::Security(_)));
        assert_eq!(fixture.order(order.id).await.status, OrderStatus::PendingPayment);

        let deliveries = fixture.store.list_payment_events().await.unwrap();
        assert_eq!(deliveries.len(), 1);
        assert!(!deliveries[0].signature_valid);
        assert_eq!(deliveries[0].outcome.as_deref(), Some("rejected"));
    }

    #[tokio::test]
    async fn test_success_after_failure_places_order() {
        let fixture = engine();
        let notifier = Arc::new(RecordingNotifier::default());
        let audit = Arc::new(RecordingAudit::default());
        let processor = WebhookProcessor::new(
            fixture.store.clone(),
            fixture.lifecycle.clone(),
            notifier.clone(),
            audit.clone(),
            WebhookVerifier::new(SECRET, 180),
        );
        let order = fixture.pending_order().await;
        fixture.open_checkout(&order, "chk_1").await;

        let failed = event("payment.failed", "chk_1");
        let outcome = processor
            .process_at(failed.as_bytes(), &signed(SECRET, "msg_1", &failed), NOW)
            .await
            .unwrap();
        assert_eq!(outcome, WebhookOutcome::Processed);
        assert_eq!(fixture.order(order.id).await.payment_status, PaymentStatus::Failed);

        let succeeded = event("payment.succeeded", "chk_1");
        let outcome = processor
            .process_at(succeeded.as_bytes(), &signed(SECRET, "msg_2", &succeeded), NOW)
            .await
            .unwrap();
        assert_eq!(outcome, WebhookOutcome::Processed);

        let placed = fixture.order(order.id).await;
        assert_eq!(placed.status, OrderStatus::Placed);
        assert_eq!(placed.payment_status, PaymentStatus::Paid);
        let payments = fixture.store.list_payments(order.id).await.unwrap();
        assert_eq!(payments[0].status, PaymentRecordStatus::Succeeded);
        assert_eq!(notifier.calls(), vec![(order.id, OrderStatus::Placed)]);

        let entry = audit.entry("payment.succeeded");
        assert_eq!(entry.before.unwrap()["status"], serde_json::json!("failed"));
        assert_eq!(entry.after.unwrap()["status"], serde_json::json!("succeeded"));
        let status_changes: Vec<_> = audit
            .entries()
            .into_iter()
            .filter(|e| e.action == "order.payment_status_changed")
            .collect();
        assert_eq!(status_changes.len(), 2);
        let last = status_changes[1].clone();
        assert_eq!(last.before.unwrap()["payment_status"], serde_json::json!("failed"));
        assert_eq!(last.after.unwrap()["payment_status"], serde_json::json!("paid"));
    }
}
