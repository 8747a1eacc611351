//! # Payment Types
//!
//! Payment sessions, refunds and the inbound webhook event model.

use crate::actor::Actor;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status of a checkout session record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentRecordStatus {
    Pending,
    Succeeded,
    Failed,
}

/// One checkout session for an order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub order_id: Uuid,
    /// Provider name (for logging and routing)
    pub provider: String,
    /// Assigned once the provider has created the session
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_checkout_id: Option<String>,
    pub status: PaymentRecordStatus,
    pub amount_cents: i64,
    pub currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    /// Last raw provider payload seen for this session
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    pub fn pending(
        order_id: Uuid,
        provider: impl Into<String>,
        amount_cents: i64,
        currency: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            order_id,
            provider: provider.into(),
            provider_checkout_id: None,
            status: PaymentRecordStatus::Pending,
            amount_cents,
            currency: currency.into(),
            redirect_url: None,
            failure_reason: None,
            raw_response: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Pending or succeeded sessions block a new checkout
    pub fn is_active(&self) -> bool {
        matches!(
            self.status,
            PaymentRecordStatus::Pending | PaymentRecordStatus::Succeeded
        )
    }
}

/// Status of a refund
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefundStatus {
    /// Row written, provider not yet called (or call outcome unknown)
    Pending,
    /// Provider accepted, awaiting webhook
    Processing,
    Succeeded,
    Failed,
}

impl RefundStatus {
    pub fn is_in_flight(&self) -> bool {
        matches!(self, RefundStatus::Pending | RefundStatus::Processing)
    }
}

/// A refund against a succeeded payment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Refund {
    pub id: Uuid,
    pub order_id: Uuid,
    pub payment_id: Uuid,
    /// Sent as `Idempotency-Key` so client retries are safe
    pub idempotency_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_refund_id: Option<String>,
    pub amount_cents: i64,
    pub status: RefundStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_message: Option<String>,
    pub requested_by: Actor,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Refund {
    pub fn pending(
        payment: &Payment,
        amount_cents: i64,
        reason: Option<String>,
        requested_by: Actor,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            order_id: payment.order_id,
            payment_id: payment.id,
            idempotency_key: Uuid::new_v4().to_string(),
            provider_refund_id: None,
            amount_cents,
            status: RefundStatus::Pending,
            reason,
            failure_message: None,
            requested_by,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Webhook event types we act on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookEventKind {
    PaymentSucceeded,
    PaymentFailed,
    RefundSucceeded,
    RefundFailed,
    /// Anything else the provider sends; recorded and ignored
    Unknown(String),
}

impl WebhookEventKind {
    pub fn from_type(event_type: &str) -> Self {
        match event_type {
            "payment.succeeded" => WebhookEventKind::PaymentSucceeded,
            "payment.failed" => WebhookEventKind::PaymentFailed,
            "refund.succeeded" => WebhookEventKind::RefundSucceeded,
            "refund.failed" => WebhookEventKind::RefundFailed,
            other => WebhookEventKind::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            WebhookEventKind::PaymentSucceeded => "payment.succeeded",
            WebhookEventKind::PaymentFailed => "payment.failed",
            WebhookEventKind::RefundSucceeded => "refund.succeeded",
            WebhookEventKind::RefundFailed => "refund.failed",
            WebhookEventKind::Unknown(other) => other,
        }
    }
}

/// `payload` object of a webhook body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPayload {
    /// Checkout id for payment events, refund id for refund events
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

/// Webhook body: `{type, payload:{id, paymentId?, failureReason?}}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookEnvelope {
    #[serde(rename = "type")]
    pub event_type: String,
    pub payload: WebhookPayload,
}

impl WebhookEnvelope {
    pub fn kind(&self) -> WebhookEventKind {
        WebhookEventKind::from_type(&self.event_type)
    }
}

/// Append-only record of one inbound webhook delivery.
/// Only the processing outcome is ever filled in after insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentEvent {
    pub id: Uuid,
    /// `webhook-id` header, if present
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_event_id: Option<String>,
    pub event_type: String,
    pub raw_body: String,
    pub signature_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub received_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
}

impl PaymentEvent {
    pub fn received(
        provider_event_id: Option<String>,
        event_type: impl Into<String>,
        raw_body: impl Into<String>,
        signature_valid: bool,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            provider_event_id,
            event_type: event_type.into(),
            raw_body: raw_body.into(),
            signature_valid,
            order_id: None,
            outcome: None,
            error: None,
            received_at: Utc::now(),
            processed_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_parsing() {
        let envelope: WebhookEnvelope = serde_json::from_str(
            r#"{"type":"payment.failed","payload":{"id":"chk_1","failureReason":"card_declined"}}"#,
        )
        .unwrap();

        assert_eq!(envelope.kind(), WebhookEventKind::PaymentFailed);
        assert_eq!(envelope.payload.id, "chk_1");
        assert_eq!(envelope.payload.failure_reason.as_deref(), Some("card_declined"));
        assert!(envelope.payload.payment_id.is_none());
    }

    #[test]
    fn test_unknown_event_kind_is_preserved() {
        let kind = WebhookEventKind::from_type("subscription.created");
        assert_eq!(kind, WebhookEventKind::Unknown("subscription.created".into()));
        assert_eq!(kind.as_str(), "subscription.created");
    }

    #[test]
    fn test_active_payment() {
        let mut payment = Payment::pending(Uuid::new_v4(), "checkout", 1000, "USD");
        assert!(payment.is_active());
        payment.status = PaymentRecordStatus::Failed;
        assert!(!payment.is_active());
    }
}
