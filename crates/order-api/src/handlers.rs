//! # Request Handlers
//!
//! Axum request handlers for the ordering API. Handlers translate HTTP into
//! engine calls; every rule lives in `order-core` / `order-gateway`.

use crate::actor::Caller;
use crate::state::AppState;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{Html, IntoResponse},
    Json,
};
use order_core::{Actor, Cart, Order, OrderError, OrderRequest, OrderStatus};
use order_gateway::WebhookHeaders;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

// =============================================================================
// Request/Response Types
// =============================================================================

/// Move an order to a new status
#[derive(Debug, Deserialize)]
pub struct TransitionRequest {
    pub status: OrderStatus,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Refund request; omit `amount_cents` to refund everything still refundable
#[derive(Debug, Default, Deserialize)]
pub struct RefundRequestBody {
    #[serde(default)]
    pub amount_cents: Option<i64>,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, code: u16) -> Self {
        Self {
            error: error.into(),
            code,
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub(crate) fn order_error_to_response(err: OrderError) -> ApiError {
    let code = err.status_code();
    let response = match &err {
        // Signature failures are logged in full by the processor; callers learn nothing.
        OrderError::Security(_) => ErrorResponse::new("invalid webhook", code),
        OrderError::Validation { field, .. } => {
            ErrorResponse::new(err.to_string(), code).with_details(field.clone())
        }
        OrderError::Storage(_)
        | OrderError::Internal(_)
        | OrderError::Configuration(_)
        | OrderError::Serialization(_)
            if code >= 500 =>
        {
            error!(error = %err, "internal error");
            ErrorResponse::new("internal error", code)
        }
        _ => ErrorResponse::new(err.to_string(), code),
    };
    (
        StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        Json(response),
    )
}

/// Customers see their own orders; staff see everything. Guest orders are
/// reachable by id only.
fn ensure_can_view(order: &Order, caller: &Caller) -> Result<(), ApiError> {
    let Some(owner) = order.user_id.as_deref() else {
        return Ok(());
    };
    match &caller.0 {
        Some(Actor::Customer { user_id }) if user_id == owner => Ok(()),
        Some(actor) if actor.is_staff_or_system() => Ok(()),
        _ => Err(order_error_to_response(OrderError::not_found("order", order.id))),
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Health check endpoint
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "tablecart",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Price a cart without creating an order
#[instrument(skip(state, caller, cart), fields(order_type = %cart.order_type, lines = cart.items.len()))]
pub async fn quote(
    State(state): State<AppState>,
    caller: Caller,
    Json(cart): Json<Cart>,
) -> Result<impl IntoResponse, ApiError> {
    let quote = state
        .lifecycle
        .quote(&cart, caller.user_id())
        .await
        .map_err(order_error_to_response)?;
    Ok(Json(quote))
}

/// Create an order in PENDING_PAYMENT
#[instrument(skip(state, caller, request), fields(order_type = %request.cart.order_type))]
pub async fn create_order(
    State(state): State<AppState>,
    caller: Caller,
    Json(request): Json<OrderRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(actor) = &caller.0 {
        if actor.user_id().is_none() {
            return Err(order_error_to_response(OrderError::PermissionDenied(
                "orders are placed by customers".to_string(),
            )));
        }
    }

    let detail = state
        .lifecycle
        .create(request, caller.user_id())
        .await
        .map_err(order_error_to_response)?;

    info!(order_number = %detail.order.order_number, "order placed via API");
    Ok((StatusCode::CREATED, Json(detail)))
}

/// Order with its items
pub async fn get_order(
    State(state): State<AppState>,
    caller: Caller,
    Path(order_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let detail = state
        .lifecycle
        .get(order_id)
        .await
        .map_err(order_error_to_response)?;
    ensure_can_view(&detail.order, &caller)?;
    Ok(Json(detail))
}

/// Status history, oldest first
pub async fn list_status_events(
    State(state): State<AppState>,
    caller: Caller,
    Path(order_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let detail = state
        .lifecycle
        .get(order_id)
        .await
        .map_err(order_error_to_response)?;
    ensure_can_view(&detail.order, &caller)?;

    let events = state
        .lifecycle
        .status_events(order_id)
        .await
        .map_err(order_error_to_response)?;
    Ok(Json(serde_json::json!({
        "order_id": order_id,
        "events": events,
        "count": events.len()
    })))
}

/// Payments, refunds and webhook deliveries for an order (staff only)
pub async fn list_payments(
    State(state): State<AppState>,
    caller: Caller,
    Path(order_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    if !caller.require()?.is_staff_or_system() {
        return Err(order_error_to_response(OrderError::PermissionDenied(
            "payment history is visible to staff only".to_string(),
        )));
    }
    state
        .lifecycle
        .get(order_id)
        .await
        .map_err(order_error_to_response)?;

    let payments = state
        .store
        .list_payments(order_id)
        .await
        .map_err(|e| order_error_to_response(e.into()))?;
    let refunds = state
        .store
        .list_refunds(order_id)
        .await
        .map_err(|e| order_error_to_response(e.into()))?;
    let deliveries: Vec<_> = state
        .store
        .list_payment_events()
        .await
        .map_err(|e| order_error_to_response(e.into()))?
        .into_iter()
        .filter(|e| e.order_id == Some(order_id))
        .collect();

    Ok(Json(serde_json::json!({
        "order_id": order_id,
        "payments": payments,
        "refunds": refunds,
        "webhook_events": deliveries
    })))
}

#[instrument(skip(state, caller, request), fields(to = %request.status))]
pub async fn transition_order(
    State(state): State<AppState>,
    caller: Caller,
    Path(order_id): Path<Uuid>,
    Json(request): Json<TransitionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let actor = caller.require()?;
    let order = state
        .lifecycle
        .transition(order_id, request.status, actor, request.reason)
        .await
        .map_err(order_error_to_response)?;
    Ok(Json(order))
}

/// Open (or reuse) a hosted checkout for the order
#[instrument(skip(state, caller))]
pub async fn create_checkout(
    State(state): State<AppState>,
    caller: Caller,
    Path(order_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let detail = state
        .lifecycle
        .get(order_id)
        .await
        .map_err(order_error_to_response)?;
    ensure_can_view(&detail.order, &caller)?;

    let handle = state
        .payments
        .create_checkout(order_id)
        .await
        .map_err(|e| {
            warn!(%order_id, error = %e, "checkout failed");
            order_error_to_response(e)
        })?;
    Ok(Json(handle))
}

#[instrument(skip(state, caller, request))]
pub async fn create_refund(
    State(state): State<AppState>,
    caller: Caller,
    Path(order_id): Path<Uuid>,
    Json(request): Json<RefundRequestBody>,
) -> Result<impl IntoResponse, ApiError> {
    let actor = caller.require()?;
    let refund = state
        .payments
        .initiate_refund(order_id, request.amount_cents, request.reason, actor)
        .await
        .map_err(order_error_to_response)?;
    Ok((StatusCode::ACCEPTED, Json(refund)))
}

/// Re-send a refund the provider never acknowledged
#[instrument(skip(state, caller))]
pub async fn resend_refund(
    State(state): State<AppState>,
    caller: Caller,
    Path(order_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let actor = caller.require()?;
    let refund = state
        .payments
        .resend_refund(order_id, actor)
        .await
        .map_err(order_error_to_response)?;
    Ok((StatusCode::ACCEPTED, Json(refund)))
}

/// Provider webhook; the raw body is needed for signature verification
#[instrument(skip(state, headers, body))]
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let webhook_headers = WebhookHeaders::from_pairs(
        headers
            .iter()
            .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str(), v))),
    );

    let outcome = state
        .webhooks
        .process(&body, &webhook_headers)
        .await
        .map_err(order_error_to_response)?;
    Ok(Json(serde_json::json!({ "outcome": outcome })))
}

/// Checkout success page
pub async fn checkout_success(Query(params): Query<HashMap<String, String>>) -> impl IntoResponse {
    let order_id = params.get("order_id").map(|s| s.as_str()).unwrap_or("unknown");
    result_page(
        "Payment received",
        &format!(
            "Order <code>{}</code> is confirmed once the payment provider notifies us.",
            html_escape(order_id)
        ),
    )
}

/// Checkout cancel page
pub async fn checkout_cancel() -> impl IntoResponse {
    result_page("Payment cancelled", "No charges were made.")
}

/// Checkout failure page
pub async fn checkout_failed() -> impl IntoResponse {
    result_page(
        "Payment failed",
        "Your order is saved. You can start a new checkout to try again.",
    )
}

fn result_page(title: &str, message: &str) -> Html<String> {
    Html(format!(
        r#"<!DOCTYPE html>
<html>
<head><title>{title}</title></head>
<body style="font-family: system-ui; display: flex; justify-content: center; align-items: center; height: 100vh; margin: 0;">
    <div style="padding: 60px; text-align: center;">
        <h1>{title}</h1>
        <p style="color: #666;">{message}</p>
    </div>
</body>
</html>
"#
    ))
}

fn html_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response() {
        let err = ErrorResponse::new("Test error", 400);
        assert_eq!(err.error, "Test error");
        assert_eq!(err.code, 400);
    }

    #[test]
    fn test_order_error_conversion() {
        let (status, _) = order_error_to_response(OrderError::InvalidState("paid".into()));
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, Json(body)) = order_error_to_response(OrderError::validation("tip_cents", "negative"));
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.details.as_deref(), Some("tip_cents"));
    }

    #[test]
    fn test_security_errors_leak_nothing() {
        let (status, Json(body)) =
            order_error_to_response(OrderError::Security("webhook signature mismatch".into()));
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body.error, "invalid webhook");
    }

    #[test]
    fn test_html_escape() {
        assert_eq!(html_escape("<b>&"), "&lt;b&gt;&amp;");
    }
}
