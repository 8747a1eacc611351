//! # Routes
//!
//! Axum router configuration for the ordering API.

use crate::handlers;
use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Create the main application router
///
/// Routes:
/// - Orders:
///   - POST /api/v1/orders/quote - Price a cart
///   - POST /api/v1/orders - Create order
///   - GET  /api/v1/orders/{order_id} - Order with items
///   - GET  /api/v1/orders/{order_id}/events - Status history
///   - POST /api/v1/orders/{order_id}/transition - Move status
///
/// - Payments:
///   - POST /api/v1/orders/{order_id}/checkout - Open hosted checkout
///   - GET  /api/v1/orders/{order_id}/payments - Payment history (staff)
///   - POST /api/v1/orders/{order_id}/refunds - Initiate refund
///   - POST /api/v1/orders/{order_id}/refunds/resend - Re-send unacknowledged refund
///
/// - Webhooks:
///   - POST /webhook/payments - Provider callbacks
///
/// - Static pages:
///   - GET /checkout/success, /checkout/cancel, /checkout/failed
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let checkout_routes = Router::new()
        .route("/success", get(handlers::checkout_success))
        .route("/cancel", get(handlers::checkout_cancel))
        .route("/failed", get(handlers::checkout_failed));

    let order_routes = Router::new()
        .route("/quote", post(handlers::quote))
        .route("/{order_id}", get(handlers::get_order))
        .route("/{order_id}/events", get(handlers::list_status_events))
        .route("/{order_id}/transition", post(handlers::transition_order))
        .route("/{order_id}/checkout", post(handlers::create_checkout))
        .route("/{order_id}/payments", get(handlers::list_payments))
        .route("/{order_id}/refunds", post(handlers::create_refund))
        .route("/{order_id}/refunds/resend", post(handlers::resend_refund));

    // Webhook routes (no CORS, must accept raw body)
    let webhook_routes = Router::new().route("/payments", post(handlers::payment_webhook));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/", get(handlers::health))
        .route("/api/v1/orders", post(handlers::create_order))
        .nest("/checkout", checkout_routes)
        .nest("/api/v1/orders", order_routes)
        .nest("/webhook", webhook_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
