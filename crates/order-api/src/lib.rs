//! # order-api
//!
//! HTTP API layer for tablecart-rs.
//!
//! This crate provides:
//! - Axum-based HTTP server
//! - REST endpoints for quoting, ordering, checkout and refunds
//! - Webhook handler for payment provider events
//!
//! ## Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | GET | `/health` | Health check |
//! | POST | `/api/v1/orders/quote` | Price a cart |
//! | POST | `/api/v1/orders` | Create order |
//! | GET | `/api/v1/orders/{id}` | Order with items |
//! | GET | `/api/v1/orders/{id}/events` | Status history |
//! | POST | `/api/v1/orders/{id}/transition` | Change status |
//! | POST | `/api/v1/orders/{id}/checkout` | Hosted checkout |
//! | GET | `/api/v1/orders/{id}/payments` | Payment history (staff) |
//! | POST | `/api/v1/orders/{id}/refunds` | Refund |
//! | POST | `/api/v1/orders/{id}/refunds/resend` | Re-send unacknowledged refund |
//! | POST | `/webhook/payments` | Provider webhook |

pub mod actor;
pub mod handlers;
pub mod routes;
pub mod state;

pub use actor::Caller;
pub use routes::create_router;
pub use state::{AppConfig, AppState, Collaborators};
