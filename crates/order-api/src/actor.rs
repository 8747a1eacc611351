//! # Caller Identity
//!
//! Authentication happens upstream; the edge proxy forwards who is calling
//! in three headers:
//!
//! | Header | Values |
//! |--------|--------|
//! | `x-actor-kind` | `customer` or `staff` |
//! | `x-actor-id` | user or staff id |
//! | `x-actor-role` | `staff`, `manager`, `admin` (staff only) |
//!
//! No headers means an anonymous guest. `system` is never accepted from the
//! outside.

use crate::handlers::ErrorResponse;
use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    Json,
};
use order_core::{Actor, StaffRole};

pub const ACTOR_KIND_HEADER: &str = "x-actor-kind";
pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

/// The caller, if identified
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller(pub Option<Actor>);

impl Caller {
    pub fn user_id(&self) -> Option<&str> {
        self.0.as_ref().and_then(Actor::user_id)
    }

    /// The actor, or 401 for anonymous callers
    pub fn require(&self) -> Result<&Actor, (StatusCode, Json<ErrorResponse>)> {
        self.0.as_ref().ok_or_else(|| {
            (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse::new("this operation needs an identified caller", 401)),
            )
        })
    }
}

fn bad_header(message: impl Into<String>) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse::new("invalid caller headers", 400).with_details(message)),
    )
}

impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = (StatusCode, Json<ErrorResponse>);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        };

        let Some(kind) = header(ACTOR_KIND_HEADER) else {
            return Ok(Caller(None));
        };
        let id = header(ACTOR_ID_HEADER)
            .ok_or_else(|| bad_header(format!("{} is required", ACTOR_ID_HEADER)))?;

        let actor = match kind.to_ascii_lowercase().as_str() {
            "customer" => Actor::customer(id),
            "staff" => {
                let role = header(ACTOR_ROLE_HEADER)
                    .ok_or_else(|| bad_header(format!("{} is required for staff", ACTOR_ROLE_HEADER)))?;
                let role = StaffRole::parse(role)
                    .ok_or_else(|| bad_header(format!("unknown role {}", role)))?;
                Actor::staff(id, role)
            }
            other => return Err(bad_header(format!("unknown actor kind {}", other))),
        };
        Ok(Caller(Some(actor)))
    }
}
