//! # Order Error Types
//!
//! Typed error handling for the tablecart order engine.
//! Every engine operation returns `Result<T, OrderError>`.

use crate::store::StoreError;
use thiserror::Error;

/// Core error type for all order, pricing and payment operations
#[derive(Debug, Error)]
pub enum OrderError {
    /// Malformed input, carries the offending field
    #[error("Invalid {field}: {message}")]
    Validation { field: String, message: String },

    /// Catalog item or modifier missing or inactive
    #[error("Item unavailable: {item_id}")]
    ItemUnavailable { item_id: String },

    /// Missing order, payment, refund or promo
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Illegal transition, checkout on a paid order, over-refund, ...
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Actor lacks the capability for this operation
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Bad webhook signature or stale timestamp
    #[error("Security check failed: {0}")]
    Security(String),

    /// Payment provider rejected the request (non-2xx)
    #[error("Provider error [{provider}]: {message}")]
    ExternalService { provider: String, message: String },

    /// Provider unreachable or timed out
    #[error("Network error: {0}")]
    Network(String),

    /// Storage backend failure
    #[error("Storage error: {0}")]
    Storage(StoreError),

    /// Configuration errors (missing keys, invalid config)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal error (should not happen)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl OrderError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        OrderError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        OrderError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Returns true if the caller may retry the same request
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            OrderError::ExternalService { .. } | OrderError::Network(_)
        )
    }

    /// Returns the HTTP status code appropriate for this error
    pub fn status_code(&self) -> u16 {
        match self {
            OrderError::Validation { .. } => 400,
            OrderError::ItemUnavailable { .. } => 400,
            OrderError::NotFound { .. } => 404,
            OrderError::InvalidState(_) => 409,
            OrderError::PermissionDenied(_) => 403,
            OrderError::Security(_) => 401,
            OrderError::ExternalService { .. } => 502,
            OrderError::Network(_) => 503,
            OrderError::Storage(StoreError::NotFound) => 404,
            OrderError::Storage(_) => 500,
            OrderError::Configuration(_) => 500,
            OrderError::Serialization(_) => 500,
            OrderError::Internal(_) => 500,
        }
    }
}

impl From<StoreError> for OrderError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(message) => OrderError::InvalidState(message),
            StoreError::PromoExhausted { code } => {
                OrderError::InvalidState(format!("promo code {} has reached its usage limit", code))
            }
            other => OrderError::Storage(other),
        }
    }
}

impl From<serde_json::Error> for OrderError {
    fn from(err: serde_json::Error) -> Self {
        OrderError::Serialization(err.to_string())
    }
}

/// Result type alias for order operations
pub type OrderResult<T> = Result<T, OrderError>;
