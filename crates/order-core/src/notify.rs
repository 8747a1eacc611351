//! # Notification Dispatcher
//!
//! Tells customers and staff that an order changed status. Delivery
//! mechanics (push, SMS, email) live behind the trait.

use crate::error::OrderResult;
use crate::order::OrderStatus;
use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn notify(&self, order_id: Uuid, new_status: OrderStatus) -> OrderResult<()>;
}

/// Default dispatcher (just logs)
pub struct LoggingNotifier;

#[async_trait]
impl NotificationDispatcher for LoggingNotifier {
    async fn notify(&self, order_id: Uuid, new_status: OrderStatus) -> OrderResult<()> {
        info!(%order_id, status = %new_status, "order notification");
        Ok(())
    }
}
