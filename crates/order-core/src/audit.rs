//! # Audit Logger
//!
//! Every state-changing operation writes one entry with before/after
//! snapshots of the touched entity.

use crate::actor::Actor;
use crate::error::OrderResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Dotted action name (e.g., "order.status_changed")
    pub action: String,
    pub entity_type: String,
    pub entity_id: String,
    pub before: Option<serde_json::Value>,
    pub after: Option<serde_json::Value>,
    pub actor: Actor,
    pub at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(
        action: impl Into<String>,
        entity_type: impl Into<String>,
        entity_id: impl ToString,
        actor: &Actor,
    ) -> Self {
        Self {
            action: action.into(),
            entity_type: entity_type.into(),
            entity_id: entity_id.to_string(),
            before: None,
            after: None,
            actor: actor.clone(),
            at: Utc::now(),
        }
    }

    /// Builder: snapshot before the change. Unserializable values are dropped.
    pub fn with_before<T: Serialize>(mut self, before: &T) -> Self {
        self.before = serde_json::to_value(before).ok();
        self
    }

    /// Builder: snapshot after the change
    pub fn with_after<T: Serialize>(mut self, after: &T) -> Self {
        self.after = serde_json::to_value(after).ok();
        self
    }
}

/// Audit Logger collaborator
#[async_trait]
pub trait AuditLogger: Send + Sync {
    async fn log(&self, entry: AuditEntry) -> OrderResult<()>;
}

/// Log an entry after the change it describes has been committed.
/// A failing logger is reported but never undoes or fails the operation.
pub async fn record(logger: &dyn AuditLogger, entry: AuditEntry) {
    let action = entry.action.clone();
    if let Err(err) = logger.log(entry).await {
        error!(%action, error = %err, "failed to write audit entry");
    }
}

/// Writes audit entries to the tracing pipeline under the `audit` target
pub struct TracingAuditLogger;

#[async_trait]
impl AuditLogger for TracingAuditLogger {
    async fn log(&self, entry: AuditEntry) -> OrderResult<()> {
        info!(
            target: "audit",
            action = %entry.action,
            entity_type = %entry.entity_type,
            entity_id = %entry.entity_id,
            actor = %entry.actor.label(),
            before = %entry.before.as_ref().map(|v| v.to_string()).unwrap_or_default(),
            after = %entry.after.as_ref().map(|v| v.to_string()).unwrap_or_default(),
            "audit"
        );
        Ok(())
    }
}
