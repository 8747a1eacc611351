//! # Actors
//!
//! Explicit capability value passed into state-changing operations.
//! The engine never looks up a "current user"; callers say who is acting.

use serde::{Deserialize, Serialize};

/// Staff privilege level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StaffRole {
    Staff,
    Manager,
    Admin,
}

impl StaffRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            StaffRole::Staff => "staff",
            StaffRole::Manager => "manager",
            StaffRole::Admin => "admin",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "staff" => Some(StaffRole::Staff),
            "manager" => Some(StaffRole::Manager),
            "admin" => Some(StaffRole::Admin),
            _ => None,
        }
    }
}

/// Who is performing an operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Actor {
    /// The engine itself (payment confirmation, order creation)
    System,
    /// A customer acting on their own order
    Customer { user_id: String },
    /// Restaurant staff
    Staff { staff_id: String, role: StaffRole },
}

impl Actor {
    pub fn customer(user_id: impl Into<String>) -> Self {
        Actor::Customer {
            user_id: user_id.into(),
        }
    }

    pub fn staff(staff_id: impl Into<String>, role: StaffRole) -> Self {
        Actor::Staff {
            staff_id: staff_id.into(),
            role,
        }
    }

    /// Managers, admins and the system itself
    pub fn is_elevated(&self) -> bool {
        match self {
            Actor::System => true,
            Actor::Staff { role, .. } => matches!(role, StaffRole::Manager | StaffRole::Admin),
            Actor::Customer { .. } => false,
        }
    }

    pub fn is_staff_or_system(&self) -> bool {
        !matches!(self, Actor::Customer { .. })
    }

    pub fn user_id(&self) -> Option<&str> {
        match self {
            Actor::Customer { user_id } => Some(user_id),
            _ => None,
        }
    }

    /// Short label for logs and audit rows
    pub fn label(&self) -> String {
        match self {
            Actor::System => "system".to_string(),
            Actor::Customer { user_id } => format!("customer:{}", user_id),
            Actor::Staff { staff_id, role } => format!("{}:{}", role.as_str(), staff_id),
        }
    }
}
