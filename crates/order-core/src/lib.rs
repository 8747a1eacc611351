//! # order-core
//!
//! Core types and engine for the tablecart restaurant ordering backend.
//!
//! This crate provides:
//! - `PricingCalculator` for deterministic cart pricing in integer cents
//! - `PromoValidator` for promo code rules and usage limits
//! - `OrderLifecycle` for order creation and the status machine
//! - `OrderStore` trait with an in-memory implementation
//! - `PaymentStrategy` trait for hosted-checkout payment providers
//! - `OrderError` for typed error handling
//!
//! ## Example
//!
//! ```rust,ignore
//! use order_core::{Cart, CartLine, OrderLifecycle, OrderRequest, OrderType};
//!
//! let cart = Cart::new(OrderType::Pickup)
//!     .with_line(CartLine::new("burger", 2))
//!     .with_promo("SAVE10");
//!
//! // Price it
//! let quote = lifecycle.quote(&cart, Some("user-1")).await?;
//!
//! // Place it; the order waits in PENDING_PAYMENT until the webhook confirms payment
//! let detail = lifecycle.create(OrderRequest::new(cart, customer), Some("user-1")).await?;
//! ```

pub mod actor;
pub mod audit;
pub mod catalog;
pub mod error;
pub mod lifecycle;
pub mod memory;
pub mod notify;
pub mod order;
pub mod payment;
pub mod pricing;
pub mod promo;
pub mod settings;
pub mod store;
pub mod strategy;

// Re-exports for convenience
pub use actor::{Actor, StaffRole};
pub use audit::{AuditEntry, AuditLogger, TracingAuditLogger};
pub use catalog::{CatalogItem, CatalogModifier, ItemCatalog, MenuCatalog};
pub use error::{OrderError, OrderResult};
pub use lifecycle::{generate_order_number, OrderLifecycle, OrderRequest};
pub use memory::MemoryOrderStore;
pub use notify::{LoggingNotifier, NotificationDispatcher};
pub use order::{
    AddressSnapshot, CancelledBy, CustomerSnapshot, Order, OrderDetail, OrderItem,
    OrderItemModifier, OrderStatus, OrderType, PaymentStatus, StatusEvent,
};
pub use payment::{
    Payment, PaymentEvent, PaymentRecordStatus, Refund, RefundStatus, WebhookEnvelope,
    WebhookEventKind, WebhookPayload,
};
pub use pricing::{Cart, CartLine, PricedLine, PricedModifier, PricingCalculator, PricingResult};
pub use promo::{
    AppliedPromo, DiscountType, PromoCatalog, PromoCode, PromoCodeUsage, PromoContext,
    PromoDecision, PromoRejection, PromoScope, PromoValidator,
};
pub use settings::{PricingSettings, SettingsStore, StaticSettings};
pub use store::{Changed, Conditional, NewOrder, OrderStore, PaymentChange, StoreError, StoreResult};
pub use strategy::{
    BoxedPaymentStrategy, CheckoutRequest, CheckoutUrls, PaymentStrategy, ProviderCheckout,
    ProviderRefund, RefundRequest,
};
