//! Fixtures shared by the gateway tests.

use async_trait::async_trait;
use order_core::audit::{AuditEntry, AuditLogger};
use order_core::{
    Cart, CartLine, CatalogItem, CheckoutRequest, CustomerSnapshot, MenuCatalog,
    MemoryOrderStore, NotificationDispatcher, Order, OrderError, OrderLifecycle, OrderRequest,
    OrderResult, OrderStatus, OrderStore, OrderType, Payment, PaymentChange, PaymentRecordStatus,
    PaymentStatus, PaymentStrategy, PricingCalculator, PricingSettings, PromoValidator,
    ProviderCheckout, ProviderRefund, RefundRequest, StaticSettings, TracingAuditLogger,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

pub struct Fixture {
    pub store: Arc<MemoryOrderStore>,
    pub lifecycle: OrderLifecycle,
}

/// Engine over an in-memory store with a single 100.00 menu item
pub fn engine() -> Fixture {
    let store = Arc::new(MemoryOrderStore::new());
    let menu = MenuCatalog::new().with_item(CatalogItem::new("tasting", "Tasting menu", 10000));
    let pricing = PricingCalculator::new(
        Arc::new(menu),
        Arc::new(StaticSettings::new(PricingSettings::default())),
        PromoValidator::new(store.clone()),
    );
    let lifecycle = OrderLifecycle::new(store.clone(), pricing, Arc::new(TracingAuditLogger));
    Fixture { store, lifecycle }
}

impl Fixture {
    /// A 10000-cent pickup order in PENDING_PAYMENT
    pub async fn pending_order(&self) -> Order {
        let request = OrderRequest::new(
            Cart::new(OrderType::Pickup).with_line(CartLine::new("tasting", 1)),
            CustomerSnapshot {
                name: "Grace".to_string(),
                ..Default::default()
            },
        );
        self.lifecycle
            .create(request, Some("u1"))
            .await
            .unwrap()
            .order
    }

    pub async fn order(&self, order_id: Uuid) -> Order {
        self.store.get_order(order_id).await.unwrap().unwrap()
    }

    /// Record a pending payment with a checkout id, as a checkout would
    pub async fn open_checkout(&self, order: &Order, checkout_id: &str) -> Payment {
        let mut payment = Payment::pending(order.id, "fake", order.total_cents, "USD");
        payment.provider_checkout_id = Some(checkout_id.to_string());
        self.store.insert_payment(payment.clone()).await.unwrap();
        payment
    }
}

/// Succeeded payment plus `payment_status = paid`, without touching order status
pub async fn mark_paid(fixture: &Fixture, order_id: Uuid, checkout_id: &str) {
    let order = fixture.order(order_id).await;
    fixture.open_checkout(&order, checkout_id).await;
    fixture
        .store
        .compare_and_set_payment(
            checkout_id,
            &[PaymentRecordStatus::Pending],
            PaymentRecordStatus::Succeeded,
            PaymentChange::default(),
        )
        .await
        .unwrap();
    fixture
        .store
        .set_payment_status(order_id, PaymentStatus::Paid)
        .await
        .unwrap();
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mode {
    Healthy,
    FailingCheckout,
    RejectingRefunds,
    Offline,
    /// Never answers a checkout request
    Hanging,
    /// Answers refunds after a delay
    Slow(Duration),
}

/// In-process provider that records what it was asked to do
pub struct FakeGateway {
    mode: Mode,
    checkouts: Mutex<Vec<CheckoutRequest>>,
    refunds: Mutex<Vec<RefundRequest>>,
}

impl Default for FakeGateway {
    fn default() -> Self {
        Self::with_mode(Mode::Healthy)
    }
}

impl FakeGateway {
    fn with_mode(mode: Mode) -> Self {
        Self {
            mode,
            checkouts: Mutex::new(Vec::new()),
            refunds: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_checkout() -> Self {
        Self::with_mode(Mode::FailingCheckout)
    }

    pub fn rejecting_refunds() -> Self {
        Self::with_mode(Mode::RejectingRefunds)
    }

    pub fn offline() -> Self {
        Self::with_mode(Mode::Offline)
    }

    pub fn hanging() -> Self {
        Self::with_mode(Mode::Hanging)
    }

    pub fn slow(delay: Duration) -> Self {
        Self::with_mode(Mode::Slow(delay))
    }

    pub fn checkouts(&self) -> Vec<CheckoutRequest> {
        self.checkouts.lock().unwrap().clone()
    }

    pub fn refunds(&self) -> Vec<RefundRequest> {
        self.refunds.lock().unwrap().clone()
    }
}

#[async_trait]
impl PaymentStrategy for FakeGateway {
    async fn create_checkout(&self, request: &CheckoutRequest) -> OrderResult<ProviderCheckout> {
        match self.mode {
            Mode::FailingCheckout | Mode::Offline => {
                return Err(OrderError::Network("connection refused".to_string()));
            }
            Mode::Hanging => return std::future::pending().await,
            _ => {}
        }
        let mut checkouts = self.checkouts.lock().unwrap();
        checkouts.push(request.clone());
        let id = format!("chk_{}", checkouts.len());
        Ok(ProviderCheckout {
            redirect_url: format!("https://pay.example.com/{}", id),
            raw: serde_json::json!({ "id": id }),
            id,
        })
    }

    async fn refund(&self, request: &RefundRequest) -> OrderResult<ProviderRefund> {
        if let Mode::Slow(delay) = self.mode {
            tokio::time::sleep(delay).await;
        }
        match self.mode {
            Mode::Offline => Err(OrderError::Network("connection reset".to_string())),
            Mode::RejectingRefunds => Err(OrderError::ExternalService {
                provider: "fake".to_string(),
                message: "charge already disputed".to_string(),
            }),
            _ => {
                let mut refunds = self.refunds.lock().unwrap();
                refunds.push(request.clone());
                let id = format!("rf_{}", refunds.len());
                Ok(ProviderRefund {
                    raw: serde_json::json!({ "id": id, "status": "processing" }),
                    id,
                    status: "processing".to_string(),
                })
            }
        }
    }

    fn provider_name(&self) -> &str {
        "fake"
    }
}

/// Notifier that remembers every call
#[derive(Default)]
pub struct RecordingNotifier {
    calls: Mutex<Vec<(Uuid, OrderStatus)>>,
}

impl RecordingNotifier {
    pub fn calls(&self) -> Vec<(Uuid, OrderStatus)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationDispatcher for RecordingNotifier {
    async fn notify(&self, order_id: Uuid, new_status: OrderStatus) -> OrderResult<()> {
        self.calls.lock().unwrap().push((order_id, new_status));
        Ok(())
    }
}

/// Audit logger that keeps every entry
#[derive(Default)]
pub struct RecordingAudit {
    entries: Mutex<Vec<AuditEntry>>,
}

impl RecordingAudit {
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().unwrap().clone()
    }

    pub fn entry(&self, action: &str) -> AuditEntry {
        self.entries()
            .into_iter()
            .find(|e| e.action == action)
            .unwrap_or_else(|| panic!("no audit entry for {}", action))
    }
}

#[async_trait]
impl AuditLogger for RecordingAudit {
    async fn log(&self, entry: AuditEntry) -> OrderResult<()> {
        self.entries.lock().unwrap().push(entry);
        Ok(())
    }
}
