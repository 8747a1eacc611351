//! # Application State
//!
//! Shared state for the Axum application.
//! Wires the order engine, payment service and webhook processor over one store.

use anyhow::Context;
use order_core::{
    AuditLogger, BoxedPaymentStrategy, CheckoutUrls, ItemCatalog, LoggingNotifier, MemoryOrderStore,
    MenuCatalog, NotificationDispatcher, OrderLifecycle, OrderStore, PricingCalculator,
    PricingSettings, PromoCatalog, PromoValidator, StaticSettings, TracingAuditLogger,
};
use order_gateway::{CheckoutApiClient, GatewayConfig, PaymentService, WebhookProcessor, WebhookVerifier};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Public base URL; checkout redirect URLs are built under it
    pub base_url: String,
    /// Environment (development, staging, production)
    pub environment: String,
    /// Directory holding menu.toml, pricing.toml and promos.toml
    pub config_dir: PathBuf,
}

impl AppConfig {
    /// Load from environment variables
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            base_url: std::env::var("BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8080".to_string()),
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            config_dir: std::env::var("CONFIG_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("config")),
        }
    }

    /// Get the socket address to bind to
    pub fn socket_addr(&self) -> anyhow::Result<std::net::SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid bind address {}:{}", self.host, self.port))
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

/// Pluggable collaborators; everything else is derived from these
pub struct Collaborators {
    pub store: Arc<dyn OrderStore>,
    pub catalog: Arc<dyn ItemCatalog>,
    pub settings: PricingSettings,
    pub gateway: BoxedPaymentStrategy,
    pub verifier: WebhookVerifier,
    pub notifier: Arc<dyn NotificationDispatcher>,
    pub audit: Arc<dyn AuditLogger>,
    pub currency: String,
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub lifecycle: OrderLifecycle,
    pub payments: PaymentService,
    pub webhooks: Arc<WebhookProcessor>,
    pub store: Arc<dyn OrderStore>,
}

impl AppState {
    /// Build from environment and the config directory, with an in-memory store
    pub async fn new() -> anyhow::Result<Self> {
        let config = AppConfig::from_env();
        let gateway_config = GatewayConfig::from_env()?;

        let catalog = load_menu(&config.config_dir)?;
        let settings = load_pricing(&config.config_dir)?;
        let promos = load_promos(&config.config_dir)?;

        let store = Arc::new(MemoryOrderStore::new());
        for promo in promos.promos {
            store.upsert_promo_code(promo).await?;
        }

        let client = CheckoutApiClient::new(gateway_config.clone())?;
        info!(
            items = catalog.active_items().count(),
            provider = %gateway_config.provider_name,
            currency = %gateway_config.currency,
            "engine configured"
        );

        Ok(Self::from_parts(
            config,
            Collaborators {
                store,
                catalog: Arc::new(catalog),
                settings,
                gateway: Arc::new(client),
                verifier: WebhookVerifier::new(
                    &gateway_config.webhook_secret,
                    gateway_config.webhook_tolerance_secs,
                ),
                notifier: Arc::new(LoggingNotifier),
                audit: Arc::new(TracingAuditLogger),
                currency: gateway_config.currency,
            },
        ))
    }

    pub fn from_parts(config: AppConfig, parts: Collaborators) -> Self {
        let pricing = PricingCalculator::new(
            parts.catalog,
            Arc::new(StaticSettings::new(parts.settings)),
            PromoValidator::new(parts.store.clone()),
        );
        let lifecycle = OrderLifecycle::new(parts.store.clone(), pricing, parts.audit.clone());
        let payments = PaymentService::new(
            parts.store.clone(),
            parts.gateway,
            parts.audit.clone(),
            CheckoutUrls::new(&config.base_url),
            parts.currency,
        );
        let webhooks = WebhookProcessor::new(
            parts.store.clone(),
            lifecycle.clone(),
            parts.notifier,
            parts.audit,
            parts.verifier,
        );

        Self {
            config,
            lifecycle,
            payments,
            webhooks: Arc::new(webhooks),
            store: parts.store,
        }
    }
}

/// Read a config file; a missing file is not an error
fn read_config_file(dir: &Path, name: &str) -> anyhow::Result<Option<(PathBuf, String)>> {
    let path = dir.join(name);
    match std::fs::read_to_string(&path) {
        Ok(content) => Ok(Some((path, content))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(path = %path.display(), "config file not found, using defaults");
            Ok(None)
        }
        Err(e) => Err(e).with_context(|| format!("failed to read {}", path.display())),
    }
}

fn load_menu(dir: &Path) -> anyhow::Result<MenuCatalog> {
    let Some((path, content)) = read_config_file(dir, "menu.toml")? else {
        return Ok(MenuCatalog::new());
    };
    let menu = MenuCatalog::from_toml(&content)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    info!(path = %path.display(), items = menu.items.len(), "loaded menu");
    Ok(menu)
}

fn load_pricing(dir: &Path) -> anyhow::Result<PricingSettings> {
    let Some((path, content)) = read_config_file(dir, "pricing.toml")? else {
        return Ok(PricingSettings::default());
    };
    PricingSettings::from_toml(&content).with_context(|| format!("failed to parse {}", path.display()))
}

fn load_promos(dir: &Path) -> anyhow::Result<PromoCatalog> {
    let Some((path, content)) = read_config_file(dir, "promos.toml")? else {
        return Ok(PromoCatalog::default());
    };
    let promos = PromoCatalog::from_toml(&content)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    info!(path = %path.display(), promos = promos.promos.len(), "loaded promo codes");
    Ok(promos)
}
