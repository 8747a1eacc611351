//! # tablecart
//!
//! Restaurant ordering and payment reconciliation service.
//!
//! ## Usage
//!
//! ```bash
//! # Set environment variables
//! export PAYMENT_API_KEY=sk_test_...
//! export PAYMENT_WEBHOOK_SECRET=whsec_...
//! export BASE_URL=https://order.example.com
//!
//! # Run the server (LOG_FORMAT=json for structured logs)
//! tablecart
//! ```

use order_api::{routes, state::AppState};
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| fmt::layer().json()))
        .with((!json).then(|| fmt::layer()))
        .init();

    print_banner();

    let state = AppState::new().await?;

    let addr = state.config.socket_addr()?;
    let is_prod = state.config.is_production();

    info!("Environment: {}", state.config.environment);
    info!("Checkout redirects under {}", state.config.base_url);

    let app = routes::create_router(state);

    info!("tablecart starting on http://{}", addr);

    if !is_prod {
        info!("Health: http://{}/health", addr);
        info!("Orders: POST http://{}/api/v1/orders", addr);
        info!("Webhook: POST http://{}/webhook/payments", addr);
    }

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn print_banner() {
    println!(
        r#"
  tablecart
  ━━━━━━━━━━━━━━━━━━━━━━━
  Orders, payments, reconciliation
  Version: {}
"#,
        env!("CARGO_PKG_VERSION")
    );
}
