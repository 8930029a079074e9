//! agent-market HTTP server

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use market_core::seed_demo_catalog;
use market_payments::{PaymentGateway, StripeGateway};
use market_server::{build_router, sweeper, AppState, ServerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env()?;

    // Initialize payments
    let gateway: Option<Arc<dyn PaymentGateway>> = match config.stripe_secret_key.as_deref() {
        Some(key) => {
            let stripe = StripeGateway::new(key, &config.payment_currency)?;
            tracing::info!(currency = %config.payment_currency, "✓ Stripe configured");
            Some(Arc::new(stripe))
        }
        None => {
            tracing::warn!("⚠ Stripe not configured - payments disabled");
            tracing::warn!("  Set STRIPE_SECRET_KEY in .env");
            None
        }
    };

    // Build application state
    let mut state = AppState::in_memory(gateway);

    match config.stripe_webhook_secret.as_deref() {
        Some(secret) => state = state.with_webhook_secret(secret),
        None => tracing::warn!("⚠ STRIPE_WEBHOOK_SECRET not set - webhook endpoint disabled"),
    }

    if config.seed_catalog {
        seed_demo_catalog(state.catalog.as_ref()).await?;
    }

    if let Some(ttl) = config.pending_ttl {
        state = state.with_pending_ttl(ttl);
        sweeper::spawn(state.clone(), ttl, config.sweep_interval);
        tracing::info!(
            ttl_secs = ttl.as_secs(),
            interval_secs = config.sweep_interval.as_secs(),
            "Pending subscription sweeper started"
        );
    }

    let app = build_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;

    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("🚀 agent-market server running on http://{}", config.bind_addr);
    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("  GET  /api/agents                           - Agent catalog");
    tracing::info!("  POST /api/agents/{{id}}/create-payment-intent - Start a subscription");
    tracing::info!("  POST /api/subscriptions/{{id}}/complete      - Confirm payment");
    tracing::info!("  POST /api/webhooks/stripe                  - Stripe events");

    axum::serve(listener, app).await?;

    Ok(())
}
