//! market-analyst HTTP Server
//!
//! Axum-based server exposing the resolution-and-delivery pipeline over
//! REST and WebSocket endpoints. The LLM provider and exchange client are
//! selected once here, at startup, and injected behind their traits.

mod handlers;
mod state;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use market_analyst::exchange::{BinanceClient, MarketDataSource};
use market_analyst::{AnalystConfig, Analyzer};

use crate::handlers::{analyze_handler, analyze_stream_handler, health_check};
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment
    dotenvy::dotenv().ok();

    // Initialize LLM provider (selected from AGENT_PROVIDER)
    let provider = agent_runtime::provider_from_env()?;
    match provider.health_check().await {
        Ok(true) => tracing::info!("✓ Connected to {} provider", provider.name()),
        Ok(false) | Err(_) => {
            tracing::warn!("⚠ {} provider not reachable - analyses will fail", provider.name());
        }
    }

    // Initialize exchange client
    let market_data: Arc<dyn MarketDataSource> = Arc::new(BinanceClient::new());
    if market_data.health_check().await {
        tracing::info!("✓ Connected to {} market data", market_data.name());
    } else {
        tracing::warn!("⚠ {} market data not reachable", market_data.name());
    }

    // Build the pipeline
    let config = AnalystConfig::from_env();
    tracing::info!(
        max_concurrent = config.max_concurrent,
        model = %config.model,
        "analyst configured"
    );
    let analyzer = Arc::new(Analyzer::new(
        Arc::clone(&provider),
        Arc::clone(&market_data),
        config,
    ));

    let state = AppState {
        provider,
        market_data,
        analyzer,
    };

    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build router
    let app = Router::new()
        .route("/health", get(health_check))
        .route("/api/analyze", post(analyze_handler))
        .route("/api/analyze/stream", get(analyze_stream_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start server
    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("🚀 market-analyst server running on http://{}", addr);
    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("");
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health              - Health check");
    tracing::info!("  POST /api/analyze         - Resolve and analyze (collected)");
    tracing::info!("  GET  /api/analyze/stream  - WebSocket segment streaming");
    tracing::info!("");

    axum::serve(listener, app).await?;

    Ok(())
}
