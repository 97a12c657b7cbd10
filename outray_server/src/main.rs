//! Outray control-plane server
//!
//! This server handles:
//! - Subdomain/tunnel registration for tunnel clients
//! - Custom domain ownership verification (DNS challenge)
//! - Teardown directives toward data-plane nodes (control channel)
//!
//! The data-plane proxying itself runs elsewhere; this process only issues
//! control directives and maintains the registry.

mod allocator;
mod config;
mod control;
mod db;
mod error;
mod registry;
mod routes;
mod verification;

use axum::{extract::State, response::IntoResponse, routing::get, Router};
use std::net::SocketAddr;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,outray_server=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = config::Config::from_env()?;
    tracing::info!("Starting Outray control plane on {}:{}", config.host, config.port);
    tracing::info!("Base domain: {}", config.base_domain);
    tracing::info!("Edge host: {}", config.edge_host);

    // Initialize database
    tracing::info!("Connecting to database...");
    let db_pool = db::init_pool(&config.database_url).await?;
    tracing::info!("Running database migrations...");
    db::run_migrations(&db_pool).await?;

    // Initialize Redis (control channel)
    tracing::info!("Connecting to Redis...");
    let redis_client = control::init_client(&config.redis_url).await?;

    // Create app state
    let state = routes::AppState::new(config.clone(), db_pool, redis_client);

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/api/health", get(health_check))
        .merge(routes::tunnel::router())
        .merge(routes::domains::router())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    tracing::info!("Control-plane API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check endpoint
async fn health_check(State(state): State<routes::AppState>) -> impl IntoResponse {
    let db_status = sqlx::query("SELECT 1")
        .fetch_one(&state.db)
        .await
        .map(|_| "ok")
        .unwrap_or("error");

    let redis_status = state
        .publisher
        .ping()
        .await
        .map(|_| "ok")
        .unwrap_or("error");

    let status = if db_status == "ok" && redis_status == "ok" {
        "healthy"
    } else {
        "degraded"
    };

    axum::Json(serde_json::json!({
        "status": status,
        "db": db_status,
        "redis": redis_status,
    }))
}
