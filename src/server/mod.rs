//! # REST API
//!
//! Thin HTTP glue over the manager and engines: routing, request decoding,
//! and error mapping live here; all rules semantics live below. The router
//! is plain axum with permissive CORS and request tracing.

pub mod dto;
pub mod error;
pub mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::{Extension, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::HttpConfig;
use crate::logging::LogSampler;
use crate::manager::TenantManager;
use crate::store::ConnectionPool;

use self::handlers::{admin, evaluate, rules, schemas, tenants};

/// Shared state handed to every handler.
pub struct AppState {
    pub manager: Arc<TenantManager>,
    pub pool: ConnectionPool,
    pub sampler: Arc<LogSampler>,
}

/// Build the API router.
pub fn create_router(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        .route("/health", get(admin::health))
        .route("/stats", get(admin::stats))
        .route("/evaluate", post(evaluate::evaluate))
        .route(
            "/tenants",
            get(tenants::list_tenants).post(tenants::create_tenant),
        )
        .route("/tenants/:tenant_id", axum::routing::delete(tenants::delete_tenant))
        .route(
            "/tenants/:tenant_id/schema",
            get(schemas::get_schema).post(schemas::update_schema),
        )
        .route(
            "/tenants/:tenant_id/rules",
            get(rules::list_rules).post(rules::create_rule),
        )
        .route(
            "/tenants/:tenant_id/rules/:rule_id",
            get(rules::get_rule)
                .put(rules::update_rule)
                .delete(rules::delete_rule),
        );

    Router::new()
        .nest("/api/v1", api_routes)
        .layer(Extension(state))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Bind and serve until shutdown.
pub async fn start_http_server(
    state: Arc<AppState>,
    config: &HttpConfig,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let app = create_router(state);
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    tracing::info!(%addr, "HTTP server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
