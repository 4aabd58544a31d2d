//! Health and stats endpoints.

use std::sync::Arc;

use axum::{Extension, Json};

use crate::server::dto::HealthResponse;
use crate::server::error::RestError;
use crate::server::AppState;

/// `GET /api/v1/health` — liveness plus a database ping.
pub async fn health(
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<HealthResponse>, RestError> {
    let conn = state
        .pool
        .get()
        .map_err(|e| RestError::service_unavailable(format!("database unreachable: {e}")))?;
    conn.query_row("SELECT 1", [], |_| Ok(()))
        .map_err(|e| RestError::service_unavailable(format!("database unreachable: {e}")))?;

    Ok(Json(HealthResponse {
        status: "healthy",
        tenants_loaded: state.manager.tenant_count(),
    }))
}

/// `GET /api/v1/stats` — log/error counters (true totals, never sampled).
pub async fn stats(Extension(state): Extension<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "logging": state.sampler.counters(),
        "tenantsLoaded": state.manager.tenant_count(),
    }))
}
