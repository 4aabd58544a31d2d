//! Tenant CRUD. Tenant rows are owned by this layer: the manager only
//! tracks engines, so row creation happens here before any schema or rule
//! can reference the tenant.

use std::sync::Arc;

use axum::extract::Path;
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::Utc;
use uuid::Uuid;

use crate::server::dto::{CreateTenantRequest, TenantResponse, TenantsListResponse};
use crate::server::error::RestError;
use crate::server::AppState;
use crate::store::{decode_time, encode_time};

/// `GET /api/v1/tenants`
pub async fn list_tenants(
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<TenantsListResponse>, RestError> {
    let conn = state.pool.get().map_err(|e| RestError::internal(e.to_string()))?;
    let mut stmt = conn
        .prepare(
            "SELECT id, name, created_at, updated_at
             FROM tenants
             ORDER BY created_at DESC",
        )
        .map_err(|e| RestError::internal(e.to_string()))?;

    let tenants = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })
        .map_err(|e| RestError::internal(e.to_string()))?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(|e| RestError::internal(e.to_string()))?
        .into_iter()
        .map(|(id, name, created_at, updated_at)| {
            Ok(TenantResponse {
                id,
                name,
                created_at: decode_time(&created_at)
                    .map_err(|e| RestError::internal(e.to_string()))?,
                updated_at: decode_time(&updated_at)
                    .map_err(|e| RestError::internal(e.to_string()))?,
            })
        })
        .collect::<Result<Vec<_>, RestError>>()?;

    Ok(Json(TenantsListResponse { tenants }))
}

/// `POST /api/v1/tenants` — creates the row only; the engine appears once
/// a schema is posted.
pub async fn create_tenant(
    Extension(state): Extension<Arc<AppState>>,
    Json(req): Json<CreateTenantRequest>,
) -> Result<(StatusCode, Json<TenantResponse>), RestError> {
    if req.name.trim().is_empty() {
        return Err(RestError::bad_request("INVALID_INPUT", "name is required"));
    }

    let id = Uuid::new_v4().to_string();
    let now = Utc::now();

    let conn = state.pool.get().map_err(|e| RestError::internal(e.to_string()))?;
    conn.execute(
        "INSERT INTO tenants (id, name, created_at, updated_at) VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![id, req.name, encode_time(now), encode_time(now)],
    )
    .map_err(|e| RestError::internal(e.to_string()))?;

    Ok((
        StatusCode::CREATED,
        Json(TenantResponse {
            id,
            name: req.name,
            created_at: now,
            updated_at: now,
        }),
    ))
}

/// `DELETE /api/v1/tenants/:tenant_id` — removes the row (schemas and
/// rules cascade) and drops the engine.
pub async fn delete_tenant(
    Extension(state): Extension<Arc<AppState>>,
    Path(tenant_id): Path<String>,
) -> Result<StatusCode, RestError> {
    let conn = state.pool.get().map_err(|e| RestError::internal(e.to_string()))?;
    let affected = conn
        .execute(
            "DELETE FROM tenants WHERE id = ?1",
            rusqlite::params![tenant_id],
        )
        .map_err(|e| RestError::internal(e.to_string()))?;

    if affected == 0 {
        return Err(RestError::not_found(format!("tenant '{tenant_id}' not found")));
    }

    // The engine may not exist (tenant without a schema); that's fine.
    let _ = state.manager.delete_tenant(&tenant_id);

    Ok(StatusCode::NO_CONTENT)
}

/// True if a tenant row exists. Shared by the schema and rule handlers.
pub(crate) fn tenant_exists(state: &AppState, tenant_id: &str) -> Result<bool, RestError> {
    let conn = state.pool.get().map_err(|e| RestError::internal(e.to_string()))?;
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM tenants WHERE id = ?1)",
        rusqlite::params![tenant_id],
        |row| row.get(0),
    )
    .map_err(|e| RestError::internal(e.to_string()))
}
