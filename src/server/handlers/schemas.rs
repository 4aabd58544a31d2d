//! Schema endpoints: the zero-downtime update and the active-schema read.

use std::sync::Arc;

use axum::extract::Path;
use axum::{Extension, Json};
use rusqlite::OptionalExtension;

use crate::server::dto::{SchemaResponse, SchemaUpdatedResponse, UpdateSchemaRequest};
use crate::server::error::RestError;
use crate::server::handlers::tenants::tenant_exists;
use crate::server::AppState;
use crate::store::decode_time;

/// `POST /api/v1/tenants/:tenant_id/schema` — validate, persist a new
/// schema version, rebuild the engine, swap it in.
pub async fn update_schema(
    Extension(state): Extension<Arc<AppState>>,
    Path(tenant_id): Path<String>,
    Json(req): Json<UpdateSchemaRequest>,
) -> Result<Json<SchemaUpdatedResponse>, RestError> {
    if !tenant_exists(&state, &tenant_id)? {
        return Err(RestError::not_found(format!("tenant '{tenant_id}' not found")));
    }

    let update = state
        .manager
        .update_tenant_schema(&tenant_id, &req.definition)?;

    Ok(Json(SchemaUpdatedResponse {
        status: "active",
        version: update.version,
        rules_recompiled: update.rules_recompiled,
        failures: update.failures,
    }))
}

/// `GET /api/v1/tenants/:tenant_id/schema` — the active schema.
pub async fn get_schema(
    Extension(state): Extension<Arc<AppState>>,
    Path(tenant_id): Path<String>,
) -> Result<Json<SchemaResponse>, RestError> {
    let conn = state.pool.get().map_err(|e| RestError::internal(e.to_string()))?;
    let row = conn
        .query_row(
            "SELECT version, definition, created_at
             FROM schemas
             WHERE tenant_id = ?1 AND active = 1",
            rusqlite::params![tenant_id],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            },
        )
        .optional()
        .map_err(|e| RestError::internal(e.to_string()))?;

    let (version, definition, created_at) = row.ok_or_else(|| {
        RestError::not_found(format!("no active schema for tenant '{tenant_id}'"))
    })?;

    Ok(Json(SchemaResponse {
        version,
        definition: serde_json::from_str(&definition)
            .map_err(|e| RestError::internal(format!("stored schema is unreadable: {e}")))?,
        created_at: decode_time(&created_at).map_err(|e| RestError::internal(e.to_string()))?,
    }))
}
