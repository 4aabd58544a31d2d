//! Rule CRUD. Mutations go through the tenant's engine so programs and
//! caches stay consistent with the store; reads go straight to the
//! tenant-scoped store.

use std::sync::Arc;

use axum::extract::Path;
use axum::http::StatusCode;
use axum::{Extension, Json};
use uuid::Uuid;

use crate::server::dto::{CreateRuleRequest, RulesListResponse, UpdateRuleRequest};
use crate::server::error::RestError;
use crate::server::AppState;
use crate::store::{Rule, RuleStore, SqliteRuleStore};

/// `POST /api/v1/tenants/:tenant_id/rules`
pub async fn create_rule(
    Extension(state): Extension<Arc<AppState>>,
    Path(tenant_id): Path<String>,
    Json(req): Json<CreateRuleRequest>,
) -> Result<(StatusCode, Json<Rule>), RestError> {
    if req.name.trim().is_empty() || req.expression.trim().is_empty() {
        return Err(RestError::bad_request(
            "INVALID_INPUT",
            "name and expression are required",
        ));
    }

    let engine = state.manager.get_engine(&tenant_id)?;
    let rule = Rule::new(
        format!("rule-{}", Uuid::new_v4()),
        req.name,
        req.expression,
        req.active,
    );
    let stored = engine.add_rule(&rule)?;
    Ok((StatusCode::CREATED, Json(stored)))
}

/// `GET /api/v1/tenants/:tenant_id/rules`
pub async fn list_rules(
    Extension(state): Extension<Arc<AppState>>,
    Path(tenant_id): Path<String>,
) -> Result<Json<RulesListResponse>, RestError> {
    let conn = state.pool.get().map_err(|e| RestError::internal(e.to_string()))?;
    let mut stmt = conn
        .prepare(
            "SELECT id, name, expression, active, created_at, updated_at
             FROM rules
             WHERE tenant_id = ?1
             ORDER BY created_at DESC",
        )
        .map_err(|e| RestError::internal(e.to_string()))?;

    let rules = stmt
        .query_map(rusqlite::params![tenant_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, bool>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
            ))
        })
        .map_err(|e| RestError::internal(e.to_string()))?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(|e| RestError::internal(e.to_string()))?
        .into_iter()
        .map(|(id, name, expression, active, created_at, updated_at)| {
            Ok(Rule {
                id,
                name,
                expression,
                active,
                created_at: crate::store::decode_time(&created_at)
                    .map_err(|e| RestError::internal(e.to_string()))?,
                updated_at: crate::store::decode_time(&updated_at)
                    .map_err(|e| RestError::internal(e.to_string()))?,
            })
        })
        .collect::<Result<Vec<_>, RestError>>()?;

    Ok(Json(RulesListResponse { rules }))
}

/// `GET /api/v1/tenants/:tenant_id/rules/:rule_id`
pub async fn get_rule(
    Extension(state): Extension<Arc<AppState>>,
    Path((tenant_id, rule_id)): Path<(String, String)>,
) -> Result<Json<Rule>, RestError> {
    let store = SqliteRuleStore::new(state.pool.clone(), &tenant_id);
    Ok(Json(store.get(&rule_id)?))
}

/// `PUT /api/v1/tenants/:tenant_id/rules/:rule_id` — partial update; omitted
/// fields keep their stored values.
pub async fn update_rule(
    Extension(state): Extension<Arc<AppState>>,
    Path((tenant_id, rule_id)): Path<(String, String)>,
    Json(req): Json<UpdateRuleRequest>,
) -> Result<Json<Rule>, RestError> {
    let engine = state.manager.get_engine(&tenant_id)?;

    let store = SqliteRuleStore::new(state.pool.clone(), &tenant_id);
    let mut rule = store.get(&rule_id)?;
    if let Some(name) = req.name {
        rule.name = name;
    }
    if let Some(expression) = req.expression {
        rule.expression = expression;
    }
    if let Some(active) = req.active {
        rule.active = active;
    }

    let stored = engine.update_rule(&rule)?;
    Ok(Json(stored))
}

/// `DELETE /api/v1/tenants/:tenant_id/rules/:rule_id`
pub async fn delete_rule(
    Extension(state): Extension<Arc<AppState>>,
    Path((tenant_id, rule_id)): Path<(String, String)>,
) -> Result<StatusCode, RestError> {
    let engine = state.manager.get_engine(&tenant_id)?;
    engine.delete_rule(&rule_id)?;
    Ok(StatusCode::NO_CONTENT)
}
