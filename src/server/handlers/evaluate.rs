//! The evaluation verb.
//!
//! Maps the public request shape onto `Engine::evaluate` (explicit rule
//! list) or `Engine::evaluate_all` (empty/omitted list). Per-rule failures
//! ride inside the results; only infrastructural faults (unknown tenant,
//! cold-cache store read) fail the request.

use std::sync::Arc;
use std::time::Instant;

use axum::{Extension, Json};
use tracing::warn;

use crate::expr::facts_from_json;
use crate::server::dto::{EvaluateRequest, EvaluateResponse};
use crate::server::error::RestError;
use crate::server::AppState;

/// `POST /api/v1/evaluate`
pub async fn evaluate(
    Extension(state): Extension<Arc<AppState>>,
    Json(req): Json<EvaluateRequest>,
) -> Result<Json<EvaluateResponse>, RestError> {
    let tenant_id = req
        .tenant_id
        .filter(|t| !t.is_empty())
        .ok_or_else(|| RestError::bad_request("INVALID_INPUT", "tenantId is required"))?;

    let facts_json = req
        .facts
        .ok_or_else(|| RestError::bad_request("INVALID_INPUT", "facts are required"))?;
    let facts_map = facts_json
        .as_object()
        .ok_or_else(|| RestError::bad_request("INVALID_INPUT", "facts must be an object"))?;
    let facts = facts_from_json(facts_map);

    let engine = state.manager.get_engine(&tenant_id)?;

    let start = Instant::now();
    let results = if req.rules.is_empty() {
        engine.evaluate_all(&facts)?
    } else {
        let mut results = Vec::with_capacity(req.rules.len());
        for rule_id in &req.rules {
            match engine.evaluate(rule_id, &facts) {
                Ok(result) => results.push(result),
                Err(err) => {
                    // Unknown or uncompiled rule: no result row for it.
                    if state.sampler.note_warning() {
                        warn!(tenant_id, rule_id, %err, "rule evaluation skipped");
                    }
                }
            }
        }
        results
    };
    let elapsed = start.elapsed();

    Ok(Json(EvaluateResponse {
        results,
        evaluation_time: format!("{elapsed:?}"),
    }))
}
