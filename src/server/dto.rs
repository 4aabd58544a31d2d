//! Request and response bodies for the REST API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::{CompileFailure, EvaluationResult};
use crate::schema::Schema;
use crate::store::Rule;

#[derive(Debug, Deserialize)]
pub struct CreateTenantRequest {
    pub name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantResponse {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct TenantsListResponse {
    pub tenants: Vec<TenantResponse>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateSchemaRequest {
    pub definition: Schema,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaUpdatedResponse {
    pub status: &'static str,
    pub version: i64,
    pub rules_recompiled: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<CompileFailure>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaResponse {
    pub version: i64,
    pub definition: Schema,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateRuleRequest {
    pub name: String,
    pub expression: String,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct UpdateRuleRequest {
    pub name: Option<String>,
    pub expression: Option<String>,
    pub active: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct RulesListResponse {
    pub rules: Vec<Rule>,
}

#[derive(Debug, Deserialize)]
pub struct EvaluateRequest {
    #[serde(rename = "tenantId")]
    pub tenant_id: Option<String>,
    pub facts: Option<serde_json::Value>,
    #[serde(default)]
    pub rules: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateResponse {
    pub results: Vec<EvaluationResult>,
    pub evaluation_time: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub tenants_loaded: usize,
}
