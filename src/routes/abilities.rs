//! Ability introspection endpoints
//!
//! Lets clients fetch the caller's compiled rules (to hide UI affordances)
//! and ask one-off questions against the same ability the gate uses.

use axum::{routing::{get, post}, Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{Action, CurrentAbility, FieldPath, FieldSet, Rule, Subject};
use crate::errors::AppError;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/me", get(my_ability))
        .route("/check", post(check))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RuleView {
    pub action: Action,
    pub subject: Subject,
    /// Empty means every field.
    pub fields: Vec<String>,
    #[schema(value_type = Option<Object>)]
    pub conditions: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub permission_id: Uuid,
}

impl From<&Rule> for RuleView {
    fn from(rule: &Rule) -> Self {
        Self {
            action: rule.action(),
            subject: rule.subject(),
            fields: rule.fields().to_vec(),
            conditions: rule.conditions().cloned(),
            reason: rule.reason().map(str::to_string),
            permission_id: rule.permission_id(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AbilityResponse {
    pub user_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub rules: Vec<RuleView>,
}

/// The caller's compiled rules, conditions already resolved
#[utoipa::path(
    get,
    path = "/abilities/me",
    tag = "Abilities",
    responses(
        (status = 200, description = "Compiled rules of the caller", body = AbilityResponse),
        (status = 401, description = "Missing or invalid token"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn my_ability(current: CurrentAbility) -> Result<Json<AbilityResponse>, AppError> {
    Ok(Json(AbilityResponse {
        user_id: current.principal.id,
        role: current.principal.role.clone(),
        rules: current.ability.rules().iter().map(RuleView::from).collect(),
    }))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CheckRequest {
    #[schema(example = "read")]
    pub action: Action,
    #[schema(example = "Report")]
    pub subject: Subject,
    /// Optional instance to match against rule conditions.
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub instance: Option<Value>,
    /// Optional field that must also be granted.
    #[serde(default)]
    pub field: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CheckResponse {
    pub allowed: bool,
    /// `"all"` or the list of granted fields.
    #[schema(value_type = Object)]
    pub fields: FieldSet,
}

/// Evaluate one capability against the caller's ability
#[utoipa::path(
    post,
    path = "/abilities/check",
    tag = "Abilities",
    request_body = CheckRequest,
    responses(
        (status = 200, description = "Decision for the requested capability", body = CheckResponse),
        (status = 400, description = "Malformed field path"),
        (status = 401, description = "Missing or invalid token"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn check(current: CurrentAbility, Json(req): Json<CheckRequest>) -> Result<Json<CheckResponse>, AppError> {
    if let Some(field) = req.field.as_deref() {
        FieldPath::parse(field).map_err(|err| AppError::bad_request(err.to_string()))?;
    }

    let fields = current.ability.fields_for(req.action, req.subject);
    let allowed = current.ability.can(req.action, req.subject, req.instance.as_ref())
        && req.field.as_deref().map_or(true, |f| fields.covers(f));

    tracing::debug!(
        user_id = %current.principal.id,
        action = %req.action,
        subject = %req.subject,
        allowed,
        "ability check"
    );

    Ok(Json(CheckResponse { allowed, fields }))
}

