//! User directory, read through the gate.
//!
//! Lists are narrowed per instance and per field; an empty result after
//! filtering is returned as an empty list, not as 403.
//!
//! A missing user is 404 only for callers with an unconditional read rule.
//! Callers limited by conditions get 403 for missing and non-matching ids
//! alike, so they cannot probe which ids exist.

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{self, Action, Authorized, Requirement, RequirementSet, Subject};
use crate::errors::AppError;
use crate::models::user::User;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_users))
        .route("/:user_id", get(get_user))
}

pub struct ReadUsers;

impl RequirementSet for ReadUsers {
    fn requirements() -> Vec<Requirement> {
        vec![Requirement::can(Action::Read, Subject::User)]
    }
}

/// List the users the caller may read, redacted to readable fields
#[utoipa::path(
    get,
    path = "/users",
    tag = "Users",
    responses(
        (status = 200, description = "Readable users, possibly empty", body = Vec<User>),
        (status = 401, description = "Missing or invalid token"),
        (status = 403, description = "Caller cannot read users"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn list_users(
    State(state): State<AppState>,
    auth: Authorized<ReadUsers>,
) -> Result<Json<Vec<Value>>, AppError> {
    let rows = sqlx::query(
        "SELECT id, name, email, role_id, created_at, updated_at FROM users WHERE deleted_at IS NULL ORDER BY name"
    )
    .fetch_all(&state.pool)
    .await?;

    let users = rows.iter().map(User::try_from).collect::<Result<Vec<_>, _>>()?;
    let total = users.len();

    let visible = authz::filter(&auth.ability, Action::Read, Subject::User, users);
    tracing::debug!(
        user_id = %auth.principal.id,
        total,
        visible = visible.len(),
        "users filtered"
    );

    Ok(Json(
        visible
            .iter()
            .map(|user| authz::project(&auth.ability, Action::Read, Subject::User, user))
            .collect(),
    ))
}

/// Get one user, redacted to readable fields
#[utoipa::path(
    get,
    path = "/users/{user_id}",
    tag = "Users",
    params(
        ("user_id" = Uuid, Path, description = "User ID"),
    ),
    responses(
        (status = 200, description = "User, unreadable fields omitted", body = User),
        (status = 403, description = "Caller cannot read this user, or may only read users matching conditions and this one is missing"),
        (status = 404, description = "User not found"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_user(
    State(state): State<AppState>,
    auth: Authorized<ReadUsers>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let row = sqlx::query(
        "SELECT id, name, email, role_id, created_at, updated_at FROM users WHERE id = ? AND deleted_at IS NULL"
    )
    .bind(user_id.to_string())
    .fetch_optional(&state.pool)
    .await?;

    let Some(row) = row else {
        if auth.ability.can(Action::Read, Subject::User, Some(&json!({}))) {
            return Err(AppError::not_found("User not found"));
        }
        return Err(AppError::forbidden("cannot read this user"));
    };

    let user = User::try_from(&row)?;

    if !auth.ability.can_instance(Action::Read, Subject::User, &user) {
        tracing::info!(
            user_id = %auth.principal.id,
            target = %user.id,
            reason = "instance_conditions",
            "authorization denied"
        );
        return Err(AppError::forbidden("cannot read this user"));
    }

    Ok(Json(authz::project(&auth.ability, Action::Read, Subject::User, &user)))
}
