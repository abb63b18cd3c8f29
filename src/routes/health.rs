use axum::extract::State;
use axum::Json;
use serde::Serialize;
use sqlx::query_scalar;
use utoipa::ToSchema;

use crate::app::AppState;
use crate::errors::AppResult;

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: &'static str,
    /// False when the permission store cannot be read; every gated request is denied meanwhile.
    pub store_ok: bool,
    pub store_error: Option<String>,
}

#[utoipa::path(
    get,
    path = "/api/health",
    tag = "Health",
    responses((status = 200, description = "Health check", body = HealthResponse))
)]
pub async fn health(State(state): State<AppState>) -> AppResult<Json<HealthResponse>> {
    let check = query_scalar::<_, i64>("SELECT COUNT(*) FROM roles").fetch_one(&state.pool).await;

    match check {
        Ok(_) => Ok(Json(HealthResponse { status: "ok", store_ok: true, store_error: None })),
        Err(e) => {
            tracing::warn!(error = %e, "permission store health check failed");
            Ok(Json(HealthResponse { status: "degraded", store_ok: false, store_error: Some(e.to_string()) }))
        }
    }
}
