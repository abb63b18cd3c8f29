use std::sync::Arc;

use axum::http::Method;
use axum::routing::get;
use axum::Router;
use sqlx::SqlitePool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::authz::{Gate, GateConfig, SqlitePermissionStore};
use crate::errors::AppError;
use crate::jwt::JwtConfig;
use crate::routes::{abilities, health, users};

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub jwt: Arc<JwtConfig>,
    pub gate: Gate,
}

impl AppState {
    pub fn new(pool: SqlitePool, jwt: JwtConfig, gate_config: GateConfig) -> Self {
        let store = SqlitePermissionStore::new(pool.clone());
        Self {
            pool,
            jwt: Arc::new(jwt),
            gate: Gate::new(Arc::new(store), gate_config),
        }
    }
}

pub async fn create_app(pool: SqlitePool) -> Result<Router, AppError> {
    let state = AppState::new(pool, JwtConfig::from_env()?, GateConfig::from_env()?);
    Ok(router(state))
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_origin(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(health::health))
        .nest("/abilities", abilities::routes())
        .nest("/users", users::routes())
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
