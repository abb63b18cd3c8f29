//! Bearer token identification of the caller.
//!
//! Tokens are issued by the identity service; this crate only verifies them
//! and reads the subject as the principal's user id.

use std::sync::Arc;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use uuid::Uuid;

use crate::app::AppState;
use crate::errors::AppError;

const DEFAULT_EXP_HOURS: i64 = 24;

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: Arc<Vec<u8>>,
    pub exp_hours: i64,
}

impl JwtConfig {
    pub fn new(secret: impl Into<Vec<u8>>, exp_hours: i64) -> Self {
        Self {
            secret: Arc::new(secret.into()),
            exp_hours,
        }
    }

    pub fn from_env() -> Result<Self, AppError> {
        let secret = std::env::var("JWT_SECRET").map_err(|_| AppError::configuration("JWT_SECRET not set"))?;
        let exp_hours = std::env::var("JWT_EXP_HOURS")
            .map(|val| val.parse::<i64>())
            .unwrap_or(Ok(DEFAULT_EXP_HOURS))
            .map_err(|_| AppError::configuration("JWT_EXP_HOURS must be a valid integer"))?;

        Ok(Self::new(secret.into_bytes(), exp_hours))
    }

    /// Signs a token for `user_id`. Used by tooling and tests.
    pub fn encode(&self, user_id: Uuid) -> Result<String, AppError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id,
            exp: (now + Duration::hours(self.exp_hours)).timestamp() as usize,
            iat: now.timestamp() as usize,
        };

        jsonwebtoken::encode(&Header::default(), &claims, &EncodingKey::from_secret(&self.secret))
            .map_err(|err| AppError::token(err.to_string()))
    }

    pub fn decode(&self, token: &str) -> Result<Claims, AppError> {
        let mut validation = Validation::default();
        validation.validate_exp = true;

        jsonwebtoken::decode::<Claims>(token, &DecodingKey::from_secret(&self.secret), &validation)
            .map(|data| data.claims)
            .map_err(|err| AppError::token(err.to_string()))
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub exp: usize,
    pub iat: usize,
}

/// The verified caller identity. Carries no permissions of its own.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or_else(|| AppError::unauthorized("Authorization header missing"))?;
        let claims = state.jwt.decode(token)?;

        Ok(AuthUser { user_id: claims.sub })
    }
}
