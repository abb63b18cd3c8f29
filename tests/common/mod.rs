#![allow(dead_code)]

use std::path::Path;

use anyhow::Result;
use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::Value;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::SqlitePool;
use tempfile::{tempdir, TempDir};
use tower::util::ServiceExt; // for `oneshot`
use uuid::Uuid;

use warden::create_app;
use warden::jwt::JwtConfig;

pub const TEST_SECRET: &str = "test-secret";

/// Holds the temp dir so the database outlives the test body.
pub struct TestApp {
    pub _dir: TempDir,
    pub pool: SqlitePool,
    pub app: Router,
}

pub async fn setup() -> Result<TestApp> {
    let dir = tempdir()?;
    let opts = SqliteConnectOptions::new()
        .filename(dir.path().join("test.db"))
        .create_if_missing(true);
    let pool = SqlitePool::connect_with(opts).await?;

    let migrator = sqlx::migrate::Migrator::new(Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations")).await?;
    migrator.run(&pool).await?;

    std::env::set_var("JWT_SECRET", TEST_SECRET);
    let app = create_app(pool.clone()).await?;

    Ok(TestApp { _dir: dir, pool, app })
}

pub fn token_for(user_id: Uuid) -> String {
    JwtConfig::new(TEST_SECRET, 1).encode(user_id).expect("token")
}

pub async fn insert_role(pool: &SqlitePool, name: &str) -> Result<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO roles (id, name) VALUES (?, ?)")
        .bind(id.to_string())
        .bind(name)
        .execute(pool)
        .await?;
    Ok(id)
}

pub async fn insert_user(pool: &SqlitePool, name: &str, role_id: Option<Uuid>) -> Result<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO users (id, name, email, role_id) VALUES (?, ?, ?, ?)")
        .bind(id.to_string())
        .bind(name)
        .bind(format!("{}@example.com", name.to_lowercase()))
        .bind(role_id.map(|r| r.to_string()))
        .execute(pool)
        .await?;
    Ok(id)
}

/// Adds a permission to the end of the role's list. `fields` and `conditions` are raw JSON text.
pub async fn grant(
    pool: &SqlitePool,
    role_id: Uuid,
    action: &str,
    subject: &str,
    fields: &str,
    conditions: Option<&str>,
) -> Result<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO permissions (id, action, subject, fields, conditions) VALUES (?, ?, ?, ?, ?)")
        .bind(id.to_string())
        .bind(action)
        .bind(subject)
        .bind(fields)
        .bind(conditions)
        .execute(pool)
        .await?;

    sqlx::query(
        "INSERT INTO role_permissions (role_id, permission_id, position) \
         VALUES (?, ?, (SELECT COUNT(*) FROM role_permissions WHERE role_id = ?))",
    )
    .bind(role_id.to_string())
    .bind(id.to_string())
    .bind(role_id.to_string())
    .execute(pool)
    .await?;

    Ok(id)
}

pub async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> Result<(StatusCode, Value)> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    let req = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))?,
        None => builder.body(Body::empty())?,
    };

    let resp = app.clone().oneshot(req).await?;
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), 10_485_760).await?;
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)?
    };
    Ok((status, value))
}
