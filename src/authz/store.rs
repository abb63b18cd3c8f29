use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::permission::{PermissionRecord, Role};
use super::principal::Principal;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

/// Read-only access to principals and their role permissions.
///
/// Implementations must not cache: every call reflects the current state of
/// the backing store, so role edits apply on the next decision.
#[async_trait]
pub trait PermissionStore: Send + Sync {
    async fn find_principal(&self, user_id: Uuid) -> Result<Option<Principal>, StoreError>;

    /// The principal's role with its permissions in persisted order.
    async fn load_role(&self, principal: &Principal) -> Result<Option<Role>, StoreError>;
}

#[derive(Debug, Clone)]
pub struct SqlitePermissionStore {
    pool: SqlitePool,
}

impl SqlitePermissionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PermissionStore for SqlitePermissionStore {
    async fn find_principal(&self, user_id: Uuid) -> Result<Option<Principal>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT u.id, u.name, u.email, u.role_id, r.name AS role_name
            FROM users u
            LEFT JOIN roles r ON r.id = u.role_id
            WHERE u.id = ? AND u.deleted_at IS NULL
            "#,
        )
        .bind(user_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut principal = Principal::new(user_id)
            .with_name(row.try_get::<String, _>("name")?)
            .with_email(row.try_get::<String, _>("email")?);

        let role_id: Option<String> = row.try_get("role_id")?;
        let role_name: Option<String> = row.try_get("role_name")?;
        if let (Some(role_id), Some(role_name)) = (role_id, role_name) {
            let role_id = Uuid::parse_str(&role_id)
                .map_err(|_| StoreError::Corrupt(format!("user {user_id} has invalid role_id {role_id:?}")))?;
            principal = principal.with_role(role_id, role_name);
        }

        Ok(Some(principal))
    }

    async fn load_role(&self, principal: &Principal) -> Result<Option<Role>, StoreError> {
        let Some(role_id) = principal.role_id else {
            return Ok(None);
        };

        let role_row = sqlx::query("SELECT id, name FROM roles WHERE id = ?")
            .bind(role_id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        let Some(role_row) = role_row else {
            return Ok(None);
        };

        let rows = sqlx::query(
            r#"
            SELECT p.id, p.action, p.subject, p.fields, p.conditions, p.reason
            FROM permissions p
            INNER JOIN role_permissions rp ON p.id = rp.permission_id
            WHERE rp.role_id = ?
            ORDER BY rp.position, rp.created_at
            "#,
        )
        .bind(role_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        let mut permissions = Vec::with_capacity(rows.len());
        for row in &rows {
            match permission_from_row(row)? {
                Ok(record) => permissions.push(record),
                Err(reason) => {
                    tracing::warn!(role_id = %role_id, %reason, "skipping unreadable permission row");
                }
            }
        }

        Ok(Some(Role {
            id: role_id,
            name: role_row.try_get("name")?,
            permissions,
        }))
    }
}

/// Outer error: the row shape is wrong. Inner error: one record is unreadable.
fn permission_from_row(row: &SqliteRow) -> Result<Result<PermissionRecord, String>, StoreError> {
    let id: String = row.try_get("id")?;
    let fields: String = row.try_get("fields")?;
    let conditions: Option<String> = row.try_get("conditions")?;

    let Ok(id) = Uuid::parse_str(&id) else {
        return Ok(Err(format!("invalid permission id {id:?}")));
    };

    let fields: Vec<String> = match serde_json::from_str(&fields) {
        Ok(fields) => fields,
        Err(err) => return Ok(Err(format!("permission {id}: fields are not a JSON string array: {err}"))),
    };

    let parsed = conditions
        .as_deref()
        .map(|raw| serde_json::from_str::<Value>(raw))
        .transpose();
    let conditions = match parsed {
        Ok(conditions) => conditions,
        Err(err) => return Ok(Err(format!("permission {id}: conditions are not valid JSON: {err}"))),
    };

    Ok(Ok(PermissionRecord {
        id,
        action: row.try_get("action")?,
        subject: row.try_get("subject")?,
        fields,
        conditions,
        reason: row.try_get("reason")?,
    }))
}
