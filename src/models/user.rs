use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::AppError;

/// A directory entry. Field names double as condition and projection paths.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<&SqliteRow> for User {
    type Error = AppError;

    fn try_from(row: &SqliteRow) -> Result<Self, Self::Error> {
        let parse = |raw: &str| {
            Uuid::parse_str(raw).map_err(|_| AppError::internal(format!("invalid uuid in users table: {raw:?}")))
        };

        let id: String = row.try_get("id")?;
        let role_id: Option<String> = row.try_get("role_id")?;

        Ok(User {
            id: parse(&id)?,
            name: row.try_get("name")?,
            email: row.try_get("email")?,
            role_id: role_id.as_deref().map(parse).transpose()?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}
