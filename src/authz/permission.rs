use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;

/// A stored grant, as read from the permission store.
///
/// `action` and `subject` are kept as the raw stored strings; compilation
/// decides whether they name a known verb and resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PermissionRecord {
    pub id: Uuid,
    #[schema(example = "read")]
    pub action: String,
    #[schema(example = "Report")]
    pub subject: String,
    /// Empty means every field.
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub conditions: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl PermissionRecord {
    pub fn new(action: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            action: action.into(),
            subject: subject.into(),
            fields: Vec::new(),
            conditions: None,
            reason: None,
        }
    }

    pub fn with_fields(mut self, fields: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_conditions(mut self, conditions: Value) -> Self {
        self.conditions = Some(conditions);
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// A named bundle of permissions, in persisted order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Role {
    pub id: Uuid,
    pub name: String,
    pub permissions: Vec<PermissionRecord>,
}

/// Why a stored permission could not become a rule.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MalformedPermission {
    #[error("unknown action: {0}")]
    UnknownAction(String),
    #[error("unknown subject: {0}")]
    UnknownSubject(String),
    #[error("invalid field name: {0:?}")]
    InvalidField(String),
    #[error("invalid conditions: {0}")]
    InvalidConditions(String),
}

impl MalformedPermission {
    pub fn invalid_conditions(message: impl Into<String>) -> Self {
        Self::InvalidConditions(message.into())
    }
}
