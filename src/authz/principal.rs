use std::collections::BTreeMap;

use serde::Serialize;
use uuid::Uuid;

/// Principal represents the authenticated user whose access is evaluated.
///
/// Only its attributes are read by the engine: `role_id` selects the
/// permissions to load, the rest feed condition templates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    pub id: Uuid,
    pub role_id: Option<Uuid>,
    pub role: Option<String>,
    pub email: Option<String>,
    pub name: Option<String>,
    /// Extra template-visible attributes, addressed as `user.<key>`.
    pub attributes: BTreeMap<String, String>,
}

impl Principal {
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            role_id: None,
            role: None,
            email: None,
            name: None,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_role(mut self, role_id: Uuid, role: impl Into<String>) -> Self {
        self.role_id = Some(role_id);
        self.role = Some(role.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Looks up a template attribute such as `user.id`.
    pub fn attribute(&self, path: &str) -> Option<String> {
        let key = path.strip_prefix("user.")?;
        match key {
            "id" => Some(self.id.to_string()),
            "role_id" => self.role_id.map(|id| id.to_string()),
            "role" => self.role.clone(),
            "email" => self.email.clone(),
            "name" => self.name.clone(),
            other => self.attributes.get(other).cloned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_attributes() {
        let id = Uuid::new_v4();
        let role_id = Uuid::new_v4();
        let principal = Principal::new(id)
            .with_role(role_id, "agent")
            .with_email("ada@example.com");

        assert_eq!(principal.attribute("user.id"), Some(id.to_string()));
        assert_eq!(principal.attribute("user.role_id"), Some(role_id.to_string()));
        assert_eq!(principal.attribute("user.role").as_deref(), Some("agent"));
        assert_eq!(principal.attribute("user.email").as_deref(), Some("ada@example.com"));
        assert_eq!(principal.attribute("user.name"), None);
    }

    #[test]
    fn test_extra_attributes_and_unknown_roots() {
        let principal = Principal::new(Uuid::new_v4()).with_attribute("team_id", "t-1");

        assert_eq!(principal.attribute("user.team_id").as_deref(), Some("t-1"));
        assert_eq!(principal.attribute("team.id"), None);
        assert_eq!(principal.attribute("id"), None);
    }
}
