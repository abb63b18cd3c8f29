use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use super::ability::Ability;
use super::compiler;
use super::principal::Principal;
use super::store::PermissionStore;
use super::{Action, Subject};

const DEFAULT_STORE_TIMEOUT_MS: u64 = 2000;

#[derive(Debug, Clone)]
pub struct GateConfig {
    /// Upper bound on one permission store read; exceeding it denies.
    pub store_timeout: Duration,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            store_timeout: Duration::from_millis(DEFAULT_STORE_TIMEOUT_MS),
        }
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("AUTHZ_STORE_TIMEOUT_MS must be a valid integer, got {0:?}")]
pub struct InvalidStoreTimeout(pub String);

impl GateConfig {
    pub fn from_env() -> Result<Self, InvalidStoreTimeout> {
        Self::from_timeout_var(std::env::var("AUTHZ_STORE_TIMEOUT_MS").ok().as_deref())
    }

    fn from_timeout_var(raw: Option<&str>) -> Result<Self, InvalidStoreTimeout> {
        let millis = match raw {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .map_err(|_| InvalidStoreTimeout(raw.to_string()))?,
            None => DEFAULT_STORE_TIMEOUT_MS,
        };

        Ok(Self {
            store_timeout: Duration::from_millis(millis),
        })
    }
}

/// A capability predicate attached to an operation.
#[derive(Clone)]
pub struct Requirement {
    label: Arc<str>,
    check: Arc<dyn Fn(&Ability) -> bool + Send + Sync>,
}

impl Requirement {
    pub fn new(label: impl Into<String>, check: impl Fn(&Ability) -> bool + Send + Sync + 'static) -> Self {
        let label: String = label.into();
        Self {
            label: Arc::from(label),
            check: Arc::new(check),
        }
    }

    /// "ability must be able to `action` `subject`".
    pub fn can(action: Action, subject: Subject) -> Self {
        Self::new(format!("can {action} {subject}"), move |ability| {
            ability.can(action, subject, None)
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn holds(&self, ability: &Ability) -> bool {
        (self.check)(ability)
    }
}

impl fmt::Debug for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Requirement").field(&self.label).finish()
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Denial {
    #[error("not authenticated")]
    Unauthenticated,
    #[error("permission store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("requirement not met: {0}")]
    RequirementFailed(String),
}

#[derive(Debug)]
pub enum Decision {
    /// The operation carries no requirements.
    Public,
    Allowed(Ability),
    Denied(Denial),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        !matches!(self, Decision::Denied(_))
    }

    pub fn ability(&self) -> Option<&Ability> {
        match self {
            Decision::Allowed(ability) => Some(ability),
            _ => None,
        }
    }

    pub fn into_result(self) -> Result<Option<Ability>, Denial> {
        match self {
            Decision::Public => Ok(None),
            Decision::Allowed(ability) => Ok(Some(ability)),
            Decision::Denied(denial) => Err(denial),
        }
    }
}

/// The enforcement point: loads permissions, compiles an ability, and checks
/// every requirement against it.
///
/// Nothing is cached. Each decision reads the store and compiles a fresh
/// ability, which is handed back to the caller on success.
#[derive(Clone)]
pub struct Gate {
    store: Arc<dyn PermissionStore>,
    config: GateConfig,
}

impl fmt::Debug for Gate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gate").field("config", &self.config).finish_non_exhaustive()
    }
}

impl Gate {
    pub fn new(store: Arc<dyn PermissionStore>, config: GateConfig) -> Self {
        Self { store, config }
    }

    /// Resolves an authenticated user id to a principal. Unknown users are `Ok(None)`.
    pub async fn find_principal(&self, user_id: Uuid) -> Result<Option<Principal>, Denial> {
        match tokio::time::timeout(self.config.store_timeout, self.store.find_principal(user_id)).await {
            Ok(Ok(principal)) => Ok(principal),
            Ok(Err(err)) => Err(store_unavailable(user_id, err.to_string())),
            Err(_) => Err(store_unavailable(user_id, "timed out".to_string())),
        }
    }

    /// Compiles the principal's current ability without checking requirements.
    pub async fn ability_for(&self, principal: &Principal) -> Result<Ability, Denial> {
        let role = match tokio::time::timeout(self.config.store_timeout, self.store.load_role(principal)).await {
            Ok(Ok(role)) => role,
            Ok(Err(err)) => return Err(store_unavailable(principal.id, err.to_string())),
            Err(_) => return Err(store_unavailable(principal.id, "timed out".to_string())),
        };

        match role {
            Some(role) => Ok(compiler::compile(&role.permissions, principal)),
            None => {
                tracing::warn!(user_id = %principal.id, role_id = ?principal.role_id, "principal has no role; denying all");
                Ok(Ability::empty())
            }
        }
    }

    /// All requirements must hold. Store failures deny.
    pub async fn authorize(&self, requirements: &[Requirement], principal: Option<&Principal>) -> Decision {
        if requirements.is_empty() {
            return Decision::Public;
        }

        let Some(principal) = principal else {
            tracing::info!(reason = "unauthenticated", "authorization denied");
            return Decision::Denied(Denial::Unauthenticated);
        };

        let ability = match self.ability_for(principal).await {
            Ok(ability) => ability,
            Err(denial) => return Decision::Denied(denial),
        };

        if let Some(failed) = requirements.iter().find(|r| !r.holds(&ability)) {
            tracing::info!(
                user_id = %principal.id,
                requirement = %failed.label(),
                reason = "requirement_failed",
                "authorization denied"
            );
            return Decision::Denied(Denial::RequirementFailed(failed.label().to_string()));
        }

        tracing::debug!(
            user_id = %principal.id,
            requirements = requirements.len(),
            "authorization allowed"
        );
        Decision::Allowed(ability)
    }
}

fn store_unavailable(user_id: Uuid, cause: String) -> Denial {
    tracing::error!(user_id = %user_id, error = %cause, reason = "store_unavailable", "authorization denied");
    Denial::StoreUnavailable(cause)
}
