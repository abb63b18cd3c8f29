//! Authorization module - ability engine and enforcement
//!
//! Turns a principal's stored role/permission records into a compiled
//! [`Ability`] and gates handlers on it:
//! - Condition templates resolved against the principal (`${user.id}`)
//! - Additive, any-match-wins rules with `manage` / `all` wildcards
//! - Field-level narrowing and per-instance condition matching
//! - Fail-closed enforcement gate with declarative requirements

mod ability;
mod compiler;
mod conditions;
mod extract;
mod gate;
mod permission;
mod principal;
mod projector;
mod resolver;
mod store;

pub use ability::{Ability, FieldSet, Rule};
pub use compiler::{compile, compile_with_report, SkippedPermission};
pub use conditions::{matches, Conditions, FieldPath, Predicate};
pub use extract::{Authorized, CurrentAbility, RequirementSet};
pub use gate::{Decision, Denial, Gate, GateConfig, InvalidStoreTimeout, Requirement};
pub use permission::{MalformedPermission, PermissionRecord, Role};
pub use principal::Principal;
pub use projector::{filter, project};
pub use resolver::resolve;
pub use store::{PermissionStore, SqlitePermissionStore, StoreError};

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// The verb being attempted. `Manage` matches every action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Manage,
    Create,
    Read,
    Update,
    Delete,
}

impl Action {
    pub const ALL: [Action; 5] = [
        Action::Manage,
        Action::Create,
        Action::Read,
        Action::Update,
        Action::Delete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Manage => "manage",
            Action::Create => "create",
            Action::Read => "read",
            Action::Update => "update",
            Action::Delete => "delete",
        }
    }

    /// True if a rule carrying `self` grants `requested`.
    pub fn covers(&self, requested: Action) -> bool {
        *self == Action::Manage || *self == requested
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = MalformedPermission;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "manage" => Ok(Action::Manage),
            "create" => Ok(Action::Create),
            "read" => Ok(Action::Read),
            "update" => Ok(Action::Update),
            "delete" => Ok(Action::Delete),
            _ => Err(MalformedPermission::UnknownAction(s.to_string())),
        }
    }
}

/// The kind of resource being acted upon. `All` matches every subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
pub enum Subject {
    #[serde(rename = "all")]
    All,
    User,
    Role,
    Permission,
    Team,
    TeamMember,
    Ticket,
    Report,
    BucketCategory,
    BucketLevel,
    UserBucket,
    Technology,
}

impl Subject {
    pub fn as_str(&self) -> &'static str {
        match self {
            Subject::All => "all",
            Subject::User => "User",
            Subject::Role => "Role",
            Subject::Permission => "Permission",
            Subject::Team => "Team",
            Subject::TeamMember => "TeamMember",
            Subject::Ticket => "Ticket",
            Subject::Report => "Report",
            Subject::BucketCategory => "BucketCategory",
            Subject::BucketLevel => "BucketLevel",
            Subject::UserBucket => "UserBucket",
            Subject::Technology => "Technology",
        }
    }

    /// True if a rule carrying `self` applies to `requested`.
    pub fn covers(&self, requested: Subject) -> bool {
        *self == Subject::All || *self == requested
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Subject {
    type Err = MalformedPermission;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "all" => Ok(Subject::All),
            "User" => Ok(Subject::User),
            "Role" => Ok(Subject::Role),
            "Permission" => Ok(Subject::Permission),
            "Team" => Ok(Subject::Team),
            "TeamMember" => Ok(Subject::TeamMember),
            "Ticket" => Ok(Subject::Ticket),
            "Report" => Ok(Subject::Report),
            "BucketCategory" => Ok(Subject::BucketCategory),
            "BucketLevel" => Ok(Subject::BucketLevel),
            "UserBucket" => Ok(Subject::UserBucket),
            "Technology" => Ok(Subject::Technology),
            _ => Err(MalformedPermission::UnknownSubject(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_parse_is_case_insensitive() {
        assert_eq!("READ".parse::<Action>().unwrap(), Action::Read);
        assert_eq!(" manage ".parse::<Action>().unwrap(), Action::Manage);
        assert!(matches!(
            "frobnicate".parse::<Action>(),
            Err(MalformedPermission::UnknownAction(_))
        ));
    }

    #[test]
    fn test_subject_parse_round_trips_display() {
        for subject in [Subject::All, Subject::TeamMember, Subject::UserBucket] {
            assert_eq!(subject.to_string().parse::<Subject>().unwrap(), subject);
        }
        assert!("team".parse::<Subject>().is_err());
    }

    #[test]
    fn test_wildcards_cover() {
        assert!(Action::Manage.covers(Action::Delete));
        assert!(!Action::Read.covers(Action::Update));
        assert!(Subject::All.covers(Subject::Team));
        assert!(!Subject::Team.covers(Subject::All));
    }

    #[test]
    fn test_serde_tags() {
        assert_eq!(serde_json::to_value(Subject::All).unwrap(), "all");
        assert_eq!(serde_json::to_value(Subject::BucketLevel).unwrap(), "BucketLevel");
        assert_eq!(serde_json::to_value(Action::Update).unwrap(), "update");
    }
}
