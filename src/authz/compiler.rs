use serde::Serialize;
use uuid::Uuid;

use super::ability::{Ability, Rule};
use super::conditions::{Conditions, FieldPath};
use super::permission::{MalformedPermission, PermissionRecord};
use super::principal::Principal;
use super::resolver;
use super::{Action, Subject};

/// A stored permission that was left out of the compiled ability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedPermission {
    pub permission_id: Uuid,
    #[serde(serialize_with = "serialize_display")]
    pub cause: MalformedPermission,
}

fn serialize_display<S: serde::Serializer>(err: &MalformedPermission, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(err)
}

/// Compiles permissions into an ability, logging and dropping malformed records.
pub fn compile(permissions: &[PermissionRecord], principal: &Principal) -> Ability {
    compile_with_report(permissions, principal).0
}

/// Compiles permissions in order. Never fails: a malformed record is skipped
/// and reported, the remaining records still become rules.
pub fn compile_with_report(
    permissions: &[PermissionRecord],
    principal: &Principal,
) -> (Ability, Vec<SkippedPermission>) {
    let mut rules = Vec::with_capacity(permissions.len());
    let mut skipped = Vec::new();

    for record in permissions {
        match compile_rule(record, principal) {
            Ok(rule) => rules.push(rule),
            Err(cause) => {
                tracing::warn!(
                    user_id = %principal.id,
                    permission_id = %record.id,
                    error = %cause,
                    "skipping malformed permission"
                );
                skipped.push(SkippedPermission {
                    permission_id: record.id,
                    cause,
                });
            }
        }
    }

    tracing::debug!(
        user_id = %principal.id,
        rules = rules.len(),
        skipped = skipped.len(),
        "ability compiled"
    );

    (Ability::from_rules(rules), skipped)
}

fn compile_rule(record: &PermissionRecord, principal: &Principal) -> Result<Rule, MalformedPermission> {
    let action: Action = record.action.parse()?;
    let subject: Subject = record.subject.parse()?;

    for field in &record.fields {
        FieldPath::parse(field)?;
    }

    let resolved = record
        .conditions
        .as_ref()
        .map(|raw| resolver::resolve(raw, principal));

    let compiled = match &resolved {
        Some(value) => Conditions::parse(value)?,
        None => None,
    };

    if resolved.as_ref().is_some_and(resolver::has_unresolved) {
        tracing::warn!(
            user_id = %principal.id,
            permission_id = %record.id,
            "conditions contain unresolved template tokens; kept verbatim"
        );
    }

    Ok(Rule::new(
        record.id,
        action,
        subject,
        record.fields.clone(),
        resolved.filter(|v| !v.is_null()),
        compiled,
        record.reason.clone(),
    ))
}
