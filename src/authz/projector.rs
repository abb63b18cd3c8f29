//! Narrowing of already-fetched data by a compiled [`Ability`].

use serde::Serialize;
use serde_json::{Map, Value};

use super::ability::{Ability, FieldSet};
use super::conditions::FieldPath;
use super::{Action, Subject};

/// Keeps the instances the ability grants, in their original order.
///
/// An empty result is not an error here; callers decide whether zero
/// survivors means "forbidden" or "nothing to show".
pub fn filter<T: Serialize>(ability: &Ability, action: Action, subject: Subject, instances: Vec<T>) -> Vec<T> {
    instances
        .into_iter()
        .filter(|instance| ability.can_instance(action, subject, instance))
        .collect()
}

/// Redacts an instance down to the fields granted by the rules that match it.
///
/// Returns `Value::Null` if the instance does not serialize.
pub fn project<T: Serialize>(ability: &Ability, action: Action, subject: Subject, instance: &T) -> Value {
    let value = match serde_json::to_value(instance) {
        Ok(value) => value,
        Err(err) => {
            tracing::warn!(error = %err, %subject, "instance failed to serialize for projection");
            return Value::Null;
        }
    };

    match ability.fields_for_instance(action, subject, &value) {
        FieldSet::All => value,
        FieldSet::Only(fields) => {
            let mut out = Value::Object(Map::new());
            for field in &fields {
                let Ok(path) = FieldPath::parse(field) else {
                    continue;
                };
                if let Some(found) = path.lookup(&value) {
                    insert_at(&mut out, path.segments(), found.clone());
                }
            }
            out
        }
    }
}

fn insert_at(target: &mut Value, segments: &[String], value: Value) {
    let Some((head, rest)) = segments.split_first() else {
        return;
    };
    let Value::Object(map) = target else {
        return;
    };

    if rest.is_empty() {
        map.insert(head.clone(), value);
        return;
    }

    let child = map
        .entry(head.clone())
        .or_insert_with(|| Value::Object(Map::new()));
    insert_at(child, rest, value);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::{compile, PermissionRecord, Principal};
    use serde_json::json;
    use uuid::Uuid;

    #[derive(Debug, Clone, PartialEq, Serialize)]
    #[serde(rename_all = "camelCase")]
    struct Report {
        id: u32,
        user_id: String,
        title: String,
    }

    fn report(id: u32, user_id: &str) -> Report {
        Report {
            id,
            user_id: user_id.to_string(),
            title: format!("report {id}"),
        }
    }

    #[test]
    fn test_filter_keeps_owned_instances_in_order() {
        let p = Principal::new(Uuid::new_v4());
        let me = p.id.to_string();
        let ability = compile(
            &[PermissionRecord::new("read", "Report").with_conditions(json!({"userId": "${user.id}"}))],
            &p,
        );

        let reports = vec![report(1, &me), report(2, "u7"), report(3, &me)];
        let visible = filter(&ability, Action::Read, Subject::Report, reports.clone());

        assert_eq!(visible, vec![reports[0].clone(), reports[2].clone()]);
    }

    #[test]
    fn test_filter_may_return_nothing() {
        let ability = Ability::empty();
        let visible = filter(&ability, Action::Read, Subject::Report, vec![report(1, "u1")]);
        assert!(visible.is_empty());
    }

    #[test]
    fn test_project_unrestricted_returns_whole_instance() {
        let ability = compile(&[PermissionRecord::new("read", "Report")], &Principal::new(Uuid::new_v4()));
        let projected = project(&ability, Action::Read, Subject::Report, &report(1, "u1"));
        assert_eq!(projected, json!({"id": 1, "userId": "u1", "title": "report 1"}));
    }

    #[test]
    fn test_project_keeps_only_granted_fields() {
        let ability = compile(
            &[PermissionRecord::new("read", "Report").with_fields(["id", "title", "missing"])],
            &Principal::new(Uuid::new_v4()),
        );
        let projected = project(&ability, Action::Read, Subject::Report, &report(4, "u1"));
        assert_eq!(projected, json!({"id": 4, "title": "report 4"}));
    }

    #[test]
    fn test_project_rebuilds_nested_paths() {
        let ability = compile(
            &[PermissionRecord::new("read", "User").with_fields(["name", "profile.avatar"])],
            &Principal::new(Uuid::new_v4()),
        );
        let user = json!({"name": "Ada", "email": "ada@example.com", "profile": {"avatar": "a.png", "phone": "555"}});

        let projected = project(&ability, Action::Read, Subject::User, &user);
        assert_eq!(projected, json!({"name": "Ada", "profile": {"avatar": "a.png"}}));
    }

    #[test]
    fn test_project_ignores_fields_of_non_matching_rules() {
        let p = Principal::new(Uuid::new_v4());
        let ability = compile(
            &[
                PermissionRecord::new("read", "Report").with_fields(["title"]),
                PermissionRecord::new("read", "Report").with_conditions(json!({"userId": "${user.id}"})),
            ],
            &p,
        );

        let own = project(&ability, Action::Read, Subject::Report, &report(1, &p.id.to_string()));
        assert_eq!(own, json!({"id": 1, "userId": p.id.to_string(), "title": "report 1"}));

        let other = project(&ability, Action::Read, Subject::Report, &report(2, "u7"));
        assert_eq!(other, json!({"title": "report 2"}));
    }

    #[test]
    fn test_project_without_grant_is_empty_object() {
        let projected = project(&Ability::empty(), Action::Read, Subject::User, &json!({"name": "Ada"}));
        assert_eq!(projected, json!({}));
    }
}
