use std::collections::{BTreeSet, HashMap};

use serde::{Serialize, Serializer};
use serde_json::Value;
use uuid::Uuid;

use super::conditions::Conditions;
use super::{Action, Subject};

/// A compiled, resolved permission. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rule {
    action: Action,
    subject: Subject,
    fields: Vec<String>,
    /// Resolved condition tree as stored, kept for display.
    conditions: Option<Value>,
    #[serde(skip)]
    compiled: Option<Conditions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
    permission_id: Uuid,
}

impl Rule {
    pub(super) fn new(
        permission_id: Uuid,
        action: Action,
        subject: Subject,
        fields: Vec<String>,
        conditions: Option<Value>,
        compiled: Option<Conditions>,
        reason: Option<String>,
    ) -> Self {
        Self {
            action,
            subject,
            fields,
            conditions,
            compiled,
            reason,
            permission_id,
        }
    }

    pub fn action(&self) -> Action {
        self.action
    }

    pub fn subject(&self) -> Subject {
        self.subject
    }

    /// Empty means every field.
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn conditions(&self) -> Option<&Value> {
        self.conditions.as_ref()
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    pub fn permission_id(&self) -> Uuid {
        self.permission_id
    }

    pub fn applies_to(&self, action: Action, subject: Subject) -> bool {
        self.action.covers(action) && self.subject.covers(subject)
    }

    pub fn matches_instance(&self, instance: &Value) -> bool {
        super::conditions::matches(instance, self.compiled.as_ref())
    }
}

/// Fields granted for an `(action, subject)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldSet {
    All,
    Only(BTreeSet<String>),
}

impl FieldSet {
    pub fn is_all(&self) -> bool {
        matches!(self, FieldSet::All)
    }

    /// A field is covered by an equal entry or by one of its dotted prefixes.
    pub fn covers(&self, field: &str) -> bool {
        match self {
            FieldSet::All => true,
            FieldSet::Only(granted) => granted.iter().any(|g| {
                field == g || field.strip_prefix(g.as_str()).is_some_and(|rest| rest.starts_with('.'))
            }),
        }
    }
}

impl Serialize for FieldSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FieldSet::All => serializer.serialize_str("all"),
            FieldSet::Only(fields) => fields.serialize(serializer),
        }
    }
}

/// The compiled capability set of one principal for one decision.
///
/// Rules are kept in compiled order and indexed by `(action, subject)`.
/// Matching is additive: a capability is granted if any rule grants it.
#[derive(Debug, Clone, Default)]
pub struct Ability {
    rules: Vec<Rule>,
    index: HashMap<(Action, Subject), Vec<usize>>,
}

impl Ability {
    /// An ability that denies everything.
    pub fn empty() -> Self {
        Self::default()
    }

    pub(super) fn from_rules(rules: Vec<Rule>) -> Self {
        let mut index: HashMap<(Action, Subject), Vec<usize>> = HashMap::new();
        for (i, rule) in rules.iter().enumerate() {
            index.entry((rule.action, rule.subject)).or_default().push(i);
        }
        Self { rules, index }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rules granting `action` on `subject`, wildcards included, in compiled order.
    pub fn relevant_rules_for(&self, action: Action, subject: Subject) -> Vec<&Rule> {
        let keys = [
            (action, subject),
            (Action::Manage, subject),
            (action, Subject::All),
            (Action::Manage, Subject::All),
        ];

        let mut positions: Vec<usize> = keys
            .iter()
            .filter_map(|key| self.index.get(key))
            .flatten()
            .copied()
            .collect();
        positions.sort_unstable();
        positions.dedup();

        positions.into_iter().map(|i| &self.rules[i]).collect()
    }

    /// Without an instance, conditions are ignored: "can read some reports".
    pub fn can(&self, action: Action, subject: Subject, instance: Option<&Value>) -> bool {
        self.relevant_rules_for(action, subject)
            .into_iter()
            .any(|rule| instance.map_or(true, |i| rule.matches_instance(i)))
    }

    pub fn cannot(&self, action: Action, subject: Subject, instance: Option<&Value>) -> bool {
        !self.can(action, subject, instance)
    }

    /// Instance check for typed values. Values that fail to serialize are denied.
    pub fn can_instance<T: Serialize>(&self, action: Action, subject: Subject, instance: &T) -> bool {
        match serde_json::to_value(instance) {
            Ok(value) => self.can(action, subject, Some(&value)),
            Err(_) => false,
        }
    }

    /// Union of the granted fields. One unrestricted rule makes the result `All`.
    pub fn fields_for(&self, action: Action, subject: Subject) -> FieldSet {
        let mut granted = BTreeSet::new();
        for rule in self.relevant_rules_for(action, subject) {
            if rule.fields.is_empty() {
                return FieldSet::All;
            }
            granted.extend(rule.fields.iter().cloned());
        }
        FieldSet::Only(granted)
    }

    /// Like [`Ability::fields_for`], counting only rules whose conditions match `instance`.
    pub fn fields_for_instance(&self, action: Action, subject: Subject, instance: &Value) -> FieldSet {
        let mut granted = BTreeSet::new();
        for rule in self.relevant_rules_for(action, subject) {
            if !rule.matches_instance(instance) {
                continue;
            }
            if rule.fields.is_empty() {
                return FieldSet::All;
            }
            granted.extend(rule.fields.iter().cloned());
        }
        FieldSet::Only(granted)
    }

    pub fn can_field(&self, action: Action, subject: Subject, field: &str) -> bool {
        self.can(action, subject, None) && self.fields_for(action, subject).covers(field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rule(action: Action, subject: Subject, fields: &[&str], conditions: Option<Value>) -> Rule {
        let compiled = conditions
            .as_ref()
            .and_then(|c| Conditions::parse(c).unwrap());
        Rule::new(
            Uuid::new_v4(),
            action,
            subject,
            fields.iter().map(|f| f.to_string()).collect(),
            conditions,
            compiled,
            None,
        )
    }

    #[test]
    fn test_empty_ability_denies_everything() {
        let ability = Ability::empty();
        for action in Action::ALL {
            assert!(ability.cannot(action, Subject::User, None));
            assert!(!ability.can(action, Subject::All, None));
        }
        assert_eq!(ability.fields_for(Action::Read, Subject::User), FieldSet::Only(BTreeSet::new()));
    }

    #[test]
    fn test_exact_rule_grants_only_its_action() {
        let ability = Ability::from_rules(vec![rule(Action::Read, Subject::User, &[], None)]);

        assert!(ability.can(Action::Read, Subject::User, None));
        assert!(ability.cannot(Action::Update, Subject::User, None));
        assert!(ability.cannot(Action::Read, Subject::Team, None));
    }

    #[test]
    fn test_manage_grants_every_action() {
        let ability = Ability::from_rules(vec![rule(Action::Manage, Subject::Team, &[], None)]);

        for action in Action::ALL {
            assert!(ability.can(action, Subject::Team, None), "{action} on Team");
        }
        assert!(ability.cannot(Action::Read, Subject::Report, None));
    }

    #[test]
    fn test_all_subject_grants_every_subject_for_matching_action() {
        let ability = Ability::from_rules(vec![rule(Action::Read, Subject::All, &[], None)]);

        assert!(ability.can(Action::Read, Subject::Technology, None));
        assert!(ability.can(Action::Read, Subject::All, None));
        assert!(ability.cannot(Action::Delete, Subject::Technology, None));
    }

    #[test]
    fn test_manage_all_grants_anything() {
        let ability = Ability::from_rules(vec![rule(Action::Manage, Subject::All, &[], None)]);
        assert!(ability.can(Action::Delete, Subject::Team, None));
        assert!(ability.can(Action::Manage, Subject::All, None));
    }

    #[test]
    fn test_read_does_not_imply_manage() {
        let ability = Ability::from_rules(vec![rule(Action::Read, Subject::Role, &[], None)]);
        assert!(ability.cannot(Action::Manage, Subject::Role, None));
    }

    #[test]
    fn test_instance_gating_uses_conditions() {
        let ability = Ability::from_rules(vec![rule(
            Action::Read,
            Subject::Report,
            &[],
            Some(json!({"userId": "u1"})),
        )]);

        assert!(ability.can(Action::Read, Subject::Report, None));
        assert!(ability.can(Action::Read, Subject::Report, Some(&json!({"userId": "u1"}))));
        assert!(ability.cannot(Action::Read, Subject::Report, Some(&json!({"userId": "other"}))));
    }

    #[test]
    fn test_any_matching_rule_wins() {
        let ability = Ability::from_rules(vec![
            rule(Action::Update, Subject::Ticket, &[], Some(json!({"assigneeId": "u1"}))),
            rule(Action::Update, Subject::Ticket, &[], Some(json!({"reporterId": "u1"}))),
        ]);

        assert!(ability.can(Action::Update, Subject::Ticket, Some(&json!({"assigneeId": "x", "reporterId": "u1"}))));
        assert!(ability.cannot(Action::Update, Subject::Ticket, Some(&json!({"assigneeId": "x", "reporterId": "y"}))));
    }

    #[test]
    fn test_relevant_rules_preserve_compiled_order() {
        let rules = vec![
            rule(Action::Manage, Subject::All, &[], None),
            rule(Action::Read, Subject::Team, &[], None),
            rule(Action::Read, Subject::All, &[], None),
            rule(Action::Delete, Subject::Team, &[], None),
            rule(Action::Manage, Subject::Team, &[], None),
        ];
        let ability = Ability::from_rules(rules.clone());

        let relevant = ability.relevant_rules_for(Action::Read, Subject::Team);
        let expected: Vec<&Rule> = vec![&rules[0], &rules[1], &rules[2], &rules[4]];
        assert_eq!(relevant, expected);
    }

    #[test]
    fn test_fields_union_and_broad_rule_wins() {
        let narrow = Ability::from_rules(vec![
            rule(Action::Read, Subject::User, &["name"], None),
            rule(Action::Read, Subject::User, &["email", "name"], None),
        ]);
        assert_eq!(
            narrow.fields_for(Action::Read, Subject::User),
            FieldSet::Only(["email".to_string(), "name".to_string()].into())
        );

        let broad = Ability::from_rules(vec![
            rule(Action::Read, Subject::User, &["name"], None),
            rule(Action::Read, Subject::User, &[], None),
        ]);
        assert_eq!(broad.fields_for(Action::Read, Subject::User), FieldSet::All);
    }

    #[test]
    fn test_instance_fields_skip_non_matching_rules() {
        let ability = Ability::from_rules(vec![
            rule(Action::Read, Subject::User, &["name"], None),
            rule(Action::Read, Subject::User, &[], Some(json!({"id": "u1"}))),
        ]);

        assert_eq!(
            ability.fields_for_instance(Action::Read, Subject::User, &json!({"id": "u1"})),
            FieldSet::All
        );
        assert_eq!(
            ability.fields_for_instance(Action::Read, Subject::User, &json!({"id": "u2"})),
            FieldSet::Only(["name".to_string()].into())
        );
        assert_eq!(ability.fields_for(Action::Read, Subject::User), FieldSet::All);
    }

    #[test]
    fn test_can_field_respects_prefixes() {
        let ability = Ability::from_rules(vec![rule(Action::Read, Subject::User, &["profile", "name"], None)]);

        assert!(ability.can_field(Action::Read, Subject::User, "name"));
        assert!(ability.can_field(Action::Read, Subject::User, "profile.avatar"));
        assert!(!ability.can_field(Action::Read, Subject::User, "profileId"));
        assert!(!ability.can_field(Action::Update, Subject::User, "name"));
    }

    #[test]
    fn test_field_set_serializes() {
        assert_eq!(serde_json::to_value(FieldSet::All).unwrap(), json!("all"));
        let only = FieldSet::Only(["b".to_string(), "a".to_string()].into());
        assert_eq!(serde_json::to_value(only).unwrap(), json!(["a", "b"]));
    }
}
