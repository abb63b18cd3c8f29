//! Structural predicate matching for rule conditions.
//!
//! A stored condition object is parsed once, at compile time, into a flat
//! conjunction of `(path, predicate)` clauses:
//!
//! ```text
//! {"userId": "u1"}                  userId      $eq "u1"
//! {"author": {"id": "u1"}}          author.id   $eq "u1"
//! {"status": {"$in": ["a", "b"]}}   status      $in ["a", "b"]
//! ```
//!
//! Evaluation is total: a missing field is a non-match, never an error.

use std::fmt;

use serde_json::{Map, Value};

use super::permission::MalformedPermission;

/// Dotted path into an instance, e.g. `author.id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath(Vec<String>);

impl FieldPath {
    pub fn parse(raw: &str) -> Result<Self, MalformedPermission> {
        let segments: Vec<String> = raw.split('.').map(str::to_string).collect();
        if segments.iter().any(|s| s.is_empty() || s.starts_with('$')) {
            return Err(MalformedPermission::InvalidField(raw.to_string()));
        }
        Ok(Self(segments))
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Walks the path through objects (and numeric indexes into arrays).
    pub fn lookup<'a>(&self, instance: &'a Value) -> Option<&'a Value> {
        self.0.iter().try_fold(instance, |current, segment| match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
    }

    fn join(&self, tail: FieldPath) -> FieldPath {
        let mut segments = self.0.clone();
        segments.extend(tail.0);
        FieldPath(segments)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("."))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Eq(Value),
    Ne(Value),
    In(Vec<Value>),
    Nin(Vec<Value>),
}

impl Predicate {
    fn from_operator(op: &str, arg: &Value, path: &FieldPath) -> Result<Self, MalformedPermission> {
        let list = |arg: &Value| match arg {
            Value::Array(items) => Ok(items.clone()),
            _ => Err(MalformedPermission::invalid_conditions(format!(
                "{op} on {path} expects an array"
            ))),
        };

        match op {
            "$eq" => Ok(Predicate::Eq(arg.clone())),
            "$ne" => Ok(Predicate::Ne(arg.clone())),
            "$in" => Ok(Predicate::In(list(arg)?)),
            "$nin" => Ok(Predicate::Nin(list(arg)?)),
            _ => Err(MalformedPermission::invalid_conditions(format!(
                "unsupported operator {op} on {path}"
            ))),
        }
    }

    /// `actual` is `None` when the instance has no value at the path.
    fn holds(&self, actual: Option<&Value>) -> bool {
        let Some(actual) = actual else {
            return false;
        };

        match self {
            Predicate::Eq(expected) => eq_match(actual, expected),
            Predicate::Ne(expected) => !eq_match(actual, expected),
            Predicate::In(allowed) => in_match(actual, allowed),
            Predicate::Nin(denied) => !in_match(actual, denied),
        }
    }
}

/// A conjunction of clauses. An empty set matches every instance.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Conditions {
    clauses: Vec<(FieldPath, Predicate)>,
}

impl Conditions {
    /// Parses a resolved condition tree. `null` means "no conditions".
    pub fn parse(value: &Value) -> Result<Option<Self>, MalformedPermission> {
        match value {
            Value::Null => Ok(None),
            Value::Object(map) => {
                let mut clauses = Vec::new();
                parse_object(None, map, &mut clauses)?;
                Ok(Some(Self { clauses }))
            }
            other => Err(MalformedPermission::invalid_conditions(format!(
                "expected an object, found {}",
                kind(other)
            ))),
        }
    }

    pub fn clauses(&self) -> &[(FieldPath, Predicate)] {
        &self.clauses
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn matches(&self, instance: &Value) -> bool {
        self.clauses
            .iter()
            .all(|(path, predicate)| predicate.holds(path.lookup(instance)))
    }
}

/// Matches `instance` against optional conditions; `None` matches anything.
pub fn matches(instance: &Value, conditions: Option<&Conditions>) -> bool {
    conditions.map_or(true, |c| c.matches(instance))
}

fn parse_object(
    prefix: Option<&FieldPath>,
    map: &Map<String, Value>,
    out: &mut Vec<(FieldPath, Predicate)>,
) -> Result<(), MalformedPermission> {
    for (key, value) in map {
        let key_path = FieldPath::parse(key)
            .map_err(|_| MalformedPermission::invalid_conditions(format!("invalid field key {key:?}")))?;
        let path = match prefix {
            Some(prefix) => prefix.join(key_path),
            None => key_path,
        };

        match value {
            Value::Object(inner) if inner.is_empty() => {
                return Err(MalformedPermission::invalid_conditions(format!(
                    "empty object for {path}"
                )));
            }
            Value::Object(inner) => {
                let operators = inner.keys().filter(|k| k.starts_with('$')).count();
                if operators == 0 {
                    parse_object(Some(&path), inner, out)?;
                } else if operators == inner.len() {
                    for (op, arg) in inner {
                        out.push((path.clone(), Predicate::from_operator(op, arg, &path)?));
                    }
                } else {
                    return Err(MalformedPermission::invalid_conditions(format!(
                        "{path} mixes operators and fields"
                    )));
                }
            }
            other => out.push((path, Predicate::Eq(other.clone()))),
        }
    }
    Ok(())
}

fn eq_match(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::Array(items), expected) if !expected.is_array() => {
            items.iter().any(|item| scalar_eq(item, expected))
        }
        _ => scalar_eq(actual, expected),
    }
}

fn in_match(actual: &Value, allowed: &[Value]) -> bool {
    match actual {
        Value::Array(items) => items.iter().any(|item| allowed.iter().any(|a| scalar_eq(item, a))),
        _ => allowed.iter().any(|a| scalar_eq(actual, a)),
    }
}

fn scalar_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        _ => a == b,
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
