//! Condition template resolution.
//!
//! Stored conditions may embed `${user.<attr>}` placeholders. Resolution walks
//! the JSON tree and substitutes them from the [`Principal`]; it never fails.

use serde_json::{Map, Value};

use super::principal::Principal;

const OPEN: &str = "${";
const CLOSE: char = '}';

/// Resolves every placeholder in `conditions` against `principal`.
///
/// Unknown placeholders are left verbatim. Attribute values that contain
/// template metacharacters are not substituted either, so resolving twice
/// gives the same result as resolving once.
pub fn resolve(conditions: &Value, principal: &Principal) -> Value {
    match conditions {
        Value::String(s) => Value::String(resolve_str(s, principal)),
        Value::Array(items) => Value::Array(items.iter().map(|v| resolve(v, principal)).collect()),
        Value::Object(map) => {
            let resolved: Map<String, Value> = map
                .iter()
                .map(|(k, v)| (k.clone(), resolve(v, principal)))
                .collect();
            Value::Object(resolved)
        }
        Value::Null | Value::Bool(_) | Value::Number(_) => conditions.clone(),
    }
}

/// True if any string in the tree still carries a `${...}` placeholder.
pub fn has_unresolved(value: &Value) -> bool {
    match value {
        Value::String(s) => next_token(s).is_some(),
        Value::Array(items) => items.iter().any(has_unresolved),
        Value::Object(map) => map.values().any(has_unresolved),
        Value::Null | Value::Bool(_) | Value::Number(_) => false,
    }
}

fn resolve_str(input: &str, principal: &Principal) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some((start, end)) = next_token(rest) {
        out.push_str(&rest[..start]);
        let token = &rest[start..end];
        let path = &token[OPEN.len()..token.len() - 1];
        let after = &rest[end..];
        match principal.attribute(path.trim()) {
            Some(value) if is_inert(&value) && !splices_token(&out, &value, after) => out.push_str(&value),
            _ => out.push_str(token),
        }
        rest = after;
    }

    out.push_str(rest);
    out
}

/// Byte range of the first `${...}` token in `s`.
fn next_token(s: &str) -> Option<(usize, usize)> {
    let start = s.find(OPEN)?;
    let close = s[start + OPEN.len()..].find(CLOSE)?;
    Some((start, start + OPEN.len() + close + 1))
}

fn is_inert(value: &str) -> bool {
    !value.contains(['$', '{', '}'])
}

/// An empty value can join a `$` before the token to a `{` after it.
fn splices_token(before: &str, value: &str, after: &str) -> bool {
    value.is_empty() && before.ends_with('$') && after.starts_with('{')
}
