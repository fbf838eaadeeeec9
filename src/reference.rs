//! The `$input` / `$nodes.<id>` / `$state.<k>` reference language (spec §3.5, §4.1).
//!
//! A small hand-written lexer/parser over dotted paths — deliberately not
//! implemented via the host language's attribute machinery, per spec §9.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::errors::ReferenceError;
use crate::state::StateInner;

static IDENT_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("static regex is valid"));

fn is_ident(s: &str) -> bool {
    IDENT_PATTERN.is_match(s)
}

/// The resolved root of a reference, before path traversal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Root {
    Input,
    Node(String),
    State(String),
}

/// A parsed (but not yet evaluated) reference string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub root: Root,
    pub path: Vec<String>,
}

static SCAN_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$[A-Za-z_][A-Za-z0-9_.]*").expect("static regex is valid"));

/// Find every `$...`-looking token inside free text (used to pull references
/// out of condition expressions, rather than a whole mapping value).
#[must_use]
pub fn scan_references(text: &str) -> Vec<&str> {
    SCAN_PATTERN.find_iter(text).map(|m| m.as_str()).collect()
}

/// Like [`scan_references`] but also returns each match's byte span, so a
/// caller can splice the surrounding text back together.
#[must_use]
pub fn scan_reference_spans(text: &str) -> Vec<(usize, usize, &str)> {
    SCAN_PATTERN.find_iter(text).map(|m| (m.start(), m.end(), m.as_str())).collect()
}

/// `true` if `s` looks like it is meant to be a reference (begins with `$`).
///
/// Per spec §4.1, anything that is *not* a string beginning with `$` is a
/// constant and bypasses the resolver entirely.
#[must_use]
pub fn looks_like_reference(s: &str) -> bool {
    s.starts_with('$')
}

/// Parse a reference string per the grammar in spec §3.5. Any `$`-prefixed
/// string that fails to match the grammar is a syntax error.
pub fn parse(raw: &str) -> Result<Reference, ReferenceError> {
    debug_assert!(raw.starts_with('$'));
    let body = &raw[1..];
    if body.is_empty() {
        return Err(ReferenceError::Syntax(raw.to_string(), "empty reference".into()));
    }
    let parts: Vec<&str> = body.split('.').collect();
    if parts.iter().any(|p| p.is_empty()) {
        return Err(ReferenceError::Syntax(raw.to_string(), "empty path segment".into()));
    }

    match parts[0] {
        "input" => {
            let path = validate_path(raw, &parts[1..])?;
            Ok(Reference { root: Root::Input, path })
        }
        "nodes" => {
            let (id, rest) = split_root_ident(raw, &parts[1..], "nodes")?;
            let path = validate_path(raw, rest)?;
            Ok(Reference { root: Root::Node(id), path })
        }
        "state" => {
            let (key, rest) = split_root_ident(raw, &parts[1..], "state")?;
            let path = validate_path(raw, rest)?;
            Ok(Reference { root: Root::State(key), path })
        }
        other => Err(ReferenceError::Syntax(
            raw.to_string(),
            format!("unknown reference root {other:?}; expected input, nodes, or state"),
        )),
    }
}

fn split_root_ident<'a>(
    raw: &str,
    rest: &'a [&'a str],
    root_name: &str,
) -> Result<(String, &'a [&'a str]), ReferenceError> {
    let Some((ident, path)) = rest.split_first() else {
        return Err(ReferenceError::Syntax(
            raw.to_string(),
            format!("${root_name} requires an identifier, e.g. ${root_name}.foo"),
        ));
    };
    if !is_ident(ident) {
        return Err(ReferenceError::Syntax(raw.to_string(), format!("invalid identifier {ident:?}")));
    }
    Ok(((*ident).to_string(), path))
}

fn validate_path(raw: &str, segments: &[&str]) -> Result<Vec<String>, ReferenceError> {
    segments
        .iter()
        .map(|s| {
            if is_ident(s) {
                Ok((*s).to_string())
            } else {
                Err(ReferenceError::Syntax(raw.to_string(), format!("invalid path segment {s:?}")))
            }
        })
        .collect()
}

/// Evaluate `value` or a constant `value_or_ref` against `state`.
///
/// If `value_or_ref` is not a reference (spec §4.1: not a string, or a
/// string that does not start with `$`) it is returned unchanged.
pub fn resolve_value(value_or_ref: &Value, state: &StateInner, strict: bool) -> Result<Value, ReferenceError> {
    let Value::String(s) = value_or_ref else {
        return Ok(value_or_ref.clone());
    };
    if !looks_like_reference(s) {
        return Ok(value_or_ref.clone());
    }
    let reference = parse(s)?;
    resolve(&reference, s, state, strict)
}

/// Evaluate an already-parsed reference against `state`.
pub fn resolve(reference: &Reference, raw: &str, state: &StateInner, strict: bool) -> Result<Value, ReferenceError> {
    let root = match &reference.root {
        Root::Input => state.input.clone(),
        Root::Node(id) => match state.data.get(id) {
            Some(v) => v.clone(),
            None => {
                if strict {
                    return Err(ReferenceError::NodeNotReady(id.clone()));
                }
                return Ok(Value::Null);
            }
        },
        Root::State(key) => match state_root_lookup(state, key) {
            Some(v) => v,
            None => {
                if strict {
                    return Err(ReferenceError::MissingField {
                        reference: raw.to_string(),
                        field: key.clone(),
                    });
                }
                return Ok(Value::Null);
            }
        },
    };
    traverse(root, &reference.path, raw, strict)
}

/// `$state.<k>` exposes a small, engine-populated namespace rather than the
/// whole internal record (spec §9 open question: authors are discouraged
/// from depending on it, so only a couple of stable keys are exposed).
fn state_root_lookup(state: &StateInner, key: &str) -> Option<Value> {
    match key {
        "last_node" => Some(
            state
                .last_node
                .clone()
                .map_or(Value::Null, Value::String),
        ),
        "router_labels" => Some(serde_json::to_value(&state.router_labels).unwrap_or(Value::Null)),
        _ => None,
    }
}

fn traverse(mut current: Value, path: &[String], raw: &str, strict: bool) -> Result<Value, ReferenceError> {
    for segment in path {
        match current {
            Value::Object(ref map) => match map.get(segment) {
                Some(v) => current = v.clone(),
                None => {
                    if strict {
                        return Err(ReferenceError::MissingField {
                            reference: raw.to_string(),
                            field: segment.clone(),
                        });
                    }
                    return Ok(Value::Null);
                }
            },
            _ => {
                if strict {
                    return Err(ReferenceError::NonObjectTraversal(raw.to_string()));
                }
                return Ok(Value::Null);
            }
        }
    }
    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with(input: Value, data: &[(&str, Value)]) -> StateInner {
        let mut s = StateInner { input, ..Default::default() };
        for (k, v) in data {
            s.data.insert((*k).to_string(), v.clone());
        }
        s
    }

    #[test]
    fn parses_plain_input() {
        let r = parse("$input").unwrap();
        assert_eq!(r.root, Root::Input);
        assert!(r.path.is_empty());
    }

    #[test]
    fn parses_nested_node_path() {
        let r = parse("$nodes.sum.value").unwrap();
        assert_eq!(r.root, Root::Node("sum".into()));
        assert_eq!(r.path, vec!["value".to_string()]);
    }

    #[test]
    fn rejects_bad_root() {
        assert!(parse("$bogus.x").is_err());
    }

    #[test]
    fn rejects_trailing_dot() {
        assert!(parse("$input.").is_err());
    }

    #[test]
    fn rejects_bare_nodes_root() {
        assert!(parse("$nodes").is_err());
    }

    #[test]
    fn strict_missing_field_errors() {
        let state = state_with(serde_json::json!({"x": 1}), &[]);
        let r = parse("$input.y").unwrap();
        let err = resolve(&r, "$input.y", &state, true).unwrap_err();
        assert!(matches!(err, ReferenceError::MissingField { .. }));
    }

    #[test]
    fn non_strict_missing_field_is_null() {
        let state = state_with(serde_json::json!({"x": 1}), &[]);
        let r = parse("$input.y").unwrap();
        assert_eq!(resolve(&r, "$input.y", &state, false).unwrap(), Value::Null);
    }

    #[test]
    fn strict_node_not_ready_errors() {
        let state = state_with(Value::Null, &[]);
        let r = parse("$nodes.missing").unwrap();
        let err = resolve(&r, "$nodes.missing", &state, true).unwrap_err();
        assert!(matches!(err, ReferenceError::NodeNotReady(_)));
    }

    #[test]
    fn non_strict_node_not_ready_is_null() {
        let state = state_with(Value::Null, &[]);
        let r = parse("$nodes.missing").unwrap();
        assert_eq!(resolve(&r, "$nodes.missing", &state, false).unwrap(), Value::Null);
    }

    #[test]
    fn non_object_traversal_is_null_when_non_strict() {
        let state = state_with(Value::Null, &[("n", serde_json::json!(5))]);
        let r = parse("$nodes.n.field").unwrap();
        assert_eq!(resolve(&r, "$nodes.n.field", &state, false).unwrap(), Value::Null);
    }

    #[test]
    fn non_object_traversal_errors_when_strict() {
        let state = state_with(Value::Null, &[("n", serde_json::json!(5))]);
        let r = parse("$nodes.n.field").unwrap();
        let err = resolve(&r, "$nodes.n.field", &state, true).unwrap_err();
        assert!(matches!(err, ReferenceError::NonObjectTraversal(_)));
    }

    #[test]
    fn non_reference_constant_passes_through() {
        let state = state_with(Value::Null, &[]);
        let v = resolve_value(&serde_json::json!("plain string"), &state, true).unwrap();
        assert_eq!(v, serde_json::json!("plain string"));
        let v = resolve_value(&serde_json::json!(42), &state, true).unwrap();
        assert_eq!(v, serde_json::json!(42));
    }
}
