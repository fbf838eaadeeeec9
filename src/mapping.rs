//! Mapping Engine: `input_mapping` resolution and `output_mapping` shaping
//! (spec §3.6, §4.2).

use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;
use serde_json::Value;

use crate::errors::MappingError;
use crate::reference;
use crate::state::StateInner;
use crate::types::Mapping;

const RAW_RESULT_SENTINELS: [&str; 4] = ["$result", "$tool_result", "$jq_result", "$code_result"];

static FIELD_SELECTOR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\$\.[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)*$").expect("static regex is valid")
});

/// Build the object passed to a node's executor by resolving every value in
/// `mapping` against `state` under the given strictness (spec §4.2).
pub fn resolve_input_mapping(
    mapping: &IndexMap<String, Value>,
    state: &StateInner,
    strict: bool,
) -> Result<Mapping, MappingError> {
    let mut out = Mapping::new();
    for (key, value) in mapping {
        let resolved = reference::resolve_value(value, state, strict)?;
        out.insert(key.clone(), resolved);
    }
    Ok(out)
}

/// `true` if `s` is one of the raw-result sentinels (spec §3.6).
#[must_use]
pub fn is_raw_result_sentinel(s: &str) -> bool {
    RAW_RESULT_SENTINELS.contains(&s)
}

/// `true` if `s` is a syntactically valid JSONPath-lite field selector (`$.a.b`).
#[must_use]
pub fn is_field_selector(s: &str) -> bool {
    FIELD_SELECTOR_PATTERN.is_match(s)
}

/// Shape a node's raw executor result into what gets published to `state.data`
/// (spec §3.6, §4.2).
///
/// An empty mapping publishes `raw_result` unchanged. Otherwise each value is
/// a raw-result sentinel, a field selector (dict-only traversal of
/// `raw_result`, missing keys → null), or a literal constant.
pub fn apply_output_mapping(
    mapping: &IndexMap<String, Value>,
    raw_result: &Value,
) -> Result<Value, MappingError> {
    if mapping.is_empty() {
        return Ok(raw_result.clone());
    }
    let mut out = Mapping::new();
    for (key, value) in mapping {
        let shaped = match value {
            Value::String(s) if is_raw_result_sentinel(s) => raw_result.clone(),
            Value::String(s) if s.starts_with("$.") => {
                if !is_field_selector(s) {
                    return Err(MappingError::BadSelector(s.clone()));
                }
                select_field(raw_result, s)
            }
            other => other.clone(),
        };
        out.insert(key.clone(), shaped);
    }
    Ok(Value::Object(out))
}

fn select_field(raw_result: &Value, selector: &str) -> Value {
    let mut current = raw_result;
    for segment in selector.trim_start_matches("$.").split('.') {
        match current.as_object().and_then(|m| m.get(segment)) {
            Some(v) => current = v,
            None => return Value::Null,
        }
    }
    current.clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn idx(pairs: &[(&str, Value)]) -> IndexMap<String, Value> {
        pairs.iter().map(|(k, v)| ((*k).to_string(), v.clone())).collect()
    }

    #[test]
    fn empty_output_mapping_passes_through_raw_result() {
        let raw = serde_json::json!({"a": 1, "b": 2});
        let shaped = apply_output_mapping(&IndexMap::new(), &raw).unwrap();
        assert_eq!(shaped, raw);
    }

    #[test]
    fn sentinel_maps_to_whole_raw_result() {
        let raw = serde_json::json!({"value": 30});
        let mapping = idx(&[("sum", serde_json::json!("$result"))]);
        let shaped = apply_output_mapping(&mapping, &raw).unwrap();
        assert_eq!(shaped, serde_json::json!({"sum": {"value": 30}}));
    }

    #[test]
    fn field_selector_extracts_nested_value() {
        let raw = serde_json::json!({"value": 30, "meta": {"ok": true}});
        let mapping = idx(&[("sum", serde_json::json!("$.value")), ("ok", serde_json::json!("$.meta.ok"))]);
        let shaped = apply_output_mapping(&mapping, &raw).unwrap();
        assert_eq!(shaped, serde_json::json!({"sum": 30, "ok": true}));
    }

    #[test]
    fn field_selector_missing_key_is_null() {
        let raw = serde_json::json!({"value": 30});
        let mapping = idx(&[("missing", serde_json::json!("$.nope"))]);
        let shaped = apply_output_mapping(&mapping, &raw).unwrap();
        assert_eq!(shaped, serde_json::json!({"missing": Value::Null}));
    }

    #[test]
    fn field_selector_on_non_object_is_null() {
        let raw = serde_json::json!(42);
        let mapping = idx(&[("x", serde_json::json!("$.field"))]);
        let shaped = apply_output_mapping(&mapping, &raw).unwrap();
        assert_eq!(shaped, serde_json::json!({"x": Value::Null}));
    }

    #[test]
    fn literal_constants_pass_through() {
        let raw = serde_json::json!({"value": 1});
        let mapping = idx(&[("tag", serde_json::json!("static")), ("count", serde_json::json!(7))]);
        let shaped = apply_output_mapping(&mapping, &raw).unwrap();
        assert_eq!(shaped, serde_json::json!({"tag": "static", "count": 7}));
    }

    #[test]
    fn input_mapping_resolves_references_and_constants() {
        let state = StateInner { input: serde_json::json!({"x": 10, "y": 20}), ..Default::default() };
        let mapping = idx(&[
            ("x", serde_json::json!("$input.x")),
            ("y", serde_json::json!("$input.y")),
            ("label", serde_json::json!("fixed")),
        ]);
        let resolved = resolve_input_mapping(&mapping, &state, true).unwrap();
        assert_eq!(resolved.get("x"), Some(&serde_json::json!(10)));
        assert_eq!(resolved.get("y"), Some(&serde_json::json!(20)));
        assert_eq!(resolved.get("label"), Some(&serde_json::json!("fixed")));
    }
}
