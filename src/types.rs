//! Shared primitive types used across the document, graph, and runtime layers.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

/// A resolved key/value bag handed to an executor, or produced by one.
///
/// Aliased rather than newtyped: the spec treats mappings as plain JSON
/// objects throughout (`input_mapping`, `output_mapping`, executor I/O).
pub type Mapping = serde_json::Map<String, Value>;

static NODE_ID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9_]*$").expect("static regex is valid"));

/// The two identifiers the compiler synthesizes regardless of what the
/// document author wrote (spec §3.2 / §4.5).
pub const RESERVED_NODE_IDS: [&str; 2] = ["start", "end"];

/// `true` if `id` matches `^[a-z][a-z0-9_]*$`.
#[must_use]
pub fn is_valid_node_id_syntax(id: &str) -> bool {
    NODE_ID_PATTERN.is_match(id)
}

/// `true` if `id` is one of the reserved implicit node ids.
#[must_use]
pub fn is_reserved_node_id(id: &str) -> bool {
    RESERVED_NODE_IDS.contains(&id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_lowercase_snake_case() {
        assert!(is_valid_node_id_syntax("fetch_user"));
        assert!(is_valid_node_id_syntax("a"));
        assert!(is_valid_node_id_syntax("a1_2b"));
    }

    #[test]
    fn rejects_bad_syntax() {
        assert!(!is_valid_node_id_syntax(""));
        assert!(!is_valid_node_id_syntax("1abc"));
        assert!(!is_valid_node_id_syntax("Abc"));
        assert!(!is_valid_node_id_syntax("a-b"));
        assert!(!is_valid_node_id_syntax("_abc"));
    }

    #[test]
    fn flags_reserved_ids() {
        assert!(is_reserved_node_id("start"));
        assert!(is_reserved_node_id("end"));
        assert!(!is_reserved_node_id("started"));
    }
}
