//! The declarative workflow document (spec §3.1–§3.3, §3.7).
//!
//! Parsed straight off `serde`: a document is either YAML or JSON on the
//! wire, sharing one Rust shape, the way `weavegraph::message` models its
//! JSON-adjacent wire types.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::ValidationError;

/// A full workflow document as authored.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkflowDocument {
    pub id: String,
    pub version: i64,
    pub input: InputSpec,
    pub nodes: Vec<NodeDef>,
    pub edges: Vec<Edge>,
    pub output: OutputSpec,
    #[serde(default = "default_fail_fast")]
    pub fail_fast: bool,
}

const fn default_fail_fast() -> bool {
    true
}

/// `input.schema` — the JSON Schema the invocation input must satisfy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InputSpec {
    pub schema: Value,
}

/// `output.input_mapping` + `output.schema`, consumed by the implicit end node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputSpec {
    pub input_mapping: IndexMap<String, Value>,
    pub schema: Value,
}

/// A user-defined node (spec §3.2).
///
/// `config` absorbs kind-specific fields the core does not itself interpret
/// (`python_code`'s source, `http_request`'s url/method, ...); only `cases`
/// and `default` are pulled out because the engine special-cases `router`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDef {
    pub id: String,
    pub kind: String,
    #[serde(default)]
    pub input_mapping: IndexMap<String, Value>,
    #[serde(default)]
    pub output_mapping: IndexMap<String, Value>,
    #[serde(default)]
    pub timeout_s: Option<f64>,
    /// Router-only: ordered label → condition string.
    #[serde(default)]
    pub cases: IndexMap<String, String>,
    /// Router-only: label used when no case matches.
    #[serde(default)]
    pub default: Option<String>,
    /// Anything else the document author attached to this node.
    #[serde(flatten)]
    pub config: serde_json::Map<String, Value>,
}

impl NodeDef {
    #[must_use]
    pub fn is_router(&self) -> bool {
        self.kind == "router"
    }
}

/// One authored edge, in either of the two equivalent surface forms (spec §3.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Edge {
    Simple(SimpleEdge),
    Branch(BranchEdge),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimpleEdge {
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub when_label: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BranchEdge {
    pub from: String,
    pub routes: Vec<Route>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Route {
    pub to: String,
    pub when_label: String,
}

impl Edge {
    /// Expand a `BranchEdge` into its constituent `SimpleEdge`s, preserving
    /// declaration order; a `SimpleEdge` flattens to itself (spec §3.3, §4.5).
    #[must_use]
    pub fn flatten(self) -> Vec<SimpleEdge> {
        match self {
            Edge::Simple(e) => vec![e],
            Edge::Branch(b) => b
                .routes
                .into_iter()
                .map(|r| SimpleEdge {
                    from: b.from.clone(),
                    to: r.to,
                    when_label: Some(r.when_label),
                })
                .collect(),
        }
    }
}

impl WorkflowDocument {
    /// Parse a document from either JSON or YAML text.
    ///
    /// JSON is attempted first (it is a strict subset of YAML 1.1 syntax in
    /// practice, but trying JSON directly avoids YAML's looser scalar
    /// coercions silently accepting malformed JSON documents).
    pub fn parse(text: &str) -> Result<Self, ValidationError> {
        if let Ok(doc) = serde_json::from_str::<Self>(text) {
            return Ok(doc);
        }
        serde_yaml::from_str(text).map_err(|e| ValidationError::DocumentParse(e.to_string()))
    }
}
