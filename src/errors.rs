//! Error taxonomy for the workflow core.
//!
//! Every fallible stage of the pipeline (validate → compile → execute) has
//! its own error enum so callers can match on the stage that failed. A
//! top-level [`WorkflowError`] aggregates them for the public
//! [`crate::validate`]/[`crate::invoke`] surface, the way
//! `weavegraph::runtimes::runner::RunnerError` aggregates its lower-level
//! errors.

use miette::Diagnostic;
use thiserror::Error;

/// Errors raised by the [`crate::validate`] pass, before compilation.
#[derive(Debug, Error, Diagnostic)]
pub enum ValidationError {
    #[error("missing required field: {0}")]
    #[diagnostic(code(flowcore::validate::missing_field))]
    MissingField(&'static str),

    #[error("output.schema.type must be \"object\"")]
    #[diagnostic(code(flowcore::validate::output_schema_type))]
    OutputSchemaNotObject,

    #[error("node id {0:?} is invalid: must match ^[a-z][a-z0-9_]*$")]
    #[diagnostic(code(flowcore::validate::bad_node_id))]
    InvalidNodeId(String),

    #[error("node id {0:?} is reserved (start/end)")]
    #[diagnostic(code(flowcore::validate::reserved_node_id))]
    ReservedNodeId(String),

    #[error("duplicate node id: {0:?}")]
    #[diagnostic(code(flowcore::validate::duplicate_node_id))]
    DuplicateNodeId(String),

    #[error("edge references unknown node: {0:?}")]
    #[diagnostic(code(flowcore::validate::unknown_edge_endpoint))]
    UnknownEdgeEndpoint(String),

    #[error("conditional edge from {from:?} carries when_label {label:?}, but {from:?} is not a router")]
    #[diagnostic(code(flowcore::validate::conditional_edge_not_router))]
    ConditionalEdgeNotRouter { from: String, label: String },

    #[error("router {router:?} has no case or default labelled {label:?}")]
    #[diagnostic(code(flowcore::validate::unknown_case_label))]
    UnknownCaseLabel { router: String, label: String },

    #[error("no edge originates from start")]
    #[diagnostic(code(flowcore::validate::no_start_edge))]
    NoStartEdge,

    #[error("no path reaches end")]
    #[diagnostic(code(flowcore::validate::no_path_to_end))]
    NoPathToEnd,

    #[error("{0:?} references unknown node {1:?}")]
    #[diagnostic(code(flowcore::validate::unknown_node_reference))]
    UnknownNodeReference(String, String),

    #[error("syntax error in reference string {0:?}: {1}")]
    #[diagnostic(code(flowcore::validate::bad_reference_syntax))]
    BadReferenceSyntax(String, String),

    #[error("kind {0:?} has no registered executor")]
    #[diagnostic(code(flowcore::validate::unregistered_kind))]
    UnregisteredKind(String),

    #[error("forbidden construct in router condition {label:?}: {detail}")]
    #[diagnostic(code(flowcore::validate::forbidden_condition_syntax))]
    ForbiddenConditionSyntax { label: String, detail: String },

    #[error("unknown top-level field: {0:?}")]
    #[diagnostic(code(flowcore::validate::unknown_top_level_field))]
    UnknownTopLevelField(String),

    #[error("document is neither valid JSON nor valid YAML: {0}")]
    #[diagnostic(code(flowcore::validate::document_parse))]
    DocumentParse(String),

    #[error("edge from router {0:?} is missing a when_label")]
    #[diagnostic(code(flowcore::validate::router_edge_missing_label))]
    RouterEdgeMissingWhenLabel(String),
}

/// A batch of validation problems, collected rather than short-circuited so
/// that a single `validate()` call reports every issue it finds.
#[derive(Debug, Error, Diagnostic)]
#[error("workflow failed validation with {} problem(s)", .0.len())]
pub struct ValidationErrors(pub Vec<ValidationError>);

/// Errors raised while compiling a validated document into a [`crate::graph::CompiledGraph`].
#[derive(Debug, Error, Diagnostic)]
pub enum CompileError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Invalid(#[from] ValidationErrors),

    #[error("kind {0:?} has no registered executor")]
    #[diagnostic(code(flowcore::compile::unregistered_kind))]
    UnregisteredKind(String),

    #[error("graph contains a cycle reachable from {0:?}")]
    #[diagnostic(
        code(flowcore::compile::cycle),
        help("Workflows must be a DAG; router branches are forward edges only.")
    )]
    Cycle(String),
}

/// Errors raised by the reference resolver (`$input`, `$nodes.*`, `$state.*`).
#[derive(Debug, Error, Diagnostic, Clone, PartialEq, Eq)]
pub enum ReferenceError {
    #[error("syntax error in reference {0:?}: {1}")]
    #[diagnostic(code(flowcore::reference::syntax))]
    Syntax(String, String),

    #[error("node {0:?} has not produced output yet")]
    #[diagnostic(code(flowcore::reference::node_not_ready))]
    NodeNotReady(String),

    #[error("missing field {field:?} while resolving {reference:?}")]
    #[diagnostic(code(flowcore::reference::missing_field))]
    MissingField { reference: String, field: String },

    #[error("cannot traverse into non-object value while resolving {0:?}")]
    #[diagnostic(code(flowcore::reference::non_object_traversal))]
    NonObjectTraversal(String),
}

/// Errors raised by the mapping engine (resolving `input_mapping`/`output_mapping`).
#[derive(Debug, Error, Diagnostic, Clone, PartialEq, Eq)]
pub enum MappingError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Reference(#[from] ReferenceError),

    #[error("output field selector {0:?} is not valid JSONPath-lite")]
    #[diagnostic(code(flowcore::mapping::bad_selector))]
    BadSelector(String),
}

/// Errors raised while parsing or evaluating a router condition expression.
#[derive(Debug, Error, Diagnostic, Clone, PartialEq, Eq)]
pub enum ConditionError {
    #[error("syntax error in condition {0:?}: {1}")]
    #[diagnostic(code(flowcore::condition::syntax))]
    Syntax(String, String),

    #[error("forbidden construct in condition {0:?}: {1}")]
    #[diagnostic(code(flowcore::condition::forbidden))]
    Forbidden(String, String),

    #[error("type error evaluating condition {0:?}: {1}")]
    #[diagnostic(code(flowcore::condition::type_error))]
    TypeError(String, String),

    #[error("division by zero in condition {0:?}")]
    #[diagnostic(code(flowcore::condition::division_by_zero))]
    DivisionByZero(String),
}

/// Errors raised by an executor during node dispatch.
#[derive(Debug, Error, Diagnostic, Clone)]
#[error("executor error ({kind}): {message}")]
#[diagnostic(code(flowcore::executor::failed))]
pub struct ExecutorError {
    pub kind: String,
    pub message: String,
    pub details: serde_json::Value,
}

impl ExecutorError {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            details: serde_json::Value::Null,
        }
    }

    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}

/// A node exceeded its configured `timeout_s`.
#[derive(Debug, Error, Diagnostic, Clone)]
#[error("node {node_id:?} timed out after {timeout_s}s")]
#[diagnostic(code(flowcore::engine::timeout))]
pub struct TimeoutError {
    pub node_id: String,
    pub timeout_s: f64,
}

/// A router had no matching case and no `default`.
#[derive(Debug, Error, Diagnostic, Clone)]
#[error("router {0:?} had no matching case and no default")]
#[diagnostic(code(flowcore::engine::router_no_match))]
pub struct RouterNoMatchError(pub String);

/// The end node's computed output failed `output.schema` validation.
#[derive(Debug, Error, Diagnostic, Clone)]
#[error("final output failed schema validation: {0}")]
#[diagnostic(code(flowcore::engine::output_schema))]
pub struct OutputSchemaError(pub String);

/// Per-node runtime failure, recorded into `state.errors` (spec §7).
#[derive(Debug, Error, Diagnostic, Clone)]
pub enum NodeError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Reference(#[from] ReferenceError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Mapping(#[from] MappingError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Executor(#[from] ExecutorError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Timeout(#[from] TimeoutError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    RouterNoMatch(#[from] RouterNoMatchError),
}

impl NodeError {
    /// The surface error-kind tag recorded alongside `state.errors` entries (spec §7).
    #[must_use]
    pub fn kind_tag(&self) -> &'static str {
        match self {
            NodeError::Reference(_) => "ReferenceError",
            // A strict `input_mapping`/`output_mapping` resolution failure is,
            // at its root, a reference failure (spec §7, §8: "Missing field
            // in strict reference: node fails with `ReferenceError`"); the
            // `MappingError` wrapper only exists to also carry `BadSelector`.
            NodeError::Mapping(MappingError::Reference(_)) => "ReferenceError",
            NodeError::Mapping(MappingError::BadSelector(_)) => "MappingError",
            NodeError::Executor(_) => "ExecutorError",
            NodeError::Timeout(_) => "TimeoutError",
            NodeError::RouterNoMatch(_) => "RouterNoMatchError",
        }
    }
}

/// Top-level error returned by [`crate::invoke`].
#[derive(Debug, Error, Diagnostic)]
pub enum WorkflowError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Validation(#[from] ValidationErrors),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Compile(#[from] CompileError),

    #[error("invocation input failed input.schema validation: {0}")]
    #[diagnostic(code(flowcore::invoke::input_schema))]
    InputSchema(String),

    #[error("run failed with {} node error(s); see errors list", .0.len())]
    #[diagnostic(code(flowcore::invoke::run_failed))]
    RunFailed(Vec<crate::state::ErrorRecord>),
}
