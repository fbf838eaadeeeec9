//! Compiler and executor core for declarative, directed workflow graphs.
//!
//! The crate decomposes into the same six components the workflow document
//! itself implies: a reference [`resolver`](reference), a [`mapping`]
//! engine built on top of it, a restricted [`condition`] evaluator for
//! router branches, a [`validate`]or, a [`compile`]r that turns a validated
//! [`document::WorkflowDocument`] into a [`graph::CompiledGraph`], and an
//! [`engine`] that schedules and runs that graph.
//!
//! Two operations make up the public surface (spec §6.3): [`validate`] and
//! [`invoke`].

pub mod compile;
pub mod condition;
pub mod document;
pub mod engine;
pub mod errors;
pub mod executor;
pub mod graph;
pub mod mapping;
pub mod reference;
pub mod state;
pub mod types;

mod validate;

use serde_json::Value;

use document::WorkflowDocument;
use errors::{ValidationErrors, WorkflowError};
use executor::ExecutorRegistry;

/// Run the Validator only (spec §4.4, §6.3): `validate(document) -> {ok, errors[]}`.
#[tracing::instrument(skip(doc, registry), fields(workflow_id = %doc.id), err(level = "debug"))]
pub fn validate(doc: &WorkflowDocument, registry: &ExecutorRegistry) -> Result<(), ValidationErrors> {
    let known_kinds = registry.known_kinds();
    validate::validate(doc, &known_kinds)
}

/// Validate, compile, and execute `doc` against `input` (spec §6.3):
/// `invoke(document, input) -> {output?, errors[]}`.
///
/// Invocation input is checked against `input.schema` before compilation
/// proceeds (an Open Question the spec leaves to the implementation; see
/// `DESIGN.md`).
#[tracing::instrument(skip(doc, registry, input), fields(workflow_id = %doc.id), err(level = "debug"))]
pub async fn invoke(
    doc: &WorkflowDocument,
    registry: &ExecutorRegistry,
    input: Value,
) -> Result<engine::RunOutcome, WorkflowError> {
    let known_kinds = registry.known_kinds();
    let graph = compile::compile(doc, &known_kinds)?;

    validate_input_schema(&doc.input.schema, &input).map_err(WorkflowError::InputSchema)?;

    let eng = engine::Engine::new(&graph, registry, &doc.output.input_mapping, &doc.output.schema, doc.fail_fast);
    let outcome = eng.run(input).await.expect("Engine::run is infallible");

    if doc.fail_fast && !outcome.errors.is_empty() {
        return Err(WorkflowError::RunFailed(outcome.errors));
    }
    Ok(outcome)
}

fn validate_input_schema(schema: &Value, instance: &Value) -> Result<(), String> {
    let compiled = jsonschema::validator_for(schema).map_err(|e| e.to_string())?;
    let errors: Vec<String> = compiled.iter_errors(instance).map(|e| e.to_string()).collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors.join("; "))
    }
}
