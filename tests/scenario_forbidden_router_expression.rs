//! Spec §8 end-to-end scenario 6: a router case using a forbidden
//! construct (a function call) is rejected at compile time, before any
//! execution is attempted.

mod common;

use std::sync::Arc;

use flowcore::document::WorkflowDocument;
use flowcore::errors::{CompileError, ValidationError};
use flowcore::executor::ExecutorRegistry;
use serde_json::json;

fn document() -> WorkflowDocument {
    let raw = json!({
        "id": "forbidden-router-expression",
        "version": 1,
        "input": { "schema": { "type": "object" } },
        "nodes": [
            {
                "id": "route_op",
                "kind": "router",
                "cases": { "bad": "foo(x) == 1" },
                "default": "bad"
            },
            { "id": "noop_node", "kind": "noop" }
        ],
        "edges": [
            { "from": "start", "to": "route_op" },
            { "from": "route_op", "to": "noop_node", "when_label": "bad" },
            { "from": "noop_node", "to": "end" }
        ],
        "output": {
            "input_mapping": {},
            "schema": { "type": "object" }
        },
        "fail_fast": true
    });
    serde_json::from_value(raw).expect("well-formed test document")
}

#[tokio::test]
async fn forbidden_function_call_in_router_case_fails_compilation() {
    let doc = document();
    let reg = ExecutorRegistry::new().with("noop", Arc::new(flowcore::executor::NoopExecutor));

    let known_kinds = reg.known_kinds();
    let err = flowcore::compile::compile(&doc, &known_kinds).expect_err("compilation must reject the bad case");

    match err {
        CompileError::Invalid(errors) => {
            assert!(
                errors.0.iter().any(|e| matches!(e, ValidationError::ForbiddenConditionSyntax { .. })),
                "expected a ForbiddenConditionSyntax among {:?}",
                errors.0
            );
        }
        other => panic!("expected CompileError::Invalid, got {other:?}"),
    }
}
