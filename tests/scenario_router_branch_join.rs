//! Spec §8 end-to-end scenario 2: router branching with a join.

mod common;

use std::sync::Arc;

use flowcore::document::WorkflowDocument;
use flowcore::executor::ExecutorRegistry;
use serde_json::json;

fn document() -> WorkflowDocument {
    let raw = json!({
        "id": "router-branch-join",
        "version": 1,
        "input": { "schema": { "type": "object", "required": ["op", "x", "y"] } },
        "nodes": [
            {
                "id": "route_op",
                "kind": "router",
                "cases": {
                    "add": "$input.op == 'add'",
                    "sub": "$input.op == 'sub'"
                },
                "default": "add"
            },
            {
                "id": "do_add",
                "kind": "add_op",
                "input_mapping": { "x": "$input.x", "y": "$input.y" }
            },
            {
                "id": "do_sub",
                "kind": "sub_op",
                "input_mapping": { "x": "$input.x", "y": "$input.y" }
            },
            {
                "id": "merge",
                "kind": "jq_transform",
                "input_mapping": { "a": "$nodes.do_add.value", "b": "$nodes.do_sub.value" }
            }
        ],
        "edges": [
            { "from": "start", "to": "route_op" },
            { "from": "route_op", "to": "do_add", "when_label": "add" },
            { "from": "route_op", "to": "do_sub", "when_label": "sub" },
            { "from": "do_add", "to": "merge" },
            { "from": "do_sub", "to": "merge" },
            { "from": "merge", "to": "end" }
        ],
        "output": {
            "input_mapping": { "result": "$nodes.merge" },
            "schema": { "type": "object", "properties": { "result": { "type": "number" } } }
        },
        "fail_fast": true
    });
    serde_json::from_value(raw).expect("well-formed test document")
}

fn registry() -> ExecutorRegistry {
    ExecutorRegistry::new()
        .with("add_op", Arc::new(common::AddExecutor))
        .with("sub_op", Arc::new(common::SubExecutor))
        .with("jq_transform", Arc::new(common::MergeExecutor))
}

#[tokio::test]
async fn add_branch_runs_and_sub_branch_is_skipped() {
    let doc = document();
    let reg = registry();
    flowcore::validate(&doc, &reg).expect("document is valid");

    let outcome = flowcore::invoke(&doc, &reg, json!({ "op": "add", "x": 4, "y": 5 }))
        .await
        .expect("run succeeds");

    assert!(outcome.is_success());
    assert_eq!(outcome.output, Some(json!({ "result": 9.0 })));
}

#[tokio::test]
async fn sub_branch_runs_and_add_branch_is_skipped() {
    let doc = document();
    let reg = registry();

    let outcome = flowcore::invoke(&doc, &reg, json!({ "op": "sub", "x": 10, "y": 3 }))
        .await
        .expect("run succeeds");

    assert!(outcome.is_success());
    assert_eq!(outcome.output, Some(json!({ "result": 7.0 })));
}
