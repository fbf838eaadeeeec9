//! Execution engine / scheduler (spec §4.6, §5).
//!
//! A single coordinating loop maintains per-node predecessor counters and a
//! ready queue; node bodies run as spawned `tokio` tasks on a `JoinSet` so
//! independent nodes genuinely execute concurrently, the way
//! `weavegraph::runtimes::runner` fans work out while a single task owns
//! scheduling decisions.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::sync::Notify;
use tokio::task::JoinSet;

use crate::condition;
use crate::document::NodeDef;
use crate::errors::{ExecutorError, NodeError, TimeoutError};
use crate::executor::ExecutorRegistry;
use crate::graph::{CompiledGraph, CompiledNodeKind};
use crate::mapping;
use crate::state::{ErrorRecord, StateInner, WorkflowState};

/// Outcome of a single `invoke()` run (spec §6.3).
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub output: Option<Value>,
    pub errors: Vec<ErrorRecord>,
}

impl RunOutcome {
    /// A run is successful only if it produced no errors and the end node
    /// published a (schema-valid) output (spec §7).
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.errors.is_empty() && self.output.is_some()
    }
}

/// How a node's presence in the schedule resolved.
#[derive(Debug, Clone)]
enum Completion {
    /// The node ran (successfully or not); `router_label` is set only for routers.
    Executed { router_label: Option<String> },
    /// The node's only enabling paths were pruned; it never ran (spec §4.6).
    Skipped,
}

/// Executes a compiled graph against one invocation input.
pub struct Engine<'a> {
    graph: &'a CompiledGraph,
    registry: &'a ExecutorRegistry,
    output_mapping: &'a IndexMap<String, Value>,
    output_schema: &'a Value,
    fail_fast: bool,
}

impl<'a> Engine<'a> {
    #[must_use]
    pub fn new(
        graph: &'a CompiledGraph,
        registry: &'a ExecutorRegistry,
        output_mapping: &'a IndexMap<String, Value>,
        output_schema: &'a Value,
        fail_fast: bool,
    ) -> Self {
        Self { graph, registry, output_mapping, output_schema, fail_fast }
    }

    #[tracing::instrument(skip(self, input), err(level = "debug"))]
    pub async fn run(&self, input: Value) -> Result<RunOutcome, NeverFails> {
        let state = Arc::new(WorkflowState::new(input));
        let cancel = Arc::new(Notify::new());

        let mut remaining: FxHashMap<String, i64> =
            self.graph.nodes.keys().map(|id| (id.clone(), self.graph.predecessor_count(id) as i64)).collect();
        let mut contributed: FxHashMap<String, bool> = self.graph.nodes.keys().map(|id| (id.clone(), false)).collect();
        let mut scheduled: std::collections::HashSet<String> = std::collections::HashSet::new();

        // Only `start` is seeded directly; every other node (including one
        // with zero declared incoming edges) must earn readiness through
        // edge propagation below, so a node unreachable from `start` never
        // runs (spec §8: "a node is executed iff at least one non-pruned
        // incoming edge path traces back to start").
        let mut ready: VecDeque<String> = VecDeque::from(["start".to_string()]);

        let mut join_set: JoinSet<(String, Completion)> = JoinSet::new();
        let mut halted = false;

        loop {
            while let Some(id) = ready.pop_front() {
                if halted || !scheduled.insert(id.clone()) {
                    continue;
                }
                self.spawn(&id, Arc::clone(&state), Arc::clone(&cancel), &mut join_set);
            }

            let Some(joined) = join_set.join_next().await else {
                break;
            };
            let (node_id, completion) = joined.expect("node task does not panic under normal operation");

            if halted {
                continue;
            }
            if let Completion::Executed { .. } = &completion {
                if state.has_errors().await && self.fail_fast && node_just_failed(&node_id, &state).await {
                    halted = true;
                    tracing::warn!(node_id, "fail_fast: halting scheduling of new nodes");
                    cancel.notify_waiters();
                }
            }

            let mut worklist = VecDeque::from([(node_id, completion)]);
            while let Some((id, completion)) = worklist.pop_front() {
                for edge in self.graph.outgoing_edges(&id).cloned().collect::<Vec<_>>() {
                    let contributes = edge_contributes(&edge.when_label, &completion);
                    let count = remaining.entry(edge.to.clone()).or_insert(0);
                    *count -= 1;
                    if contributes {
                        contributed.insert(edge.to.clone(), true);
                    }
                    if *count <= 0 && scheduled.insert(edge.to.clone()) {
                        if *contributed.get(&edge.to).unwrap_or(&false) {
                            if !halted {
                                ready.push_back(edge.to.clone());
                            }
                        } else {
                            tracing::debug!(node_id = %edge.to, "skipped: no contributing predecessor");
                            worklist.push_back((edge.to.clone(), Completion::Skipped));
                        }
                    }
                }
            }
        }

        let guard = state.read().await;
        Ok(RunOutcome { output: guard.output.clone(), errors: guard.errors.clone() })
    }

    fn spawn(
        &self,
        node_id: &str,
        state: Arc<WorkflowState>,
        cancel: Arc<Notify>,
        join_set: &mut JoinSet<(String, Completion)>,
    ) {
        let node_id = node_id.to_string();
        let Some(node) = self.graph.node(&node_id) else { return };
        match node.kind.clone() {
            CompiledNodeKind::Start => {
                join_set.spawn(async move { ("start".to_string(), Completion::Executed { router_label: None }) });
            }
            CompiledNodeKind::End => {
                let output_mapping = self.output_mapping.clone();
                let output_schema = self.output_schema.clone();
                join_set.spawn(async move {
                    run_end(&output_mapping, &output_schema, &state).await;
                    ("end".to_string(), Completion::Executed { router_label: None })
                });
            }
            CompiledNodeKind::Declared(def) if def.is_router() => {
                join_set.spawn(async move {
                    let label = run_router(&def, &state).await;
                    (def.id.clone(), Completion::Executed { router_label: label })
                });
            }
            CompiledNodeKind::Declared(def) => {
                let registry = self.registry.clone();
                join_set.spawn(async move {
                    run_normal(&def, &state, &registry, cancel).await;
                    (def.id.clone(), Completion::Executed { router_label: None })
                });
            }
        }
    }
}

/// Placeholder error type: `Engine::run` itself never fails (node failures
/// are recorded into `state.errors`, not returned as a top-level `Err`); the
/// public [`crate::invoke`] surface is what surfaces a top-level `Result`.
#[derive(Debug, thiserror::Error)]
#[error("unreachable")]
pub struct NeverFails;

fn edge_contributes(when_label: &Option<String>, completion: &Completion) -> bool {
    match completion {
        Completion::Skipped => false,
        Completion::Executed { router_label } => match when_label {
            None => true,
            Some(label) => router_label.as_deref() == Some(label.as_str()),
        },
    }
}

/// `true` if the most recent error in `state.errors` was raised by `node_id`,
/// used only to decide whether *this* completion is what should trip
/// fail-fast (rather than re-tripping on every subsequent completion).
async fn node_just_failed(node_id: &str, state: &WorkflowState) -> bool {
    state.read().await.errors.last().is_some_and(|e| e.node_id == node_id)
}

fn kind_strictness(kind: &str) -> bool {
    kind != "jq_transform"
}

async fn run_end(output_mapping: &IndexMap<String, Value>, output_schema: &Value, state: &WorkflowState) {
    let resolved = {
        let guard = state.read().await;
        mapping::resolve_input_mapping(output_mapping, &guard, true)
    };
    let object = match resolved {
        Ok(map) => Value::Object(map),
        Err(e) => {
            state.push_error(ErrorRecord::from_node_error("end", &NodeError::from(e))).await;
            return;
        }
    };
    match validate_output_schema(output_schema, &object) {
        Ok(()) => state.set_output(object).await,
        Err(message) => {
            state
                .push_error(ErrorRecord { node_id: "end".into(), kind: "OutputSchemaError".into(), message, details: Value::Null })
                .await;
        }
    }
}

fn validate_output_schema(schema: &Value, instance: &Value) -> Result<(), String> {
    let compiled = jsonschema::validator_for(schema).map_err(|e| e.to_string())?;
    let errors: Vec<String> = compiled.iter_errors(instance).map(|e| e.to_string()).collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors.join("; "))
    }
}

/// Evaluate a router's `cases` in declaration order, returning the selected
/// label (first truthy case, else `default`), and publish
/// `state.router_labels`/`state.data` accordingly (spec §4.6, §6.1).
async fn run_router(node: &NodeDef, state: &WorkflowState) -> Option<String> {
    let selected = {
        let guard = state.read().await;
        select_case(node, &guard)
    };
    let Some(label) = selected.or_else(|| node.default.clone()) else {
        state
            .push_error(ErrorRecord::from_node_error(
                node.id.clone(),
                &NodeError::from(crate::errors::RouterNoMatchError(node.id.clone())),
            ))
            .await;
        return None;
    };

    state.publish_router_label(node.id.clone(), label.clone()).await;
    let raw = serde_json::json!({ "label": label });
    match mapping::apply_output_mapping(&node.output_mapping, &raw) {
        Ok(shaped) => state.publish_data(node.id.clone(), shaped).await,
        Err(e) => state.push_error(ErrorRecord::from_node_error(node.id.clone(), &NodeError::from(e))).await,
    }
    Some(label)
}

fn select_case(node: &NodeDef, state: &StateInner) -> Option<String> {
    for (label, cond) in &node.cases {
        match condition::evaluate_condition(cond, state) {
            Ok(true) => return Some(label.clone()),
            Ok(false) | Err(_) => continue,
        }
    }
    None
}

async fn run_normal(node: &NodeDef, state: &WorkflowState, registry: &ExecutorRegistry, cancel: Arc<Notify>) {
    let strict = kind_strictness(&node.kind);
    let resolved = {
        let guard = state.read().await;
        mapping::resolve_input_mapping(&node.input_mapping, &guard, strict)
    };
    let resolved = match resolved {
        Ok(m) => m,
        Err(e) => {
            state.push_error(ErrorRecord::from_node_error(node.id.clone(), &NodeError::from(e))).await;
            return;
        }
    };

    let Some(executor) = registry.get(&node.kind) else {
        // Unreachable once compilation has succeeded (spec §4.4 check #9).
        state
            .push_error(ErrorRecord::from_node_error(
                node.id.clone(),
                &NodeError::from(ExecutorError::new(node.kind.clone(), "no registered executor")),
            ))
            .await;
        return;
    };

    let dispatch = executor.execute(resolved, &node.config, cancel);
    let outcome = if let Some(timeout_s) = node.timeout_s {
        match tokio::time::timeout(Duration::from_secs_f64(timeout_s), dispatch).await {
            Ok(r) => r,
            Err(_) => {
                state
                    .push_error(ErrorRecord::from_node_error(
                        node.id.clone(),
                        &NodeError::from(TimeoutError { node_id: node.id.clone(), timeout_s }),
                    ))
                    .await;
                return;
            }
        }
    } else {
        dispatch.await
    };

    match outcome {
        Ok(raw) => match mapping::apply_output_mapping(&node.output_mapping, &raw) {
            Ok(shaped) => state.publish_data(node.id.clone(), shaped).await,
            Err(e) => state.push_error(ErrorRecord::from_node_error(node.id.clone(), &NodeError::from(e))).await,
        },
        Err(e) => state.push_error(ErrorRecord::from_node_error(node.id.clone(), &NodeError::from(e))).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Edge, InputSpec, NodeDef, OutputSpec, SimpleEdge, WorkflowDocument};
    use crate::executor::{ExecutorRegistry, NoopExecutor};
    use indexmap::IndexMap;
    use serde_json::json;
    use std::collections::HashSet;

    fn node(id: &str, kind: &str) -> NodeDef {
        NodeDef {
            id: id.into(),
            kind: kind.into(),
            input_mapping: IndexMap::new(),
            output_mapping: IndexMap::new(),
            timeout_s: None,
            cases: IndexMap::new(),
            default: None,
            config: serde_json::Map::new(),
        }
    }

    struct AlwaysFails;

    #[async_trait::async_trait]
    impl crate::executor::Executor for AlwaysFails {
        async fn execute(
            &self,
            _input: crate::types::Mapping,
            _config: &crate::executor::NodeConfig,
            _cancel: std::sync::Arc<Notify>,
        ) -> Result<Value, ExecutorError> {
            Err(ExecutorError::new("boom", "orphan node must never run"))
        }
    }

    #[tokio::test]
    async fn a_node_with_no_incoming_edge_never_runs() {
        // `orphan` has no edge pointing at it anywhere in the document; only
        // `reachable` is wired from `start` through to `end`. The validator
        // allows this (it only requires *some* path from start to end), so
        // the engine itself must refuse to seed `orphan`. If it were seeded
        // anyway, its registered executor always fails, which would surface
        // as a run error below.
        let doc = WorkflowDocument {
            id: "wf".into(),
            version: 1,
            input: InputSpec { schema: json!({"type": "object"}) },
            nodes: vec![node("reachable", "noop"), node("orphan", "boom")],
            edges: vec![
                Edge::Simple(SimpleEdge { from: "start".into(), to: "reachable".into(), when_label: None }),
                Edge::Simple(SimpleEdge { from: "reachable".into(), to: "end".into(), when_label: None }),
            ],
            output: OutputSpec { input_mapping: IndexMap::new(), schema: json!({"type": "object"}) },
            fail_fast: true,
        };
        let kinds: HashSet<&str> = ["noop", "boom"].into_iter().collect();
        let graph = crate::compile::compile(&doc, &kinds).expect("document compiles");
        let registry =
            ExecutorRegistry::new().with("noop", std::sync::Arc::new(NoopExecutor)).with("boom", std::sync::Arc::new(AlwaysFails));
        let output_mapping = IndexMap::new();
        let output_schema = json!({"type": "object"});

        let engine = Engine::new(&graph, &registry, &output_mapping, &output_schema, true);
        let outcome = engine.run(json!({})).await.unwrap();

        assert!(outcome.errors.is_empty(), "orphan node ran and failed: {:?}", outcome.errors);
    }
}
