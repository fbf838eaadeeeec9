//! Workflow runtime state (spec §3.4).
//!
//! A single mutable record shared across concurrently executing nodes,
//! guarded by a `tokio::sync::RwLock` the way `weavegraph::state::VersionedState`
//! guards its channels — simplified here to one record instead of several
//! versioned channels, since this crate has no checkpoint/resume concept.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;

use crate::errors::NodeError;

/// One entry in `state.errors` (spec §3.4, §7): `{node_id, type, message, details}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub node_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    pub details: Value,
}

impl ErrorRecord {
    #[must_use]
    pub fn from_node_error(node_id: impl Into<String>, err: &NodeError) -> Self {
        let details = match err {
            NodeError::Executor(e) => e.details.clone(),
            _ => Value::Null,
        };
        Self {
            node_id: node_id.into(),
            kind: err.kind_tag().to_string(),
            message: err.to_string(),
            details,
        }
    }
}

/// The mutable body of the workflow state, behind a single lock.
///
/// Keeping `input` alongside the mutable fields (rather than splitting it
/// into an immutable sibling) mirrors the state record in spec §3.4 exactly:
/// one record, one set of invariants, one lock to reason about.
#[derive(Debug, Default)]
pub struct StateInner {
    pub input: Value,
    pub data: IndexMap<String, Value>,
    pub errors: Vec<ErrorRecord>,
    pub output: Option<Value>,
    pub last_node: Option<String>,
    pub router_labels: IndexMap<String, String>,
}

/// Shared workflow state, cloneable as a cheap handle (`Arc` inside).
#[derive(Debug)]
pub struct WorkflowState {
    inner: RwLock<StateInner>,
}

impl WorkflowState {
    #[must_use]
    pub fn new(input: Value) -> Self {
        Self {
            inner: RwLock::new(StateInner {
                input,
                ..Default::default()
            }),
        }
    }

    pub async fn read(&self) -> tokio::sync::RwLockReadGuard<'_, StateInner> {
        self.inner.read().await
    }

    /// Publish a node's successful output. `data[id]` is written exactly
    /// once and never mutated afterward (spec §3.4 invariant).
    pub async fn publish_data(&self, node_id: impl Into<String>, value: Value) {
        let node_id = node_id.into();
        let mut guard = self.inner.write().await;
        guard.data.insert(node_id.clone(), value);
        guard.last_node = Some(node_id);
    }

    /// Record a router's selected label. Set exactly once, before any
    /// downstream conditional edge of that router is considered.
    pub async fn publish_router_label(&self, router_id: impl Into<String>, label: impl Into<String>) {
        let mut guard = self.inner.write().await;
        guard.router_labels.insert(router_id.into(), label.into());
    }

    /// Append a node-level error. `errors` is append-only (spec §3.4).
    pub async fn push_error(&self, record: ErrorRecord) {
        self.inner.write().await.errors.push(record);
    }

    pub async fn set_output(&self, output: Value) {
        self.inner.write().await.output = Some(output);
    }

    pub async fn has_errors(&self) -> bool {
        !self.inner.read().await.errors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_then_read_is_visible() {
        let state = WorkflowState::new(serde_json::json!({"x": 1}));
        state.publish_data("a", serde_json::json!({"y": 2})).await;
        let guard = state.read().await;
        assert_eq!(guard.data.get("a"), Some(&serde_json::json!({"y": 2})));
        assert_eq!(guard.last_node.as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn errors_are_append_only_order_preserved() {
        let state = WorkflowState::new(Value::Null);
        state
            .push_error(ErrorRecord {
                node_id: "a".into(),
                kind: "ExecutorError".into(),
                message: "boom".into(),
                details: Value::Null,
            })
            .await;
        state
            .push_error(ErrorRecord {
                node_id: "b".into(),
                kind: "TimeoutError".into(),
                message: "slow".into(),
                details: Value::Null,
            })
            .await;
        let guard = state.read().await;
        assert_eq!(guard.errors[0].node_id, "a");
        assert_eq!(guard.errors[1].node_id, "b");
    }
}
