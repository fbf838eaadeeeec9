//! Executor registry and trait (spec §6.1).
//!
//! Node executors that do domain work (HTTP, sandboxed code, LLM calls, ...)
//! are out of scope for this crate; it only defines the contract they must
//! satisfy and dispatches to them by `kind`. `router` is special-cased by the
//! engine and never looked up here.

use std::sync::Arc;

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use tokio::sync::Notify;

use crate::errors::ExecutorError;
use crate::types::Mapping;

/// Per-node configuration the document author attached beyond `input_mapping`/
/// `output_mapping` (spec §3.2: "plus kind-specific fields").
pub type NodeConfig = serde_json::Map<String, serde_json::Value>;

/// What an executor does with a resolved input map and its node's config.
///
/// Executors observe `cancel` cooperatively; the engine best-effort-signals
/// it on a `fail_fast` trigger (spec §4.6, §5) but does not force-abort them.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(
        &self,
        resolved_input: Mapping,
        config: &NodeConfig,
        cancel: Arc<Notify>,
    ) -> Result<serde_json::Value, ExecutorError>;
}

/// Maps `node.kind` to a registered [`Executor`].
#[derive(Clone, Default)]
pub struct ExecutorRegistry {
    executors: FxHashMap<String, Arc<dyn Executor>>,
}

impl ExecutorRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace the executor for `kind`.
    #[must_use]
    pub fn with(mut self, kind: impl Into<String>, executor: Arc<dyn Executor>) -> Self {
        self.executors.insert(kind.into(), executor);
        self
    }

    #[must_use]
    pub fn get(&self, kind: &str) -> Option<Arc<dyn Executor>> {
        self.executors.get(kind).cloned()
    }

    /// The set of kinds the Validator's check #9 accepts, `router` included
    /// even though it is never dispatched through this registry (spec §6.1:
    /// the engine orchestrates it directly).
    #[must_use]
    pub fn known_kinds(&self) -> std::collections::HashSet<&str> {
        let mut kinds: std::collections::HashSet<&str> = self.executors.keys().map(String::as_str).collect();
        kinds.insert("router");
        kinds
    }
}

/// The built-in passthrough executor (spec §6.1: "returns the resolved
/// inputs unchanged").
#[derive(Debug, Default)]
pub struct NoopExecutor;

#[async_trait]
impl Executor for NoopExecutor {
    async fn execute(
        &self,
        resolved_input: Mapping,
        _config: &NodeConfig,
        _cancel: Arc<Notify>,
    ) -> Result<serde_json::Value, ExecutorError> {
        Ok(serde_json::Value::Object(resolved_input))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_echoes_input() {
        let exec = NoopExecutor;
        let mut input = Mapping::new();
        input.insert("x".into(), serde_json::json!(1));
        let cancel = Arc::new(Notify::new());
        let out = exec.execute(input.clone(), &NodeConfig::new(), cancel).await.unwrap();
        assert_eq!(out, serde_json::Value::Object(input));
    }

    #[test]
    fn registry_reports_router_as_known_even_unregistered() {
        let registry = ExecutorRegistry::new().with("noop", Arc::new(NoopExecutor));
        let kinds = registry.known_kinds();
        assert!(kinds.contains("noop"));
        assert!(kinds.contains("router"));
    }
}
