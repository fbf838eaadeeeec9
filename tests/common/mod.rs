//! Small stand-in executors used only to exercise the engine end-to-end.
//! Real node executors (HTTP, sandboxed code, LLM, ...) are out of scope of
//! this crate; these are the minimal fakes the spec's end-to-end scenarios
//! call for.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use flowcore::errors::ExecutorError;
use flowcore::executor::NodeConfig;
use flowcore::types::Mapping;
use serde_json::Value;
use tokio::sync::Notify;

/// `{"value": x + y}` from resolved inputs `x`, `y`.
pub struct AddExecutor;

#[async_trait]
impl flowcore::executor::Executor for AddExecutor {
    async fn execute(&self, input: Mapping, _config: &NodeConfig, _cancel: Arc<Notify>) -> Result<Value, ExecutorError> {
        let x = input.get("x").and_then(Value::as_f64).unwrap_or(0.0);
        let y = input.get("y").and_then(Value::as_f64).unwrap_or(0.0);
        Ok(serde_json::json!({ "value": x + y }))
    }
}

/// `{"value": x - y}` from resolved inputs `x`, `y`.
pub struct SubExecutor;

#[async_trait]
impl flowcore::executor::Executor for SubExecutor {
    async fn execute(&self, input: Mapping, _config: &NodeConfig, _cancel: Arc<Notify>) -> Result<Value, ExecutorError> {
        let x = input.get("x").and_then(Value::as_f64).unwrap_or(0.0);
        let y = input.get("y").and_then(Value::as_f64).unwrap_or(0.0);
        Ok(serde_json::json!({ "value": x - y }))
    }
}

/// Stands in for a `jq_transform` program `(.a // .b)`: whichever of `a`/`b`
/// is non-null, preferring `a`.
pub struct MergeExecutor;

#[async_trait]
impl flowcore::executor::Executor for MergeExecutor {
    async fn execute(&self, input: Mapping, _config: &NodeConfig, _cancel: Arc<Notify>) -> Result<Value, ExecutorError> {
        let a = input.get("a").cloned().unwrap_or(Value::Null);
        if !a.is_null() {
            return Ok(a);
        }
        Ok(input.get("b").cloned().unwrap_or(Value::Null))
    }
}

/// Returns a fixed tag, ignoring input — stands in for an independent
/// fan-out branch.
pub struct TagExecutor(pub &'static str);

#[async_trait]
impl flowcore::executor::Executor for TagExecutor {
    async fn execute(&self, _input: Mapping, _config: &NodeConfig, _cancel: Arc<Notify>) -> Result<Value, ExecutorError> {
        Ok(serde_json::json!({ "tag": self.0 }))
    }
}

/// Stands in for a `jq_transform` join: publishes its resolved input map unchanged.
pub struct JoinExecutor;

#[async_trait]
impl flowcore::executor::Executor for JoinExecutor {
    async fn execute(&self, input: Mapping, _config: &NodeConfig, _cancel: Arc<Notify>) -> Result<Value, ExecutorError> {
        Ok(Value::Object(input))
    }
}

/// Sleeps for a fixed duration, then returns null — used to exercise
/// fail-fast cancellation races.
pub struct SleeperExecutor(pub Duration);

#[async_trait]
impl flowcore::executor::Executor for SleeperExecutor {
    async fn execute(&self, _input: Mapping, _config: &NodeConfig, _cancel: Arc<Notify>) -> Result<Value, ExecutorError> {
        tokio::time::sleep(self.0).await;
        Ok(Value::Null)
    }
}

/// Always fails.
pub struct FailingExecutor;

#[async_trait]
impl flowcore::executor::Executor for FailingExecutor {
    async fn execute(&self, _input: Mapping, _config: &NodeConfig, _cancel: Arc<Notify>) -> Result<Value, ExecutorError> {
        Err(ExecutorError::new("raiser", "boom"))
    }
}
