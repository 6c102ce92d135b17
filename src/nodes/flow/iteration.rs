//! Iteration node executor.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::core::execution_context::ExecutionContext;
use crate::core::runtime_context::RuntimeContext;
use crate::core::sub_graph_runner::SubGraphOutcome;
use crate::dsl::{IterationErrorMode, IterationNodeData, NodeRunResult};
use crate::error::NodeError;
use crate::graph::Graph;
use crate::nodes::executor::NodeExecutor;
use crate::nodes::utils::{decode_json_text, parse_config};
use crate::template::resolve_reference;

/// Runs the node's sub-graph once per array element and returns the item
/// outputs in array order.
///
/// Inside a pass `{{input}}` and `{{item}}` are the element and `{{index}}`
/// its position. Parallel mode runs at most `parallelism` passes at once and
/// applies the error policy after every pass has settled.
pub struct IterationNodeExecutor;

#[async_trait]
impl NodeExecutor for IterationNodeExecutor {
    async fn execute(
        &self,
        node_id: &str,
        config: &Value,
        input: &Value,
        ctx: &ExecutionContext,
        runtime: &RuntimeContext,
    ) -> Result<NodeRunResult, NodeError> {
        let data: IterationNodeData = parse_config("iteration", config)?;
        let graph = runtime.sub_graph(node_id)?;
        let items = resolve_items(&data, input, ctx)?;

        let max_iterations = runtime.config.max_iterations;
        if items.len() > max_iterations {
            return Err(NodeError::InputValidationError(format!(
                "Array size {} exceeds max iterations {}",
                items.len(),
                max_iterations
            )));
        }

        let pass = ItemPass {
            graph,
            parent: ctx.snapshot(),
            data: &data,
            runtime,
        };
        let outputs = if data.parallel() {
            let parallelism = data
                .parallelism
                .unwrap_or(runtime.config.iteration_parallelism)
                .max(1);
            debug!(node_id, items = items.len(), parallelism, "iterating in parallel");
            pass.run_parallel(items, parallelism).await?
        } else {
            debug!(node_id, items = items.len(), "iterating sequentially");
            pass.run_sequential(items).await?
        };

        Ok(NodeRunResult::output(Value::Array(outputs)))
    }
}

/// Target array: `arrayVariable`, else the node input. JSON text is decoded.
fn resolve_items(data: &IterationNodeData, input: &Value, ctx: &ExecutionContext) -> Result<Vec<Value>, NodeError> {
    let raw = match data.array_variable.as_deref().filter(|r| !r.trim().is_empty()) {
        Some(reference) => resolve_reference(reference, ctx).ok_or_else(|| {
            NodeError::InputValidationError(format!("iteration variable '{}' not found", reference))
        })?,
        None => input.clone(),
    };
    match decode_json_text(raw) {
        Value::Array(items) => Ok(items),
        Value::Null => Ok(Vec::new()),
        other => Err(NodeError::InputValidationError(format!(
            "iteration target must be an array, got {}",
            type_name(&other)
        ))),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

struct ItemPass<'a> {
    graph: Arc<Graph>,
    parent: Arc<ExecutionContext>,
    data: &'a IterationNodeData,
    runtime: &'a RuntimeContext,
}

impl ItemPass<'_> {
    async fn run(&self, index: usize, item: Value) -> Result<Value, NodeError> {
        let mut scope = Map::new();
        scope.insert("item".to_string(), item.clone());
        scope.insert("index".to_string(), json!(index));

        let outcome = self
            .runtime
            .sub_graph_runner
            .run_sub_graph(self.graph.clone(), self.parent.clone(), item.clone(), scope.clone(), self.runtime)
            .await?;
        if !outcome.success {
            return Err(NodeError::ExecutionError(format!(
                "item {}: {}",
                index,
                outcome.error.unwrap_or_else(|| "sub-graph failed".to_string())
            )));
        }
        Ok(self.item_output(outcome, item, scope))
    }

    fn item_output(&self, outcome: SubGraphOutcome, item: Value, scope: Map<String, Value>) -> Value {
        let Some(reference) = self.data.output_variable.as_deref().filter(|r| !r.trim().is_empty()) else {
            return outcome.final_output;
        };
        let mut sub_ctx = ExecutionContext::child(self.parent.clone(), item, scope);
        for result in outcome.node_results {
            sub_ctx.insert(result);
        }
        resolve_reference(reference, &sub_ctx).unwrap_or(Value::Null)
    }

    async fn run_sequential(&self, items: Vec<Value>) -> Result<Vec<Value>, NodeError> {
        let mut outputs = Vec::with_capacity(items.len());
        for (index, item) in items.into_iter().enumerate() {
            if self.runtime.is_cancelled() {
                return Err(NodeError::Cancelled);
            }
            match self.run(index, item).await {
                Ok(value) => outputs.push(value),
                Err(e) => {
                    if let Some(value) = self.on_item_error(index, e)? {
                        outputs.push(value);
                    }
                }
            }
        }
        Ok(outputs)
    }

    async fn run_parallel(&self, items: Vec<Value>, parallelism: usize) -> Result<Vec<Value>, NodeError> {
        // `buffered` yields in submission order, so slots follow array order
        // whatever the completion order.
        let settled: Vec<Result<Value, NodeError>> = stream::iter(items.into_iter().enumerate())
            .map(|(index, item)| self.run(index, item))
            .buffered(parallelism)
            .collect()
            .await;

        if settled.iter().any(|r| matches!(r, Err(NodeError::Cancelled))) {
            return Err(NodeError::Cancelled);
        }
        let mut outputs = Vec::with_capacity(settled.len());
        for (index, result) in settled.into_iter().enumerate() {
            match result {
                Ok(value) => outputs.push(value),
                Err(e) => {
                    if let Some(value) = self.on_item_error(index, e)? {
                        outputs.push(value);
                    }
                }
            }
        }
        Ok(outputs)
    }

    /// Apply the item policy: `Err` aborts the node, `Ok(None)` drops the
    /// slot, `Ok(Some(null))` keeps it.
    fn on_item_error(&self, index: usize, err: NodeError) -> Result<Option<Value>, NodeError> {
        if err.is_cancelled() {
            return Err(err);
        }
        match self.data.error_handling {
            IterationErrorMode::Terminated => Err(err),
            IterationErrorMode::Continue => {
                warn!(index, error = %err, "iteration item failed, recording null");
                Ok(Some(Value::Null))
            }
            IterationErrorMode::RemoveFailed => {
                warn!(index, error = %err, "iteration item failed, dropping it");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::sub_graph_runner::SubGraphRunner;
    use crate::dsl::{NodeResult, NodeStatus};
    use crate::graph::build_scope;
    use parking_lot::Mutex;
    use std::time::Duration;

    /// Doubles numeric items; fails on the configured index.
    struct FakeRunner {
        fail_at: Option<usize>,
        seen: Mutex<Vec<Value>>,
    }

    impl FakeRunner {
        fn new(fail_at: Option<usize>) -> Self {
            Self {
                fail_at,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl SubGraphRunner for FakeRunner {
        async fn run_sub_graph(
            &self,
            _graph: Arc<Graph>,
            _parent: Arc<ExecutionContext>,
            input: Value,
            scope_vars: Map<String, Value>,
            _runtime: &RuntimeContext,
        ) -> Result<SubGraphOutcome, NodeError> {
            let index = scope_vars["index"].as_u64().unwrap_or_default() as usize;
            // Later items finish first.
            tokio::time::sleep(Duration::from_millis(30 - 10 * index.min(2) as u64)).await;
            self.seen.lock().push(scope_vars["item"].clone());
            if self.fail_at == Some(index) {
                return Ok(SubGraphOutcome {
                    success: false,
                    final_output: Value::Null,
                    node_results: vec![],
                    error: Some("boom".into()),
                });
            }
            let doubled = input.as_i64().unwrap_or_default() * 2;
            Ok(SubGraphOutcome {
                success: true,
                final_output: json!(doubled),
                node_results: vec![NodeResult {
                    node_id: "calc".into(),
                    node_type: "code".into(),
                    label: "calc".into(),
                    status: NodeStatus::Completed,
                    output: json!({"value": doubled}),
                    error: None,
                    start_time: 0,
                    duration: None,
                    tolerated: false,
                }],
                error: None,
            })
        }
    }

    fn runtime(runner: Arc<FakeRunner>) -> RuntimeContext {
        let def = serde_json::from_value(json!({
            "nodes": [
                {"id": "iter", "type": "iteration", "data": {}},
                {"id": "inner", "type": "template", "parentId": "iter", "data": {"template": "x"}}
            ],
            "edges": []
        }))
        .unwrap();
        let mut runtime = RuntimeContext::default().with_sub_graph_runner(runner);
        runtime.scope = Some(Arc::new(build_scope(&def, false).unwrap()));
        runtime
    }

    async fn run(config: Value, input: Value, runner: Arc<FakeRunner>) -> Result<Value, NodeError> {
        let ctx = ExecutionContext::new(input.clone());
        IterationNodeExecutor
            .execute("iter", &config, &input, &ctx, &runtime(runner))
            .await
            .map(|r| r.output)
    }

    #[tokio::test]
    async fn test_sequential_continue_records_null() {
        let runner = Arc::new(FakeRunner::new(Some(1)));
        let out = run(json!({"errorHandling": "continue"}), json!([1, 2, 3]), runner).await.unwrap();
        assert_eq!(out, json!([2, null, 6]));
    }

    #[tokio::test]
    async fn test_sequential_terminates_on_first_error() {
        let runner = Arc::new(FakeRunner::new(Some(1)));
        let err = run(json!({}), json!([1, 2, 3]), runner.clone()).await.unwrap_err();
        assert!(err.to_string().contains("item 1: boom"), "{}", err);
        assert_eq!(runner.seen.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_parallel_keeps_array_order_and_removes_failed() {
        let runner = Arc::new(FakeRunner::new(Some(0)));
        let config = json!({"isParallel": true, "parallelism": 3, "errorHandling": "remove_failed"});
        let out = run(config, json!([1, 2, 3]), runner.clone()).await.unwrap();
        assert_eq!(out, json!([4, 6]));
        // Every item ran even though the first one failed.
        assert_eq!(runner.seen.lock().len(), 3);

        let runner = Arc::new(FakeRunner::new(None));
        let out = run(json!({"mode": "parallel"}), json!("[5, 6, 7]"), runner).await.unwrap();
        assert_eq!(out, json!([10, 12, 14]));
    }

    #[tokio::test]
    async fn test_output_variable_and_array_variable() {
        let runner = Arc::new(FakeRunner::new(None));
        let config = json!({"arrayVariable": "input.numbers", "outputVariable": "calc.value"});
        let out = run(config, json!({"numbers": [4]}), runner).await.unwrap();
        assert_eq!(out, json!([8]));

        let runner = Arc::new(FakeRunner::new(None));
        let err = run(json!({}), json!({"not": "an array"}), runner).await.unwrap_err();
        assert!(matches!(err, NodeError::InputValidationError(_)));
    }
}
