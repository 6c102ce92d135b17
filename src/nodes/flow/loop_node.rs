//! Loop node executor.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::core::execution_context::ExecutionContext;
use crate::core::runtime_context::RuntimeContext;
use crate::dsl::{IterationErrorMode, LoopNodeData, NodeRunResult, NodeType};
use crate::error::NodeError;
use crate::nodes::executor::NodeExecutor;
use crate::nodes::utils::parse_config;
use crate::template::resolve_value_spec;

/// Re-runs the node's sub-graph, threading a bag of named variables through
/// the passes.
///
/// After each pass, keys of the pass's final output that name a declared
/// variable overwrite it. The loop stops after `maxLoops` passes, when a pass
/// completed an `exit_loop` node, or when `terminationCondition` holds for
/// the updated variables (with `iteration` bound to the pass just run).
///
/// A failed pass leaves the variables untouched. `errorHandling` decides the
/// rest: `terminated` fails the node, `continue` records a `null` output and
/// `remove_failed` drops it; either way the loop goes on.
pub struct LoopNodeExecutor;

#[async_trait]
impl NodeExecutor for LoopNodeExecutor {
    async fn execute(
        &self,
        node_id: &str,
        config: &Value,
        input: &Value,
        ctx: &ExecutionContext,
        runtime: &RuntimeContext,
    ) -> Result<NodeRunResult, NodeError> {
        let data: LoopNodeData = parse_config("loop", config)?;
        let graph = runtime.sub_graph(node_id)?;
        let max_loops = data.max_loops.unwrap_or(runtime.config.default_max_loops);
        let condition = data.termination_condition.as_deref().filter(|c| !c.trim().is_empty());

        let mut variables: Map<String, Value> = data
            .variables
            .entries()
            .into_iter()
            .map(|(name, initial)| (name, resolve_value_spec(&initial, ctx)))
            .collect();
        let parent = ctx.snapshot();

        let mut outputs = Vec::new();
        let mut exited = false;
        let mut iterations = 0u32;
        let mut failures = 0u32;
        while iterations < max_loops {
            if runtime.is_cancelled() {
                return Err(NodeError::Cancelled);
            }

            let mut scope = variables.clone();
            scope.insert("iteration".to_string(), json!(iterations));
            let outcome = runtime
                .sub_graph_runner
                .run_sub_graph(graph.clone(), parent.clone(), input.clone(), scope, runtime)
                .await?;
            if outcome.success {
                if let Value::Object(map) = &outcome.final_output {
                    for (name, value) in map {
                        if let Some(slot) = variables.get_mut(name) {
                            *slot = value.clone();
                        }
                    }
                }
                outputs.push(outcome.final_output.clone());
            } else {
                let reason = outcome.error.as_deref().unwrap_or("sub-graph failed");
                match data.error_handling {
                    IterationErrorMode::Terminated => {
                        return Err(NodeError::ExecutionError(format!(
                            "loop pass {} failed: {}",
                            iterations, reason
                        )));
                    }
                    IterationErrorMode::Continue => outputs.push(Value::Null),
                    IterationErrorMode::RemoveFailed => {}
                }
                warn!(
                    node_id,
                    iteration = iterations,
                    error = reason,
                    "loop pass failed, continuing"
                );
                failures += 1;
            }
            let pass = iterations;
            iterations += 1;

            if outcome.completed_node_of_kind(NodeType::ExitLoop) {
                debug!(node_id, iteration = pass, "exit_loop reached");
                exited = true;
                break;
            }
            if let Some(expr) = condition {
                let mut bindings = variables.clone();
                bindings.insert("iteration".to_string(), json!(pass));
                bindings.insert("input".to_string(), input.clone());
                if runtime.expression.evaluate_bool(expr, &bindings).await? {
                    debug!(node_id, iteration = pass, "termination condition met");
                    break;
                }
            }
        }

        Ok(NodeRunResult::output(json!({
            "variables": variables,
            "iterations": iterations,
            "outputs": outputs,
            "exited": exited,
            "failures": failures,
        })))
    }
}
