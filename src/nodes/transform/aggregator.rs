//! Variable aggregator node executor.

use async_trait::async_trait;
use serde_json::Value;

use crate::core::execution_context::ExecutionContext;
use crate::core::runtime_context::RuntimeContext;
use crate::dsl::{AggregationStrategy, NodeRunResult, VariableAggregatorNodeData};
use crate::error::NodeError;
use crate::nodes::executor::NodeExecutor;
use crate::nodes::utils::parse_config;
use crate::template::{resolve_reference, value_to_text};

/// Combines several values into one.
///
/// With no `variables` configured the outputs of the node's live
/// predecessors are used, in edge order. Missing and `null` values are
/// dropped before combining.
pub struct VariableAggregatorExecutor;

#[async_trait]
impl NodeExecutor for VariableAggregatorExecutor {
    async fn execute(
        &self,
        node_id: &str,
        config: &Value,
        _input: &Value,
        ctx: &ExecutionContext,
        runtime: &RuntimeContext,
    ) -> Result<NodeRunResult, NodeError> {
        let data: VariableAggregatorNodeData = parse_config("variable_aggregator", config)?;

        let values: Vec<Value> = if data.variables.is_empty() {
            predecessor_outputs(node_id, ctx, runtime)
        } else {
            data.variables
                .iter()
                .filter_map(|reference| resolve_reference(reference, ctx))
                .collect()
        };
        let values: Vec<Value> = values.into_iter().filter(|v| !v.is_null()).collect();

        Ok(NodeRunResult::output(aggregate(data.strategy, values)))
    }
}

fn predecessor_outputs(node_id: &str, ctx: &ExecutionContext, runtime: &RuntimeContext) -> Vec<Value> {
    let Some(graph) = runtime.scope.as_ref() else {
        return Vec::new();
    };
    let mut seen = Vec::new();
    for idx in graph.in_edge_indices(node_id) {
        let source = graph.edge(*idx).source.as_str();
        if !seen.contains(&source) {
            seen.push(source);
        }
    }
    seen.into_iter().filter_map(|id| ctx.output(id).cloned()).collect()
}

fn aggregate(strategy: AggregationStrategy, values: Vec<Value>) -> Value {
    match strategy {
        AggregationStrategy::Array => Value::Array(values),
        AggregationStrategy::Concat => Value::String(
            values
                .iter()
                .map(|v| value_to_text(Some(v)))
                .collect::<Vec<_>>()
                .join("\n"),
        ),
        AggregationStrategy::Merge => Value::String(values.iter().map(Value::to_string).collect()),
    }
}
