//! Sub-graph runner for container nodes (iteration, loop).
//!
//! A sub-graph is the private scope owned by a container node. The
//! [`SubGraphRunner`] trait abstracts how one pass over it is executed so that
//! tests can substitute custom implementations.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::debug;

use crate::core::dispatcher::WorkflowDispatcher;
use crate::core::event_bus::EventEmitter;
use crate::core::execution_context::ExecutionContext;
use crate::core::runtime_context::RuntimeContext;
use crate::dsl::{NodeResult, NodeStatus, NodeType};
use crate::error::NodeError;
use crate::graph::Graph;

/// Result of one pass over a sub-graph.
#[derive(Debug, Clone)]
pub struct SubGraphOutcome {
    pub success: bool,
    pub final_output: Value,
    pub node_results: Vec<NodeResult>,
    pub error: Option<String>,
}

impl SubGraphOutcome {
    /// Whether the pass executed a node of `kind` to completion.
    pub fn completed_node_of_kind(&self, kind: NodeType) -> bool {
        self.node_results
            .iter()
            .any(|r| r.status == NodeStatus::Completed && NodeType::parse(&r.node_type) == Some(kind))
    }
}

/// Trait for executing embedded sub-graphs within container nodes.
#[async_trait]
pub trait SubGraphRunner: Send + Sync {
    /// Run `graph` once with a fresh context whose reads fall back to
    /// `parent`. `scope_vars` become `{{name}}` references inside the pass.
    async fn run_sub_graph(
        &self,
        graph: Arc<Graph>,
        parent: Arc<ExecutionContext>,
        input: Value,
        scope_vars: Map<String, Value>,
        runtime: &RuntimeContext,
    ) -> Result<SubGraphOutcome, NodeError>;
}

/// Default [`SubGraphRunner`]: a fresh [`WorkflowDispatcher`] per pass, with
/// events muted.
pub struct DefaultSubGraphRunner;

#[async_trait]
impl SubGraphRunner for DefaultSubGraphRunner {
    async fn run_sub_graph(
        &self,
        graph: Arc<Graph>,
        parent: Arc<ExecutionContext>,
        input: Value,
        scope_vars: Map<String, Value>,
        runtime: &RuntimeContext,
    ) -> Result<SubGraphOutcome, NodeError> {
        if runtime.is_cancelled() {
            return Err(NodeError::Cancelled);
        }
        debug!(nodes = graph.len(), "dispatching sub-graph");

        let context = ExecutionContext::child(parent, input, scope_vars);
        let dispatcher =
            WorkflowDispatcher::new(graph, context, Arc::new(runtime.clone()), EventEmitter::silent());
        let outcome = dispatcher
            .run()
            .await
            .map_err(|e| NodeError::ExecutionError(format!("sub-graph: {}", e)))?;
        if outcome.cancelled {
            return Err(NodeError::Cancelled);
        }

        Ok(SubGraphOutcome {
            success: outcome.success,
            final_output: outcome.final_output,
            node_results: outcome.context.results(),
            error: outcome.error,
        })
    }
}
