//! Workflow dispatcher: the main execution driver.
//!
//! The [`WorkflowDispatcher`] walks one graph scope, executing each node via
//! its registered [`NodeExecutor`](crate::nodes::NodeExecutor) under the
//! node's retry/timeout policy, managing edge traversal (branch pruning and
//! skip propagation) and reporting every transition through the
//! [`EventEmitter`]. Nested scopes are dispatched by a fresh dispatcher per
//! pass; nothing here is global, so dispatch is re-entrant.

use std::collections::{HashSet, VecDeque};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use aiflow_sandbox_js::JsSandboxConfig;

use crate::core::event_bus::{EventEmitter, ExecutionEvent};
use crate::core::execution_context::ExecutionContext;
use crate::core::retry::{execute_with_policy, NodeOutcome};
use crate::core::runtime_context::RuntimeContext;
use crate::dsl::{EdgeHandle, NodeResult, NodeStatus, NodeType};
use crate::error::{NodeError, WorkflowError, WorkflowResult};
use crate::graph::{EdgeStates, Graph, GraphNode};
use crate::sandbox::{PythonSandboxConfig, SandboxManagerConfig};
use crate::template::{resolve_reference, resolve_value_spec};

/// Configuration for the workflow engine
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    pub max_steps: usize,
    pub max_execution_time_secs: u64,
    /// Per-attempt cap for nodes that set no `timeout` of their own.
    pub default_node_timeout_ms: Option<u64>,
    pub js_timeout_ms: u64,
    pub python_timeout_ms: u64,
    pub python_bin: String,
    /// Upper bound on concurrent sub-runs of a parallel iteration.
    pub iteration_parallelism: usize,
    /// Largest array an iteration node accepts.
    pub max_iterations: usize,
    pub default_max_loops: u32,
    pub classifier_max_retries: u32,
    pub http_timeout_secs: u64,
    pub event_buffer: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            max_steps: 500,
            max_execution_time_secs: 600,
            default_node_timeout_ms: None,
            js_timeout_ms: 5000,
            python_timeout_ms: 5000,
            python_bin: "python3".to_string(),
            iteration_parallelism: 10,
            max_iterations: 1000,
            default_max_loops: 10,
            classifier_max_retries: 2,
            http_timeout_secs: 30,
            event_buffer: 256,
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(text: &str) -> WorkflowResult<Self> {
        toml::from_str(text).map_err(|e| WorkflowError::ConfigError(e.to_string()))
    }

    pub fn from_file(path: impl AsRef<Path>) -> WorkflowResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| WorkflowError::ConfigError(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&text)
    }

    pub fn sandbox_config(&self) -> SandboxManagerConfig {
        SandboxManagerConfig {
            js: JsSandboxConfig {
                default_timeout: Duration::from_millis(self.js_timeout_ms),
                ..JsSandboxConfig::default()
            },
            python: PythonSandboxConfig {
                python_bin: self.python_bin.clone(),
                default_timeout: Duration::from_millis(self.python_timeout_ms),
                ..PythonSandboxConfig::default()
            },
        }
    }
}

/// What a dispatch produced. Fatal errors are returned as `Err` instead.
#[derive(Debug)]
pub struct DispatchOutcome {
    pub success: bool,
    pub final_output: Value,
    pub error: Option<String>,
    pub cancelled: bool,
    pub context: ExecutionContext,
}

enum Step {
    Continue,
    Failed(String),
    Cancelled,
}

/// The main workflow dispatcher: drives execution of one graph scope.
pub struct WorkflowDispatcher {
    graph: Arc<Graph>,
    context: ExecutionContext,
    runtime: Arc<RuntimeContext>,
    emitter: EventEmitter,
    edges: EdgeStates,
    reachable: HashSet<String>,
}

impl WorkflowDispatcher {
    pub fn new(
        graph: Arc<Graph>,
        context: ExecutionContext,
        runtime: Arc<RuntimeContext>,
        emitter: EventEmitter,
    ) -> Self {
        let mut scoped = (*runtime).clone();
        scoped.scope = Some(graph.clone());
        let edges = EdgeStates::new(&graph);
        let reachable = graph.reachable();
        Self {
            graph,
            context,
            runtime: Arc::new(scoped),
            emitter,
            edges,
            reachable,
        }
    }

    pub async fn run(mut self) -> WorkflowResult<DispatchOutcome> {
        let start_time = self.runtime.time_provider.now_timestamp();
        let mut step_count = 0usize;
        let mut queue: VecDeque<String> = VecDeque::new();
        let mut queued: HashSet<String> = HashSet::new();
        for root in self.graph.roots() {
            if queued.insert(root.to_string()) {
                queue.push_back(root.to_string());
            }
        }
        debug!(
            nodes = self.graph.len(),
            reachable = self.reachable.len(),
            "dispatch started"
        );

        let mut failure = None;
        while let Some(node_id) = queue.pop_front() {
            if self.runtime.is_cancelled() {
                return Ok(self.finish_cancelled());
            }
            self.check_limits(&mut step_count, start_time)?;

            let node = self
                .graph
                .node(&node_id)
                .cloned()
                .ok_or_else(|| WorkflowError::NodeNotFound(node_id.clone()))?;

            if self.edges.all_inputs_skipped(&self.graph, &node_id, &self.reachable) {
                self.skip_node(&node).await;
            } else {
                match self.execute_node(&node).await {
                    Step::Continue => {}
                    Step::Failed(message) => {
                        failure = Some(message);
                        break;
                    }
                    Step::Cancelled => return Ok(self.finish_cancelled()),
                }
            }

            let downstream: Vec<String> = self
                .graph
                .downstream_node_ids(&node_id)
                .into_iter()
                .map(str::to_string)
                .collect();
            for next in downstream {
                if !self.reachable.contains(&next) || queued.contains(&next) {
                    continue;
                }
                if self.edges.is_node_ready(&self.graph, &next, &self.reachable) {
                    queued.insert(next.clone());
                    queue.push_back(next);
                }
            }
        }

        let final_output = self.final_output();
        Ok(DispatchOutcome {
            success: failure.is_none(),
            final_output,
            error: failure,
            cancelled: false,
            context: self.context,
        })
    }

    fn check_limits(&self, step_count: &mut usize, start_time: i64) -> WorkflowResult<()> {
        // Check max steps
        *step_count += 1;
        let max_steps = self.runtime.config.max_steps;
        if *step_count > max_steps {
            return Err(WorkflowError::MaxStepsExceeded(max_steps));
        }

        // Check max time
        if self.runtime.time_provider.elapsed_secs(start_time) > self.runtime.config.max_execution_time_secs {
            return Err(WorkflowError::ExecutionTimeout);
        }

        Ok(())
    }

    async fn skip_node(&mut self, node: &GraphNode) {
        debug!(node_id = %node.id, "node skipped: every inbound edge was pruned");
        let result = NodeResult {
            node_id: node.id.clone(),
            node_type: node.node_type.clone(),
            label: node.label.clone(),
            status: NodeStatus::Skipped,
            output: Value::Null,
            error: None,
            start_time: self.runtime.time_provider.now_millis(),
            duration: None,
            tolerated: false,
        };
        self.emitter.emit(ExecutionEvent::from_result(&result)).await;
        self.context.insert(result);
        self.edges.skip_outgoing(&self.graph, &node.id);
    }

    /// A completed node frees every outgoing edge unless it picked a branch.
    fn advance_edges(&mut self, node: &GraphNode, handle: &EdgeHandle) {
        match handle {
            EdgeHandle::Default => self.edges.process_normal_edges(&self.graph, &node.id),
            EdgeHandle::Branch(_) => self.edges.process_branch_edges(&self.graph, &node.id, handle),
        }
    }

    async fn execute_node(&mut self, node: &GraphNode) -> Step {
        let runtime = self.runtime.clone();
        let started = Instant::now();
        let start_time = runtime.time_provider.now_millis();
        info!(node_id = %node.id, node_type = %node.node_type, "node started");
        self.emitter.emit(ExecutionEvent::running(&node.id)).await;

        let input = self.node_input(node);
        let handler_key = node.kind.map(|k| k.as_str()).unwrap_or(node.node_type.as_str());
        let outcome = match runtime.registry.get(handler_key) {
            Some(executor) => execute_with_policy(executor, node, &input, &self.context, &runtime).await,
            None => NodeOutcome::Failed(NodeError::ConfigError(format!(
                "no executor for node type: {}",
                node.node_type
            ))),
        };

        let mut result = NodeResult {
            node_id: node.id.clone(),
            node_type: node.node_type.clone(),
            label: node.label.clone(),
            status: NodeStatus::Completed,
            output: Value::Null,
            error: None,
            start_time,
            duration: Some(started.elapsed().as_millis() as u64),
            tolerated: false,
        };

        let step = match outcome {
            NodeOutcome::Completed(run) => {
                result.output = run.output;
                self.advance_edges(node, &run.edge_source_handle);
                info!(node_id = %node.id, elapsed_ms = result.duration, "node completed");
                Step::Continue
            }
            NodeOutcome::Tolerated { output, error } => {
                warn!(node_id = %node.id, error = %error, "node failed, policy substituted output");
                result.status = NodeStatus::Failed;
                result.tolerated = true;
                result.output = output;
                result.error = Some(error.to_string());
                // A tolerated branch node selects no handled branch.
                if node.is_branch() {
                    self.edges
                        .process_branch_edges(&self.graph, &node.id, &EdgeHandle::Branch(String::new()));
                } else {
                    self.edges.process_normal_edges(&self.graph, &node.id);
                }
                Step::Continue
            }
            NodeOutcome::Failed(error) => {
                result.status = NodeStatus::Failed;
                result.error = Some(error.to_string());
                if error.is_cancelled() {
                    info!(node_id = %node.id, "node cancelled");
                    Step::Cancelled
                } else {
                    warn!(node_id = %node.id, node_type = %node.node_type, error = %error, "node failed");
                    Step::Failed(format!("Node {} failed: {}", node.id, error))
                }
            }
        };

        self.emitter.emit(ExecutionEvent::from_result(&result)).await;
        self.context.insert(result);
        step
    }

    /// Trigger nodes and roots get the scope input; otherwise the output of
    /// the live predecessors. `inputVariable` overrides both.
    fn node_input(&self, node: &GraphNode) -> Value {
        match node.config.get("inputVariable") {
            Some(Value::String(reference)) if !reference.trim().is_empty() => {
                return resolve_reference(reference, &self.context).unwrap_or(Value::Null);
            }
            Some(spec) if !spec.is_null() && !spec.is_string() => {
                return resolve_value_spec(spec, &self.context);
            }
            _ => {}
        }
        if node.is_trigger() {
            return self.context.input().clone();
        }

        let preds: Vec<&str> = self
            .edges
            .taken_predecessors(&self.graph, &node.id)
            .into_iter()
            .filter(|p| self.context.output(p).is_some())
            .collect();
        match preds.as_slice() {
            [] => self.context.input().clone(),
            [only] => self.context.output(only).cloned().unwrap_or(Value::Null),
            many => Value::Object(
                many.iter()
                    .map(|p| (p.to_string(), self.context.output(p).cloned().unwrap_or(Value::Null)))
                    .collect(),
            ),
        }
    }

    /// One completed `output`/`end` node gives its output, several give an
    /// object keyed by node id. Otherwise the last completed node's output,
    /// or the scope input when nothing completed.
    fn final_output(&self) -> Value {
        let results = self.context.results();
        let terminals: Vec<&NodeResult> = results
            .iter()
            .filter(|r| r.status == NodeStatus::Completed)
            .filter(|r| matches!(NodeType::parse(&r.node_type), Some(NodeType::Output | NodeType::End)))
            .collect();
        match terminals.as_slice() {
            [only] => only.output.clone(),
            [] => results
                .iter()
                .rev()
                .find(|r| r.status == NodeStatus::Completed)
                .map(|r| r.output.clone())
                .unwrap_or_else(|| self.context.input().clone()),
            many => Value::Object(
                many.iter()
                    .map(|r| (r.node_id.clone(), r.output.clone()))
                    .collect::<Map<String, Value>>(),
            ),
        }
    }

    fn finish_cancelled(self) -> DispatchOutcome {
        info!("dispatch cancelled");
        DispatchOutcome {
            success: false,
            final_output: Value::Null,
            error: Some(WorkflowError::Aborted("cancelled".into()).to_string()),
            cancelled: true,
            context: self.context,
        }
    }
}
