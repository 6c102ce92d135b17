//! High-level workflow runner and builder.
//!
//! [`WorkflowRunner`] (constructed via [`WorkflowRunnerBuilder`]) validates a
//! definition, builds its graph, wires the runtime collaborators and launches
//! the dispatcher on a background task, returning a [`WorkflowHandle`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, Instrument};

use super::handle::WorkflowHandle;
use crate::core::dispatcher::{EngineConfig, WorkflowDispatcher};
use crate::core::event_bus::{create_event_channel, EventEmitter, ExecutionEvent, RunResult};
use crate::core::execution_context::ExecutionContext;
use crate::core::runtime_context::{IdGenerator, RuntimeContext, TimeProvider};
use crate::core::sub_graph_runner::SubGraphRunner;
use crate::dsl::{parse_definition, validate_definition, DslFormat, ValidationReport, WorkflowDefinition};
use crate::error::WorkflowError;
use crate::graph::{build_graph, Graph};
use crate::llm::LanguageModel;
use crate::memory::ConversationMemory;
use crate::nodes::executor::{NodeExecutor, NodeExecutorRegistry};
use crate::tools::{NotificationSender, ToolRegistry};

/// Entry point for running a workflow definition.
///
/// Use [`WorkflowRunner::builder(definition)`](Self::builder) to obtain a
/// [`WorkflowRunnerBuilder`].
pub struct WorkflowRunner;

impl WorkflowRunner {
    pub fn builder(definition: WorkflowDefinition) -> WorkflowRunnerBuilder {
        WorkflowRunnerBuilder {
            definition,
            input: Value::Null,
            config: EngineConfig::default(),
            runtime: None,
            model: None,
            tools: None,
            senders: None,
            memory: None,
            sub_graph_runner: None,
            time_provider: None,
            id_generator: None,
            executors: Vec::new(),
            cancel: None,
        }
    }

    /// Parse `content` and return a builder for it.
    pub fn from_text(content: &str, format: DslFormat) -> Result<WorkflowRunnerBuilder, WorkflowError> {
        Ok(Self::builder(parse_definition(content, format)?))
    }
}

/// Builder for configuring and launching a run.
pub struct WorkflowRunnerBuilder {
    definition: WorkflowDefinition,
    input: Value,
    config: EngineConfig,
    runtime: Option<RuntimeContext>,
    model: Option<Arc<dyn LanguageModel>>,
    tools: Option<ToolRegistry>,
    senders: Option<(Arc<dyn NotificationSender>, Arc<dyn NotificationSender>)>,
    memory: Option<Arc<dyn ConversationMemory>>,
    sub_graph_runner: Option<Arc<dyn SubGraphRunner>>,
    time_provider: Option<Arc<dyn TimeProvider>>,
    id_generator: Option<Arc<dyn IdGenerator>>,
    executors: Vec<(String, Box<dyn NodeExecutor>)>,
    cancel: Option<CancellationToken>,
}

impl WorkflowRunnerBuilder {
    /// Raw trigger payload.
    pub fn input(mut self, input: Value) -> Self {
        self.input = input;
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Start from a prepared runtime instead of one derived from
    /// [`config`](Self::config). The other setters still apply on top.
    pub fn runtime(mut self, runtime: RuntimeContext) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn model(mut self, model: Arc<dyn LanguageModel>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn notification_senders(
        mut self,
        site: Arc<dyn NotificationSender>,
        email: Arc<dyn NotificationSender>,
    ) -> Self {
        self.senders = Some((site, email));
        self
    }

    pub fn memory(mut self, memory: Arc<dyn ConversationMemory>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn sub_graph_runner(mut self, runner: Arc<dyn SubGraphRunner>) -> Self {
        self.sub_graph_runner = Some(runner);
        self
    }

    pub fn time_provider(mut self, provider: Arc<dyn TimeProvider>) -> Self {
        self.time_provider = Some(provider);
        self
    }

    pub fn id_generator(mut self, generator: Arc<dyn IdGenerator>) -> Self {
        self.id_generator = Some(generator);
        self
    }

    /// Register or replace the executor for `node_type`.
    pub fn executor(mut self, node_type: &str, executor: Box<dyn NodeExecutor>) -> Self {
        self.executors.push((node_type.to_string(), executor));
        self
    }

    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Validate the definition without running it.
    pub fn validate(&self) -> ValidationReport {
        validate_definition(&self.definition)
    }

    fn build_runtime(&mut self) -> RuntimeContext {
        let mut runtime = self
            .runtime
            .take()
            .unwrap_or_else(|| RuntimeContext::new(self.config.clone()));
        if let Some((site, email)) = self.senders.take() {
            runtime = runtime.with_notification_senders(site, email);
        }
        if let Some(tools) = self.tools.take() {
            runtime = runtime.with_tools(tools);
        }
        if let Some(model) = self.model.take() {
            runtime = runtime.with_model(model);
        }
        if let Some(memory) = self.memory.take() {
            runtime = runtime.with_memory(memory);
        }
        if let Some(runner) = self.sub_graph_runner.take() {
            runtime = runtime.with_sub_graph_runner(runner);
        }
        if let Some(provider) = self.time_provider.take() {
            runtime = runtime.with_time_provider(provider);
        }
        if let Some(generator) = self.id_generator.take() {
            runtime = runtime.with_id_generator(generator);
        }
        if !self.executors.is_empty() {
            let mut registry = NodeExecutorRegistry::new();
            for (node_type, executor) in self.executors.drain(..) {
                registry.register(&node_type, executor);
            }
            runtime = runtime.with_registry(registry);
        }
        if let Some(token) = self.cancel.take() {
            runtime = runtime.with_cancellation(token);
        }
        runtime
    }

    /// Validate, build the graph and launch the run on a background task.
    ///
    /// Graph errors are returned here and no node executes.
    pub async fn run(mut self) -> Result<WorkflowHandle, WorkflowError> {
        let report = validate_definition(&self.definition);
        if !report.is_valid {
            return Err(WorkflowError::ValidationFailed(Box::new(report)));
        }
        let graph = Arc::new(build_graph(&self.definition)?);

        let runtime = Arc::new(self.build_runtime());
        let run_id = runtime.id_generator.next_id();
        let cancel = runtime.cancel.clone();
        let (tx, rx) = create_event_channel(runtime.config.event_buffer);
        let emitter = EventEmitter::new(tx);

        let span = info_span!("workflow_run", run_id = %run_id);
        let task = tokio::spawn(drive(graph, self.input, runtime, emitter).instrument(span));
        Ok(WorkflowHandle::new(run_id, rx, cancel, task))
    }

    /// Run to completion and return the aggregate result.
    pub async fn execute(self) -> Result<RunResult, WorkflowError> {
        Ok(self.run().await?.wait().await)
    }
}

/// Dispatch the top-level scope under the run-wide time cap and emit the
/// terminal event.
async fn drive(graph: Arc<Graph>, input: Value, runtime: Arc<RuntimeContext>, emitter: EventEmitter) -> RunResult {
    let started = Instant::now();
    info!(nodes = graph.len(), "workflow run started");

    let limit = Duration::from_secs(runtime.config.max_execution_time_secs);
    let dispatcher = WorkflowDispatcher::new(graph, ExecutionContext::new(input), runtime.clone(), emitter.clone());
    let outcome = match tokio::time::timeout(limit, dispatcher.run()).await {
        Ok(outcome) => outcome,
        Err(_) => {
            // Stop anything still attached to the dropped dispatch.
            runtime.cancel.cancel();
            Err(WorkflowError::ExecutionTimeout)
        }
    };
    let total_duration = started.elapsed().as_millis() as u64;

    match outcome {
        Ok(outcome) => {
            let result = RunResult {
                success: outcome.success,
                final_output: outcome.final_output,
                node_results: outcome.context.results(),
                total_duration,
                error: outcome.error,
            };
            info!(success = result.success, elapsed_ms = total_duration, "workflow run finished");
            emitter.emit(ExecutionEvent::Final { result: result.clone() }).await;
            result
        }
        Err(err) => {
            error!(error = %err, "workflow run aborted");
            emitter.emit(ExecutionEvent::Error { error: err.to_string() }).await;
            RunResult::failed(err.to_string(), total_duration)
        }
    }
}
