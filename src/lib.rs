//! # aiflow: a workflow engine for AI employee graphs
//!
//! `aiflow` executes a graph of typed steps (triggers, model calls,
//! conditions, classifiers, agents, sandboxed code, HTTP calls,
//! notifications, loops) against a trigger input and streams per-node
//! progress as NDJSON events.
//!
//! - **Scheduling**: reachability from trigger nodes, dependency-ordered
//!   dispatch, branch pruning on `true`/`false` and category handles.
//! - **Nested scopes**: `iteration` and `loop` nodes own private sub-graphs
//!   dispatched re-entrantly with a fresh execution context per pass.
//! - **Sandboxed code**: JavaScript through Boa, Python through a
//!   short-lived subprocess; both under a wall-clock cap.
//! - **Node policy**: retries, per-attempt timeouts and
//!   `fail` / `default_value` / `continue` error handling.
//! - **Cancellation**: a token threaded through every suspension point.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use aiflow::{DslFormat, WorkflowRunner};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), aiflow::WorkflowError> {
//!     let json = std::fs::read_to_string("workflow.json").unwrap();
//!     let result = WorkflowRunner::from_text(&json, DslFormat::Json)?
//!         .input(serde_json::json!({"query": "hello"}))
//!         .execute()
//!         .await?;
//!     println!("{}", result.final_output);
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod core;
pub mod dsl;
pub mod error;
pub mod evaluator;
pub mod graph;
pub mod llm;
pub mod memory;
pub mod nodes;
pub mod sandbox;
pub mod template;
pub mod tools;

pub use crate::api::{WorkflowHandle, WorkflowRunner, WorkflowRunnerBuilder};
pub use crate::core::{
    DefaultSubGraphRunner, EngineConfig, ExecutionContext, ExecutionEvent, FakeIdGenerator, FakeTimeProvider,
    IdGenerator, RealIdGenerator, RealTimeProvider, RunResult, RuntimeContext, SubGraphOutcome, SubGraphRunner,
    TimeProvider, WorkflowDispatcher,
};
pub use crate::dsl::{
    parse_definition, validate_definition, Diagnostic, DiagnosticLevel, DslFormat, NodeResult, NodeStatus,
    NodeType, ValidationReport, WorkflowDefinition,
};
pub use crate::error::{NodeError, WorkflowError};
pub use crate::graph::{build_graph, Graph};
pub use crate::llm::{LanguageModel, ScriptedModel};
pub use crate::memory::{ConversationMemory, InMemoryConversationMemory};
pub use crate::nodes::{NodeExecutor, NodeExecutorRegistry};
pub use crate::tools::{NotificationSender, Tool, ToolRegistry};
