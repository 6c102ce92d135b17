use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

use crate::core::execution_context::ExecutionContext;
use crate::core::runtime_context::RuntimeContext;
use crate::dsl::{NodeRunResult, NodeType};
use crate::error::NodeError;
use crate::llm::{LlmNodeExecutor, QuestionClassifierExecutor};

/// Trait for node execution. Each node type implements this.
#[async_trait]
pub trait NodeExecutor: Send + Sync {
    /// Execute the node. `input` is the materialized node input; `ctx` holds
    /// every result recorded so far for reference resolution.
    async fn execute(
        &self,
        node_id: &str,
        config: &Value,
        input: &Value,
        ctx: &ExecutionContext,
        runtime: &RuntimeContext,
    ) -> Result<NodeRunResult, NodeError>;
}

/// Registry of node executors by canonical node type tag
pub struct NodeExecutorRegistry {
    executors: HashMap<String, Box<dyn NodeExecutor>>,
}

impl NodeExecutorRegistry {
    pub fn new() -> Self {
        let mut registry = Self::empty();
        // Register built-in executors
        registry.register_type(NodeType::Start, Box::new(super::control_flow::TriggerNodeExecutor::passthrough()));
        registry.register_type(NodeType::Webhook, Box::new(super::control_flow::TriggerNodeExecutor::passthrough()));
        registry.register_type(NodeType::CronTrigger, Box::new(super::control_flow::TriggerNodeExecutor::scheduled()));
        registry.register_type(NodeType::Condition, Box::new(super::control_flow::ConditionNodeExecutor));
        registry.register_type(NodeType::Output, Box::new(super::control_flow::OutputNodeExecutor));
        registry.register_type(NodeType::End, Box::new(super::control_flow::OutputNodeExecutor));
        registry.register_type(NodeType::ExitLoop, Box::new(super::control_flow::ExitLoopNodeExecutor));

        registry.register_type(NodeType::Llm, Box::new(LlmNodeExecutor));
        registry.register_type(NodeType::Process, Box::new(LlmNodeExecutor));
        registry.register_type(NodeType::QuestionClassifier, Box::new(QuestionClassifierExecutor));
        registry.register_type(NodeType::Agent, Box::new(super::agent::AgentNodeExecutor));
        registry.register_type(NodeType::Notification, Box::new(super::notification::NotificationNodeExecutor));

        registry.register_type(NodeType::Code, Box::new(super::transform::CodeNodeExecutor));
        registry.register_type(NodeType::HttpRequest, Box::new(super::transform::HttpRequestExecutor));
        registry.register_type(NodeType::Template, Box::new(super::transform::TemplateNodeExecutor));
        registry.register_type(
            NodeType::VariableAssignment,
            Box::new(super::transform::VariableAssignmentExecutor),
        );
        registry.register_type(
            NodeType::VariableAggregator,
            Box::new(super::transform::VariableAggregatorExecutor),
        );

        registry.register_type(NodeType::Iteration, Box::new(super::flow::IterationNodeExecutor));
        registry.register_type(NodeType::Loop, Box::new(super::flow::LoopNodeExecutor));
        registry
    }

    /// A registry with nothing registered.
    pub fn empty() -> Self {
        NodeExecutorRegistry {
            executors: HashMap::new(),
        }
    }

    /// Register under a raw tag. Tags that are not a known [`NodeType`] are
    /// looked up verbatim.
    pub fn register(&mut self, node_type: &str, executor: Box<dyn NodeExecutor>) {
        let key = NodeType::parse(node_type)
            .map(|t| t.as_str().to_string())
            .unwrap_or_else(|| node_type.to_string());
        self.executors.insert(key, executor);
    }

    pub fn register_type(&mut self, node_type: NodeType, executor: Box<dyn NodeExecutor>) {
        self.executors.insert(node_type.as_str().to_string(), executor);
    }

    pub fn get(&self, node_type: &str) -> Option<&dyn NodeExecutor> {
        self.executors.get(node_type).map(|e| e.as_ref())
    }

    pub fn contains(&self, node_type: &str) -> bool {
        self.executors.contains_key(node_type)
    }

    pub fn node_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.executors.keys().map(|s| s.as_str()).collect();
        types.sort_unstable();
        types
    }
}

impl Default for NodeExecutorRegistry {
    fn default() -> Self {
        Self::new()
    }
}
