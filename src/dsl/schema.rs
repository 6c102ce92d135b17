use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tracing::warn;

use aiflow_types::CodeLanguage;

// ================================
// Workflow Definition
// ================================

/// `{ nodes, edges }` as produced by the canvas.
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct WorkflowDefinition {
    #[serde(default)]
    pub nodes: Vec<NodeSchema>,
    #[serde(default)]
    pub edges: Vec<EdgeSchema>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct NodeSchema {
    pub id: String,
    /// Raw type tag; see [`NodeType`] for the accepted spellings.
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default = "empty_object")]
    pub data: Value,
    /// Owning iteration/loop node, if this node belongs to a private sub-graph.
    #[serde(default, alias = "parent_id", skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

impl NodeSchema {
    pub fn kind(&self) -> Option<NodeType> {
        NodeType::parse(&self.node_type)
    }

    /// Display label: `data.label`, then `data.title`, then the id.
    pub fn label(&self) -> String {
        ["label", "title"]
            .iter()
            .find_map(|k| self.data.get(*k).and_then(|v| v.as_str()))
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| self.id.clone())
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct EdgeSchema {
    #[serde(default)]
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(default, alias = "source_handle", skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
}

fn empty_object() -> Value {
    Value::Object(Default::default())
}

// ================================
// Node Type Enum
// ================================

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Start,
    #[serde(alias = "cron-trigger", alias = "cron", alias = "schedule")]
    CronTrigger,
    Webhook,
    Llm,
    Process,
    Agent,
    #[serde(alias = "question-classifier", alias = "classifier")]
    QuestionClassifier,
    #[serde(alias = "if-else", alias = "if_else", alias = "if")]
    Condition,
    Code,
    #[serde(alias = "http-request", alias = "http")]
    HttpRequest,
    Notification,
    #[serde(alias = "variable-assignment", alias = "assigner", alias = "variable_assigner")]
    VariableAssignment,
    #[serde(alias = "variable-aggregator", alias = "aggregator")]
    VariableAggregator,
    #[serde(alias = "template-transform", alias = "template_transform")]
    Template,
    Iteration,
    Loop,
    #[serde(alias = "exit-loop", alias = "break")]
    ExitLoop,
    Output,
    End,
}

impl NodeType {
    pub fn parse(tag: &str) -> Option<Self> {
        serde_json::from_value(Value::String(tag.to_string())).ok()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Start => "start",
            NodeType::CronTrigger => "cron_trigger",
            NodeType::Webhook => "webhook",
            NodeType::Llm => "llm",
            NodeType::Process => "process",
            NodeType::Agent => "agent",
            NodeType::QuestionClassifier => "question_classifier",
            NodeType::Condition => "condition",
            NodeType::Code => "code",
            NodeType::HttpRequest => "http_request",
            NodeType::Notification => "notification",
            NodeType::VariableAssignment => "variable_assignment",
            NodeType::VariableAggregator => "variable_aggregator",
            NodeType::Template => "template",
            NodeType::Iteration => "iteration",
            NodeType::Loop => "loop",
            NodeType::ExitLoop => "exit_loop",
            NodeType::Output => "output",
            NodeType::End => "end",
        }
    }

    pub fn execution_type(&self) -> NodeExecutionType {
        match self {
            NodeType::Start | NodeType::CronTrigger | NodeType::Webhook => NodeExecutionType::Trigger,
            NodeType::Condition | NodeType::QuestionClassifier => NodeExecutionType::Branch,
            NodeType::Iteration | NodeType::Loop => NodeExecutionType::Container,
            NodeType::Output | NodeType::End => NodeExecutionType::Response,
            _ => NodeExecutionType::Executable,
        }
    }

    pub fn is_trigger(&self) -> bool {
        self.execution_type() == NodeExecutionType::Trigger
    }

    pub fn is_branch(&self) -> bool {
        self.execution_type() == NodeExecutionType::Branch
    }

    pub fn is_container(&self) -> bool {
        self.execution_type() == NodeExecutionType::Container
    }
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeExecutionType {
    Trigger,
    Executable,
    Branch,
    Container,
    Response,
}

// ================================
// Retry / Timeout / Failure Policy
// ================================

/// Per-node wrapper settings, read from the node's `data`.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct NodePolicy {
    /// Attempts beyond the first.
    #[serde(default)]
    pub retry_count: u32,
    /// Per-attempt wall-clock cap in milliseconds.
    #[serde(default)]
    pub timeout: Option<u64>,
    /// Pause between attempts in milliseconds.
    #[serde(default)]
    pub retry_interval: Option<u64>,
    #[serde(default)]
    pub error_handling: ErrorHandling,
    #[serde(default)]
    pub default_value: Option<Value>,
    /// Only retry errors classified as transient (network, 5xx, 429,
    /// timeouts, model and sandbox failures). Off by default: every error
    /// except cancellation is retried up to `retry_count` times.
    #[serde(default)]
    pub retry_on_retryable_only: bool,
}

impl NodePolicy {
    /// Read the policy from a node's `data`. A malformed field is logged and
    /// falls back to its default; the other fields still apply.
    pub fn from_config(config: &Value) -> Self {
        for (field, err) in Self::malformed_fields(config) {
            warn!(field, error = %err, "ignoring malformed node policy field");
        }
        Self {
            retry_count: policy_field(config, "retryCount").unwrap_or_default(),
            timeout: policy_field(config, "timeout").unwrap_or_default(),
            retry_interval: policy_field(config, "retryInterval").unwrap_or_default(),
            error_handling: policy_field(config, "errorHandling").unwrap_or_default(),
            default_value: config.get("defaultValue").filter(|v| !v.is_null()).cloned(),
            retry_on_retryable_only: policy_field(config, "retryOnRetryableOnly").unwrap_or_default(),
        }
    }

    /// Policy fields present in `config` that do not parse, with the reason.
    pub fn malformed_fields(config: &Value) -> Vec<(&'static str, String)> {
        let mut out = Vec::new();
        let mut check = |field: &'static str, result: Result<(), String>| {
            if let Err(e) = result {
                out.push((field, e));
            }
        };
        check("retryCount", policy_field::<u32>(config, "retryCount").map(drop));
        check("timeout", policy_field::<Option<u64>>(config, "timeout").map(drop));
        check("retryInterval", policy_field::<Option<u64>>(config, "retryInterval").map(drop));
        check("errorHandling", policy_field::<ErrorHandling>(config, "errorHandling").map(drop));
        check("retryOnRetryableOnly", policy_field::<bool>(config, "retryOnRetryableOnly").map(drop));
        out
    }
}

fn policy_field<T: DeserializeOwned + Default>(config: &Value, field: &str) -> Result<T, String> {
    match config.get(field) {
        None | Some(Value::Null) => Ok(T::default()),
        Some(raw) => serde_json::from_value(raw.clone()).map_err(|e| e.to_string()),
    }
}

/// What happens once retries are exhausted.
///
/// Unknown spellings (including the iteration item policies) read as `Fail`.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ErrorHandling {
    #[default]
    Fail,
    DefaultValue,
    Continue,
}

impl<'de> Deserialize<'de> for ErrorHandling {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(match raw.as_deref().map(normalize_tag).as_deref() {
            Some("default_value") => ErrorHandling::DefaultValue,
            Some("continue") => ErrorHandling::Continue,
            _ => ErrorHandling::Fail,
        })
    }
}

/// `defaultValue` / `default-value` / `DEFAULT_VALUE` -> `default_value`
pub fn normalize_tag(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 4);
    for (i, c) in raw.trim().chars().enumerate() {
        if c == '-' || c == ' ' {
            out.push('_');
        } else if c.is_ascii_uppercase() {
            if i > 0 && !out.ends_with('_') && raw.chars().any(|c| c.is_ascii_lowercase()) {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

// ================================
// Condition Node Config
// ================================

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ConditionNodeData {
    #[serde(default)]
    pub conditions: Option<Vec<Condition>>,
    #[serde(default, alias = "logic", alias = "logical_operator")]
    pub logical_operator: LogicalOperator,
    // Legacy single-clause shape
    #[serde(default)]
    pub variable: Option<String>,
    #[serde(default)]
    pub operator: Option<ComparisonOperator>,
    #[serde(default)]
    pub value: Option<Value>,
}

impl ConditionNodeData {
    /// The clause list, falling back to the legacy single-clause fields.
    pub fn clauses(&self) -> Vec<Condition> {
        match &self.conditions {
            Some(list) if !list.is_empty() => list.clone(),
            _ => match &self.operator {
                Some(op) => vec![Condition {
                    variable: self.variable.clone().unwrap_or_default(),
                    operator: op.clone(),
                    value: self.value.clone().unwrap_or(Value::Null),
                }],
                None => Vec::new(),
            },
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Condition {
    #[serde(default)]
    pub variable: String,
    pub operator: ComparisonOperator,
    #[serde(default)]
    pub value: Value,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonOperator {
    Contains,
    #[serde(alias = "not-contains")]
    NotContains,
    #[serde(alias = "equal", alias = "eq", alias = "==", alias = "is")]
    Equals,
    #[serde(alias = "not_equal", alias = "ne", alias = "!=", alias = "is_not")]
    NotEquals,
    #[serde(alias = "starts_with", alias = "startsWith")]
    StartWith,
    #[serde(alias = "ends_with", alias = "endsWith")]
    EndWith,
    #[serde(alias = "empty", alias = "isEmpty")]
    IsEmpty,
    #[serde(alias = "is_not_empty", alias = "notEmpty")]
    NotEmpty,
    #[serde(alias = "null", alias = "isNull")]
    IsNull,
    #[serde(alias = "is_not_null", alias = "notNull")]
    NotNull,
    #[serde(alias = "matches")]
    Regex,
    #[serde(alias = ">")]
    Gt,
    #[serde(alias = ">=")]
    Gte,
    #[serde(alias = "<")]
    Lt,
    #[serde(alias = "<=")]
    Lte,
    #[serde(alias = "jsExpression", alias = "expression")]
    JsExpression,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogicalOperator {
    #[default]
    And,
    Or,
}

impl<'de> Deserialize<'de> for LogicalOperator {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            None | Some("and") | Some("&&") => Ok(LogicalOperator::And),
            Some("or") | Some("||") => Ok(LogicalOperator::Or),
            Some(other) => Err(serde::de::Error::custom(format!(
                "unknown logical operator: {}",
                other
            ))),
        }
    }
}

// ================================
// Code Node Config
// ================================

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CodeNodeData {
    pub code: String,
    #[serde(default = "default_code_language")]
    pub language: CodeLanguage,
    /// Named values handed to `main` as `vars`; strings are templates.
    #[serde(default)]
    pub variables: HashMap<String, Value>,
    #[serde(default)]
    pub timeout: Option<u64>,
}

fn default_code_language() -> CodeLanguage {
    CodeLanguage::JavaScript
}

// ================================
// HTTP Request Node Config
// ================================

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct HttpRequestNodeData {
    #[serde(default)]
    pub method: HttpMethod,
    pub url: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub params: HashMap<String, String>,
    #[serde(default)]
    pub body: Option<Value>,
    #[serde(default)]
    pub body_type: HttpBodyType,
    #[serde(default, alias = "authorization")]
    pub auth: Option<HttpAuth>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    #[serde(alias = "get")]
    Get,
    #[serde(alias = "post")]
    Post,
    #[serde(alias = "put")]
    Put,
    #[serde(alias = "delete")]
    Delete,
    #[serde(alias = "patch")]
    Patch,
    #[serde(alias = "head")]
    Head,
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum HttpBodyType {
    #[default]
    Json,
    Raw,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HttpAuth {
    #[serde(alias = "none")]
    NoAuth,
    #[serde(alias = "bearer")]
    BearerToken { token: String },
    #[serde(alias = "basic")]
    BasicAuth {
        username: String,
        #[serde(default)]
        password: String,
    },
}

// ================================
// Model-backed Node Configs
// ================================

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct LlmNodeData {
    #[serde(default, alias = "userPrompt", alias = "template")]
    pub prompt: Option<String>,
    #[serde(default, alias = "system")]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    /// JSON schema the reply must satisfy.
    #[serde(default, alias = "jsonSchema", alias = "responseSchema")]
    pub output_schema: Option<Value>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AgentStrategy {
    #[default]
    #[serde(alias = "functionCalling", alias = "function-calling", alias = "tools")]
    FunctionCalling,
    #[serde(alias = "ReAct", alias = "re_act")]
    React,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct AgentNodeData {
    #[serde(default)]
    pub strategy: AgentStrategy,
    #[serde(default, alias = "userPrompt", alias = "task")]
    pub prompt: Option<String>,
    #[serde(default, alias = "system")]
    pub system_prompt: Option<String>,
    /// Tool ids to expose; anything not listed stays hidden.
    #[serde(default, alias = "enabledTools")]
    pub tools: Vec<String>,
    #[serde(default = "default_agent_iterations")]
    pub max_iterations: u32,
    #[serde(default)]
    pub memory: Option<AgentMemoryConfig>,
    #[serde(default)]
    pub model: Option<String>,
}

fn default_agent_iterations() -> u32 {
    5
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AgentMemoryConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default = "default_window_size")]
    pub window_size: usize,
}

fn default_window_size() -> usize {
    10
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct QuestionClassifierNodeData {
    pub categories: Vec<ClassifierCategory>,
    /// Text to classify; defaults to the node input.
    #[serde(default, alias = "query", alias = "question")]
    pub prompt: Option<String>,
    #[serde(default)]
    pub instruction: Option<String>,
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ClassifierCategory {
    #[serde(alias = "id")]
    pub key: String,
    #[serde(default, alias = "label")]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

// ================================
// Notification Node Config
// ================================

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum NotificationChannel {
    #[default]
    Site,
    Email,
    Both,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct NotificationNodeData {
    #[serde(default, alias = "channel")]
    pub notification_type: NotificationChannel,
    #[serde(default)]
    pub title: Option<String>,
    /// Template or reference; structured values are rendered as text/table.
    #[serde(default, alias = "message")]
    pub content: Option<String>,
    #[serde(default, alias = "to")]
    pub recipients: Vec<String>,
}

// ================================
// Data-shaping Node Configs
// ================================

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Assignment {
    #[serde(alias = "variable", alias = "key")]
    pub name: String,
    #[serde(default)]
    pub value: Value,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct VariableAssignmentNodeData {
    #[serde(default)]
    pub assignments: Vec<Assignment>,
    #[serde(default, alias = "variable", alias = "variableName")]
    pub name: Option<String>,
    #[serde(default)]
    pub value: Option<Value>,
}

impl VariableAssignmentNodeData {
    pub fn bindings(&self) -> Vec<Assignment> {
        let mut all = self.assignments.clone();
        if let Some(name) = &self.name {
            all.push(Assignment {
                name: name.clone(),
                value: self.value.clone().unwrap_or(Value::Null),
            });
        }
        all
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AggregationStrategy {
    Concat,
    Merge,
    #[default]
    Array,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct VariableAggregatorNodeData {
    /// References to combine; empty means "every live predecessor".
    #[serde(default)]
    pub variables: Vec<String>,
    #[serde(default, alias = "mode")]
    pub strategy: AggregationStrategy,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct TemplateNodeData {
    pub template: String,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct OutputNodeData {
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default, alias = "variable", alias = "source")]
    pub output_variable: Option<String>,
}

// ================================
// Container Node Configs
// ================================

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct SubGraphSpec {
    #[serde(default, alias = "sub_nodes")]
    pub sub_nodes: Option<Vec<NodeSchema>>,
    #[serde(default, alias = "sub_edges")]
    pub sub_edges: Option<Vec<EdgeSchema>>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum IterationMode {
    #[default]
    Sequential,
    Parallel,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum IterationErrorMode {
    #[default]
    Terminated,
    Continue,
    RemoveFailed,
}

impl<'de> Deserialize<'de> for IterationErrorMode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(match raw.as_deref().map(normalize_tag).as_deref() {
            Some("continue") | Some("continue_on_error") | Some("default_value") => {
                IterationErrorMode::Continue
            }
            Some("remove_failed") | Some("remove_abnormal") => IterationErrorMode::RemoveFailed,
            _ => IterationErrorMode::Terminated,
        })
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct IterationNodeData {
    #[serde(default, alias = "iteratorVariable", alias = "arrayVariable", alias = "variable")]
    pub array_variable: Option<String>,
    #[serde(default)]
    pub mode: IterationMode,
    #[serde(default)]
    pub is_parallel: bool,
    #[serde(default, alias = "parallelNums", alias = "concurrency")]
    pub parallelism: Option<usize>,
    #[serde(default)]
    pub error_handling: IterationErrorMode,
    /// Reference inside the sub-run whose value becomes the item output.
    #[serde(default)]
    pub output_variable: Option<String>,
}

impl IterationNodeData {
    pub fn parallel(&self) -> bool {
        self.is_parallel || self.mode == IterationMode::Parallel
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct LoopVariable {
    pub name: String,
    #[serde(default, alias = "initial", alias = "initialValue")]
    pub value: Value,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(untagged)]
pub enum LoopVariables {
    List(Vec<LoopVariable>),
    Map(serde_json::Map<String, Value>),
}

impl Default for LoopVariables {
    fn default() -> Self {
        LoopVariables::List(Vec::new())
    }
}

impl LoopVariables {
    pub fn entries(&self) -> Vec<(String, Value)> {
        match self {
            LoopVariables::List(list) => list.iter().map(|v| (v.name.clone(), v.value.clone())).collect(),
            LoopVariables::Map(map) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct LoopNodeData {
    #[serde(default, alias = "maxIterations")]
    pub max_loops: Option<u32>,
    #[serde(default)]
    pub variables: LoopVariables,
    /// JS expression over the loop variables and `iteration`.
    #[serde(default, alias = "breakCondition", alias = "condition")]
    pub termination_condition: Option<String>,
    /// What a failed pass does to the loop; read like the iteration policy.
    #[serde(default)]
    pub error_handling: IterationErrorMode,
}

// ================================
// Node Run Result
// ================================

/// Which outgoing edges a finished node keeps live.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum EdgeHandle {
    /// Every outgoing edge is live.
    #[default]
    Default,
    /// Only edges whose `sourceHandle` matches stay live; unhandled edges too.
    Branch(String),
}

/// What a handler returns on success.
#[derive(Debug, Clone, Default)]
pub struct NodeRunResult {
    pub output: Value,
    pub edge_source_handle: EdgeHandle,
}

impl NodeRunResult {
    pub fn output(output: Value) -> Self {
        Self {
            output,
            edge_source_handle: EdgeHandle::Default,
        }
    }

    pub fn branch(output: Value, handle: impl Into<String>) -> Self {
        Self {
            output,
            edge_source_handle: EdgeHandle::Branch(handle.into()),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Idle,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl NodeStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, NodeStatus::Completed | NodeStatus::Failed | NodeStatus::Skipped)
    }
}

/// Per-node record kept in the execution context and reported in `final`.
#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct NodeResult {
    pub node_id: String,
    #[serde(rename = "type")]
    pub node_type: String,
    pub label: String,
    pub status: NodeStatus,
    pub output: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Epoch milliseconds.
    pub start_time: i64,
    /// Milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    /// Failed but substituted by `continue` / `default_value`.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub tolerated: bool,
}
