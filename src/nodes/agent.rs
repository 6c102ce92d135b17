use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::core::execution_context::ExecutionContext;
use crate::core::runtime_context::RuntimeContext;
use crate::dsl::{AgentNodeData, AgentStrategy, NodeRunResult};
use crate::error::NodeError;
use crate::llm::{ChatMessage, GenerateRequest, ToolCall, ToolDefinition};
use crate::nodes::executor::NodeExecutor;
use crate::nodes::utils::{parse_config, render_or_input};
use crate::template::render_template;

/// Executor for `agent` nodes.
///
/// Only the tool ids listed in the node config are offered to the model, and
/// a call naming any other tool is refused without running it.
pub struct AgentNodeExecutor;

#[async_trait]
impl NodeExecutor for AgentNodeExecutor {
    async fn execute(
        &self,
        node_id: &str,
        config: &Value,
        input: &Value,
        ctx: &ExecutionContext,
        runtime: &RuntimeContext,
    ) -> Result<NodeRunResult, NodeError> {
        let data: AgentNodeData = parse_config("agent", config)?;
        runtime.model()?;

        let prompt = render_or_input(data.prompt.as_deref(), input, ctx);
        let system = data.system_prompt.as_deref().map(|s| render_template(s, ctx));

        let memory_key = data
            .memory
            .as_ref()
            .filter(|m| m.enabled)
            .map(|m| {
                let key = m
                    .key
                    .as_deref()
                    .map(|k| render_template(k, ctx))
                    .filter(|k| !k.trim().is_empty())
                    .unwrap_or_else(|| format!("agent:{}", node_id));
                (key, m.window_size)
            });
        let history = match &memory_key {
            Some((key, window)) => runtime
                .memory
                .load(key, *window)
                .await
                .map_err(|e| NodeError::ExecutionError(e.to_string()))?,
            None => Vec::new(),
        };

        let session = AgentSession {
            node_id,
            data: &data,
            runtime,
            system,
            history,
        };
        let run = match data.strategy {
            AgentStrategy::FunctionCalling => session.function_calling(&prompt).await?,
            AgentStrategy::React => session.react(&prompt).await?,
        };

        if let Some((key, _)) = &memory_key {
            runtime
                .memory
                .append(key, vec![ChatMessage::user(prompt.clone()), ChatMessage::assistant(run.text.clone())])
                .await
                .map_err(|e| NodeError::ExecutionError(e.to_string()))?;
        }

        Ok(NodeRunResult::output(json!({
            "text": run.text,
            "toolCalls": run.tool_calls,
            "iterations": run.iterations,
            "truncated": run.truncated,
        })))
    }
}

struct AgentRun {
    text: String,
    tool_calls: Vec<Value>,
    iterations: u32,
    truncated: bool,
}

struct AgentSession<'a> {
    node_id: &'a str,
    data: &'a AgentNodeData,
    runtime: &'a RuntimeContext,
    system: Option<String>,
    history: Vec<ChatMessage>,
}

impl AgentSession<'_> {
    fn max_iterations(&self) -> u32 {
        self.data.max_iterations.max(1)
    }

    fn request(&self, prompt: &str, messages: &[ChatMessage], system: Option<String>) -> GenerateRequest {
        let mut request = GenerateRequest::new(prompt)
            .with_system(system)
            .with_model(self.data.model.clone());
        request.messages = self.history.iter().cloned().chain(messages.iter().cloned()).collect();
        request
    }

    /// Run one requested call, refusing anything outside the allowlist.
    async fn call_tool(&self, iteration: u32, name: &str, arguments: &Value, log: &mut Vec<Value>) -> String {
        let (result, is_error) = if !self.data.tools.iter().any(|t| t == name) {
            warn!(node_id = self.node_id, tool = name, "model requested a tool that is not enabled");
            (format!("tool '{}' is not enabled for this agent", name), true)
        } else {
            match self.runtime.tools.execute(name, arguments.clone()).await {
                Ok(output) => (tool_output_text(&output), false),
                Err(e) => (e.to_string(), true),
            }
        };
        log.push(json!({
            "iteration": iteration,
            "tool": name,
            "arguments": arguments,
            "result": &result,
            "isError": is_error,
        }));
        result
    }

    /// Tool-enabled model calls. The last permitted round offers no tools so
    /// the model has to answer.
    async fn function_calling(&self, prompt: &str) -> Result<AgentRun, NodeError> {
        let model = self.runtime.model()?;
        let tools: Vec<ToolDefinition> = self.runtime.tools.definitions(&self.data.tools);
        let max_iterations = self.max_iterations();

        let mut messages: Vec<ChatMessage> = Vec::new();
        let mut log = Vec::new();
        let mut pending_prompt = prompt.to_string();
        let mut iterations = 0;

        loop {
            if self.runtime.is_cancelled() {
                return Err(NodeError::Cancelled);
            }
            iterations += 1;
            let last_round = iterations >= max_iterations;
            let mut request = self.request(&pending_prompt, &messages, self.system.clone());
            if !last_round {
                request.tools = tools.clone();
            }
            let response = model.generate(request).await?;

            if response.tool_calls.is_empty() || last_round {
                let truncated = !response.tool_calls.is_empty();
                return Ok(AgentRun {
                    text: response.text,
                    tool_calls: log,
                    iterations,
                    truncated,
                });
            }

            messages.push(ChatMessage::user(std::mem::take(&mut pending_prompt)));
            messages.push(ChatMessage::assistant(describe_calls(&response.text, &response.tool_calls)));
            let mut observations = Vec::new();
            for call in &response.tool_calls {
                let result = self.call_tool(iterations, &call.name, &call.arguments, &mut log).await;
                observations.push(format!("Result of {} ({}): {}", call.name, call.id, result));
            }
            pending_prompt = observations.join("\n");
        }
    }

    /// Thought / Action / Observation loop capped at `maxIterations` model
    /// calls.
    async fn react(&self, prompt: &str) -> Result<AgentRun, NodeError> {
        let model = self.runtime.model()?;
        let tools = self.runtime.tools.definitions(&self.data.tools);
        let system = react_system_prompt(self.system.as_deref(), &tools);
        let max_iterations = self.max_iterations();

        let mut messages = Vec::new();
        let mut log = Vec::new();
        let mut pending_prompt = prompt.to_string();
        let mut last_thought = String::new();

        for iteration in 1..=max_iterations {
            if self.runtime.is_cancelled() {
                return Err(NodeError::Cancelled);
            }
            let request = self.request(&pending_prompt, &messages, Some(system.clone()));
            let reply = model.generate(request).await?.text;

            match parse_react_step(&reply) {
                ReactStep::Final(answer) => {
                    return Ok(AgentRun {
                        text: answer,
                        tool_calls: log,
                        iterations: iteration,
                        truncated: false,
                    });
                }
                ReactStep::Action { thought, tool, input } => {
                    debug!(node_id = self.node_id, iteration, tool = %tool, "react action");
                    if !thought.is_empty() {
                        last_thought = thought;
                    }
                    let observation = self.call_tool(iteration, &tool, &input, &mut log).await;
                    messages.push(ChatMessage::user(std::mem::take(&mut pending_prompt)));
                    messages.push(ChatMessage::assistant(reply));
                    pending_prompt = format!("Observation: {}", observation);
                }
            }
        }

        warn!(node_id = self.node_id, max_iterations, "react loop hit its iteration cap");
        Ok(AgentRun {
            text: last_thought,
            tool_calls: log,
            iterations: max_iterations,
            truncated: true,
        })
    }
}

fn tool_output_text(output: &Value) -> String {
    match output {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn describe_calls(text: &str, calls: &[ToolCall]) -> String {
    let mut out = text.trim().to_string();
    for call in calls {
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(&format!("Calling {} with {}", call.name, call.arguments));
    }
    out
}

fn react_system_prompt(system: Option<&str>, tools: &[ToolDefinition]) -> String {
    let mut prompt = String::new();
    if let Some(system) = system.filter(|s| !s.trim().is_empty()) {
        prompt.push_str(system.trim());
        prompt.push_str("\n\n");
    }
    prompt.push_str("You can use the following tools:\n");
    if tools.is_empty() {
        prompt.push_str("(none)\n");
    }
    for tool in tools {
        prompt.push_str(&format!("- {}: {} Input schema: {}\n", tool.name, tool.description, tool.parameters));
    }
    prompt.push_str(
        "\nUse this format:\n\
         Thought: reason about what to do next\n\
         Action: the tool name\n\
         Action Input: the tool input as JSON\n\
         You will then receive an Observation. Repeat as needed, and finish with:\n\
         Thought: I now know the answer\n\
         Final Answer: the answer for the user",
    );
    prompt
}

#[derive(Debug, PartialEq)]
enum ReactStep {
    Final(String),
    Action { thought: String, tool: String, input: Value },
}

fn parse_react_step(reply: &str) -> ReactStep {
    if let Some(idx) = reply.find("Final Answer:") {
        return ReactStep::Final(reply[idx + "Final Answer:".len()..].trim().to_string());
    }

    let field = |label: &str| -> Option<String> {
        let start = reply.find(label)? + label.len();
        let rest = &reply[start..];
        let end = ["\nAction:", "\nAction Input:", "\nObservation:", "\nThought:"]
            .iter()
            .filter_map(|stop| rest.find(stop))
            .min()
            .unwrap_or(rest.len());
        Some(rest[..end].trim().to_string())
    };

    let Some(tool) = field("Action:").filter(|t| !t.is_empty()) else {
        // No action and no marker: the reply is the answer.
        return ReactStep::Final(reply.trim().to_string());
    };
    let input = field("Action Input:")
        .map(|raw| serde_json::from_str(&raw).unwrap_or(Value::String(raw)))
        .unwrap_or_else(|| json!({}));
    ReactStep::Action {
        thought: field("Thought:").unwrap_or_default(),
        tool: tool.trim_matches('`').to_string(),
        input,
    }
}
