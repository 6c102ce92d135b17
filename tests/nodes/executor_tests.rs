//! Executor behaviour through the public runner, with collaborators injected
//! the way an embedding application would.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use aiflow::dsl::{NodeRunResult, NodeStatus};
use aiflow::llm::{GenerateResponse, ToolCall};
use aiflow::tools::{LogEntry, LogRetrievalTool, RecordingNotificationSender};
use aiflow::{
    parse_definition, DslFormat, ExecutionContext, FakeTimeProvider, InMemoryConversationMemory, NodeError,
    NodeExecutor, RunResult, RuntimeContext, ScriptedModel, ToolRegistry, WorkflowRunner, WorkflowRunnerBuilder,
};

fn builder(workflow: Value) -> WorkflowRunnerBuilder {
    let def = parse_definition(&workflow.to_string(), DslFormat::Json).unwrap();
    WorkflowRunner::builder(def)
}

/// `start -> <node> -> out`, where `out` emits `output_variable`.
fn single_node(node: Value, output_variable: &str) -> Value {
    let id = node["id"].as_str().unwrap().to_string();
    json!({
        "nodes": [
            {"id": "start", "type": "start"},
            node,
            {"id": "out", "type": "output", "data": {"outputVariable": output_variable}}
        ],
        "edges": [
            {"id": "e1", "source": "start", "target": id},
            {"id": "e2", "source": id, "target": "out"}
        ]
    })
}

fn status_of(result: &RunResult, node_id: &str) -> NodeStatus {
    result
        .node_results
        .iter()
        .find(|r| r.node_id == node_id)
        .map(|r| r.status)
        .unwrap_or_else(|| panic!("no result for {}", node_id))
}

fn log_tool() -> LogRetrievalTool {
    LogRetrievalTool::new(vec![
        LogEntry {
            timestamp: "2024-05-01T10:00:00Z".into(),
            level: "info".into(),
            message: "service started".into(),
        },
        LogEntry {
            timestamp: "2024-05-01T10:05:00Z".into(),
            level: "error".into(),
            message: "database connection refused".into(),
        },
    ])
}

fn tool_call(name: &str, arguments: Value) -> GenerateResponse {
    GenerateResponse {
        text: String::new(),
        tool_calls: vec![ToolCall {
            id: "call-1".into(),
            name: name.into(),
            arguments,
        }],
        usage: None,
    }
}

#[tokio::test]
async fn test_agent_calls_enabled_tool_then_answers() {
    let model = Arc::new(ScriptedModel::with_responses([
        Ok(tool_call("log_retrieval", json!({"level": "error"}))),
        Ok(GenerateResponse::text("The database refused connections.")),
    ]));
    let mut tools = ToolRegistry::new();
    tools.register(Arc::new(log_tool()));

    let workflow = single_node(
        json!({
            "id": "triage",
            "type": "agent",
            "data": {"prompt": "Why did {{input.service}} fail?", "tools": ["log_retrieval"]}
        }),
        "triage",
    );
    let result = builder(workflow)
        .input(json!({"service": "billing"}))
        .model(model.clone())
        .tools(tools)
        .execute()
        .await
        .unwrap();

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.final_output["text"], "The database refused connections.");
    assert_eq!(result.final_output["iterations"], 2);
    let calls = result.final_output["toolCalls"].as_array().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0]["tool"], "log_retrieval");
    assert_eq!(calls[0]["isError"], false);
    assert!(calls[0]["result"].as_str().unwrap().contains("database connection refused"));

    let requests = model.requests();
    assert_eq!(requests[0].prompt, "Why did billing fail?");
    assert_eq!(requests[0].tools.len(), 1);
    assert!(requests[1].prompt.contains("database connection refused"));
}

#[tokio::test]
async fn test_agent_rejects_tool_not_enabled_on_node() {
    let model = Arc::new(ScriptedModel::with_responses([
        Ok(tool_call("log_retrieval", json!({}))),
        Ok(GenerateResponse::text("done")),
    ]));
    let mut tools = ToolRegistry::new();
    tools.register(Arc::new(log_tool()));

    let workflow = single_node(json!({"id": "a", "type": "agent", "data": {"prompt": "hi"}}), "a");
    let result = builder(workflow).model(model).tools(tools).execute().await.unwrap();

    assert!(result.success);
    let calls = result.final_output["toolCalls"].as_array().unwrap();
    assert_eq!(calls[0]["isError"], true);
    assert!(calls[0]["result"].as_str().unwrap().contains("not enabled"));
}

#[tokio::test]
async fn test_agent_memory_carries_across_runs() {
    let memory = Arc::new(InMemoryConversationMemory::new());
    let model = Arc::new(ScriptedModel::new(["Nice to meet you, Ada.", "Your name is Ada."]));
    let workflow = single_node(
        json!({
            "id": "chat",
            "type": "agent",
            "data": {"prompt": "{{input}}", "memory": {"enabled": true, "key": "user-42"}}
        }),
        "chat.text",
    );

    for text in ["I am Ada", "What is my name?"] {
        let result = builder(workflow.clone())
            .input(json!(text))
            .model(model.clone())
            .memory(memory.clone())
            .execute()
            .await
            .unwrap();
        assert!(result.success, "{:?}", result.error);
    }

    let requests = model.requests();
    assert!(requests[0].messages.is_empty());
    let history: Vec<&str> = requests[1].messages.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(history, vec!["I am Ada", "Nice to meet you, Ada."]);
}

#[tokio::test]
async fn test_agent_without_model_fails_node() {
    let workflow = single_node(json!({"id": "a", "type": "agent", "data": {"prompt": "hi"}}), "a");
    let result = builder(workflow).execute().await.unwrap();
    assert!(!result.success);
    assert_eq!(status_of(&result, "a"), NodeStatus::Failed);
}

#[tokio::test]
async fn test_notification_renders_rows_as_table_on_both_channels() {
    let site = Arc::new(RecordingNotificationSender::default());
    let email = Arc::new(RecordingNotificationSender::default());
    let workflow = single_node(
        json!({
            "id": "notify",
            "type": "notification",
            "data": {
                "notificationType": "both",
                "title": "Stock report",
                "content": "{{input.rows}}",
                "recipients": ["ops@example.com"]
            }
        }),
        "notify.channels",
    );

    let result = builder(workflow)
        .input(json!({"rows": [{"sku": "A1", "qty": 3}, {"sku": "B2", "qty": 0}]}))
        .notification_senders(site.clone(), email.clone())
        .execute()
        .await
        .unwrap();

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.final_output, json!(["site", "email"]));
    let sent = site.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].title, "Stock report");
    assert_eq!(sent[0].recipients, vec!["ops@example.com".to_string()]);
    assert!(sent[0].content.starts_with("| sku | qty |"));
    assert!(sent[0].content.contains("| B2 | 0 |"));
    assert_eq!(email.sent(), sent);
}

#[tokio::test]
async fn test_notification_delivery_failure_fails_node() {
    let site = Arc::new(RecordingNotificationSender::failing("inbox offline"));
    let email = Arc::new(RecordingNotificationSender::default());
    let workflow = single_node(
        json!({"id": "notify", "type": "notification", "data": {"notificationType": "site", "content": "x"}}),
        "notify",
    );

    let result = builder(workflow)
        .notification_senders(site, email.clone())
        .execute()
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(status_of(&result, "notify"), NodeStatus::Failed);
    assert!(result.error.unwrap_or_default().contains("inbox offline"));
    assert!(email.sent().is_empty());
}

#[tokio::test]
async fn test_classifier_retries_then_falls_back_to_first_category() {
    let model = Arc::new(ScriptedModel::new(["no idea", "still unsure", "really cannot say"]));
    let workflow = json!({
        "nodes": [
            {"id": "start", "type": "start"},
            {"id": "route", "type": "question_classifier", "data": {
                "prompt": "{{input}}",
                "maxRetries": 2,
                "categories": [{"key": "sales", "name": "Sales"}, {"key": "support", "name": "Support"}]
            }},
            {"id": "sales", "type": "template", "data": {"template": "sales desk"}},
            {"id": "support", "type": "template", "data": {"template": "support desk"}}
        ],
        "edges": [
            {"id": "e1", "source": "start", "target": "route"},
            {"id": "e2", "source": "route", "target": "sales", "sourceHandle": "sales"},
            {"id": "e3", "source": "route", "target": "support", "sourceHandle": "support"}
        ]
    });

    let result = builder(workflow)
        .input(json!("hmm"))
        .model(model.clone())
        .execute()
        .await
        .unwrap();

    assert!(result.success, "{:?}", result.error);
    assert_eq!(model.call_count(), 3);
    assert_eq!(status_of(&result, "sales"), NodeStatus::Completed);
    assert_eq!(status_of(&result, "support"), NodeStatus::Skipped);
    assert_eq!(result.final_output, json!("sales desk"));
}

#[tokio::test]
async fn test_http_basic_auth_and_json_body() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/tickets")
        .match_header("authorization", "Basic YWxpY2U6d29uZGVy")
        .match_body(mockito::Matcher::PartialJson(json!({"title": "Disk full"})))
        .with_status(201)
        .with_header("content-type", "application/json")
        .with_body(r#"{"id": 7}"#)
        .create_async()
        .await;

    let workflow = single_node(
        json!({
            "id": "create",
            "type": "http_request",
            "data": {
                "method": "POST",
                "url": format!("{}/tickets", server.url()),
                "bodyType": "json",
                "body": {"title": "{{input.title}}"},
                "auth": {"type": "basic", "username": "alice", "password": "wonder"}
            }
        }),
        "create",
    );

    let result = builder(workflow)
        .input(json!({"title": "Disk full"}))
        .execute()
        .await
        .unwrap();

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.final_output["status"], 201);
    assert_eq!(result.final_output["body"], json!({"id": 7}));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_cron_trigger_uses_injected_clock() {
    let workflow = single_node(json!({"id": "tick", "type": "cron_trigger"}), "tick");
    let result = builder(workflow)
        .time_provider(Arc::new(FakeTimeProvider::new(1_700_000_000)))
        .execute()
        .await
        .unwrap();

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.final_output["triggeredAt"], "2023-11-14T22:13:20.000Z");
}

#[tokio::test]
async fn test_assignment_feeds_template() {
    let workflow = json!({
        "nodes": [
            {"id": "start", "type": "start"},
            {"id": "vars", "type": "variable_assignment", "data": {
                "assignments": [
                    {"variable": "who", "value": "{{input.user.name}}"},
                    {"variable": "count", "value": 3}
                ]
            }},
            {"id": "msg", "type": "template", "data": {"template": "{{vars.who}} has {{vars.count}} tasks"}},
            {"id": "out", "type": "output"}
        ],
        "edges": [
            {"id": "e1", "source": "start", "target": "vars"},
            {"id": "e2", "source": "vars", "target": "msg"},
            {"id": "e3", "source": "msg", "target": "out"}
        ]
    });

    let result = builder(workflow)
        .input(json!({"user": {"name": "Grace"}}))
        .execute()
        .await
        .unwrap();

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.final_output, json!("Grace has 3 tasks"));
}

struct ShoutExecutor;

#[async_trait]
impl NodeExecutor for ShoutExecutor {
    async fn execute(
        &self,
        _node_id: &str,
        _config: &Value,
        input: &Value,
        _ctx: &ExecutionContext,
        _runtime: &RuntimeContext,
    ) -> Result<NodeRunResult, NodeError> {
        let text = input.as_str().ok_or_else(|| NodeError::InputValidationError("expected text".into()))?;
        Ok(NodeRunResult::output(json!(text.to_uppercase())))
    }
}

#[tokio::test]
async fn test_registered_executor_overrides_builtin() {
    let workflow = single_node(json!({"id": "p", "type": "process"}), "p");
    let result = builder(workflow)
        .input(json!("quiet please"))
        .executor("process", Box::new(ShoutExecutor))
        .execute()
        .await
        .unwrap();

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.final_output, json!("QUIET PLEASE"));
}
