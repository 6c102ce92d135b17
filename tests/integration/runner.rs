//! Data-driven end-to-end cases.
//!
//! Each directory under `tests/integration/cases/` holds:
//! - `workflow.json`: the definition (`${MOCK_SERVER}` is replaced with the
//!   mock HTTP server URL)
//! - `in.json`: the trigger payload
//! - `state.json`: engine config, fake clock/ids, scripted model replies,
//!   mock endpoints
//! - `out.json`: the expected outcome

#[macro_use]
mod macros;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use aiflow::dsl::{parse_definition, DslFormat};
use aiflow::{
    EngineConfig, ExecutionEvent, FakeIdGenerator, FakeTimeProvider, NodeStatus, ScriptedModel, WorkflowError,
    WorkflowRunner,
};

#[derive(Debug, Deserialize, Default)]
struct StateFile {
    #[serde(default)]
    config: Option<EngineConfig>,
    #[serde(default)]
    fake_time: Option<FakeTimeConfig>,
    #[serde(default)]
    fake_id: Option<FakeIdConfig>,
    /// Replies handed out in order by a scripted model.
    #[serde(default)]
    llm_responses: Option<Vec<String>>,
    #[serde(default)]
    mock_server: Option<Vec<MockEndpoint>>,
    /// Skip the case when no `python3` is on PATH.
    #[serde(default)]
    requires_python: bool,
}

#[derive(Debug, Deserialize)]
struct FakeTimeConfig {
    fixed_timestamp: i64,
}

#[derive(Debug, Deserialize)]
struct FakeIdConfig {
    prefix: String,
}

/// Defines a mock HTTP endpoint for testing HTTP request nodes.
#[derive(Debug, Deserialize)]
struct MockEndpoint {
    /// HTTP method: GET, POST, PUT, DELETE, PATCH, HEAD
    method: String,
    /// URL path, e.g. "/api/data"
    path: String,
    #[serde(default = "default_status")]
    response_status: usize,
    #[serde(default)]
    response_headers: HashMap<String, String>,
    #[serde(default)]
    response_body: String,
    /// Expected request headers (optional, for matching)
    #[serde(default)]
    match_headers: HashMap<String, String>,
    /// Expected request body substring (optional, for matching)
    #[serde(default)]
    match_body: Option<String>,
    #[serde(default)]
    expect: Option<usize>,
}

fn default_status() -> usize {
    200
}

#[derive(Debug, Deserialize)]
struct ExpectedOutput {
    /// `completed`, `failed` (final event, success false), `error` (single
    /// error event) or `invalid` (rejected before the run starts).
    status: String,
    #[serde(default)]
    output: Option<Value>,
    #[serde(default)]
    error_contains: Option<String>,
    #[serde(default)]
    node_status: HashMap<String, String>,
    /// Nodes that must not appear in the results at all.
    #[serde(default)]
    absent_nodes: Vec<String>,
    #[serde(default)]
    llm_calls: Option<usize>,
}

fn read_to_string(path: impl AsRef<Path>) -> String {
    let path = path.as_ref();
    fs::read_to_string(path).unwrap_or_else(|e| panic!("Failed to read {}: {}", path.display(), e))
}

fn read_json<T: DeserializeOwned + Default>(path: impl AsRef<Path>) -> T {
    let path = path.as_ref();
    if !path.exists() {
        return T::default();
    }
    serde_json::from_str(&read_to_string(path)).unwrap_or_else(|e| panic!("Invalid JSON in {}: {}", path.display(), e))
}

fn python_available() -> bool {
    std::process::Command::new("python3")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// A guard that keeps the mock server and its mocks alive for the test duration.
struct MockServerGuard {
    server: mockito::ServerGuard,
    mocks: Vec<mockito::Mock>,
}

async fn setup_mock_server(endpoints: &[MockEndpoint]) -> MockServerGuard {
    let mut server = mockito::Server::new_async().await;
    let mut mocks = Vec::new();
    for endpoint in endpoints {
        let mut mock = server
            .mock(endpoint.method.to_uppercase().as_str(), endpoint.path.as_str())
            .match_query(mockito::Matcher::Any)
            .with_status(endpoint.response_status)
            .with_body(&endpoint.response_body);
        for (name, value) in &endpoint.response_headers {
            mock = mock.with_header(name.as_str(), value.as_str());
        }
        for (name, value) in &endpoint.match_headers {
            mock = mock.match_header(name.as_str(), value.as_str());
        }
        if let Some(substr) = &endpoint.match_body {
            mock = mock.match_body(mockito::Matcher::Regex(regex_escape(substr)));
        }
        if let Some(n) = endpoint.expect {
            mock = mock.expect(n);
        }
        mocks.push(mock.create_async().await);
    }
    MockServerGuard { server, mocks }
}

fn regex_escape(text: &str) -> String {
    text.chars()
        .flat_map(|c| {
            let special = "\\.+*?()|[]{}^$".contains(c);
            special.then_some('\\').into_iter().chain(std::iter::once(c))
        })
        .collect()
}

pub async fn run_case(case_dir: &Path) {
    let state: StateFile = read_json(case_dir.join("state.json"));
    if state.requires_python && !python_available() {
        eprintln!("skipping {}: python3 not available", case_dir.display());
        return;
    }
    let input: Value = {
        let path = case_dir.join("in.json");
        if path.exists() {
            serde_json::from_str(&read_to_string(path)).expect("in.json")
        } else {
            Value::Null
        }
    };
    let expected: ExpectedOutput =
        serde_json::from_str(&read_to_string(case_dir.join("out.json"))).expect("out.json");

    let mock_guard = match &state.mock_server {
        Some(endpoints) => Some(setup_mock_server(endpoints).await),
        None => None,
    };
    let mut workflow_json = read_to_string(case_dir.join("workflow.json"));
    if let Some(guard) = &mock_guard {
        workflow_json = workflow_json.replace("${MOCK_SERVER}", &guard.server.url());
    }

    let definition = parse_definition(&workflow_json, DslFormat::Json)
        .unwrap_or_else(|e| panic!("Failed to parse workflow.json: {}", e));

    let mut builder = WorkflowRunner::builder(definition)
        .input(input)
        .config(state.config.unwrap_or_default());
    if let Some(fake_time) = &state.fake_time {
        builder = builder.time_provider(Arc::new(FakeTimeProvider::new(fake_time.fixed_timestamp)));
    }
    if let Some(fake_id) = &state.fake_id {
        builder = builder.id_generator(Arc::new(FakeIdGenerator::new(fake_id.prefix.clone())));
    }
    let model = state.llm_responses.as_ref().map(|replies| Arc::new(ScriptedModel::new(replies.clone())));
    if let Some(model) = &model {
        builder = builder.model(model.clone());
    }

    let handle = match builder.run().await {
        Ok(handle) => handle,
        Err(err) => {
            assert_eq!(
                expected.status,
                "invalid",
                "Workflow failed to start: {} ({})",
                err,
                case_dir.display()
            );
            let text = match &err {
                WorkflowError::ValidationFailed(report) => serde_json::to_string(report).unwrap(),
                other => other.to_string(),
            };
            if let Some(substr) = &expected.error_contains {
                assert!(text.contains(substr), "Error did not contain '{}': {}", substr, text);
            }
            return;
        }
    };
    assert_ne!(expected.status, "invalid", "Run should have been rejected: {}", case_dir.display());

    let (events, result) = handle.collect().await;
    let terminal: Vec<&ExecutionEvent> = events.iter().filter(|e| e.is_terminal()).collect();
    assert_eq!(terminal.len(), 1, "exactly one terminal event for {}", case_dir.display());
    assert!(events.last().map(|e| e.is_terminal()).unwrap_or(false), "terminal event comes last");

    match expected.status.as_str() {
        "completed" => {
            assert!(
                result.success,
                "Expected completed but got error {:?} for case: {}",
                result.error,
                case_dir.display()
            );
            assert!(matches!(terminal[0], ExecutionEvent::Final { .. }));
        }
        "failed" => {
            assert!(!result.success, "Expected failure for case: {}", case_dir.display());
            assert!(matches!(terminal[0], ExecutionEvent::Final { .. }));
        }
        "error" => {
            assert!(!result.success);
            assert!(matches!(terminal[0], ExecutionEvent::Error { .. }));
        }
        other => panic!("Unknown expected status: {}", other),
    }

    if let Some(substr) = &expected.error_contains {
        let err = result.error.clone().unwrap_or_default();
        assert!(err.contains(substr), "Error did not contain '{}': {}", substr, err);
    }
    if let Some(output) = &expected.output {
        assert_eq!(&result.final_output, output, "Output mismatch for case: {}", case_dir.display());
    }
    for (node_id, status) in &expected.node_status {
        let actual = result
            .node_results
            .iter()
            .find(|r| &r.node_id == node_id)
            .unwrap_or_else(|| panic!("no result for node {} in {}", node_id, case_dir.display()));
        let expected_status: NodeStatus = serde_json::from_value(Value::String(status.clone())).unwrap();
        assert_eq!(actual.status, expected_status, "status of node {}", node_id);
    }
    for node_id in &expected.absent_nodes {
        assert!(
            result.node_results.iter().all(|r| &r.node_id != node_id),
            "node {} should never have run",
            node_id
        );
    }
    if let (Some(calls), Some(model)) = (expected.llm_calls, &model) {
        assert_eq!(model.call_count(), calls, "model calls for {}", case_dir.display());
    }
    if let Some(guard) = &mock_guard {
        for mock in &guard.mocks {
            mock.assert_async().await;
        }
    }
}

integration_test_cases!("tests/integration/cases",
    case_001_linear_template => "001_linear_template",
    case_002_condition_prunes_branch => "002_condition_prunes_branch",
    case_003_unreachable_never_runs => "003_unreachable_never_runs",
    case_004_js_code_main => "004_js_code_main",
    case_005_js_code_timeout => "005_js_code_timeout",
    case_006_python_echo => "006_python_echo",
    case_007_python_exception => "007_python_exception",
    case_008_iteration_continue => "008_iteration_continue",
    case_009_loop_max_loops => "009_loop_max_loops",
    case_010_loop_termination => "010_loop_termination",
    case_011_loop_exit_node => "011_loop_exit_node",
    case_012_classifier_fuzzy => "012_classifier_fuzzy",
    case_013_http_request => "013_http_request",
    case_014_http_non_2xx => "014_http_non_2xx",
    case_015_default_value_policy => "015_default_value_policy",
    case_016_aggregator_concat => "016_aggregator_concat",
    case_017_duplicate_ids => "017_duplicate_ids",
    case_018_max_steps => "018_max_steps",
    case_019_cron_trigger_stamp => "019_cron_trigger_stamp",
    case_020_wrapper_dive => "020_wrapper_dive",
    case_021_llm_structured => "021_llm_structured",
    case_022_notification => "022_notification",
    case_023_retry_then_continue => "023_retry_then_continue",
    case_024_iteration_parallel_remove_failed => "024_iteration_parallel_remove_failed",
    case_025_http_4xx_retried => "025_http_4xx_retried",
);
