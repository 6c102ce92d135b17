//! Retry, per-attempt timeout and failure policy around one handler call.

use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use crate::core::execution_context::ExecutionContext;
use crate::core::runtime_context::RuntimeContext;
use crate::dsl::{ErrorHandling, NodePolicy, NodeRunResult};
use crate::error::NodeError;
use crate::graph::GraphNode;
use crate::nodes::executor::NodeExecutor;

/// How a wrapped invocation ended.
#[derive(Debug)]
pub enum NodeOutcome {
    Completed(NodeRunResult),
    /// Failed, but the node's policy substituted `output` and the run goes on.
    Tolerated { output: Value, error: NodeError },
    Failed(NodeError),
}

/// Run `executor` for `node` under the node's retry / timeout / error policy.
///
/// Every failure is retried up to `retryCount` times unless the node opts into
/// `retryOnRetryableOnly`. Cancellation is never retried and never substituted.
pub async fn execute_with_policy(
    executor: &dyn NodeExecutor,
    node: &GraphNode,
    input: &Value,
    ctx: &ExecutionContext,
    runtime: &RuntimeContext,
) -> NodeOutcome {
    let policy = NodePolicy::from_config(&node.config);
    let timeout_ms = policy.timeout.or(runtime.config.default_node_timeout_ms);

    let mut last_error = None;
    for attempt in 0..=policy.retry_count {
        let result = tokio::select! {
            biased;
            _ = runtime.cancel.cancelled() => Err(NodeError::Cancelled),
            r = run_attempt(executor, node, input, ctx, runtime, timeout_ms) => r,
        };

        let err = match result {
            Ok(r) => return NodeOutcome::Completed(r),
            Err(e) => e,
        };
        if err.is_cancelled() {
            return NodeOutcome::Failed(err);
        }

        let should_retry =
            attempt < policy.retry_count && (!policy.retry_on_retryable_only || err.is_retryable());
        if !should_retry {
            last_error = Some(err);
            break;
        }

        warn!(
            node_id = %node.id,
            node_type = %node.node_type,
            attempt = attempt + 1,
            error = %err,
            "node attempt failed, retrying"
        );
        if let Some(interval) = policy.retry_interval.filter(|ms| *ms > 0) {
            tokio::select! {
                _ = runtime.cancel.cancelled() => return NodeOutcome::Failed(NodeError::Cancelled),
                _ = tokio::time::sleep(Duration::from_millis(interval)) => {}
            }
        }
        last_error = Some(err);
    }

    let err = last_error.unwrap_or_else(|| NodeError::ExecutionError("node produced no result".into()));
    match policy.error_handling {
        ErrorHandling::Fail => NodeOutcome::Failed(err),
        ErrorHandling::DefaultValue => {
            debug!(node_id = %node.id, error = %err, "substituting default value");
            NodeOutcome::Tolerated {
                output: policy.default_value.unwrap_or(Value::Null),
                error: err,
            }
        }
        ErrorHandling::Continue => {
            debug!(node_id = %node.id, error = %err, "continuing past failed node");
            NodeOutcome::Tolerated {
                output: Value::Null,
                error: err,
            }
        }
    }
}

async fn run_attempt(
    executor: &dyn NodeExecutor,
    node: &GraphNode,
    input: &Value,
    ctx: &ExecutionContext,
    runtime: &RuntimeContext,
    timeout_ms: Option<u64>,
) -> Result<NodeRunResult, NodeError> {
    let fut = executor.execute(&node.id, &node.config, input, ctx, runtime);
    match timeout_ms {
        Some(ms) => match tokio::time::timeout(Duration::from_millis(ms), fut).await {
            Ok(r) => r,
            Err(_) => {
                warn!(node_id = %node.id, timeout_ms = ms, "node attempt timed out");
                Err(NodeError::Timeout(ms))
            }
        },
        None => fut.await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Flaky {
        fail_times: u32,
        calls: AtomicU32,
        error: fn() -> NodeError,
    }

    impl Flaky {
        fn new(fail_times: u32, error: fn() -> NodeError) -> Self {
            Self {
                fail_times,
                calls: AtomicU32::new(0),
                error,
            }
        }
    }

    #[async_trait]
    impl NodeExecutor for Flaky {
        async fn execute(
            &self,
            _node_id: &str,
            _config: &Value,
            _input: &Value,
            _ctx: &ExecutionContext,
            _runtime: &RuntimeContext,
        ) -> Result<NodeRunResult, NodeError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_times {
                Err((self.error)())
            } else {
                Ok(NodeRunResult::output(json!({"attempt": n})))
            }
        }
    }

    struct Sleeper;

    #[async_trait]
    impl NodeExecutor for Sleeper {
        async fn execute(
            &self,
            _node_id: &str,
            _config: &Value,
            _input: &Value,
            _ctx: &ExecutionContext,
            _runtime: &RuntimeContext,
        ) -> Result<NodeRunResult, NodeError> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(NodeRunResult::output(Value::Null))
        }
    }

    fn node(config: Value) -> GraphNode {
        GraphNode {
            id: "n".into(),
            node_type: "code".into(),
            kind: None,
            label: "n".into(),
            config,
        }
    }

    fn transient() -> NodeError {
        NodeError::ExecutionError("transient".into())
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let exec = Flaky::new(2, transient);
        let runtime = RuntimeContext::default();
        let ctx = ExecutionContext::new(Value::Null);
        let outcome = execute_with_policy(&exec, &node(json!({"retryCount": 2})), &Value::Null, &ctx, &runtime).await;
        match outcome {
            NodeOutcome::Completed(r) => assert_eq!(r.output, json!({"attempt": 2})),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(exec.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_apply_policy() {
        let runtime = RuntimeContext::default();
        let ctx = ExecutionContext::new(Value::Null);

        let exec = Flaky::new(5, transient);
        let outcome = execute_with_policy(&exec, &node(json!({"retryCount": 1})), &Value::Null, &ctx, &runtime).await;
        assert!(matches!(outcome, NodeOutcome::Failed(NodeError::ExecutionError(_))));
        assert_eq!(exec.calls.load(Ordering::SeqCst), 2);

        let exec = Flaky::new(5, transient);
        let config = json!({"errorHandling": "default_value", "defaultValue": {"ok": false}});
        match execute_with_policy(&exec, &node(config), &Value::Null, &ctx, &runtime).await {
            NodeOutcome::Tolerated { output, .. } => assert_eq!(output, json!({"ok": false})),
            other => panic!("unexpected {:?}", other),
        }

        let exec = Flaky::new(5, transient);
        match execute_with_policy(&exec, &node(json!({"errorHandling": "continue"})), &Value::Null, &ctx, &runtime).await {
            NodeOutcome::Tolerated { output, .. } => assert_eq!(output, Value::Null),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_every_error_is_retried_by_default() {
        let exec = Flaky::new(5, || NodeError::ConfigError("bad".into()));
        let runtime = RuntimeContext::default();
        let ctx = ExecutionContext::new(Value::Null);
        let outcome = execute_with_policy(&exec, &node(json!({"retryCount": 3})), &Value::Null, &ctx, &runtime).await;
        assert!(matches!(outcome, NodeOutcome::Failed(NodeError::ConfigError(_))));
        assert_eq!(exec.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_retryable_only_skips_permanent_errors() {
        let runtime = RuntimeContext::default();
        let ctx = ExecutionContext::new(Value::Null);
        let config = json!({"retryCount": 3, "retryOnRetryableOnly": true});

        let exec = Flaky::new(5, || NodeError::ConfigError("bad".into()));
        let outcome = execute_with_policy(&exec, &node(config.clone()), &Value::Null, &ctx, &runtime).await;
        assert!(matches!(outcome, NodeOutcome::Failed(NodeError::ConfigError(_))));
        assert_eq!(exec.calls.load(Ordering::SeqCst), 1);

        let exec = Flaky::new(2, transient);
        let outcome = execute_with_policy(&exec, &node(config), &Value::Null, &ctx, &runtime).await;
        assert!(matches!(outcome, NodeOutcome::Completed(_)));
        assert_eq!(exec.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_timeout_and_cancellation() {
        let runtime = RuntimeContext::default();
        let ctx = ExecutionContext::new(Value::Null);
        let outcome = execute_with_policy(&Sleeper, &node(json!({"timeout": 50})), &Value::Null, &ctx, &runtime).await;
        assert!(matches!(outcome, NodeOutcome::Failed(NodeError::Timeout(50))));

        runtime.cancel.cancel();
        let config = json!({"errorHandling": "continue", "retryCount": 3});
        let outcome = execute_with_policy(&Sleeper, &node(config), &Value::Null, &ctx, &runtime).await;
        assert!(matches!(outcome, NodeOutcome::Failed(NodeError::Cancelled)));
    }
}
