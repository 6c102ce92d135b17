//! Progress events, serialized one per line (NDJSON) by the transport.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::dsl::{NodeResult, NodeStatus};

/// Aggregate result of one run, carried by the `final` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    pub success: bool,
    pub final_output: Value,
    pub node_results: Vec<NodeResult>,
    /// Milliseconds.
    pub total_duration: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunResult {
    /// A run that ended before producing any node results.
    pub fn failed(error: impl Into<String>, total_duration: u64) -> Self {
        RunResult {
            success: false,
            final_output: Value::Null,
            node_results: Vec::new(),
            total_duration,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ExecutionEvent {
    #[serde(rename_all = "camelCase")]
    Update {
        node_id: String,
        status: NodeStatus,
        output: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Final { result: RunResult },
    Error { error: String },
}

impl ExecutionEvent {
    pub fn running(node_id: &str) -> Self {
        ExecutionEvent::Update {
            node_id: node_id.to_string(),
            status: NodeStatus::Running,
            output: Value::Null,
            error: None,
        }
    }

    pub fn from_result(result: &NodeResult) -> Self {
        ExecutionEvent::Update {
            node_id: result.node_id.clone(),
            status: result.status,
            output: result.output.clone(),
            error: result.error.clone(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionEvent::Final { .. } | ExecutionEvent::Error { .. })
    }

    /// One NDJSON line, without the trailing newline.
    pub fn to_ndjson(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            serde_json::json!({ "type": "error", "error": format!("event serialization failed: {}", e) })
                .to_string()
        })
    }
}

pub type EventSender = mpsc::Sender<ExecutionEvent>;
pub type EventReceiver = mpsc::Receiver<ExecutionEvent>;

pub fn create_event_channel(buffer: usize) -> (EventSender, EventReceiver) {
    mpsc::channel(buffer.max(1))
}

/// Sender wrapper with an active flag, so nested runs and tests can mute
/// emission without a receiver.
#[derive(Clone)]
pub struct EventEmitter {
    tx: Option<EventSender>,
    active: Arc<AtomicBool>,
}

impl EventEmitter {
    pub fn new(tx: EventSender) -> Self {
        Self {
            tx: Some(tx),
            active: Arc::new(AtomicBool::new(true)),
        }
    }

    /// An emitter that drops everything.
    pub fn silent() -> Self {
        Self {
            tx: None,
            active: Arc::new(AtomicBool::new(false)),
        }
    }

    #[inline(always)]
    pub fn is_active(&self) -> bool {
        self.tx.is_some() && self.active.load(Ordering::Relaxed)
    }

    pub fn deactivate(&self) {
        self.active.store(false, Ordering::Relaxed);
    }

    pub async fn emit(&self, event: ExecutionEvent) {
        if !self.is_active() {
            return;
        }
        if let Some(tx) = &self.tx {
            if tx.send(event).await.is_err() {
                // Receiver gone; stop trying.
                self.deactivate();
            }
        }
    }
}
