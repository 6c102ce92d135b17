use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::error;

use crate::core::event_bus::{EventReceiver, ExecutionEvent, RunResult};

/// Handle to a launched run.
///
/// Events arrive in emission order and the stream ends after the single
/// terminal event (`final` or `error`). Dropping the event receiver does not
/// stop the run; it only mutes emission.
pub struct WorkflowHandle {
    run_id: String,
    events: Option<EventReceiver>,
    cancel: CancellationToken,
    task: JoinHandle<RunResult>,
}

impl WorkflowHandle {
    pub(crate) fn new(
        run_id: String,
        events: EventReceiver,
        cancel: CancellationToken,
        task: JoinHandle<RunResult>,
    ) -> Self {
        Self {
            run_id,
            events: Some(events),
            cancel,
            task,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Next progress event, or `None` once the stream has closed.
    pub async fn next_event(&mut self) -> Option<ExecutionEvent> {
        match self.events.as_mut() {
            Some(rx) => rx.recv().await,
            None => None,
        }
    }

    /// Take the raw receiver, e.g. to forward it to a transport.
    pub fn take_events(&mut self) -> Option<EventReceiver> {
        self.events.take()
    }

    /// Ask the run to stop at its next suspension point. The run still ends
    /// with a `final` event.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Discard pending events and wait for the aggregate result.
    pub async fn wait(mut self) -> RunResult {
        self.events.take();
        join(self.task).await
    }

    /// Drain every event, then return them with the aggregate result.
    pub async fn collect(mut self) -> (Vec<ExecutionEvent>, RunResult) {
        let mut seen = Vec::new();
        if let Some(mut rx) = self.events.take() {
            while let Some(event) = rx.recv().await {
                seen.push(event);
            }
        }
        let result = join(self.task).await;
        (seen, result)
    }
}

async fn join(task: JoinHandle<RunResult>) -> RunResult {
    match task.await {
        Ok(result) => result,
        Err(e) => {
            error!(error = %e, "run task did not complete");
            RunResult::failed(format!("Internal error: run task failed: {}", e), 0)
        }
    }
}
