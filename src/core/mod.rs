pub mod dispatcher;
pub mod event_bus;
pub mod execution_context;
pub mod retry;
pub mod runtime_context;
pub mod sub_graph_runner;

pub use dispatcher::{DispatchOutcome, EngineConfig, WorkflowDispatcher};
pub use event_bus::{
    create_event_channel, EventEmitter, EventReceiver, EventSender, ExecutionEvent, RunResult,
};
pub use execution_context::ExecutionContext;
pub use retry::{execute_with_policy, NodeOutcome};
pub use runtime_context::{
    FakeIdGenerator, FakeTimeProvider, IdGenerator, RealIdGenerator, RealTimeProvider, RuntimeContext, TimeProvider,
};
pub use sub_graph_runner::{DefaultSubGraphRunner, SubGraphOutcome, SubGraphRunner};
