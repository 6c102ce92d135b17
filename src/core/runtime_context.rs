use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use aiflow_sandbox_js::ExpressionEvaluator;
use tokio_util::sync::CancellationToken;

use crate::core::dispatcher::EngineConfig;
use crate::core::sub_graph_runner::{DefaultSubGraphRunner, SubGraphRunner};
use crate::error::NodeError;
use crate::graph::Graph;
use crate::llm::{LanguageModel, LlmError};
use crate::memory::{ConversationMemory, InMemoryConversationMemory};
use crate::nodes::executor::NodeExecutorRegistry;
use crate::sandbox::SandboxManager;
use crate::tools::{NotificationSender, ToolRegistry, TracingNotificationSender};

/// Collaborators and limits shared by every node of a run, including nested
/// sub-runs. Everything is reference-counted, so clones are cheap.
#[derive(Clone)]
pub struct RuntimeContext {
    pub time_provider: Arc<dyn TimeProvider>,
    pub id_generator: Arc<dyn IdGenerator>,
    pub config: Arc<EngineConfig>,
    pub registry: Arc<NodeExecutorRegistry>,
    pub sub_graph_runner: Arc<dyn SubGraphRunner>,
    pub model: Option<Arc<dyn LanguageModel>>,
    pub tools: Arc<ToolRegistry>,
    pub site_sender: Arc<dyn NotificationSender>,
    pub email_sender: Arc<dyn NotificationSender>,
    pub memory: Arc<dyn ConversationMemory>,
    pub sandbox: Arc<SandboxManager>,
    pub expression: ExpressionEvaluator,
    pub http: reqwest::Client,
    pub cancel: CancellationToken,
    /// Graph scope currently being dispatched; set by the dispatcher.
    pub scope: Option<Arc<Graph>>,
}

impl Default for RuntimeContext {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl RuntimeContext {
    /// Built-in executors, both sandboxes, log-only notification senders and
    /// no model.
    pub fn new(config: EngineConfig) -> Self {
        let site_sender: Arc<dyn NotificationSender> = Arc::new(TracingNotificationSender::new("site"));
        let email_sender: Arc<dyn NotificationSender> = Arc::new(TracingNotificationSender::new("email"));
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            time_provider: Arc::new(RealTimeProvider),
            id_generator: Arc::new(RealIdGenerator),
            registry: Arc::new(NodeExecutorRegistry::new()),
            sub_graph_runner: Arc::new(DefaultSubGraphRunner),
            model: None,
            tools: Arc::new(ToolRegistry::with_notification_senders(
                site_sender.clone(),
                email_sender.clone(),
            )),
            site_sender,
            email_sender,
            memory: Arc::new(InMemoryConversationMemory::default()),
            sandbox: Arc::new(SandboxManager::new(config.sandbox_config())),
            expression: ExpressionEvaluator::new(Duration::from_millis(config.js_timeout_ms)),
            http,
            cancel: CancellationToken::new(),
            scope: None,
            config: Arc::new(config),
        }
    }

    pub fn with_model(mut self, model: Arc<dyn LanguageModel>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = Arc::new(tools);
        self
    }

    /// Replaces both channels and re-binds the notification tools to them.
    /// Call before [`with_tools`](Self::with_tools) if both are customised.
    pub fn with_notification_senders(
        mut self,
        site: Arc<dyn NotificationSender>,
        email: Arc<dyn NotificationSender>,
    ) -> Self {
        self.tools = Arc::new(ToolRegistry::with_notification_senders(site.clone(), email.clone()));
        self.site_sender = site;
        self.email_sender = email;
        self
    }

    pub fn with_memory(mut self, memory: Arc<dyn ConversationMemory>) -> Self {
        self.memory = memory;
        self
    }

    pub fn with_registry(mut self, registry: NodeExecutorRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    pub fn with_sub_graph_runner(mut self, runner: Arc<dyn SubGraphRunner>) -> Self {
        self.sub_graph_runner = runner;
        self
    }

    pub fn with_time_provider(mut self, provider: Arc<dyn TimeProvider>) -> Self {
        self.time_provider = provider;
        self
    }

    pub fn with_id_generator(mut self, generator: Arc<dyn IdGenerator>) -> Self {
        self.id_generator = generator;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn model(&self) -> Result<&Arc<dyn LanguageModel>, NodeError> {
        self.model.as_ref().ok_or_else(|| LlmError::NotConfigured.into())
    }

    /// Private sub-graph owned by container node `owner_id` in the current
    /// scope.
    pub fn sub_graph(&self, owner_id: &str) -> Result<Arc<Graph>, NodeError> {
        self.scope
            .as_ref()
            .and_then(|g| g.sub_graph(owner_id))
            .ok_or_else(|| NodeError::ConfigError(format!("node {} has no sub-graph", owner_id)))
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

pub trait TimeProvider: Send + Sync {
    fn now_timestamp(&self) -> i64;
    fn now_millis(&self) -> i64;
    fn elapsed_secs(&self, since: i64) -> u64;
}

pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> String;
}

// --- Real implementations ---

pub struct RealTimeProvider;

impl TimeProvider for RealTimeProvider {
    fn now_timestamp(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64
    }

    fn now_millis(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as i64
    }

    fn elapsed_secs(&self, since: i64) -> u64 {
        let now = self.now_timestamp();
        if now >= since {
            (now - since) as u64
        } else {
            0
        }
    }
}

pub struct RealIdGenerator;

impl IdGenerator for RealIdGenerator {
    fn next_id(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

// --- Fake implementations ---

pub struct FakeTimeProvider {
    pub fixed_timestamp: i64,
}

impl FakeTimeProvider {
    pub fn new(fixed_timestamp: i64) -> Self {
        Self { fixed_timestamp }
    }
}

impl TimeProvider for FakeTimeProvider {
    fn now_timestamp(&self) -> i64 {
        self.fixed_timestamp
    }

    fn now_millis(&self) -> i64 {
        self.fixed_timestamp.saturating_mul(1000)
    }

    fn elapsed_secs(&self, since: i64) -> u64 {
        if self.fixed_timestamp >= since {
            (self.fixed_timestamp - since) as u64
        } else {
            0
        }
    }
}

pub struct FakeIdGenerator {
    pub prefix: String,
    pub counter: AtomicU64,
}

impl FakeIdGenerator {
    pub fn new(prefix: String) -> Self {
        Self {
            prefix,
            counter: AtomicU64::new(0),
        }
    }
}

impl IdGenerator for FakeIdGenerator {
    fn next_id(&self) -> String {
        let id = self.counter.fetch_add(1, Ordering::SeqCst);
        format!("{}-{}", self.prefix, id)
    }
}
