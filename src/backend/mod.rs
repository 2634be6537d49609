//! Contracts for the services that actually talk to a model.
//!
//! A [`ModelBackend`] runs one conversation turn and yields [`BackendEvent`]s. A
//! [`SelectionModel`] answers the cheap "which tool servers does this message need" question.

pub mod claude_cli;
pub mod protocol;
pub mod router;

use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures_util::stream::BoxStream;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use crate::core::config::data::AgentConfig;
use crate::core::message::ToolUse;
use crate::mcp::permissions::PermissionDecision;
use crate::mcp::registry::{ToolServerEntry, ToolServerStatus};

pub use claude_cli::ClaudeCliBackend;
pub use router::AnthropicRouter;

/// Final message of a turn.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnResult {
    pub subtype: String,
    pub is_error: bool,
    pub duration_ms: u64,
    pub total_cost_usd: f64,
    pub num_turns: u32,
}

impl TurnResult {
    pub fn is_success(&self) -> bool {
        self.subtype == "success" && !self.is_error
    }

    pub fn stats_line(&self) -> String {
        format!(
            "Completed in {:.2}s | Cost: ${:.4} | Turns: {}",
            self.duration_ms as f64 / 1000.0,
            self.total_cost_usd,
            self.num_turns
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BackendEvent {
    SystemInit {
        session_id: String,
        servers: Vec<ToolServerStatus>,
    },
    TextDelta(String),
    ToolUse(ToolUse),
    Result(TurnResult),
}

#[derive(Debug)]
pub enum BackendError {
    Cancelled,
    Spawn(String),
    Io(std::io::Error),
    Protocol(String),
    Api(String),
    Exited(String),
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::Cancelled => write!(f, "Request cancelled"),
            BackendError::Spawn(message) => write!(f, "Failed to start backend: {message}"),
            BackendError::Io(err) => write!(f, "Backend I/O error: {err}"),
            BackendError::Protocol(message) => write!(f, "Backend protocol error: {message}"),
            BackendError::Api(message) => write!(f, "{message}"),
            BackendError::Exited(message) => write!(f, "Backend exited: {message}"),
        }
    }
}

impl Error for BackendError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            BackendError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for BackendError {
    fn from(err: std::io::Error) -> Self {
        BackendError::Io(err)
    }
}

pub type EventStream = BoxStream<'static, Result<BackendEvent, BackendError>>;

/// Answers tool authorization requests raised by the backend mid-turn.
#[async_trait::async_trait]
pub trait PermissionHandler: Send + Sync {
    async fn can_use_tool(
        &self,
        tool_name: &str,
        input: Map<String, Value>,
        suggestions: Vec<Value>,
    ) -> PermissionDecision;
}

/// Everything the backend needs to run one turn.
pub struct QueryRequest {
    pub prompt: String,
    pub resume_session_id: Option<String>,
    /// `None` means no tool servers are attached to this turn.
    pub tool_servers: Option<Vec<ToolServerEntry>>,
    pub system_prompt: String,
    pub model: String,
    pub agents: BTreeMap<String, AgentConfig>,
    pub disallowed_tools: Vec<String>,
    pub permission_mode: String,
    pub include_partial_messages: bool,
    pub cancel: CancellationToken,
    pub permissions: Arc<dyn PermissionHandler>,
}

impl fmt::Debug for QueryRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryRequest")
            .field("prompt", &self.prompt)
            .field("resume_session_id", &self.resume_session_id)
            .field(
                "tool_servers",
                &self
                    .tool_servers
                    .as_ref()
                    .map(|servers| servers.iter().map(|s| s.name.as_str()).collect::<Vec<_>>()),
            )
            .field("model", &self.model)
            .field("include_partial_messages", &self.include_partial_messages)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
pub trait ModelBackend: Send + Sync {
    async fn query(&self, request: QueryRequest) -> Result<EventStream, BackendError>;
}

#[async_trait::async_trait]
pub trait SelectionModel: Send + Sync {
    /// Names of the tool servers the model picked for `user_message`.
    async fn choose_servers(
        &self,
        routing_prompt: &str,
        user_message: &str,
    ) -> Result<Vec<String>, BackendError>;
}

/// Selection model that always answers with the same servers. Used with `--no-select`.
#[derive(Debug, Clone, Default)]
pub struct FixedSelection {
    servers: Vec<String>,
}

impl FixedSelection {
    pub fn new(servers: Vec<String>) -> Self {
        Self { servers }
    }
}

#[async_trait::async_trait]
impl SelectionModel for FixedSelection {
    async fn choose_servers(&self, _: &str, _: &str) -> Result<Vec<String>, BackendError> {
        Ok(self.servers.clone())
    }
}

/// Race `future` against `cancel`.
pub async fn run_cancellable<T, F>(cancel: &CancellationToken, future: F) -> Result<T, BackendError>
where
    F: Future<Output = Result<T, BackendError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(BackendError::Cancelled),
        result = future => result,
    }
}
