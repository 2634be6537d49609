//! Shared fixtures: a sample catalogue and scripted stand-ins for the model services.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::StreamExt;
use serde_json::{Map, Value};
use tokio::sync::{mpsc, Notify};

use crate::backend::{
    BackendError, BackendEvent, EventStream, ModelBackend, QueryRequest, SelectionModel,
    TurnResult,
};
use crate::core::config::data::ToolServerConfig;
use crate::core::message::ToolUse;
use crate::mcp::permissions::PermissionDecision;
use crate::mcp::registry::{ToolServerCatalogue, ToolServerEntry};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub fn sample_catalogue() -> ToolServerCatalogue {
    ToolServerCatalogue::new(vec![
        ToolServerEntry::new(
            "github",
            ToolServerConfig {
                description: "GitHub issues, pull requests and code search".into(),
                command: Some("bunx".into()),
                prompt: Some("Search code before answering.".into()),
                ..ToolServerConfig::default()
            },
        ),
        ToolServerEntry::new(
            "notion",
            ToolServerConfig {
                description: "Notion docs and wikis".into(),
                url: Some("https://mcp.notion.com/mcp".into()),
                ..ToolServerConfig::default()
            },
        ),
    ])
}

pub fn success_result(duration_ms: u64, total_cost_usd: f64, num_turns: u32) -> BackendEvent {
    BackendEvent::Result(TurnResult {
        subtype: "success".into(),
        is_error: false,
        duration_ms,
        total_cost_usd,
        num_turns,
    })
}

pub fn tool_use(name: &str, input: Value) -> BackendEvent {
    let input = input.as_object().cloned().unwrap_or_default();
    BackendEvent::ToolUse(ToolUse::new(name, input))
}

pub fn text(delta: &str) -> BackendEvent {
    BackendEvent::TextDelta(delta.to_string())
}

/// One step of a scripted backend turn.
#[derive(Debug, Clone)]
pub enum ScriptStep {
    Event(BackendEvent),
    Error(String),
    /// Ask the turn's permission handler and record the answer.
    Permission { tool_name: String, input: Map<String, Value> },
    /// Park until [`ScriptedBackend::release`] is called.
    Hold,
    Sleep(Duration),
}

impl From<BackendEvent> for ScriptStep {
    fn from(event: BackendEvent) -> Self {
        ScriptStep::Event(event)
    }
}

/// What a scripted backend was asked to do.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedQuery {
    pub prompt: String,
    pub resume_session_id: Option<String>,
    pub tool_servers: Option<Vec<String>>,
    pub system_prompt: String,
    pub disallowed_tools: Vec<String>,
}

#[derive(Default)]
pub struct ScriptedBackend {
    scripts: Mutex<VecDeque<Vec<ScriptStep>>>,
    queries: Mutex<Vec<RecordedQuery>>,
    decisions: Arc<Mutex<Vec<PermissionDecision>>>,
    release: Arc<Notify>,
    failure: Mutex<Option<String>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the steps for the next turn.
    pub fn script<I, S>(self, steps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<ScriptStep>,
    {
        lock(&self.scripts).push_back(steps.into_iter().map(Into::into).collect());
        self
    }

    /// Make the next `query` call fail before any events are produced.
    pub fn failing(self, message: &str) -> Self {
        *lock(&self.failure) = Some(message.to_string());
        self
    }

    pub fn release(&self) {
        self.release.notify_one();
    }

    pub fn queries(&self) -> Vec<RecordedQuery> {
        lock(&self.queries).clone()
    }

    pub fn decisions(&self) -> Vec<PermissionDecision> {
        lock(&self.decisions).clone()
    }
}

#[async_trait::async_trait]
impl ModelBackend for ScriptedBackend {
    async fn query(&self, request: QueryRequest) -> Result<EventStream, BackendError> {
        lock(&self.queries).push(RecordedQuery {
            prompt: request.prompt.clone(),
            resume_session_id: request.resume_session_id.clone(),
            tool_servers: request
                .tool_servers
                .as_ref()
                .map(|servers| servers.iter().map(|s| s.name.clone()).collect()),
            system_prompt: request.system_prompt.clone(),
            disallowed_tools: request.disallowed_tools.clone(),
        });

        if let Some(message) = lock(&self.failure).take() {
            return Err(BackendError::Api(message));
        }

        let steps = lock(&self.scripts).pop_front().unwrap_or_default();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let decisions = self.decisions.clone();
        let release = self.release.clone();
        let permissions = request.permissions;

        tokio::spawn(async move {
            for step in steps {
                match step {
                    ScriptStep::Event(event) => {
                        if tx.send(Ok(event)).is_err() {
                            return;
                        }
                    }
                    ScriptStep::Error(message) => {
                        let _ = tx.send(Err(BackendError::Protocol(message)));
                        return;
                    }
                    ScriptStep::Permission { tool_name, input } => {
                        let decision = permissions.can_use_tool(&tool_name, input, Vec::new()).await;
                        lock(&decisions).push(decision);
                    }
                    ScriptStep::Hold => release.notified().await,
                    ScriptStep::Sleep(duration) => tokio::time::sleep(duration).await,
                }
            }
        });

        let stream = futures_util::stream::poll_fn(move |cx| rx.poll_recv(cx));
        Ok(stream.boxed())
    }
}

/// Selection model with a canned answer.
pub struct ScriptedSelection {
    answer: Result<Vec<String>, String>,
    hang: bool,
}

impl ScriptedSelection {
    pub fn new(servers: &[&str]) -> Self {
        Self {
            answer: Ok(servers.iter().map(|s| s.to_string()).collect()),
            hang: false,
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            answer: Err(message.to_string()),
            hang: false,
        }
    }

    /// Never answers; only cancellation ends the call.
    pub fn pending() -> Self {
        Self {
            answer: Ok(Vec::new()),
            hang: true,
        }
    }
}

#[async_trait::async_trait]
impl SelectionModel for ScriptedSelection {
    async fn choose_servers(&self, _: &str, _: &str) -> Result<Vec<String>, BackendError> {
        if self.hang {
            std::future::pending::<()>().await;
        }
        self.answer.clone().map_err(BackendError::Api)
    }
}
