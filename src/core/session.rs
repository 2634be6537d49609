//! Observable conversation state shared by the UI and the turn orchestrator.
//!
//! [`SessionState`] is plain data with small mutators. [`SessionHandle`] wraps it for concurrent
//! access and bumps a revision counter after every update so renderers know when to redraw.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;

use crate::core::message::{ChatHistoryEntry, MessageRole, ToolUse};
use crate::mcp::registry::ToolServerStatus;

/// Where the orchestrator is within the current turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TurnPhase {
    #[default]
    Idle,
    Selecting,
    Querying,
    Streaming,
    Finalizing,
}

impl TurnPhase {
    pub fn is_idle(self) -> bool {
        self == TurnPhase::Idle
    }
}

/// A tool call waiting on the user's yes/no/redirect answer.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingPermission {
    pub tool_name: String,
    pub input: Map<String, Value>,
}

#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub chat_history: Vec<ChatHistoryEntry>,
    /// Assistant text streamed since the last flush.
    pub current_assistant_message: String,
    pub current_tool_uses: Vec<ToolUse>,
    pub input: String,
    pub is_processing: bool,
    pub phase: TurnPhase,
    pub tool_servers: Vec<ToolServerStatus>,
    /// Lowercased names of every server the selector has ever picked this session.
    pub inferred_servers: BTreeSet<String>,
    pub pending_permission: Option<PendingPermission>,
    pub session_id: Option<String>,
    pub stats: Option<String>,
    reported_failures: Vec<String>,
    abort: CancellationToken,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append_history(&mut self, entry: ChatHistoryEntry) {
        self.chat_history.push(entry);
    }

    pub fn append_system(&mut self, content: impl Into<String>) {
        self.append_history(ChatHistoryEntry::system(content));
    }

    pub fn append_assistant_text(&mut self, text: &str) {
        self.current_assistant_message.push_str(text);
    }

    /// Commit buffered assistant text as a message. Whitespace-only buffers are dropped.
    pub fn flush_assistant_message(&mut self) -> bool {
        let text = std::mem::take(&mut self.current_assistant_message);
        if text.trim().is_empty() {
            return false;
        }
        self.append_history(ChatHistoryEntry::assistant(text));
        true
    }

    pub fn add_tool_use(&mut self, tool_use: ToolUse) {
        self.current_tool_uses.push(tool_use.clone());
        self.append_history(ChatHistoryEntry::ToolUse(tool_use));
    }

    pub fn clear_tool_uses(&mut self) {
        self.current_tool_uses.clear();
    }

    pub fn record_denial(&mut self, tool_name: &str, reason: &str) {
        self.append_history(ChatHistoryEntry::ToolDenied {
            name: tool_name.to_string(),
            reason: reason.to_string(),
        });
    }

    /// Replace the server status list and return the failed server names that have not
    /// already been reported for the current set of statuses.
    pub fn set_tool_servers(&mut self, servers: Vec<ToolServerStatus>) -> Vec<String> {
        let failed: Vec<String> = servers
            .iter()
            .filter(|server| server.status.is_failed())
            .map(|server| server.name.clone())
            .collect();
        self.tool_servers = servers;
        if failed == self.reported_failures {
            return Vec::new();
        }
        self.reported_failures = failed.clone();
        failed
    }

    pub fn connected_servers(&self) -> Vec<&str> {
        self.tool_servers
            .iter()
            .filter(|server| !server.status.is_failed())
            .map(|server| server.name.as_str())
            .collect()
    }

    pub fn failed_servers(&self) -> Vec<&str> {
        self.tool_servers
            .iter()
            .filter(|server| server.status.is_failed())
            .map(|server| server.name.as_str())
            .collect()
    }

    /// Start a turn: cancel whatever was in flight and install a fresh abort token.
    pub fn begin_turn(&mut self) -> CancellationToken {
        self.abort.cancel();
        self.abort = CancellationToken::new();
        self.is_processing = true;
        self.stats = None;
        self.pending_permission = None;
        self.clear_tool_uses();
        self.abort.clone()
    }

    /// Signal the running turn to stop. Returns false when nothing was running.
    pub fn abort_turn(&mut self) -> bool {
        let running = !self.phase.is_idle();
        self.abort.cancel();
        self.abort = CancellationToken::new();
        self.pending_permission = None;
        self.is_processing = false;
        running
    }

    pub fn abort_token(&self) -> CancellationToken {
        self.abort.clone()
    }

    pub fn finish_turn(&mut self) {
        self.phase = TurnPhase::Idle;
        self.is_processing = false;
        self.pending_permission = None;
    }

    /// Clear the visible conversation. The backend session and known servers survive; failed
    /// servers are reported again in the new transcript.
    pub fn reset(&mut self) {
        self.chat_history.clear();
        self.current_assistant_message.clear();
        self.current_tool_uses.clear();
        self.input.clear();
        self.stats = None;
        self.pending_permission = None;
        self.reported_failures.clear();
    }

    /// User messages, oldest first, for input history cycling.
    pub fn user_messages(&self) -> Vec<&str> {
        self.chat_history
            .iter()
            .filter_map(|entry| entry.message_content(MessageRole::User))
            .collect()
    }
}

/// Cloneable async handle over [`SessionState`].
#[derive(Clone)]
pub struct SessionHandle {
    inner: Arc<Mutex<SessionState>>,
    revision: Arc<watch::Sender<u64>>,
}

impl SessionHandle {
    pub fn new(state: SessionState) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            inner: Arc::new(Mutex::new(state)),
            revision: Arc::new(revision),
        }
    }

    pub async fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&SessionState) -> R,
    {
        let guard = self.inner.lock().await;
        f(&guard)
    }

    pub async fn update<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut SessionState) -> R,
    {
        let result = {
            let mut guard = self.inner.lock().await;
            f(&mut guard)
        };
        self.revision.send_modify(|revision| *revision = revision.wrapping_add(1));
        result
    }

    pub async fn snapshot(&self) -> SessionState {
        self.read(SessionState::clone).await
    }

    /// Receiver that changes whenever the state is updated.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }
}

impl Default for SessionHandle {
    fn default() -> Self {
        Self::new(SessionState::new())
    }
}
