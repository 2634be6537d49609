//! The conversation turn loop.
//!
//! Waits on the [`HandoffQueue`] for user input, picks tool servers, runs the backend, and folds
//! its events into the [`SessionHandle`]. Each event is applied in the same session update that
//! checks the turn's cancellation token, so nothing from an aborted turn leaks into the
//! transcript.

mod events;

use std::collections::BTreeMap;
use std::sync::Arc;

use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::{run_cancellable, BackendError, EventStream, ModelBackend, QueryRequest};
use crate::core::config::data::{AgentConfig, Config};
use crate::core::constants::{ABORTED_STATS, STATS_ERROR_PREFIX};
use crate::core::handoff::HandoffQueue;
use crate::core::message::ChatHistoryEntry;
use crate::core::permission::PermissionGate;
use crate::core::prompt::{build_system_prompt, SystemPromptParts};
use crate::core::selector::{Selection, ServerSelector};
use crate::core::session::{SessionHandle, TurnPhase};
use crate::mcp::registry::ToolServerCatalogue;
use crate::mcp::tools::disallowed_tools;

pub use events::{apply_event, EventEffect};

/// Per-session knobs for every turn.
#[derive(Debug, Clone, Default)]
pub struct TurnSettings {
    pub model: String,
    pub include_partial_messages: bool,
    pub permission_mode: String,
    pub disallowed_tools: Vec<String>,
    pub agents: BTreeMap<String, AgentConfig>,
    pub base_system_prompt: String,
    pub additional_system_prompt: Option<String>,
}

impl TurnSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            model: config.model().to_string(),
            include_partial_messages: config.stream_enabled(),
            permission_mode: config.permission_mode().to_string(),
            disallowed_tools: disallowed_tools(config),
            agents: config.agents.clone(),
            base_system_prompt: config.base_system_prompt().to_string(),
            additional_system_prompt: None,
        }
    }

    pub fn with_additional_prompt(mut self, prompt: Option<String>) -> Self {
        self.additional_system_prompt = prompt.filter(|p| !p.trim().is_empty());
        self
    }
}

/// What a queued message asks the loop to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Exit,
    Blank,
    Message(String),
}

impl Inbound {
    pub fn classify(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            Inbound::Blank
        } else if trimmed.eq_ignore_ascii_case("exit") {
            Inbound::Exit
        } else {
            Inbound::Message(trimmed.to_string())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    Completed,
    Failed,
    Aborted,
    /// The stream ended without a result message.
    Incomplete,
}

pub struct TurnOrchestrator {
    session: SessionHandle,
    queue: Arc<HandoffQueue>,
    backend: Arc<dyn ModelBackend>,
    selector: ServerSelector,
    catalogue: ToolServerCatalogue,
    settings: TurnSettings,
}

impl TurnOrchestrator {
    pub fn new(
        session: SessionHandle,
        queue: Arc<HandoffQueue>,
        backend: Arc<dyn ModelBackend>,
        selector: ServerSelector,
        catalogue: ToolServerCatalogue,
        settings: TurnSettings,
    ) -> Self {
        Self {
            session,
            queue,
            backend,
            selector,
            catalogue,
            settings,
        }
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    /// Serve turns until `exit` arrives.
    pub async fn run(&self) {
        info!(servers = ?self.catalogue.names(), "Conversation loop started");
        loop {
            let Some(raw) = self.queue.receive().await else {
                // Queue was cleared while idle.
                continue;
            };
            match Inbound::classify(&raw) {
                Inbound::Exit => break,
                Inbound::Blank => continue,
                Inbound::Message(message) => {
                    let outcome = self.run_turn(message).await;
                    debug!(outcome = ?outcome, "Turn finished");
                }
            }
        }
        self.session.update(|state| state.finish_turn()).await;
        info!("Conversation loop ended");
    }

    /// Run one full turn for `user_message`.
    pub async fn run_turn(&self, user_message: String) -> TurnOutcome {
        let cancel = self
            .session
            .update(|state| {
                let cancel = state.begin_turn();
                state.append_history(ChatHistoryEntry::user(user_message.clone()));
                state.phase = TurnPhase::Selecting;
                cancel
            })
            .await;

        let outcome = self.drive_turn(&user_message, &cancel).await;
        self.session.update(|state| state.finish_turn()).await;
        outcome
    }

    async fn drive_turn(&self, user_message: &str, cancel: &CancellationToken) -> TurnOutcome {
        let already_connected = self.session.read(|s| s.inferred_servers.clone()).await;
        let selection = match self
            .selector
            .select(
                user_message,
                &self.catalogue,
                &self.settings.agents,
                &already_connected,
                cancel,
            )
            .await
        {
            Ok(selection) => selection,
            Err(BackendError::Cancelled) => return self.commit_abort().await,
            Err(err) => {
                warn!(error = %err, "Tool-server selection failed");
                Selection::default()
            }
        };

        let Some(request) = self.prepare_query(user_message, &selection, cancel).await else {
            return self.commit_abort().await;
        };

        let stream = match run_cancellable(cancel, self.backend.query(request)).await {
            Ok(stream) => stream,
            Err(BackendError::Cancelled) => return self.commit_abort().await,
            Err(err) => return self.commit_error(&err).await,
        };
        self.consume(stream, cancel).await
    }

    /// Record the selection and build the backend request. `None` if the turn was aborted.
    async fn prepare_query(
        &self,
        user_message: &str,
        selection: &Selection,
        cancel: &CancellationToken,
    ) -> Option<QueryRequest> {
        let snapshot = self
            .session
            .update(|state| {
                if cancel.is_cancelled() {
                    return None;
                }
                state
                    .inferred_servers
                    .extend(selection.newly_added.iter().map(|name| name.to_lowercase()));
                if let Some(notice) = selection.connecting_notice() {
                    state.append_system(notice);
                }
                state.phase = TurnPhase::Querying;
                Some((
                    state.tool_servers.clone(),
                    state.inferred_servers.clone(),
                    state.session_id.clone(),
                ))
            })
            .await;
        let (statuses, selected, resume_session_id) = snapshot?;

        let active_servers = selection.active_servers.clone().unwrap_or_default();
        let system_prompt = build_system_prompt(&SystemPromptParts {
            date: chrono::Local::now().date_naive(),
            additional: self.settings.additional_system_prompt.as_deref(),
            statuses: &statuses,
            selected: &selected,
            base: &self.settings.base_system_prompt,
            active_servers: &active_servers,
        });

        let gate = PermissionGate::new(
            self.queue.clone(),
            Arc::new(self.session.clone()),
            cancel.clone(),
        )
        .with_disallowed(self.settings.disallowed_tools.clone());

        debug!(
            servers = ?selection.active_names(),
            resume = ?resume_session_id,
            "Querying backend"
        );
        Some(QueryRequest {
            prompt: user_message.to_string(),
            resume_session_id,
            tool_servers: selection.active_servers.clone(),
            system_prompt,
            model: self.settings.model.clone(),
            agents: self.settings.agents.clone(),
            disallowed_tools: self.settings.disallowed_tools.clone(),
            permission_mode: self.settings.permission_mode.clone(),
            include_partial_messages: self.settings.include_partial_messages,
            cancel: cancel.clone(),
            permissions: Arc::new(gate),
        })
    }

    async fn consume(&self, mut stream: EventStream, cancel: &CancellationToken) -> TurnOutcome {
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return self.commit_abort().await,
                next = stream.next() => next,
            };

            let event = match next {
                Some(Ok(event)) => event,
                Some(Err(BackendError::Cancelled)) => return self.commit_abort().await,
                Some(Err(err)) => return self.commit_error(&err).await,
                None => {
                    debug!("Backend stream ended without a result");
                    self.session
                        .update(|state| {
                            state.flush_assistant_message();
                        })
                        .await;
                    return TurnOutcome::Incomplete;
                }
            };

            let effect = self
                .session
                .update(|state| {
                    if cancel.is_cancelled() {
                        return None;
                    }
                    Some(apply_event(state, event))
                })
                .await;

            match effect {
                None => return self.commit_abort().await,
                Some(EventEffect::Finished(outcome)) => return outcome,
                Some(EventEffect::Continue) => {}
            }
        }
    }

    async fn commit_abort(&self) -> TurnOutcome {
        info!("Turn aborted");
        self.session
            .update(|state| {
                state.flush_assistant_message();
                state.stats = Some(ABORTED_STATS.to_string());
            })
            .await;
        TurnOutcome::Aborted
    }

    async fn commit_error(&self, err: &BackendError) -> TurnOutcome {
        warn!(error = %err, "Turn failed");
        let stats = format!("{STATS_ERROR_PREFIX} {err}");
        self.session
            .update(|state| {
                state.flush_assistant_message();
                state.stats = Some(stats);
            })
            .await;
        TurnOutcome::Failed
    }
}
