//! What the front ends may do to a running conversation.

use std::sync::Arc;

use tracing::debug;

use crate::core::handoff::HandoffQueue;
use crate::core::session::SessionHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Sent,
    Ignored,
    /// A turn is still running; the line was not queued.
    Busy,
    Cleared,
    Exit,
}

#[derive(Clone)]
pub struct ChatController {
    session: SessionHandle,
    queue: Arc<HandoffQueue>,
}

impl ChatController {
    pub fn new(session: SessionHandle, queue: Arc<HandoffQueue>) -> Self {
        Self { session, queue }
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    /// Hand a typed line to the orchestrator. `exit`, `clear` and `/clear` are handled here.
    ///
    /// Nothing is queued while a turn runs: the queue is shared with the permission gate, which
    /// would take the line as its answer.
    pub async fn submit(&self, text: &str) -> SubmitOutcome {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return SubmitOutcome::Ignored;
        }

        let busy = self
            .session
            .read(|state| state.is_processing || !state.phase.is_idle())
            .await;
        if trimmed.eq_ignore_ascii_case("exit") {
            if busy {
                self.abort().await;
            } else {
                self.queue.send(trimmed);
            }
            return SubmitOutcome::Exit;
        }
        if busy {
            debug!("Submit ignored while a turn is running");
            return SubmitOutcome::Busy;
        }
        if trimmed.eq_ignore_ascii_case("clear") || trimmed.eq_ignore_ascii_case("/clear") {
            self.clear().await;
            return SubmitOutcome::Cleared;
        }

        let sent = self
            .session
            .update(|state| {
                if state.is_processing || !state.phase.is_idle() {
                    return false;
                }
                state.is_processing = true;
                state.stats = None;
                state.input.clear();
                true
            })
            .await;
        if !sent {
            return SubmitOutcome::Busy;
        }
        self.queue.send(trimmed);
        SubmitOutcome::Sent
    }

    /// Answer the pending permission prompt. Every parked request gets the same answer.
    pub async fn answer(&self, text: &str) {
        let reply = if text.trim().is_empty() {
            "y".to_string()
        } else {
            text.to_string()
        };
        self.queue.send(reply.clone());
        while self.queue.has_waiting_receiver() {
            self.queue.send(reply.clone());
        }
        self.session
            .update(|state| {
                state.pending_permission = None;
                state.input.clear();
            })
            .await;
    }

    pub async fn deny(&self) {
        self.answer("n").await;
    }

    /// Stop the running turn. Returns false when no turn was running.
    pub async fn abort(&self) -> bool {
        let aborted = self.session.update(|state| state.abort_turn()).await;
        debug!(aborted, "Abort requested");
        aborted
    }

    pub async fn clear(&self) {
        self.queue.clear();
        self.session.update(|state| state.reset()).await;
    }
}
