use tracing::{debug, warn};

use crate::backend::BackendEvent;
use crate::core::constants::STATS_ERROR_PREFIX;
use crate::core::session::{SessionState, TurnPhase};

use super::TurnOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventEffect {
    Continue,
    Finished(TurnOutcome),
}

/// Fold one backend event into the session.
pub fn apply_event(state: &mut SessionState, event: BackendEvent) -> EventEffect {
    if matches!(state.phase, TurnPhase::Querying | TurnPhase::Selecting) {
        state.phase = TurnPhase::Streaming;
    }

    match event {
        BackendEvent::SystemInit {
            session_id,
            servers,
        } => {
            debug!(session_id = %session_id, servers = servers.len(), "Backend session initialised");
            state.session_id = Some(session_id);
            let failed = state.set_tool_servers(servers);
            if !failed.is_empty() {
                warn!(servers = ?failed, "Tool servers failed to connect");
                state.append_system(format!(
                    "[Error] Failed to connect to {}",
                    failed.join(", ")
                ));
            }
            EventEffect::Continue
        }
        BackendEvent::TextDelta(text) => {
            state.append_assistant_text(&text);
            EventEffect::Continue
        }
        BackendEvent::ToolUse(tool_use) => {
            debug!(tool = %tool_use.name, "Backend reported tool use");
            state.flush_assistant_message();
            state.add_tool_use(tool_use);
            EventEffect::Continue
        }
        BackendEvent::Result(result) => {
            state.phase = TurnPhase::Finalizing;
            state.flush_assistant_message();
            if result.is_success() {
                state.stats = Some(result.stats_line());
                EventEffect::Finished(TurnOutcome::Completed)
            } else {
                state.stats = Some(format!("{STATS_ERROR_PREFIX} {}", result.subtype));
                EventEffect::Finished(TurnOutcome::Failed)
            }
        }
    }
}
