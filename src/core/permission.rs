//! Mid-turn tool authorization.
//!
//! The backend asks the gate whether a tool may run. The gate publishes the request to the
//! session, parks on the [`HandoffQueue`] until the user answers, and turns the answer into a
//! [`PermissionDecision`].

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::backend::PermissionHandler;
use crate::core::handoff::HandoffQueue;
use crate::core::session::{PendingPermission, SessionHandle};
use crate::mcp::permissions::{
    session_allow_rule, PermissionDecision, PermissionReply, DENIED_BY_CONFIG, DENIED_BY_USER,
};
use crate::mcp::tools::is_disallowed;

/// Delay before the spinner comes back after a denial, so the denial is visible first.
pub const RESUME_AFTER_DENIAL: Duration = Duration::from_millis(100);

/// Where the gate reports what it is doing.
#[async_trait::async_trait]
pub trait PermissionNotifier: Send + Sync {
    async fn permission_requested(&self, request: PendingPermission);
    async fn permission_resolved(&self, tool_name: &str, decision: &PermissionDecision);
    async fn processing_resumed(&self);
}

#[async_trait::async_trait]
impl PermissionNotifier for SessionHandle {
    async fn permission_requested(&self, request: PendingPermission) {
        self.update(|state| {
            state.pending_permission = Some(request);
            state.is_processing = false;
        })
        .await;
    }

    async fn permission_resolved(&self, tool_name: &str, decision: &PermissionDecision) {
        self.update(|state| {
            state.pending_permission = None;
            if let PermissionDecision::Deny { message, .. } = decision {
                state.record_denial(tool_name, message);
            }
        })
        .await;
    }

    async fn processing_resumed(&self) {
        self.update(|state| {
            if !state.phase.is_idle() {
                state.is_processing = true;
            }
        })
        .await;
    }
}

pub struct PermissionGate {
    queue: Arc<HandoffQueue>,
    notifier: Arc<dyn PermissionNotifier>,
    disallowed: Vec<String>,
    cancel: CancellationToken,
    resume_delay: Duration,
}

impl PermissionGate {
    pub fn new(
        queue: Arc<HandoffQueue>,
        notifier: Arc<dyn PermissionNotifier>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            queue,
            notifier,
            disallowed: Vec::new(),
            cancel,
            resume_delay: RESUME_AFTER_DENIAL,
        }
    }

    pub fn with_disallowed(mut self, disallowed: Vec<String>) -> Self {
        self.disallowed = disallowed;
        self
    }

    pub fn with_resume_delay(mut self, delay: Duration) -> Self {
        self.resume_delay = delay;
        self
    }

    pub async fn request(
        &self,
        tool_name: &str,
        input: Map<String, Value>,
        suggestions: Vec<Value>,
    ) -> PermissionDecision {
        if is_disallowed(&self.disallowed, tool_name) {
            debug!(tool = %tool_name, "Denying disallowed tool without prompting");
            let decision = PermissionDecision::deny(DENIED_BY_CONFIG);
            self.notifier.permission_resolved(tool_name, &decision).await;
            return decision;
        }

        self.notifier
            .permission_requested(PendingPermission {
                tool_name: tool_name.to_string(),
                input: input.clone(),
            })
            .await;

        let reply = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            reply = self.queue.receive() => reply,
        };

        let decision = match reply {
            Some(raw) => decide(&raw, tool_name, input, suggestions),
            None => PermissionDecision::deny(DENIED_BY_USER),
        };
        debug!(tool = %tool_name, allowed = decision.is_allow(), "Permission resolved");

        if self.cancel.is_cancelled() {
            return decision;
        }
        self.notifier.permission_resolved(tool_name, &decision).await;
        if decision.is_allow() {
            self.notifier.processing_resumed().await;
        } else {
            let notifier = self.notifier.clone();
            let cancel = self.cancel.clone();
            let delay = self.resume_delay;
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                if !cancel.is_cancelled() {
                    notifier.processing_resumed().await;
                }
            });
        }
        decision
    }
}

#[async_trait::async_trait]
impl PermissionHandler for PermissionGate {
    async fn can_use_tool(
        &self,
        tool_name: &str,
        input: Map<String, Value>,
        suggestions: Vec<Value>,
    ) -> PermissionDecision {
        self.request(tool_name, input, suggestions).await
    }
}

/// Map a typed answer onto a decision.
pub fn decide(
    raw: &str,
    tool_name: &str,
    input: Map<String, Value>,
    suggestions: Vec<Value>,
) -> PermissionDecision {
    match PermissionReply::classify(raw) {
        PermissionReply::Allow => {
            let updated_permissions = if suggestions.is_empty() {
                session_allow_rule(tool_name).map(|rule| vec![rule])
            } else {
                Some(suggestions)
            };
            PermissionDecision::Allow {
                updated_input: input,
                updated_permissions,
            }
        }
        PermissionReply::Deny => PermissionDecision::deny(DENIED_BY_USER),
        PermissionReply::Redirect(text) => PermissionDecision::deny(text),
    }
}
