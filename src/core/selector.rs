//! Per-turn tool-server selection.
//!
//! A small routing model reads the user's message against the catalogue and names the servers
//! it needs. Selections accumulate: a server picked once stays attached for the rest of the
//! session.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::backend::{run_cancellable, BackendError, SelectionModel};
use crate::core::config::data::AgentConfig;
use crate::mcp::registry::{ToolServerCatalogue, ToolServerEntry};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    /// Servers to attach to this turn; `None` when nothing has ever been selected.
    pub active_servers: Option<Vec<ToolServerEntry>>,
    /// Catalogue names picked this turn that were not attached before.
    pub newly_added: Vec<String>,
}

impl Selection {
    pub fn connecting_notice(&self) -> Option<String> {
        if self.newly_added.is_empty() {
            None
        } else {
            Some(format!("Connecting to {}...", self.newly_added.join(", ")))
        }
    }

    pub fn active_names(&self) -> Vec<&str> {
        self.active_servers
            .iter()
            .flatten()
            .map(|server| server.name.as_str())
            .collect()
    }
}

pub struct ServerSelector {
    model: Arc<dyn SelectionModel>,
}

impl ServerSelector {
    pub fn new(model: Arc<dyn SelectionModel>) -> Self {
        Self { model }
    }

    /// Pick servers for `user_message`. `already_connected` holds lowercased names.
    ///
    /// Only cancellation is returned as an error; a failing routing model degrades to
    /// selecting nothing new.
    pub async fn select(
        &self,
        user_message: &str,
        catalogue: &ToolServerCatalogue,
        agents: &BTreeMap<String, AgentConfig>,
        already_connected: &BTreeSet<String>,
        cancel: &CancellationToken,
    ) -> Result<Selection, BackendError> {
        if catalogue.is_empty() {
            return Ok(Selection::default());
        }

        let routing_prompt = routing_prompt(catalogue, agents);
        debug!(
            available = ?catalogue.names(),
            already = ?already_connected,
            "Selecting tool servers"
        );

        let picked = match run_cancellable(
            cancel,
            self.model.choose_servers(&routing_prompt, user_message),
        )
        .await
        {
            Ok(picked) => picked,
            Err(BackendError::Cancelled) => return Err(BackendError::Cancelled),
            Err(err) => {
                warn!(error = %err, "Tool-server selection failed; continuing without new servers");
                Vec::new()
            }
        };

        let mut selected: Vec<String> = Vec::new();
        for name in &picked {
            match catalogue.find_server(name) {
                Some(server) if !selected.contains(&server.name) => {
                    selected.push(server.name.clone())
                }
                Some(_) => {}
                None => debug!(server = %name, "Ignoring unknown tool server from selector"),
            }
        }

        let newly_added: Vec<String> = selected
            .iter()
            .filter(|name| !already_connected.contains(&name.to_lowercase()))
            .cloned()
            .collect();

        let union: Vec<&str> = already_connected
            .iter()
            .map(String::as_str)
            .chain(selected.iter().map(String::as_str))
            .collect();
        let active_servers = if union.is_empty() {
            None
        } else {
            Some(catalogue.matching(union))
        };

        debug!(
            selected = ?selected,
            newly_added = ?newly_added,
            "Tool-server selection complete"
        );
        Ok(Selection {
            active_servers,
            newly_added,
        })
    }
}

pub fn routing_prompt(
    catalogue: &ToolServerCatalogue,
    agents: &BTreeMap<String, AgentConfig>,
) -> String {
    let names = catalogue.names().join(", ");
    let capabilities = catalogue
        .servers()
        .iter()
        .map(|server| format!("- {}: {}", server.name, server.description()))
        .collect::<Vec<_>>()
        .join("\n");

    let mut prompt = format!(
        "You route requests to tool servers. Decide which of the available servers the user's \
message needs.\n\nAvailable servers: {names}\n\nSERVER CAPABILITIES:\n{capabilities}\n"
    );

    if !agents.is_empty() {
        let agent_lines = agents
            .iter()
            .map(|(name, agent)| {
                let description = match agent.description.trim() {
                    "" => "No description",
                    description => description,
                };
                if agent.mcp_servers.is_empty() {
                    format!("- {name}: {description}")
                } else {
                    format!(
                        "- {name}: {description} (requires: {})",
                        agent.mcp_servers.join(", ")
                    )
                }
            })
            .collect::<Vec<_>>()
            .join("\n");
        prompt.push_str(&format!(
            "\nSUBAGENTS:\n{agent_lines}\n\nIf the request falls in a subagent's domain, select \
the servers that subagent requires.\n"
        ));
    }

    prompt.push_str(
        "\nINSTRUCTIONS:\n\
- Reply only through the select_tool_servers tool; no greeting or commentary.\n\
- Infer the servers from the request and the capabilities above.\n\
- Server names mentioned by the user match case-insensitively.\n\
- Use exact names from the available list.\n\
- Select nothing when no server is relevant.\n\n\
Examples:\n\
- \"Show me GitHub issues\" -> [\"github\"]\n\
- \"Show me some docs on OKRs\" -> [\"notion\"]\n\
- \"What's the weather?\" -> []\n",
    );
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::FixedSelection;
    use crate::utils::test_utils::{sample_catalogue, ScriptedSelection};

    fn connected(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[tokio::test]
    async fn new_server_is_added_and_announced() {
        let selector = ServerSelector::new(Arc::new(FixedSelection::new(vec!["notion".into()])));
        let selection = selector
            .select(
                "show me notion docs",
                &sample_catalogue(),
                &BTreeMap::new(),
                &BTreeSet::new(),
                &CancellationToken::new(),
            )
            .await
            .expect("selection");

        assert_eq!(selection.newly_added, vec!["notion"]);
        assert_eq!(selection.active_names(), vec!["notion"]);
        assert_eq!(
            selection.connecting_notice().as_deref(),
            Some("Connecting to notion...")
        );
    }

    #[tokio::test]
    async fn selections_accumulate_and_ignore_case() {
        let selector = ServerSelector::new(Arc::new(FixedSelection::new(vec![
            "GitHub".into(),
            "notion".into(),
            "jira".into(),
            "github".into(),
        ])));
        let selection = selector
            .select(
                "issues and docs",
                &sample_catalogue(),
                &BTreeMap::new(),
                &connected(&["notion"]),
                &CancellationToken::new(),
            )
            .await
            .expect("selection");

        assert_eq!(selection.newly_added, vec!["github"]);
        assert_eq!(selection.active_names(), vec!["github", "notion"]);
    }

    #[tokio::test]
    async fn nothing_selected_means_no_servers() {
        let selector = ServerSelector::new(Arc::new(FixedSelection::default()));
        let selection = selector
            .select(
                "what's the weather?",
                &sample_catalogue(),
                &BTreeMap::new(),
                &BTreeSet::new(),
                &CancellationToken::new(),
            )
            .await
            .expect("selection");
        assert_eq!(selection, Selection::default());
        assert!(selection.connecting_notice().is_none());
    }

    #[tokio::test]
    async fn previously_connected_servers_stay_active() {
        let selector = ServerSelector::new(Arc::new(FixedSelection::default()));
        let selection = selector
            .select(
                "thanks",
                &sample_catalogue(),
                &BTreeMap::new(),
                &connected(&["github"]),
                &CancellationToken::new(),
            )
            .await
            .expect("selection");
        assert!(selection.newly_added.is_empty());
        assert_eq!(selection.active_names(), vec!["github"]);
    }

    #[tokio::test]
    async fn failing_model_degrades_to_previous_servers() {
        let selector = ServerSelector::new(Arc::new(ScriptedSelection::failing("boom")));
        let selection = selector
            .select(
                "anything",
                &sample_catalogue(),
                &BTreeMap::new(),
                &connected(&["notion"]),
                &CancellationToken::new(),
            )
            .await
            .expect("selection");
        assert!(selection.newly_added.is_empty());
        assert_eq!(selection.active_names(), vec!["notion"]);
    }

    #[tokio::test]
    async fn cancellation_is_reported() {
        let selector = ServerSelector::new(Arc::new(ScriptedSelection::pending()));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = selector
            .select(
                "anything",
                &sample_catalogue(),
                &BTreeMap::new(),
                &BTreeSet::new(),
                &cancel,
            )
            .await;
        assert!(matches!(result, Err(BackendError::Cancelled)));
    }

    #[tokio::test]
    async fn empty_catalogue_skips_inference() {
        let selection = ServerSelector::new(Arc::new(ScriptedSelection::failing("unused")))
            .select(
                "anything",
                &ToolServerCatalogue::default(),
                &BTreeMap::new(),
                &BTreeSet::new(),
                &CancellationToken::new(),
            )
            .await
            .expect("selection");
        assert!(selection.active_servers.is_none());
    }

    #[test]
    fn routing_prompt_lists_servers_and_agent_requirements() {
        let mut agents = BTreeMap::new();
        agents.insert(
            "reviewer".to_string(),
            AgentConfig {
                description: "Reviews pull requests".into(),
                mcp_servers: vec!["github".into()],
                ..AgentConfig::default()
            },
        );
        let prompt = routing_prompt(&sample_catalogue(), &agents);
        assert!(prompt.contains("Available servers: github, notion"));
        assert!(prompt.contains("- github: GitHub issues, pull requests and code search"));
        assert!(prompt.contains("- reviewer: Reviews pull requests (requires: github)"));

        let without_agents = routing_prompt(&sample_catalogue(), &BTreeMap::new());
        assert!(!without_agents.contains("SUBAGENTS"));
    }
}
