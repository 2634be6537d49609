use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::core::constants::{
    DEFAULT_BACKEND_COMMAND, DEFAULT_MODEL, DEFAULT_PERMISSION_MODE, DEFAULT_SELECTOR_MODEL,
    DEFAULT_SYSTEM_PROMPT,
};

/// A tool server the agent may connect to on demand.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct ToolServerConfig {
    /// What the server is good for; this is what the selector model reads.
    #[serde(default)]
    pub description: String,
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Remote servers are reached over HTTP instead of a spawned command.
    pub url: Option<String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    pub enabled: Option<bool>,
    /// Instructions appended to the system prompt while this server is active.
    pub prompt: Option<String>,
    pub prompt_file: Option<PathBuf>,
    /// Tool names on this server the agent may never call.
    #[serde(default)]
    pub disallowed_tools: Vec<String>,
}

impl ToolServerConfig {
    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }

    pub fn instruction_appendix(&self) -> Option<&str> {
        self.prompt
            .as_deref()
            .map(str::trim)
            .filter(|prompt| !prompt.is_empty())
    }
}

/// A subagent the backend can delegate to.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct AgentConfig {
    #[serde(default)]
    pub description: String,
    pub prompt: Option<String>,
    pub prompt_file: Option<PathBuf>,
    /// Tool servers this agent needs; the selector is told about them.
    #[serde(default)]
    pub mcp_servers: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
pub struct Config {
    /// Model used for conversation turns (e.g. "sonnet")
    pub model: Option<String>,
    /// Lightweight model used to pick tool servers for a turn
    pub selector_model: Option<String>,
    pub system_prompt: Option<String>,
    pub system_prompt_file: Option<PathBuf>,
    /// Stream partial assistant text as it is generated
    pub stream: Option<bool>,
    pub permission_mode: Option<String>,
    /// Tools that are never offered to the agent, across all servers
    #[serde(default)]
    pub disallowed_tools: Vec<String>,
    /// Executable that speaks the agent stream-json protocol
    pub backend_command: Option<String>,
    #[serde(default)]
    pub mcp_servers: BTreeMap<String, ToolServerConfig>,
    #[serde(default)]
    pub agents: BTreeMap<String, AgentConfig>,
}

impl Config {
    pub fn model(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }

    pub fn selector_model(&self) -> &str {
        self.selector_model
            .as_deref()
            .unwrap_or(DEFAULT_SELECTOR_MODEL)
    }

    pub fn base_system_prompt(&self) -> &str {
        self.system_prompt
            .as_deref()
            .map(str::trim)
            .filter(|prompt| !prompt.is_empty())
            .unwrap_or(DEFAULT_SYSTEM_PROMPT)
    }

    pub fn stream_enabled(&self) -> bool {
        self.stream.unwrap_or(false)
    }

    pub fn permission_mode(&self) -> &str {
        self.permission_mode
            .as_deref()
            .unwrap_or(DEFAULT_PERMISSION_MODE)
    }

    pub fn backend_command(&self) -> &str {
        self.backend_command
            .as_deref()
            .unwrap_or(DEFAULT_BACKEND_COMMAND)
    }

    pub fn enabled_servers(&self) -> impl Iterator<Item = (&String, &ToolServerConfig)> {
        self.mcp_servers
            .iter()
            .filter(|(_, server)| server.is_enabled())
    }

    pub fn get_server(&self, name: &str) -> Option<&ToolServerConfig> {
        self.mcp_servers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, server)| server)
    }
}

/// Get a user-friendly display string for a path, using `~` for the home directory on Unix.
pub fn path_display<P: AsRef<Path>>(path: P) -> String {
    let path = path.as_ref();

    #[cfg(unix)]
    {
        if let Some(home) = std::env::var_os("HOME") {
            let home_path = PathBuf::from(home);
            if let Ok(relative) = path.strip_prefix(&home_path) {
                return format!("~/{}", relative.display());
            }
        }
    }

    path.display().to_string()
}
