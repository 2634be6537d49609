use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::config::data::{Config, ToolServerConfig};

#[derive(Debug, Clone, PartialEq)]
pub struct ToolServerEntry {
    pub name: String,
    pub config: ToolServerConfig,
}

impl ToolServerEntry {
    pub fn new(name: impl Into<String>, config: ToolServerConfig) -> Self {
        Self {
            name: name.into(),
            config,
        }
    }

    pub fn description(&self) -> &str {
        let description = self.config.description.trim();
        if description.is_empty() {
            "No description"
        } else {
            description
        }
    }
}

/// The enabled tool servers a session may draw from.
#[derive(Debug, Clone, Default)]
pub struct ToolServerCatalogue {
    servers: Vec<ToolServerEntry>,
}

impl ToolServerCatalogue {
    pub fn from_config(config: &Config) -> Self {
        let servers = config
            .enabled_servers()
            .map(|(name, server)| ToolServerEntry::new(name.clone(), server.clone()))
            .collect();
        Self { servers }
    }

    pub fn new(servers: Vec<ToolServerEntry>) -> Self {
        let servers = servers
            .into_iter()
            .filter(|server| server.config.is_enabled())
            .collect();
        Self { servers }
    }

    pub fn servers(&self) -> &[ToolServerEntry] {
        &self.servers
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.servers.iter().map(|server| server.name.as_str()).collect()
    }

    pub fn find_server(&self, name: &str) -> Option<&ToolServerEntry> {
        let name = name.trim();
        self.servers
            .iter()
            .find(|server| server.name.eq_ignore_ascii_case(name))
    }

    /// Catalogue entries whose name matches any of `names`, ignoring case, in catalogue order.
    pub fn matching<'a, I>(&self, names: I) -> Vec<ToolServerEntry>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let wanted: Vec<String> = names
            .into_iter()
            .map(|name| name.trim().to_lowercase())
            .collect();
        self.servers
            .iter()
            .filter(|server| wanted.contains(&server.name.to_lowercase()))
            .cloned()
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ConnectionStatus {
    Connected,
    Failed,
    Pending,
    NeedsAuth,
    Other(String),
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &str {
        match self {
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Failed => "failed",
            ConnectionStatus::Pending => "pending",
            ConnectionStatus::NeedsAuth => "needs-auth",
            ConnectionStatus::Other(status) => status,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ConnectionStatus::Failed)
    }
}

impl From<String> for ConnectionStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "connected" => ConnectionStatus::Connected,
            "failed" => ConnectionStatus::Failed,
            "pending" => ConnectionStatus::Pending,
            "needs-auth" => ConnectionStatus::NeedsAuth,
            _ => ConnectionStatus::Other(value),
        }
    }
}

impl From<ConnectionStatus> for String {
    fn from(value: ConnectionStatus) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection state of one tool server as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolServerStatus {
    pub name: String,
    pub status: ConnectionStatus,
}

impl ToolServerStatus {
    pub fn new(name: impl Into<String>, status: ConnectionStatus) -> Self {
        Self {
            name: name.into(),
            status,
        }
    }
}
