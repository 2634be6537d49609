//! Naming and display helpers for tool-server tools.
//!
//! Tools exposed through a tool server are qualified as `mcp__<server>__<tool>`.

use serde_json::{Map, Value};

use crate::core::config::data::Config;

pub const QUALIFIED_PREFIX: &str = "mcp";
const SEPARATOR: &str = "__";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolName<'a> {
    pub server: Option<&'a str>,
    pub tool: &'a str,
}

impl<'a> ToolName<'a> {
    pub fn parse(name: &'a str) -> Self {
        let mut parts = name.splitn(3, SEPARATOR);
        if let (Some(QUALIFIED_PREFIX), Some(server), Some(tool)) =
            (parts.next(), parts.next(), parts.next())
        {
            if !server.is_empty() && !tool.is_empty() {
                return Self {
                    server: Some(server),
                    tool,
                };
            }
        }
        Self {
            server: None,
            tool: name,
        }
    }

    pub fn is_server_tool(&self) -> bool {
        self.server.is_some()
    }
}

pub fn qualified_tool_name(server: &str, tool: &str) -> String {
    format!("{QUALIFIED_PREFIX}{SEPARATOR}{server}{SEPARATOR}{tool}")
}

/// Global disallowed tools plus every enabled server's disallowed tools, qualified.
pub fn disallowed_tools(config: &Config) -> Vec<String> {
    let mut tools = config.disallowed_tools.clone();
    for (name, server) in config.enabled_servers() {
        tools.extend(
            server
                .disallowed_tools
                .iter()
                .map(|tool| qualified_tool_name(name, tool)),
        );
    }
    tools
}

pub fn is_disallowed(disallowed: &[String], tool_name: &str) -> bool {
    disallowed.iter().any(|tool| tool == tool_name)
}

/// Render tool input for display. GraphQL-style inputs show their query text as-is.
pub fn format_tool_input(input: &Map<String, Value>) -> String {
    let text = match input.get("query") {
        Some(Value::String(query)) if !query.is_empty() => query.clone(),
        _ => serde_json::to_string_pretty(input).unwrap_or_else(|_| "{}".to_string()),
    };
    text.replace("\\n", "\n").replace("\\t", "  ")
}
