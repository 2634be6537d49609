//! `agent-chat status`: what the configuration offers.

use std::fmt::Write;
use std::path::Path;

use crate::core::config::data::path_display;
use crate::core::config::Config;
use crate::mcp::tools::disallowed_tools;

pub fn format_status(config: &Config, config_path: &Path) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Configuration: {}", path_display(config_path));
    let _ = writeln!(
        out,
        "Model: {} (routing: {})",
        config.model(),
        config.selector_model()
    );
    let _ = writeln!(out, "Backend: {}", config.backend_command());
    let _ = writeln!(out);

    if config.mcp_servers.is_empty() {
        let _ = writeln!(out, "No tool servers configured.");
    } else {
        let width = config.mcp_servers.keys().map(String::len).max().unwrap_or(0);
        let _ = writeln!(out, "Tool servers:");
        for (name, server) in &config.mcp_servers {
            let state = if server.is_enabled() {
                "enabled"
            } else {
                "disabled"
            };
            let _ = writeln!(
                out,
                "  {name:<width$}  {state:<8}  {}",
                server.description.trim()
            );
        }
    }

    if !config.agents.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Agents:");
        for (name, agent) in &config.agents {
            let requires = if agent.mcp_servers.is_empty() {
                String::new()
            } else {
                format!(" (requires: {})", agent.mcp_servers.join(", "))
            };
            let _ = writeln!(out, "  {name}: {}{requires}", agent.description.trim());
        }
    }

    let disallowed = disallowed_tools(config);
    if !disallowed.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Disallowed tools: {}", disallowed.join(", "));
    }
    out
}
