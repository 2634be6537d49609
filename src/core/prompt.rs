//! System prompt assembly for a turn.

use std::collections::BTreeSet;

use chrono::NaiveDate;

use crate::mcp::registry::{ToolServerEntry, ToolServerStatus};

#[derive(Debug, Clone)]
pub struct SystemPromptParts<'a> {
    pub date: NaiveDate,
    pub additional: Option<&'a str>,
    pub statuses: &'a [ToolServerStatus],
    pub selected: &'a BTreeSet<String>,
    pub base: &'a str,
    pub active_servers: &'a [ToolServerEntry],
}

pub fn build_system_prompt(parts: &SystemPromptParts<'_>) -> String {
    let mut sections: Vec<String> = Vec::new();
    sections.push(format!("Current date: {}", parts.date.format("%A, %B %-d, %Y")));

    if let Some(additional) = parts.additional.map(str::trim).filter(|s| !s.is_empty()) {
        sections.push(additional.to_string());
    }

    let (failed, connected): (Vec<&ToolServerStatus>, Vec<&ToolServerStatus>) = parts
        .statuses
        .iter()
        .partition(|server| server.status.is_failed());
    if !connected.is_empty() {
        sections.push(format!(
            "Connected tool servers: {}",
            join_names(connected.iter().map(|s| s.name.as_str()))
        ));
    }
    if !failed.is_empty() {
        sections.push(format!(
            "Unavailable tool servers (failed to connect): {}",
            join_names(failed.iter().map(|s| s.name.as_str()))
        ));
    }
    if !parts.selected.is_empty() {
        sections.push(format!(
            "Tool servers selected for this conversation: {}",
            join_names(parts.selected.iter().map(String::as_str))
        ));
    }

    let base = parts.base.trim();
    if !base.is_empty() {
        sections.push(base.to_string());
    }

    for server in parts.active_servers {
        if let Some(appendix) = server.config.instruction_appendix() {
            sections.push(format!("# {} tool server\n\n{appendix}", server.name));
        }
    }

    sections.join("\n\n")
}

fn join_names<'a>(names: impl Iterator<Item = &'a str>) -> String {
    names.collect::<Vec<_>>().join(", ")
}
