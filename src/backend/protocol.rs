//! Line-delimited JSON messages exchanged with the agent CLI in stream-json mode.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::backend::{BackendEvent, TurnResult};
use crate::core::config::data::AgentConfig;
use crate::core::message::ToolUse;
use crate::mcp::registry::{ToolServerEntry, ToolServerStatus};

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireMessage {
    System {
        #[serde(default)]
        subtype: String,
        #[serde(default)]
        session_id: Option<String>,
        #[serde(default)]
        mcp_servers: Vec<ToolServerStatus>,
    },
    StreamEvent {
        event: Value,
    },
    Assistant {
        message: AssistantMessage,
    },
    Result {
        #[serde(default)]
        subtype: String,
        #[serde(default)]
        is_error: bool,
        #[serde(default)]
        duration_ms: u64,
        #[serde(default)]
        total_cost_usd: f64,
        #[serde(default)]
        num_turns: u32,
    },
    ControlRequest {
        request_id: String,
        request: Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        name: String,
        #[serde(default)]
        input: Map<String, Value>,
    },
    #[serde(other)]
    Other,
}

/// A request the CLI makes of us while a turn is running.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlRequest {
    CanUseTool {
        tool_name: String,
        input: Map<String, Value>,
        suggestions: Vec<Value>,
    },
    Unsupported(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum StreamLine {
    Events(Vec<BackendEvent>),
    Control {
        request_id: String,
        request: ControlRequest,
    },
    Ignored,
}

/// Decode one stdout line.
///
/// With `partial_messages` set, assistant text arrives through `stream_event` deltas and the
/// complete `assistant` message only contributes its tool calls.
pub fn parse_line(line: &str, partial_messages: bool) -> Result<StreamLine, serde_json::Error> {
    let message: WireMessage = serde_json::from_str(line)?;
    let parsed = match message {
        WireMessage::System {
            subtype,
            session_id,
            mcp_servers,
        } if subtype == "init" => match session_id {
            Some(session_id) => StreamLine::Events(vec![BackendEvent::SystemInit {
                session_id,
                servers: mcp_servers,
            }]),
            None => StreamLine::Ignored,
        },
        WireMessage::System { .. } => StreamLine::Ignored,
        WireMessage::StreamEvent { event } => match text_delta(&event) {
            Some(text) if partial_messages => {
                StreamLine::Events(vec![BackendEvent::TextDelta(text.to_string())])
            }
            _ => StreamLine::Ignored,
        },
        WireMessage::Assistant { message } => {
            let events: Vec<BackendEvent> = message
                .content
                .into_iter()
                .filter_map(|block| match block {
                    ContentBlock::Text { text } if !partial_messages => {
                        Some(BackendEvent::TextDelta(text))
                    }
                    ContentBlock::ToolUse { name, input } => {
                        Some(BackendEvent::ToolUse(ToolUse::new(name, input)))
                    }
                    _ => None,
                })
                .collect();
            if events.is_empty() {
                StreamLine::Ignored
            } else {
                StreamLine::Events(events)
            }
        }
        WireMessage::Result {
            subtype,
            is_error,
            duration_ms,
            total_cost_usd,
            num_turns,
        } => StreamLine::Events(vec![BackendEvent::Result(TurnResult {
            subtype,
            is_error,
            duration_ms,
            total_cost_usd,
            num_turns,
        })]),
        WireMessage::ControlRequest {
            request_id,
            request,
        } => StreamLine::Control {
            request_id,
            request: control_request(request),
        },
        WireMessage::Other => StreamLine::Ignored,
    };
    Ok(parsed)
}

fn text_delta(event: &Value) -> Option<&str> {
    if event.get("type").and_then(Value::as_str) != Some("content_block_delta") {
        return None;
    }
    let delta = event.get("delta")?;
    if delta.get("type").and_then(Value::as_str) != Some("text_delta") {
        return None;
    }
    delta.get("text").and_then(Value::as_str)
}

fn control_request(request: Value) -> ControlRequest {
    let subtype = request
        .get("subtype")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    if subtype != "can_use_tool" {
        return ControlRequest::Unsupported(subtype);
    }
    let tool_name = request
        .get("tool_name")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let input = request
        .get("input")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    let suggestions = request
        .get("permission_suggestions")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    ControlRequest::CanUseTool {
        tool_name,
        input,
        suggestions,
    }
}

pub fn user_message(prompt: &str) -> Value {
    json!({
        "type": "user",
        "session_id": "",
        "message": {"role": "user", "content": prompt},
        "parent_tool_use_id": null,
    })
}

pub fn initialize_request(request_id: &str) -> Value {
    json!({
        "type": "control_request",
        "request_id": request_id,
        "request": {"subtype": "initialize", "hooks": null},
    })
}

pub fn control_success(request_id: &str, response: Value) -> Value {
    json!({
        "type": "control_response",
        "response": {
            "subtype": "success",
            "request_id": request_id,
            "response": response,
        },
    })
}

pub fn control_error(request_id: &str, error: &str) -> Value {
    json!({
        "type": "control_response",
        "response": {
            "subtype": "error",
            "request_id": request_id,
            "error": error,
        },
    })
}

/// `--mcp-config` payload for the servers attached to a turn.
pub fn mcp_config(servers: &[ToolServerEntry]) -> Value {
    let mut entries = Map::new();
    for server in servers {
        let config = &server.config;
        let entry = if let Some(url) = &config.url {
            json!({"type": "http", "url": url, "headers": config.headers})
        } else if let Some(command) = &config.command {
            json!({"type": "stdio", "command": command, "args": config.args, "env": config.env})
        } else {
            tracing::warn!(server = %server.name, "Tool server has neither command nor url; skipping");
            continue;
        };
        entries.insert(server.name.clone(), entry);
    }
    json!({ "mcpServers": entries })
}

pub fn agents(agents: &BTreeMap<String, AgentConfig>) -> Value {
    let entries: Map<String, Value> = agents
        .iter()
        .map(|(name, agent)| {
            (
                name.clone(),
                json!({
                    "description": agent.description,
                    "prompt": agent.prompt.clone().unwrap_or_default(),
                }),
            )
        })
        .collect();
    Value::Object(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::data::ToolServerConfig;
    use crate::mcp::registry::ConnectionStatus;

    #[test]
    fn init_message_becomes_system_init() {
        let line = r#"{"type":"system","subtype":"init","session_id":"s-1","mcp_servers":[{"name":"github","status":"connected"},{"name":"slack","status":"failed"}],"tools":[]}"#;
        let parsed = parse_line(line, false).expect("parse");
        assert_eq!(
            parsed,
            StreamLine::Events(vec![BackendEvent::SystemInit {
                session_id: "s-1".into(),
                servers: vec![
                    ToolServerStatus::new("github", ConnectionStatus::Connected),
                    ToolServerStatus::new("slack", ConnectionStatus::Failed),
                ],
            }])
        );
    }

    #[test]
    fn assistant_text_depends_on_partial_mode() {
        let line = r#"{"type":"assistant","message":{"content":[{"type":"text","text":"Hi"},{"type":"tool_use","id":"t1","name":"mcp__github__search","input":{"q":"x"}}]}}"#;

        let StreamLine::Events(full) = parse_line(line, false).expect("parse") else {
            panic!("expected events");
        };
        assert_eq!(full.len(), 2);
        assert_eq!(full[0], BackendEvent::TextDelta("Hi".into()));

        let StreamLine::Events(partial) = parse_line(line, true).expect("parse") else {
            panic!("expected events");
        };
        assert_eq!(partial.len(), 1);
        assert!(matches!(&partial[0], BackendEvent::ToolUse(tool) if tool.name == "mcp__github__search"));
    }

    #[test]
    fn stream_event_text_delta_only_when_partial() {
        let line = r#"{"type":"stream_event","event":{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"He"}}}"#;
        assert_eq!(
            parse_line(line, true).expect("parse"),
            StreamLine::Events(vec![BackendEvent::TextDelta("He".into())])
        );
        assert_eq!(parse_line(line, false).expect("parse"), StreamLine::Ignored);

        let start = r#"{"type":"stream_event","event":{"type":"message_start"}}"#;
        assert_eq!(parse_line(start, true).expect("parse"), StreamLine::Ignored);
    }

    #[test]
    fn result_and_unknown_messages() {
        let line = r#"{"type":"result","subtype":"success","is_error":false,"duration_ms":2500,"total_cost_usd":0.02,"num_turns":2,"result":"ok"}"#;
        let StreamLine::Events(events) = parse_line(line, false).expect("parse") else {
            panic!("expected events");
        };
        let BackendEvent::Result(result) = &events[0] else {
            panic!("expected result");
        };
        assert_eq!(result.duration_ms, 2500);
        assert_eq!(result.num_turns, 2);

        let user = r#"{"type":"user","message":{"content":[]}}"#;
        assert_eq!(parse_line(user, false).expect("parse"), StreamLine::Ignored);
        assert!(parse_line("not json", false).is_err());
    }

    #[test]
    fn control_requests_are_classified() {
        let line = r#"{"type":"control_request","request_id":"r1","request":{"subtype":"can_use_tool","tool_name":"Bash","input":{"command":"ls"},"permission_suggestions":[{"type":"addRules"}]}}"#;
        match parse_line(line, false).expect("parse") {
            StreamLine::Control {
                request_id,
                request:
                    ControlRequest::CanUseTool {
                        tool_name,
                        input,
                        suggestions,
                    },
            } => {
                assert_eq!(request_id, "r1");
                assert_eq!(tool_name, "Bash");
                assert_eq!(input["command"], "ls");
                assert_eq!(suggestions.len(), 1);
            }
            other => panic!("unexpected: {other:?}"),
        }

        let hook = r#"{"type":"control_request","request_id":"r2","request":{"subtype":"hook_callback"}}"#;
        assert!(matches!(
            parse_line(hook, false).expect("parse"),
            StreamLine::Control { request: ControlRequest::Unsupported(subtype), .. } if subtype == "hook_callback"
        ));
    }

    #[test]
    fn mcp_config_covers_stdio_and_http_servers() {
        let servers = vec![
            ToolServerEntry::new(
                "github",
                ToolServerConfig {
                    command: Some("bunx".into()),
                    args: vec!["mcp-remote".into()],
                    ..ToolServerConfig::default()
                },
            ),
            ToolServerEntry::new(
                "notion",
                ToolServerConfig {
                    url: Some("https://mcp.notion.com/mcp".into()),
                    ..ToolServerConfig::default()
                },
            ),
            ToolServerEntry::new("broken", ToolServerConfig::default()),
        ];
        let config = mcp_config(&servers);
        assert_eq!(config["mcpServers"]["github"]["command"], "bunx");
        assert_eq!(config["mcpServers"]["notion"]["type"], "http");
        assert!(config["mcpServers"].get("broken").is_none());
    }
}
