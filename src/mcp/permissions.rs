use serde::Serialize;
use serde_json::{Map, Value};

use crate::mcp::tools::ToolName;

pub const DENIED_BY_USER: &str = "User denied permission";
pub const DENIED_BY_CONFIG: &str = "Tool is disallowed by configuration";

/// Answer handed back to the backend for one tool authorization request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "behavior", rename_all = "lowercase")]
pub enum PermissionDecision {
    Allow {
        #[serde(rename = "updatedInput")]
        updated_input: Map<String, Value>,
        #[serde(rename = "updatedPermissions", skip_serializing_if = "Option::is_none")]
        updated_permissions: Option<Vec<Value>>,
    },
    Deny {
        message: String,
        interrupt: bool,
    },
}

impl PermissionDecision {
    pub fn deny(message: impl Into<String>) -> Self {
        PermissionDecision::Deny {
            message: message.into(),
            interrupt: true,
        }
    }

    pub fn is_allow(&self) -> bool {
        matches!(self, PermissionDecision::Allow { .. })
    }
}

/// How a typed reply to a permission prompt is read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionReply {
    Allow,
    Deny,
    /// Free text: deny the tool and hand the text, as typed, to the agent instead.
    Redirect(String),
}

impl PermissionReply {
    pub fn classify(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "" | "y" | "yes" | "allow" => PermissionReply::Allow,
            "n" | "no" | "deny" => PermissionReply::Deny,
            _ => PermissionReply::Redirect(raw.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct PermissionRule {
    #[serde(rename = "toolName")]
    tool_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct PermissionRuleUpdate {
    #[serde(rename = "type")]
    kind: &'static str,
    rules: Vec<PermissionRule>,
    behavior: &'static str,
    destination: &'static str,
}

/// Session-scoped allow rule for a single tool-server tool; `None` for built-in tools.
pub fn session_allow_rule(tool_name: &str) -> Option<Value> {
    if !ToolName::parse(tool_name).is_server_tool() {
        return None;
    }
    let update = PermissionRuleUpdate {
        kind: "addRules",
        rules: vec![PermissionRule {
            tool_name: tool_name.to_string(),
        }],
        behavior: "allow",
        destination: "session",
    };
    serde_json::to_value(update).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn classify_reads_the_decision_table() {
        for allow in ["", "YES", " y ", "allow", "Y"] {
            assert_eq!(PermissionReply::classify(allow), PermissionReply::Allow);
        }
        for deny in ["no", "N", "deny", "  No  "] {
            assert_eq!(PermissionReply::classify(deny), PermissionReply::Deny);
        }
        assert_eq!(
            PermissionReply::classify("please use python instead"),
            PermissionReply::Redirect("please use python instead".into())
        );
        assert_eq!(
            PermissionReply::classify("  use python,\n  not bash "),
            PermissionReply::Redirect("  use python,\n  not bash ".into())
        );
    }

    #[test]
    fn allow_serializes_in_backend_shape() {
        let mut input = Map::new();
        input.insert("path".into(), json!("/tmp"));
        let decision = PermissionDecision::Allow {
            updated_input: input,
            updated_permissions: None,
        };
        let value = serde_json::to_value(&decision).expect("serialize");
        assert_eq!(value, json!({"behavior": "allow", "updatedInput": {"path": "/tmp"}}));
    }

    #[test]
    fn deny_serializes_with_interrupt() {
        let value = serde_json::to_value(PermissionDecision::deny("nope")).expect("serialize");
        assert_eq!(
            value,
            json!({"behavior": "deny", "message": "nope", "interrupt": true})
        );
    }

    #[test]
    fn session_rule_only_for_server_tools() {
        assert_eq!(session_allow_rule("Bash"), None);
        let rule = session_allow_rule("mcp__github__search").expect("rule");
        assert_eq!(
            rule,
            json!({
                "type": "addRules",
                "rules": [{"toolName": "mcp__github__search"}],
                "behavior": "allow",
                "destination": "session"
            })
        );
    }
}
