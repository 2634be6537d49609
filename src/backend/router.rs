//! Tool-server routing through the Anthropic Messages API with a forced tool call.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::backend::{BackendError, SelectionModel};
use crate::utils::url::construct_api_url;

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
pub const API_VERSION: &str = "2023-06-01";
pub const SELECT_TOOL_NAME: &str = "select_tool_servers";
const MAX_TOKENS: u32 = 512;

#[derive(Serialize)]
struct RoutingMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct RoutingRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<RoutingMessage<'a>>,
    tools: Vec<Value>,
    tool_choice: Value,
}

#[derive(Deserialize)]
struct RoutingResponse {
    #[serde(default)]
    content: Vec<RoutingBlock>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RoutingBlock {
    ToolUse {
        name: String,
        #[serde(default)]
        input: Value,
    },
    #[serde(other)]
    Other,
}

pub struct AnthropicRouter {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl AnthropicRouter {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn request_body<'a>(&'a self, routing_prompt: &'a str, user_message: &'a str) -> RoutingRequest<'a> {
        RoutingRequest {
            model: &self.model,
            max_tokens: MAX_TOKENS,
            system: routing_prompt,
            messages: vec![RoutingMessage {
                role: "user",
                content: user_message,
            }],
            tools: vec![json!({
                "name": SELECT_TOOL_NAME,
                "description": "Select the tool servers needed to answer the user's message.",
                "input_schema": {
                    "type": "object",
                    "properties": {
                        "servers": {
                            "type": "array",
                            "items": {"type": "string"},
                            "description": "Names of the tool servers to connect. Empty when none are needed."
                        }
                    },
                    "required": ["servers"]
                }
            })],
            tool_choice: json!({"type": "tool", "name": SELECT_TOOL_NAME}),
        }
    }
}

#[async_trait::async_trait]
impl SelectionModel for AnthropicRouter {
    async fn choose_servers(
        &self,
        routing_prompt: &str,
        user_message: &str,
    ) -> Result<Vec<String>, BackendError> {
        let url = construct_api_url(&self.base_url, "v1/messages");
        debug!(url = %url, model = %self.model, "Requesting tool-server selection");

        let response = self
            .client
            .post(url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("Content-Type", "application/json")
            .json(&self.request_body(routing_prompt, user_message))
            .send()
            .await
            .map_err(|err| BackendError::Api(format!("Selection request failed: {err}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "<no body>".to_string());
            return Err(BackendError::Api(format!(
                "{} ({status})",
                format_api_error(&error_text)
            )));
        }

        let body: RoutingResponse = response
            .json()
            .await
            .map_err(|err| BackendError::Api(format!("Invalid selection response: {err}")))?;
        Ok(selected_servers(body))
    }
}

fn selected_servers(response: RoutingResponse) -> Vec<String> {
    response
        .content
        .into_iter()
        .find_map(|block| match block {
            RoutingBlock::ToolUse { name, input } if name == SELECT_TOOL_NAME => Some(input),
            _ => None,
        })
        .and_then(|input| input.get("servers").and_then(Value::as_array).cloned())
        .unwrap_or_default()
        .into_iter()
        .filter_map(|value| value.as_str().map(str::to_owned))
        .collect()
}

fn extract_error_summary(value: &Value) -> Option<String> {
    let summary = value
        .pointer("/error/message")
        .and_then(Value::as_str)
        .map(str::to_owned)
        .or_else(|| {
            value.get("error").and_then(|v| match v {
                Value::String(s) => Some(s.to_string()),
                _ => None,
            })
        })
        .or_else(|| value.get("message").and_then(Value::as_str).map(str::to_owned));

    summary.map(|text| text.split_whitespace().collect::<Vec<_>>().join(" "))
}

/// One-line summary of an API error body.
pub fn format_api_error(error_text: &str) -> String {
    let trimmed = error_text.trim();
    if trimmed.is_empty() {
        return "API Error: <empty>".to_string();
    }
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        if let Some(summary) = extract_error_summary(&value).filter(|s| !s.is_empty()) {
            return format!("API Error: {summary}");
        }
    }
    let collapsed = trimmed.split_whitespace().collect::<Vec<_>>().join(" ");
    format!("API Error: {collapsed}")
}
