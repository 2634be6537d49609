use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl MessageRole {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::System => "system",
        }
    }

    pub fn is_user(self) -> bool {
        self == MessageRole::User
    }

    pub fn is_assistant(self) -> bool {
        self == MessageRole::Assistant
    }
}

impl AsRef<str> for MessageRole {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl TryFrom<&str> for MessageRole {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "user" => Ok(MessageRole::User),
            "assistant" => Ok(MessageRole::Assistant),
            "system" => Ok(MessageRole::System),
            _ => Err(format!("invalid message role: {value}")),
        }
    }
}

impl TryFrom<String> for MessageRole {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::try_from(value.as_str())
    }
}

impl From<MessageRole> for String {
    fn from(value: MessageRole) -> Self {
        value.as_str().to_string()
    }
}

/// A tool invocation reported by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolUse {
    pub name: String,
    pub input: Map<String, Value>,
}

impl ToolUse {
    pub fn new(name: impl Into<String>, input: Map<String, Value>) -> Self {
        Self {
            name: name.into(),
            input,
        }
    }
}

/// One entry of the conversation transcript, in causal order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatHistoryEntry {
    Message { role: MessageRole, content: String },
    ToolUse(ToolUse),
    ToolDenied { name: String, reason: String },
}

impl ChatHistoryEntry {
    pub fn user(content: impl Into<String>) -> Self {
        ChatHistoryEntry::Message {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        ChatHistoryEntry::Message {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        ChatHistoryEntry::Message {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn role(&self) -> Option<MessageRole> {
        match self {
            ChatHistoryEntry::Message { role, .. } => Some(*role),
            _ => None,
        }
    }

    /// Text of a `Message` entry with the given role.
    pub fn message_content(&self, wanted: MessageRole) -> Option<&str> {
        match self {
            ChatHistoryEntry::Message { role, content } if *role == wanted => Some(content),
            _ => None,
        }
    }
}

impl From<ToolUse> for ChatHistoryEntry {
    fn from(value: ToolUse) -> Self {
        ChatHistoryEntry::ToolUse(value)
    }
}
