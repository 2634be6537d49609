pub const DEFAULT_MODEL: &str = "sonnet";
pub const DEFAULT_SELECTOR_MODEL: &str = "claude-haiku-4-5";
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful agent.";
pub const DEFAULT_BACKEND_COMMAND: &str = "claude";
pub const DEFAULT_PERMISSION_MODE: &str = "default";
pub const CONFIG_FILE_NAME: &str = "agent-chat.toml";
pub const STATS_ERROR_PREFIX: &str = "[agent-chat] Error:";
pub const ABORTED_STATS: &str = "Request aborted by user";
