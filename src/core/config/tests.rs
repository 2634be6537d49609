use super::data::Config;
use super::io::ConfigError;
use std::fs;
use tempfile::TempDir;

const SAMPLE: &str = r#"
model = "sonnet"
stream = true
disallowed_tools = ["Bash"]
system_prompt_file = "prompts/system.md"

[mcp_servers.github]
description = "GitHub issues, PRs and code search"
command = "bunx"
args = ["mcp-remote", "https://api.githubcopilot.com/mcp/readonly"]
prompt_file = "prompts/github.md"
disallowed_tools = ["create_issue"]

[mcp_servers.notion]
description = "Notion docs and wikis"
url = "https://mcp.notion.com/mcp"
prompt = "Prefer search before fetch."

[mcp_servers.chrome]
description = "Browser automation"
command = "bunx"
enabled = false

[agents.reviewer]
description = "Reviews pull requests"
prompt = "You review code."
mcp_servers = ["github"]
"#;

fn write_sample(dir: &TempDir) -> std::path::PathBuf {
    let prompts = dir.path().join("prompts");
    fs::create_dir_all(&prompts).expect("create prompts dir");
    fs::write(prompts.join("system.md"), "  Be concise.\n").expect("write system prompt");
    fs::write(prompts.join("github.md"), "Use code search first.\n").expect("write github prompt");
    let path = dir.path().join("agent-chat.toml");
    fs::write(&path, SAMPLE).expect("write config");
    path
}

#[test]
fn load_resolves_prompt_files_relative_to_config() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = write_sample(&temp_dir);

    let config = Config::load_from_path(&path).expect("load failed");

    assert_eq!(config.base_system_prompt(), "Be concise.");
    let github = config.get_server("GitHub").expect("github server");
    assert_eq!(github.instruction_appendix(), Some("Use code search first."));
    assert_eq!(
        config.get_server("notion").and_then(|s| s.instruction_appendix()),
        Some("Prefer search before fetch.")
    );
    assert_eq!(config.agents["reviewer"].mcp_servers, vec!["github"]);
}

#[test]
fn enabled_servers_skip_explicitly_disabled_entries() {
    let config: Config = toml::from_str(SAMPLE).expect("parse");
    let names: Vec<&str> = config
        .enabled_servers()
        .map(|(name, _)| name.as_str())
        .collect();
    assert_eq!(names, vec!["github", "notion"]);
}

#[test]
fn defaults_apply_when_fields_are_missing() {
    let config = Config::default();
    assert_eq!(config.model(), "sonnet");
    assert_eq!(config.base_system_prompt(), "You are a helpful agent.");
    assert_eq!(config.backend_command(), "claude");
    assert_eq!(config.permission_mode(), "default");
    assert!(!config.stream_enabled());
}

#[test]
fn discover_reports_every_searched_path_when_missing() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let missing = temp_dir.path().join("nope.toml");

    let err = Config::discover(Some(&missing)).expect_err("expected not found");
    match &err {
        ConfigError::NotFound { searched } => assert_eq!(searched, &vec![missing.clone()]),
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().starts_with("No configuration file found"));
}

#[test]
fn parse_errors_carry_the_config_path() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = temp_dir.path().join("broken.toml");
    fs::write(&path, "model = [").expect("write");

    let err = Config::load_from_path(&path).expect_err("expected parse error");
    assert!(matches!(err, ConfigError::Parse { .. }));
    assert!(err.to_string().contains("broken.toml"));
}

#[test]
fn missing_prompt_file_is_reported() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = temp_dir.path().join("agent-chat.toml");
    fs::write(
        &path,
        "[mcp_servers.github]\ndescription = \"x\"\nprompt_file = \"missing.md\"\n",
    )
    .expect("write");

    let err = Config::load_from_path(&path).expect_err("expected prompt error");
    assert!(matches!(err, ConfigError::PromptFile { .. }));
}
