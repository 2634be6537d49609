//! Command-line interface parsing and handling
//!
//! This module parses arguments, checks the environment, wires the orchestrator
//! to its backends and dispatches to the TUI, the headless `say` command or the
//! `status` listing.

pub mod say;
pub mod status;

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;

use crate::backend::{AnthropicRouter, ClaudeCliBackend, FixedSelection, SelectionModel};
use crate::core::config::data::path_display;
use crate::core::config::Config;
use crate::core::controller::ChatController;
use crate::core::handoff::HandoffQueue;
use crate::core::orchestrator::{TurnOrchestrator, TurnSettings};
use crate::core::selector::ServerSelector;
use crate::core::session::SessionHandle;
use crate::mcp::registry::ToolServerCatalogue;
use crate::ui::chat_loop::{run_chat, ChatOptions};
use crate::utils::logging::init_tracing;

pub const API_KEY_ENV: &str = "ANTHROPIC_API_KEY";
pub const BASE_URL_ENV: &str = "ANTHROPIC_BASE_URL";

#[derive(Parser)]
#[command(name = "agent-chat", version)]
#[command(about = "A terminal chat client for a tool-using language-model agent")]
#[command(
    long_about = "agent-chat is a full-screen terminal chat interface for an agent that can call \
external tool servers. Before each turn a small routing model picks the tool servers the message \
needs; servers stay connected for the rest of the session.\n\n\
Environment Variables:\n\
  ANTHROPIC_API_KEY   Key for the routing model (required unless --no-select)\n\
  ANTHROPIC_BASE_URL  Custom API base URL (optional)\n\
  AGENT_CHAT_LOG      Diagnostic log filter (optional, defaults to info)\n\n\
Controls:\n\
  Enter             Send the message, or approve a pending tool call\n\
  Esc               Deny a pending tool call, or interrupt the running turn\n\
  Up/Down           Recall previous messages\n\
  PageUp/PageDown   Scroll the transcript\n\
  Ctrl+C            Quit the application\n\n\
Commands:\n\
  clear, /clear     Start over (the agent session is kept)\n\
  /log <filename>   Enable logging to specified file\n\
  /log              Toggle logging pause/resume\n\
  exit              Quit"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Configuration file (defaults to the platform config dir, then ./agent-chat.toml)
    #[arg(short = 'c', long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Model used by the agent backend
    #[arg(short = 'm', long, global = true, value_name = "MODEL")]
    pub model: Option<String>,

    /// Enable transcript logging to specified file
    #[arg(short = 'l', long, global = true)]
    pub log: Option<String>,

    /// Write diagnostic logs to specified file
    #[arg(long, global = true, value_name = "FILE")]
    pub debug_log: Option<PathBuf>,

    /// Extra text placed near the top of the system prompt
    #[arg(long, global = true, value_name = "TEXT")]
    pub append_system_prompt: Option<String>,

    /// Skip the routing model and offer every enabled tool server
    #[arg(long, global = true)]
    pub no_select: bool,
}

#[derive(Subcommand, Clone)]
pub enum Commands {
    /// Start the chat interface (default)
    Chat,
    /// Send a single prompt and print the reply (no TUI)
    Say {
        /// Prompt to send (can be multiple words)
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        prompt: Vec<String>,
    },
    /// Show the configured tool servers
    Status,
}

/// Variables read from the process environment at startup.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Environment {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
}

/// Collect the environment, reporting every missing required variable at once.
pub fn check_environment<F>(require_api_key: bool, lookup: F) -> Result<Environment, Vec<&'static str>>
where
    F: Fn(&str) -> Option<String>,
{
    let present = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
    let environment = Environment {
        api_key: present(API_KEY_ENV),
        base_url: present(BASE_URL_ENV),
    };

    let mut missing = Vec::new();
    if require_api_key && environment.api_key.is_none() {
        missing.push(API_KEY_ENV);
    }
    if missing.is_empty() {
        Ok(environment)
    } else {
        Err(missing)
    }
}

/// Everything a front end needs to talk to a running conversation.
pub struct ChatRuntime {
    pub controller: ChatController,
    pub orchestrator: Arc<TurnOrchestrator>,
    pub model: String,
}

pub fn build_runtime(args: &Args, config: &Config, environment: &Environment) -> ChatRuntime {
    let catalogue = ToolServerCatalogue::from_config(config);

    let mut settings = TurnSettings::from_config(config)
        .with_additional_prompt(args.append_system_prompt.clone());
    if let Some(model) = args.model.as_deref().filter(|m| !m.trim().is_empty()) {
        settings.model = model.to_string();
    }
    let model = settings.model.clone();

    let selection: Arc<dyn SelectionModel> = match (&environment.api_key, args.no_select) {
        (Some(api_key), false) => {
            let mut router = AnthropicRouter::new(api_key.clone(), config.selector_model());
            if let Some(base_url) = &environment.base_url {
                router = router.with_base_url(base_url.clone());
            }
            Arc::new(router)
        }
        _ => Arc::new(FixedSelection::new(
            catalogue.names().into_iter().map(str::to_string).collect(),
        )),
    };

    let session = SessionHandle::default();
    let queue = Arc::new(HandoffQueue::new());
    let orchestrator = TurnOrchestrator::new(
        session.clone(),
        queue.clone(),
        Arc::new(ClaudeCliBackend::new(config.backend_command())),
        ServerSelector::new(selection),
        catalogue,
        settings,
    );

    ChatRuntime {
        controller: ChatController::new(session, queue),
        orchestrator: Arc::new(orchestrator),
        model,
    }
}

pub fn main() -> Result<(), Box<dyn Error>> {
    tokio::runtime::Runtime::new()?.block_on(async_main())
}

async fn async_main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    let command = args.command.clone().unwrap_or(Commands::Chat);

    let (config, config_path) = match Config::discover(args.config.as_deref()) {
        Ok(found) => found,
        Err(err) => {
            eprintln!("❌ {err}");
            std::process::exit(1);
        }
    };

    if let Commands::Status = command {
        print!("{}", status::format_status(&config, &config_path));
        return Ok(());
    }

    let environment = match check_environment(!args.no_select, |name| std::env::var(name).ok()) {
        Ok(environment) => environment,
        Err(missing) => {
            eprintln!("❌ Missing required environment variables:");
            for name in missing {
                eprintln!("  • {name}");
            }
            eprintln!();
            eprintln!("💡 Set them, or pass --no-select to offer every enabled tool server.");
            std::process::exit(1);
        }
    };

    let headless = matches!(command, Commands::Say { .. });
    init_tracing(args.debug_log.as_deref(), headless)?;
    info!(config = %path_display(&config_path), "Configuration loaded");

    let runtime = build_runtime(&args, &config, &environment);
    match command {
        Commands::Say { prompt } => say::run_say(runtime, prompt.join(" ")).await,
        Commands::Chat | Commands::Status => {
            let orchestrator = runtime.orchestrator.clone();
            let handle = tokio::spawn(async move { orchestrator.run().await });
            let options = ChatOptions {
                title: format!("agent-chat • {}", runtime.model),
                log_file: args.log.clone(),
            };
            run_chat(runtime.controller, handle, options).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup<'a>(vars: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |name| {
            vars.iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| value.to_string())
        }
    }

    #[test]
    fn api_key_is_required_unless_selection_is_skipped() {
        assert_eq!(check_environment(true, lookup(&[])), Err(vec![API_KEY_ENV]));
        assert_eq!(
            check_environment(true, lookup(&[(API_KEY_ENV, "  ")])),
            Err(vec![API_KEY_ENV])
        );
        assert_eq!(
            check_environment(false, lookup(&[])),
            Ok(Environment::default())
        );
    }

    #[test]
    fn base_url_is_picked_up() {
        let environment = check_environment(
            true,
            lookup(&[(API_KEY_ENV, "sk-test"), (BASE_URL_ENV, "http://localhost:8080")]),
        )
        .expect("environment");
        assert_eq!(environment.api_key.as_deref(), Some("sk-test"));
        assert_eq!(
            environment.base_url.as_deref(),
            Some("http://localhost:8080")
        );
    }

    #[test]
    fn say_collects_trailing_words() {
        let args = Args::try_parse_from(["agent-chat", "--no-select", "say", "list", "-my", "issues"])
            .expect("parse");
        assert!(args.no_select);
        match args.command {
            Some(Commands::Say { prompt }) => assert_eq!(prompt, ["list", "-my", "issues"]),
            _ => panic!("expected say"),
        }
    }

    #[test]
    fn chat_is_the_default_command() {
        let args = Args::try_parse_from(["agent-chat", "-m", "opus"]).expect("parse");
        assert!(args.command.is_none());
        assert_eq!(args.model.as_deref(), Some("opus"));
    }

    #[tokio::test]
    async fn model_flag_overrides_config() {
        let args = Args::try_parse_from(["agent-chat", "--model", "opus", "--no-select"])
            .expect("parse");
        let runtime = build_runtime(&args, &Config::default(), &Environment::default());
        assert_eq!(runtime.model, "opus");

        let args = Args::try_parse_from(["agent-chat", "--no-select"]).expect("parse");
        let runtime = build_runtime(&args, &Config::default(), &Environment::default());
        assert_eq!(runtime.model, crate::core::constants::DEFAULT_MODEL);
    }
}
