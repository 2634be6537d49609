//! TUI-less "say" command

use std::error::Error;
use std::io::{self, Write};

use tokio::io::{AsyncBufReadExt, BufReader};

use crate::cli::ChatRuntime;
use crate::core::message::{ChatHistoryEntry, MessageRole};
use crate::core::orchestrator::TurnOutcome;
use crate::core::session::{PendingPermission, SessionState};
use crate::mcp::tools::{format_tool_input, ToolName};
use crate::utils::logging::format_entry;

pub async fn run_say(runtime: ChatRuntime, prompt: String) -> Result<(), Box<dyn Error>> {
    let prompt = prompt.trim().to_string();
    if prompt.is_empty() {
        eprintln!("Usage: agent-chat say <prompt>");
        std::process::exit(1);
    }

    let ChatRuntime {
        controller,
        orchestrator,
        ..
    } = runtime;
    let mut revisions = controller.session().subscribe();
    let mut turn = tokio::spawn(async move { orchestrator.run_turn(prompt).await });

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut printer = HeadlessPrinter::default();
    let outcome = loop {
        tokio::select! {
            result = &mut turn => break result?,
            Ok(()) = revisions.changed() => {}
        }

        let state = controller.session().snapshot().await;
        if let Some(pending) = printer.render(&state, &mut io::stdout(), &mut io::stderr())? {
            eprint!("{}", permission_prompt(&pending));
            io::stderr().flush()?;
            // Closed stdin counts as a refusal.
            let answer = stdin.next_line().await?.unwrap_or_else(|| "n".to_string());
            controller.answer(&answer).await;
        }
    };

    let state = controller.session().snapshot().await;
    printer.render(&state, &mut io::stdout(), &mut io::stderr())?;
    if let Some(stats) = &state.stats {
        eprintln!("{stats}");
    }

    match outcome {
        TurnOutcome::Completed => Ok(()),
        _ => std::process::exit(1),
    }
}

fn permission_prompt(pending: &PendingPermission) -> String {
    let name = ToolName::parse(&pending.tool_name);
    let label = match name.server {
        Some(server) => format!("{} from {server}", name.tool),
        None => name.tool.to_string(),
    };
    let input = format_tool_input(&pending.input);
    format!("\nAllow {label}?\n{input}\n[Y/n, or type a redirect] ")
}

/// Writes the reply to stdout as it streams; everything else goes to stderr.
#[derive(Debug, Default)]
struct HeadlessPrinter {
    history_seen: usize,
    /// The part of the live buffer already written.
    printed: String,
    prompted: bool,
}

impl HeadlessPrinter {
    /// Print what changed since the last call. Returns a permission request the first time it
    /// shows up.
    fn render<O: Write, E: Write>(
        &mut self,
        state: &SessionState,
        out: &mut O,
        err: &mut E,
    ) -> io::Result<Option<PendingPermission>> {
        for entry in state.chat_history.iter().skip(self.history_seen) {
            match entry {
                ChatHistoryEntry::Message {
                    role: MessageRole::User,
                    ..
                } => {}
                ChatHistoryEntry::Message {
                    role: MessageRole::Assistant,
                    content,
                } => {
                    let rest = content
                        .strip_prefix(self.printed.as_str())
                        .unwrap_or(content);
                    writeln!(out, "{rest}")?;
                    self.printed.clear();
                }
                other => {
                    if let Some(text) = format_entry(other) {
                        writeln!(err, "{text}")?;
                    }
                }
            }
        }
        self.history_seen = state.chat_history.len();

        // A buffer that was dropped without reaching history starts the next reply afresh.
        let live = &state.current_assistant_message;
        let fresh = match live.strip_prefix(self.printed.as_str()) {
            Some(fresh) => fresh,
            None => live.as_str(),
        };
        if !fresh.is_empty() {
            write!(out, "{fresh}")?;
        }
        self.printed.clone_from(live);
        out.flush()?;

        match &state.pending_permission {
            Some(pending) if !self.prompted => {
                self.prompted = true;
                Ok(Some(pending.clone()))
            }
            Some(_) => Ok(None),
            None => {
                self.prompted = false;
                Ok(None)
            }
        }
    }
}
