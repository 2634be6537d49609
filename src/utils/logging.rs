//! Plain-text conversation transcript and diagnostic log setup.

use std::error::Error;
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

use crate::core::message::{ChatHistoryEntry, MessageRole};
use crate::mcp::tools::{format_tool_input, ToolName};

pub const LOG_FILTER_ENV: &str = "AGENT_CHAT_LOG";

/// Appends committed chat-history entries to a transcript file.
#[derive(Debug, Default)]
pub struct TranscriptLog {
    file_path: Option<String>,
    is_active: bool,
    /// Number of history entries already considered.
    cursor: usize,
}

impl TranscriptLog {
    pub fn new(log_file: Option<String>) -> Result<Self, Box<dyn Error>> {
        let mut log = TranscriptLog::default();
        if let Some(path) = log_file {
            log.set_log_file(path)?;
        }
        Ok(log)
    }

    pub fn set_log_file(&mut self, path: String) -> Result<String, Box<dyn Error>> {
        test_file_access(&path)?;
        self.file_path = Some(path.clone());
        self.is_active = true;
        Ok(format!("Logging enabled to: {path}"))
    }

    pub fn toggle_logging(&mut self, pause_message: &str) -> Result<String, Box<dyn Error>> {
        match &self.file_path {
            Some(path) => {
                let path = path.clone();
                if self.is_active {
                    self.log_message(&format!("## {pause_message}"))?;
                    self.is_active = false;
                    Ok(format!("Logging paused (file: {path})"))
                } else {
                    self.is_active = true;
                    Ok(format!("Logging resumed to: {path}"))
                }
            }
            None => {
                Err("No log file specified. Use /log <filename> to enable logging first.".into())
            }
        }
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn status_string(&self) -> String {
        let name = |path: &str| {
            Path::new(path)
                .file_name()
                .unwrap_or_default()
                .to_string_lossy()
                .into_owned()
        };
        match (&self.file_path, self.is_active) {
            (None, _) => "disabled".to_string(),
            (Some(path), true) => format!("active ({})", name(path)),
            (Some(path), false) => format!("paused ({})", name(path)),
        }
    }

    /// Write history entries committed since the last call.
    ///
    /// A history shorter than what was already seen means the conversation was cleared; the
    /// transcript keeps what it has and continues from the new start.
    pub fn sync(&mut self, history: &[ChatHistoryEntry]) -> Result<(), Box<dyn Error>> {
        if history.len() < self.cursor {
            self.cursor = 0;
        }
        let fresh = &history[self.cursor..];
        self.cursor = history.len();
        for entry in fresh {
            if let Some(text) = format_entry(entry) {
                self.log_message(&text)?;
            }
        }
        Ok(())
    }

    pub fn log_message(&self, content: &str) -> Result<(), Box<dyn Error>> {
        match (&self.file_path, self.is_active) {
            (Some(path), true) => write_to_log(path, content),
            _ => Ok(()),
        }
    }
}

pub fn format_entry(entry: &ChatHistoryEntry) -> Option<String> {
    match entry {
        ChatHistoryEntry::Message { role, content } => match role {
            MessageRole::User => Some(format!("You: {content}")),
            MessageRole::Assistant if content.trim().is_empty() => None,
            MessageRole::Assistant => Some(content.clone()),
            MessageRole::System => Some(format!("## {content}")),
        },
        ChatHistoryEntry::ToolUse(tool) => {
            let name = ToolName::parse(&tool.name);
            let label = match name.server {
                Some(server) => format!("[tool] [{server}] {}", name.tool),
                None => format!("[tool] {}", name.tool),
            };
            Some(format!("{label}\n{}", format_tool_input(&tool.input)))
        }
        ChatHistoryEntry::ToolDenied { name, reason } => {
            Some(format!("[tool denied] {name}: {reason}"))
        }
    }
}

fn write_to_log(path: &str, content: &str) -> Result<(), Box<dyn Error>> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut writer = BufWriter::with_capacity(64 * 1024, file);
    for line in content.lines() {
        writeln!(writer, "{line}")?;
    }
    writeln!(writer)?;
    writer.flush()?;
    Ok(())
}

fn test_file_access(path: &str) -> Result<(), Box<dyn Error>> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.flush()?;
    Ok(())
}

/// Install the global tracing subscriber.
///
/// Diagnostics go to `debug_log` when given. Without one they go to stderr in headless mode and
/// nowhere while the TUI owns the terminal.
pub fn init_tracing(debug_log: Option<&Path>, headless: bool) -> Result<(), Box<dyn Error>> {
    let filter = EnvFilter::try_from_env(LOG_FILTER_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    match debug_log {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
                .map_err(|err| err as Box<dyn Error>)?;
        }
        None if headless => {
            builder
                .with_writer(std::io::stderr)
                .try_init()
                .map_err(|err| err as Box<dyn Error>)?;
        }
        None => {}
    }
    Ok(())
}
