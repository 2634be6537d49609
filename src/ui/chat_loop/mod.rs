//! Interactive chat loop.
//!
//! The loop never touches the backend. It renders snapshots of the shared
//! session, forwards key presses to the [`ChatController`], and exits when the
//! orchestrator task ends or the user quits.

mod keys;
mod lifecycle;

use std::error::Error;
use std::time::{Duration, Instant};

use ratatui::crossterm::event::{self, Event, KeyEvent, KeyEventKind};
use tokio::task::JoinHandle;
use tracing::debug;
use tui_textarea::{CursorMove, Input, TextArea};

use crate::core::controller::{ChatController, SubmitOutcome};
use crate::core::session::SessionState;
use crate::ui::history::InputHistory;
use crate::ui::renderer::{ui, FrameContext};
use crate::utils::logging::TranscriptLog;

pub use keys::{map_key, KeyAction};
use lifecycle::{restore_terminal, setup_terminal, ChatTerminal};

const SCROLL_STEP: u16 = 10;
const BUSY_NOTICE: &str = "A turn is still running (Esc to interrupt)";

pub struct ChatOptions {
    pub title: String,
    pub log_file: Option<String>,
}

pub async fn run_chat(
    controller: ChatController,
    orchestrator: JoinHandle<()>,
    options: ChatOptions,
) -> Result<(), Box<dyn Error>> {
    let transcript = TranscriptLog::new(options.log_file)?;
    let mut terminal = setup_terminal()?;

    let mut view = ChatView::new(options.title, transcript);
    let result = view.run(&mut terminal, &controller, &orchestrator).await;

    restore_terminal(&mut terminal)?;
    if !orchestrator.is_finished() {
        orchestrator.abort();
    }
    result
}

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

struct ChatView {
    title: String,
    textarea: TextArea<'static>,
    history: InputHistory,
    transcript: TranscriptLog,
    notice: Option<String>,
    scroll_from_bottom: u16,
    pulse_start: Instant,
}

impl ChatView {
    fn new(title: String, transcript: TranscriptLog) -> Self {
        Self {
            title,
            textarea: TextArea::default(),
            history: InputHistory::default(),
            transcript,
            notice: None,
            scroll_from_bottom: 0,
            pulse_start: Instant::now(),
        }
    }

    async fn run(
        &mut self,
        terminal: &mut ChatTerminal,
        controller: &ChatController,
        orchestrator: &JoinHandle<()>,
    ) -> Result<(), Box<dyn Error>> {
        loop {
            if orchestrator.is_finished() {
                debug!("Orchestrator finished; leaving chat loop");
                return Ok(());
            }

            let state = controller.session().snapshot().await;
            if let Err(err) = self.transcript.sync(&state.chat_history) {
                self.notice = Some(format!("Log error: {err}"));
            }

            let logging_status = self.transcript.status_string();
            terminal.draw(|f| {
                let ctx = FrameContext {
                    title: &self.title,
                    logging_status: &logging_status,
                    notice: self.notice.as_deref(),
                    textarea: &self.textarea,
                    scroll_from_bottom: self.scroll_from_bottom,
                    pulse_start: self.pulse_start,
                };
                ui(f, &state, &ctx);
            })?;

            if !event::poll(Duration::from_millis(50))? {
                continue;
            }
            match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => {
                    if self.handle_key(key, &state, controller).await == Flow::Quit {
                        return Ok(());
                    }
                }
                Event::Paste(text) => {
                    self.textarea.insert_str(text);
                    self.sync_input(controller).await;
                }
                _ => {}
            }
        }
    }

    async fn handle_key(
        &mut self,
        key: KeyEvent,
        state: &SessionState,
        controller: &ChatController,
    ) -> Flow {
        match map_key(&key, state.pending_permission.is_some()) {
            KeyAction::Quit => {
                controller.abort().await;
                return Flow::Quit;
            }
            KeyAction::Submit => {
                let text = self.text();
                if let Some(args) = log_command_args(&text) {
                    self.notice = Some(self.handle_log_command(args));
                    self.set_text("");
                    return Flow::Continue;
                }
                // The draft stays in the box until the turn is over.
                match controller.submit(&text).await {
                    SubmitOutcome::Exit => return Flow::Quit,
                    SubmitOutcome::Ignored => {}
                    SubmitOutcome::Busy => self.notice = Some(BUSY_NOTICE.to_string()),
                    SubmitOutcome::Sent | SubmitOutcome::Cleared => {
                        self.set_text("");
                        self.history.reset();
                        self.scroll_from_bottom = 0;
                        self.notice = None;
                    }
                }
            }
            KeyAction::Answer => {
                controller.answer(&self.text()).await;
                self.set_text("");
            }
            KeyAction::Deny => {
                controller.deny().await;
                self.set_text("");
            }
            KeyAction::Abort => {
                controller.abort().await;
            }
            KeyAction::HistoryPrev => {
                let sent = state.user_messages();
                let current = self.text();
                if let Some(text) = self.history.previous(&sent, &current) {
                    self.set_text(&text);
                }
            }
            KeyAction::HistoryNext => {
                let sent = state.user_messages();
                if let Some(text) = self.history.next(&sent) {
                    self.set_text(&text);
                }
            }
            KeyAction::ScrollUp => {
                self.scroll_from_bottom = self.scroll_from_bottom.saturating_add(SCROLL_STEP);
            }
            KeyAction::ScrollDown => {
                self.scroll_from_bottom = self.scroll_from_bottom.saturating_sub(SCROLL_STEP);
            }
            KeyAction::Edit => {
                self.textarea.input(Input::from(key));
                self.sync_input(controller).await;
            }
        }
        Flow::Continue
    }

    fn handle_log_command(&mut self, args: &str) -> String {
        let result = if args.is_empty() {
            self.transcript.toggle_logging("Logging paused")
        } else {
            self.transcript.set_log_file(args.to_string())
        };
        result.unwrap_or_else(|err| format!("Log error: {err}"))
    }

    fn text(&self) -> String {
        self.textarea.lines().join("\n")
    }

    fn set_text(&mut self, text: &str) {
        self.textarea = if text.is_empty() {
            TextArea::default()
        } else {
            TextArea::from(text.lines().map(str::to_string).collect::<Vec<_>>())
        };
        self.textarea.move_cursor(CursorMove::Bottom);
        self.textarea.move_cursor(CursorMove::End);
    }

    async fn sync_input(&self, controller: &ChatController) {
        let text = self.text();
        controller.session().update(|state| state.input = text).await;
    }
}

/// Arguments of a `/log` command, or `None` for anything else.
fn log_command_args(text: &str) -> Option<&str> {
    let rest = text.trim().strip_prefix("/log")?;
    if rest.is_empty() || rest.starts_with(char::is_whitespace) {
        Some(rest.trim())
    } else {
        None
    }
}
