use std::time::Instant;

use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame,
};
use tui_textarea::TextArea;

use crate::core::message::{ChatHistoryEntry, MessageRole};
use crate::core::session::{PendingPermission, SessionState};
use crate::mcp::tools::{format_tool_input, ToolName};

const PERMISSION_HINT: &str = "Enter=yes, Esc=no, or type a redirect";

/// Everything the frame needs besides the session itself.
pub struct FrameContext<'a> {
    pub title: &'a str,
    pub logging_status: &'a str,
    pub notice: Option<&'a str>,
    pub textarea: &'a TextArea<'static>,
    /// Lines scrolled up from the bottom of the transcript.
    pub scroll_from_bottom: u16,
    pub pulse_start: Instant,
}

pub fn ui(f: &mut Frame, state: &SessionState, ctx: &FrameContext<'_>) {
    let permission_height = state
        .pending_permission
        .as_ref()
        .map(|pending| permission_lines(pending).len() as u16 + 2)
        .unwrap_or(0);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(0),
            Constraint::Length(permission_height),
            Constraint::Length(3),
        ])
        .split(f.area());

    f.render_widget(Paragraph::new(header_line(state, ctx)), chunks[0]);
    render_transcript(f, chunks[1], state, ctx);

    if let Some(pending) = &state.pending_permission {
        let panel = Paragraph::new(permission_lines(pending))
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(Color::Yellow))
                    .title("Permission required"),
            )
            .wrap(Wrap { trim: false });
        f.render_widget(panel, chunks[2]);
    }

    let mut textarea = ctx.textarea.clone();
    let title = if state.pending_permission.is_some() {
        PERMISSION_HINT
    } else if state.is_processing {
        "Type your message (Esc to interrupt, Ctrl+C to quit)"
    } else {
        "Type your message (Enter to send, Up/Down for history, Ctrl+C to quit)"
    };
    textarea.set_block(Block::default().borders(Borders::ALL).title(title));
    f.render_widget(&textarea, chunks[3]);
}

fn header_line(state: &SessionState, ctx: &FrameContext<'_>) -> Line<'static> {
    let mut spans = vec![Span::styled(
        ctx.title.to_string(),
        Style::default().add_modifier(Modifier::BOLD),
    )];
    for server in &state.tool_servers {
        let (marker, color) = if server.status.is_failed() {
            ("✗", Color::Red)
        } else {
            ("✓", Color::Green)
        };
        spans.push(Span::raw(" "));
        spans.push(Span::styled(
            format!("{} {marker}", server.name),
            Style::default().fg(color),
        ));
    }
    spans.push(Span::styled(
        format!(" • Logging: {}", ctx.logging_status),
        Style::default().fg(Color::DarkGray),
    ));
    Line::from(spans)
}

fn render_transcript(f: &mut Frame, area: Rect, state: &SessionState, ctx: &FrameContext<'_>) {
    let mut lines = build_display_lines(state);
    if state.is_processing {
        lines.push(Line::from(Span::styled(
            format!("{} Working...", pulse_symbol(ctx.pulse_start)),
            Style::default().fg(Color::Cyan),
        )));
    }
    if let Some(stats) = &state.stats {
        lines.push(Line::from(Span::styled(
            stats.clone(),
            Style::default().fg(Color::DarkGray),
        )));
    }
    if let Some(notice) = ctx.notice {
        lines.push(Line::from(Span::styled(
            notice.to_string(),
            Style::default().fg(Color::Magenta),
        )));
    }

    let total = wrapped_line_count(&lines, area.width);
    let max_offset = total.saturating_sub(area.height);
    let offset = max_offset.saturating_sub(ctx.scroll_from_bottom);

    let transcript = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .scroll((offset, 0));
    f.render_widget(transcript, area);
}

/// Transcript lines for the committed history plus the live streaming buffer.
pub fn build_display_lines(state: &SessionState) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    for entry in &state.chat_history {
        push_entry(&mut lines, entry);
    }
    if !state.current_assistant_message.is_empty() {
        push_text(&mut lines, &state.current_assistant_message, Style::default());
        lines.push(Line::from(""));
    }
    lines
}

fn push_entry(lines: &mut Vec<Line<'static>>, entry: &ChatHistoryEntry) {
    match entry {
        ChatHistoryEntry::Message { role, content } => match role {
            MessageRole::User => {
                let style = Style::default().fg(Color::Green);
                let mut rows = content.lines();
                let first = rows.next().unwrap_or_default().to_string();
                lines.push(Line::from(vec![
                    Span::styled("You: ", style.add_modifier(Modifier::BOLD)),
                    Span::styled(first, style),
                ]));
                for row in rows {
                    lines.push(Line::from(Span::styled(format!("     {row}"), style)));
                }
            }
            MessageRole::Assistant => push_text(lines, content, Style::default()),
            MessageRole::System => {
                push_text(lines, content, Style::default().fg(Color::DarkGray))
            }
        },
        ChatHistoryEntry::ToolUse(tool) => {
            let name = ToolName::parse(&tool.name);
            let label = match name.server {
                Some(server) => format!("[{server}] {}", name.tool),
                None => name.tool.to_string(),
            };
            lines.push(Line::from(Span::styled(
                label,
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD),
            )));
            if !tool.input.is_empty() {
                push_text(
                    lines,
                    &format_tool_input(&tool.input),
                    Style::default().fg(Color::DarkGray),
                );
            }
        }
        ChatHistoryEntry::ToolDenied { name, reason } => {
            lines.push(Line::from(Span::styled(
                format!("✗ {name} denied: {reason}"),
                Style::default().fg(Color::Red),
            )));
        }
    }
    lines.push(Line::from(""));
}

fn push_text(lines: &mut Vec<Line<'static>>, text: &str, style: Style) {
    for row in text.lines() {
        lines.push(Line::from(Span::styled(row.to_string(), style)));
    }
}

fn permission_lines(pending: &PendingPermission) -> Vec<Line<'static>> {
    let name = ToolName::parse(&pending.tool_name);
    let label = match name.server {
        Some(server) => format!("Allow {} from {server}?", name.tool),
        None => format!("Allow {}?", name.tool),
    };
    let mut lines = vec![Line::from(Span::styled(
        label,
        Style::default().add_modifier(Modifier::BOLD),
    ))];
    push_text(
        &mut lines,
        &format_tool_input(&pending.input),
        Style::default().fg(Color::DarkGray),
    );
    lines
}

fn wrapped_line_count(lines: &[Line<'_>], width: u16) -> u16 {
    if width == 0 {
        return lines.len() as u16;
    }
    let width = width as usize;
    let count: usize = lines
        .iter()
        .map(|line| line.width().max(1).div_ceil(width))
        .sum();
    count.min(u16::MAX as usize) as u16
}

fn pulse_symbol(start: Instant) -> &'static str {
    let elapsed = start.elapsed().as_millis() as f32 / 1000.0;
    let phase = (elapsed * 2.0) % 2.0;
    let intensity = if phase < 1.0 { phase } else { 2.0 - phase };
    if intensity < 0.33 {
        "○"
    } else if intensity < 0.66 {
        "◐"
    } else {
        "●"
    }
}
