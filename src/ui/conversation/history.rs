//! Conversation history display component

use crate::events::{Message, Role};
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Widget},
};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

/// Scroll position of the history view, counted in lines from the bottom
#[derive(Debug, Clone, Default)]
pub struct HistoryView {
    scroll_from_bottom: usize,
}

impl HistoryView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scroll_up(&mut self, lines: usize) {
        self.scroll_from_bottom = self.scroll_from_bottom.saturating_add(lines);
    }

    pub fn scroll_down(&mut self, lines: usize) {
        self.scroll_from_bottom = self.scroll_from_bottom.saturating_sub(lines);
    }

    pub fn scroll_to_bottom(&mut self) {
        self.scroll_from_bottom = 0;
    }

    pub fn offset(&self) -> usize {
        self.scroll_from_bottom
    }
}

/// Borrowed snapshot rendered once per frame
pub struct ConversationHistory<'a> {
    pub messages: &'a [Message],
    /// Reply still waiting for its first fragment; hidden while empty
    pub pending_id: Option<&'a str>,
    /// Shown below the last message while a reply is pending
    pub typing_indicator: Option<String>,
    pub view: &'a HistoryView,
}

impl<'a> ConversationHistory<'a> {
    /// All lines of the conversation at the given content width.
    pub fn lines(&self, width: u16) -> Vec<Line<'static>> {
        let mut all_lines: Vec<Line<'static>> = Vec::new();
        for message in self.messages {
            if message.text.is_empty() && self.pending_id == Some(message.id.as_str()) {
                continue;
            }
            all_lines.extend(render_message(message, width));
            all_lines.push(Line::from(""));
        }

        if let Some(indicator) = &self.typing_indicator {
            all_lines.push(Line::from(vec![Span::styled(
                format!("  {}", indicator),
                Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
            )]));
        }

        all_lines
    }
}

impl Widget for ConversationHistory<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let block = Block::default().borders(Borders::ALL).title("Unterhaltung");
        let inner_area = block.inner(area);
        block.render(area, buf);

        let all_lines = self.lines(inner_area.width);

        let height = inner_area.height as usize;
        let total = all_lines.len();
        let max_offset = total.saturating_sub(height);
        let offset = self.view.offset().min(max_offset);
        let start = total.saturating_sub(height + offset);
        let end = (start + height).min(total);

        for (i, line) in all_lines[start..end].iter().enumerate() {
            buf.set_line(inner_area.x, inner_area.y + i as u16, line, inner_area.width);
        }
    }
}

/// Render a single message into lines
fn render_message(message: &Message, width: u16) -> Vec<Line<'static>> {
    let mut lines = Vec::new();

    let time = message
        .local_time()
        .map(|t| t.format("%H:%M").to_string())
        .unwrap_or_default();
    let header_style = match message.role {
        Role::User => Style::default().fg(Color::Blue).add_modifier(Modifier::BOLD),
        Role::Model => Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
    };

    lines.push(Line::from(vec![
        Span::styled(message.label().to_string(), header_style),
        Span::styled(format!("  {}", time), Style::default().fg(Color::DarkGray)),
    ]));

    let content_style = match message.role {
        Role::User => Style::default().fg(Color::Cyan),
        Role::Model => Style::default().fg(Color::White),
    };
    for content_line in wrap_text(&message.text, width.saturating_sub(2) as usize) {
        lines.push(Line::from(vec![
            Span::raw("  "),
            Span::styled(content_line, content_style),
        ]));
    }

    lines
}

/// Wrap text to fit within the given display width.
///
/// Explicit line breaks, leading indentation and inner spacing are kept.
/// Words wider than a line are broken between characters.
pub fn wrap_text(text: &str, width: usize) -> Vec<String> {
    if width == 0 {
        return vec![text.to_string()];
    }

    let mut lines = Vec::new();
    for paragraph in text.split('\n') {
        wrap_paragraph(paragraph, width, &mut lines);
    }
    lines
}

fn wrap_paragraph(paragraph: &str, width: usize, lines: &mut Vec<String>) {
    let mut line = String::new();
    let mut line_width = 0usize;
    let mut gap = String::new();

    for (is_space, run) in whitespace_runs(paragraph) {
        if is_space {
            gap.push_str(run);
            continue;
        }

        let gap_width = gap.width();
        if !line.is_empty() && line_width + gap_width + run.width() > width {
            lines.push(std::mem::take(&mut line));
            line_width = 0;
        } else if line_width + gap_width < width {
            line.push_str(&gap);
            line_width += gap_width;
        }
        gap.clear();

        for ch in run.chars() {
            let ch_width = ch.width().unwrap_or(0);
            if !line.is_empty() && line_width + ch_width > width {
                lines.push(std::mem::take(&mut line));
                line_width = 0;
            }
            line.push(ch);
            line_width += ch_width;
        }
    }

    lines.push(line);
}

/// Split into alternating runs of whitespace and non-whitespace.
fn whitespace_runs(text: &str) -> Vec<(bool, &str)> {
    let mut runs = Vec::new();
    let mut start = 0;
    let mut current: Option<bool> = None;

    for (offset, ch) in text.char_indices() {
        let is_space = ch.is_whitespace();
        match current {
            Some(space) if space != is_space => {
                runs.push((space, &text[start..offset]));
                start = offset;
            }
            _ => {}
        }
        current = Some(is_space);
    }
    if let Some(space) = current {
        runs.push((space, &text[start..]));
    }

    runs
}
