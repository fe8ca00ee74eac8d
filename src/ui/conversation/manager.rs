use crate::chat::{ChatOrchestrator, Rejection, StreamProgress, SubmitOutcome};
use crate::llm::ResponseStreamer;
use crate::prompts;
use crate::ui::conversation::{
    get_help_text, ConversationComposer, ConversationHistory, ConversationResult, HistoryView,
    ParsedCommand, SlashCommand,
};
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
    Frame,
};

const SCROLL_STEP: usize = 5;

/// Actions that can be requested by the conversation manager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationAction {
    None,
    Exit,
}

/// Manages the conversation flow and UI components
pub struct ConversationManager<S> {
    orchestrator: ChatOrchestrator<S>,
    composer: ConversationComposer,
    view: HistoryView,
    /// One-line hint shown above the composer
    notice: Option<String>,
    /// Multi-line popup, closed by any key
    overlay: Option<String>,
    confirm_clear: bool,
}

impl<S: ResponseStreamer> ConversationManager<S> {
    pub fn new(orchestrator: ChatOrchestrator<S>) -> Self {
        let name = orchestrator.assistant_name().to_string();
        Self {
            orchestrator,
            composer: ConversationComposer::new(
                prompts::input_placeholder(&name),
                composer_title(&name),
            ),
            view: HistoryView::new(),
            notice: None,
            overlay: None,
            confirm_clear: false,
        }
    }

    pub fn orchestrator(&self) -> &ChatOrchestrator<S> {
        &self.orchestrator
    }

    /// Handle key input
    pub fn handle_key(&mut self, key: KeyEvent) -> ConversationAction {
        if key.kind != KeyEventKind::Press {
            return ConversationAction::None;
        }

        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            return ConversationAction::Exit;
        }

        if self.overlay.take().is_some() {
            self.composer.set_focus(true);
            return ConversationAction::None;
        }

        if self.confirm_clear {
            self.confirm_clear = false;
            self.notice = None;
            if matches!(key.code, KeyCode::Char('j' | 'J' | 'y' | 'Y')) {
                self.orchestrator.clear_conversation();
                self.view.scroll_to_bottom();
            }
            return ConversationAction::None;
        }

        match key.code {
            KeyCode::PageUp => {
                self.view.scroll_up(SCROLL_STEP);
                return ConversationAction::None;
            }
            KeyCode::PageDown => {
                self.view.scroll_down(SCROLL_STEP);
                return ConversationAction::None;
            }
            _ => {}
        }

        match self.composer.handle_key(key) {
            ConversationResult::Submitted(input) => {
                self.submit(&input);
                ConversationAction::None
            }
            ConversationResult::Command(command) => self.handle_slash_command(command),
            ConversationResult::None => ConversationAction::None,
        }
    }

    fn submit(&mut self, input: &str) {
        let outcome = self.orchestrator.submit(input);
        if outcome.accepted() {
            self.composer.clear();
            self.view.scroll_to_bottom();
            self.notice = None;
        }

        if outcome == SubmitOutcome::Rejected(Rejection::Busy) {
            self.notice = Some(format!(
                "{} antwortet noch. Deine Nachricht bleibt im Eingabefeld.",
                self.orchestrator.assistant_name()
            ));
        }
    }

    /// Handle slash commands
    fn handle_slash_command(&mut self, command: ParsedCommand) -> ConversationAction {
        match command.command {
            SlashCommand::Name => {
                match command.argument() {
                    Some(raw) => match self.orchestrator.rename_assistant(raw) {
                        Ok(name) => {
                            self.composer.set_placeholder(prompts::input_placeholder(&name));
                            self.composer.set_title(composer_title(&name));
                            self.view.scroll_to_bottom();
                            self.notice = None;
                        }
                        Err(e) => self.notice = Some(e.to_string()),
                    },
                    None => {
                        self.notice = Some(format!(
                            "Aktueller Name: {}. Ändern mit /name <Name> (max. {} Zeichen).",
                            self.orchestrator.assistant_name(),
                            prompts::MAX_NAME_CHARS
                        ));
                    }
                }
                ConversationAction::None
            }
            SlashCommand::Clear => {
                self.confirm_clear = true;
                self.notice = Some("Möchtest du den Chatverlauf wirklich löschen? (j/n)".to_string());
                ConversationAction::None
            }
            SlashCommand::Help => {
                self.overlay = Some(get_help_text());
                self.composer.set_focus(false);
                ConversationAction::None
            }
            SlashCommand::Bye => ConversationAction::Exit,
        }
    }

    /// Wait for progress of the in-flight reply; pends forever when idle.
    pub async fn next_stream_progress(&mut self) -> StreamProgress {
        match self.orchestrator.next_stream_event().await {
            Some(progress) => progress,
            None => std::future::pending().await,
        }
    }

    pub fn on_stream_progress(&mut self, progress: &StreamProgress) {
        if !matches!(progress, StreamProgress::Fragment(_)) && !self.confirm_clear {
            // A pending "still answering" hint is stale once the reply is done.
            self.notice = None;
        }
    }

    fn typing_indicator(&self) -> Option<String> {
        let placeholder_id = self.orchestrator.placeholder_id()?;
        let still_empty = self
            .orchestrator
            .conversation()
            .get(placeholder_id)
            .map_or(true, |m| m.text.is_empty());
        still_empty.then(|| prompts::typing_indicator(self.orchestrator.assistant_name()))
    }

    /// Render the whole chat screen
    pub fn render(&self, frame: &mut Frame) {
        let area = frame.size();
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1),
                Constraint::Min(3),
                Constraint::Length(1),
                Constraint::Length(self.composer.desired_height()),
            ])
            .split(area);

        let name = self.orchestrator.assistant_name();
        let status = if self.orchestrator.is_busy() {
            Span::styled(prompts::typing_indicator(name), Style::default().fg(Color::Yellow))
        } else {
            Span::styled(format!("{} ist bereit", name), Style::default().fg(Color::Green))
        };
        let header = Line::from(vec![
            Span::styled(
                "Dein KI-Begleiter",
                Style::default().fg(Color::Magenta).add_modifier(Modifier::BOLD),
            ),
            Span::raw("  "),
            status,
        ]);
        frame.render_widget(Paragraph::new(header), chunks[0]);

        let history = ConversationHistory {
            messages: self.orchestrator.conversation().messages(),
            pending_id: self.orchestrator.placeholder_id(),
            typing_indicator: self.typing_indicator(),
            view: &self.view,
        };
        frame.render_widget(history, chunks[1]);

        let footer = match &self.notice {
            Some(notice) => Line::from(Span::styled(notice.clone(), Style::default().fg(Color::Yellow))),
            None => Line::from(Span::styled(
                "KI kann Fehler machen. Bitte überprüfe wichtige Informationen.  /help für Befehle",
                Style::default().fg(Color::DarkGray),
            )),
        };
        frame.render_widget(Paragraph::new(footer), chunks[2]);

        frame.render_widget(&self.composer, chunks[3]);

        if let Some(text) = &self.overlay {
            let popup = centered_rect(area, 70, 12);
            frame.render_widget(Clear, popup);
            frame.render_widget(
                Paragraph::new(text.as_str())
                    .wrap(Wrap { trim: false })
                    .block(Block::default().borders(Borders::ALL).title("Hilfe")),
                popup,
            );
        }
    }
}

fn composer_title(name: &str) -> String {
    format!("Nachricht an {}", name)
}

fn centered_rect(area: Rect, percent_x: u16, height: u16) -> Rect {
    let width = (u32::from(area.width) * u32::from(percent_x) / 100) as u16;
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}
