pub mod conversation;
pub mod tui;

use crate::chat::{ChatOrchestrator, StreamProgress};
use crate::config::Config;
use crate::events::TuiEvent;
use crate::llm::LlmClient;
use crate::storage::StorageManager;
use anyhow::Result;
use conversation::{ConversationAction, ConversationManager};
use tui::{EventHandler, Tui};

/// What woke the chat loop
enum Step {
    Terminal(Option<TuiEvent>),
    Stream(StreamProgress),
}

/// Run the interactive chat screen until the user leaves.
pub async fn run_chat(config: Config) -> Result<()> {
    let storage = StorageManager::new(&config.home);
    let client = LlmClient::new(config)?;
    let mut manager = ConversationManager::new(ChatOrchestrator::new(client, storage));

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let result = chat_loop(&mut terminal, &mut manager).await;
    tui::restore()?;

    result
}

async fn chat_loop(terminal: &mut Tui, manager: &mut ConversationManager<LlmClient>) -> Result<()> {
    let mut events = EventHandler::new();

    loop {
        terminal.draw(|frame| manager.render(frame))?;

        // Both branches are cancel-safe; a dropped stream wait loses no event.
        let step = tokio::select! {
            event = events.next() => Step::Terminal(event),
            progress = manager.next_stream_progress() => Step::Stream(progress),
        };

        match step {
            Step::Terminal(None) => break,
            Step::Terminal(Some(TuiEvent::Key(key))) => {
                if manager.handle_key(key) == ConversationAction::Exit {
                    break;
                }
            }
            Step::Terminal(Some(TuiEvent::Resize(width, height))) => {
                tracing::debug!(width, height, "Terminal resized");
            }
            Step::Terminal(Some(TuiEvent::Tick)) => {}
            Step::Stream(progress) => manager.on_stream_progress(&progress),
        }
    }

    tracing::info!("Chat closed");
    Ok(())
}
