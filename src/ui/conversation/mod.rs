//! Conversation UI components for chat interface

pub mod commands;
pub mod composer;
pub mod history;
pub mod manager;

pub use commands::{get_help_text, ParsedCommand, SlashCommand};
pub use composer::{ConversationComposer, ConversationResult};
pub use history::{ConversationHistory, HistoryView};
pub use manager::{ConversationAction, ConversationManager};
