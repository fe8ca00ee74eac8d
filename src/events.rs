use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Terminal events forwarded to the chat loop
#[derive(Debug, Clone)]
pub enum TuiEvent {
    /// Key press event
    Key(crossterm::event::KeyEvent),

    /// Terminal resize
    Resize(u16, u16),

    /// Periodic redraw for the typing indicator
    Tick,
}

/// Who authored a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

impl Role {
    /// Turn tag used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Model => "model",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single entry of the conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub text: String,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
    /// Assistant name at the time a model message was created
    pub speaker: Option<String>,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role: Role::User,
            text: text.into(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            speaker: None,
        }
    }

    pub fn model(text: impl Into<String>, speaker: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role: Role::Model,
            text: text.into(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            speaker: Some(speaker.to_string()),
        }
    }

    /// Label shown next to the message.
    pub fn label(&self) -> &str {
        match self.role {
            Role::User => "Du",
            Role::Model => self.speaker.as_deref().unwrap_or("KI"),
        }
    }

    pub fn local_time(&self) -> Option<chrono::DateTime<chrono::Local>> {
        chrono::DateTime::from_timestamp_millis(self.timestamp)
            .map(|utc| utc.with_timezone(&chrono::Local))
    }
}
