//! Ordered, append-only conversation store.
//!
//! Insertion order is chronological order is rendering order. Messages are
//! never removed one by one; the whole sequence may be replaced by `reset`.

use anyhow::{bail, Result};

use crate::events::{Message, Role};

#[derive(Debug, Clone, Default)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a conversation with a single greeting.
    pub fn with_greeting(greeting: Message) -> Self {
        let mut conversation = Self::new();
        conversation.reset(greeting);
        conversation
    }

    /// Add a message to the end.
    ///
    /// Timestamps are clamped so the sequence never goes backwards.
    pub fn append(&mut self, mut message: Message) -> Result<()> {
        if self.messages.iter().any(|m| m.id == message.id) {
            bail!("Message id '{}' already exists in the conversation", message.id);
        }

        if let Some(last) = self.messages.last() {
            message.timestamp = message.timestamp.max(last.timestamp);
        }

        self.messages.push(message);
        Ok(())
    }

    /// Replace the text of a model message, leaving everything else untouched.
    pub fn replace_text(&mut self, id: &str, text: &str) -> Result<()> {
        let Some(message) = self.messages.iter_mut().find(|m| m.id == id) else {
            bail!("No message with id '{}'", id);
        };

        if message.role != Role::Model {
            bail!("Message '{}' is not a model message", id);
        }

        message.text.clear();
        message.text.push_str(text);
        Ok(())
    }

    /// Discard everything and start over with one greeting.
    pub fn reset(&mut self, greeting: Message) {
        self.messages.clear();
        self.messages.push(greeting);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn get(&self, id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    #[cfg(test)]
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_keeps_insertion_order() {
        let mut conversation = Conversation::new();
        conversation.append(Message::user("eins")).unwrap();
        conversation.append(Message::model("zwei", "Lumi")).unwrap();
        conversation.append(Message::user("drei")).unwrap();

        let texts: Vec<_> = conversation.messages().iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, ["eins", "zwei", "drei"]);
    }

    #[test]
    fn append_rejects_duplicate_ids() {
        let mut conversation = Conversation::new();
        let message = Message::user("Hallo");
        conversation.append(message.clone()).unwrap();

        assert!(conversation.append(message).is_err());
        assert_eq!(conversation.len(), 1);
    }

    #[test]
    fn append_never_moves_time_backwards() {
        let mut conversation = Conversation::new();
        let mut first = Message::user("später");
        first.timestamp = 2_000;
        let mut second = Message::user("früher");
        second.timestamp = 1_000;

        conversation.append(first).unwrap();
        conversation.append(second).unwrap();

        assert_eq!(conversation.messages()[1].timestamp, 2_000);
    }

    #[test]
    fn replace_text_only_touches_the_target() {
        let mut conversation = Conversation::new();
        let user = Message::user("Frage");
        let placeholder = Message::model("", "Lumi");
        let id = placeholder.id.clone();
        conversation.append(user.clone()).unwrap();
        conversation.append(placeholder.clone()).unwrap();

        conversation.replace_text(&id, "Antwort").unwrap();

        assert_eq!(conversation.messages()[0], user);
        let updated = conversation.get(&id).unwrap();
        assert_eq!(updated.text, "Antwort");
        assert_eq!(updated.timestamp, placeholder.timestamp);
        assert_eq!(updated.speaker, placeholder.speaker);
    }

    #[test]
    fn replace_text_fails_for_unknown_or_user_ids() {
        let mut conversation = Conversation::new();
        let user = Message::user("Frage");
        let id = user.id.clone();
        conversation.append(user).unwrap();

        assert!(conversation.replace_text("missing", "x").is_err());
        assert!(conversation.replace_text(&id, "x").is_err());
        assert_eq!(conversation.messages()[0].text, "Frage");
    }

    #[test]
    fn reset_leaves_only_the_greeting() {
        let mut conversation = Conversation::new();
        conversation.append(Message::user("a")).unwrap();
        conversation.append(Message::model("b", "Lumi")).unwrap();

        conversation.reset(Message::model("Hallo!", "Lumi"));

        assert_eq!(conversation.len(), 1);
        assert_eq!(conversation.messages()[0].text, "Hallo!");
        assert_eq!(conversation.messages()[0].role, Role::Model);
    }
}
