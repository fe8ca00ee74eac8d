use crate::conversation::Conversation;
use crate::events::Message;
use crate::llm::{LlmEvent, LlmRequest, ResponseStreamer};
use crate::prompts;
use crate::storage::StorageManager;
use crate::streaming::StreamAccumulator;
use anyhow::{anyhow, Result};
use tokio::sync::mpsc;

/// Why a submission was not started
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Input was empty or whitespace only
    Empty,
    /// Another exchange is still in flight
    Busy,
}

/// Result of a submission attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Rejected(Rejection),
    /// Streaming started; drive it with `next_stream_event`
    Started,
    /// Accepted, but the request could not be made
    Failed,
}

impl SubmitOutcome {
    /// Whether the input was consumed (the composer should be cleared).
    pub fn accepted(&self) -> bool {
        !matches!(self, SubmitOutcome::Rejected(_))
    }
}

/// Progress of the in-flight exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamProgress {
    Fragment(String),
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy)]
enum FailureKind {
    Configuration,
    Transport,
}

impl FailureKind {
    fn as_str(self) -> &'static str {
        match self {
            FailureKind::Configuration => "configuration",
            FailureKind::Transport => "transport",
        }
    }
}

struct InFlight {
    placeholder_id: String,
    accumulator: StreamAccumulator,
    events: mpsc::Receiver<LlmEvent>,
}

/// Owns the conversation and drives one exchange at a time
pub struct ChatOrchestrator<S> {
    streamer: S,
    storage: StorageManager,
    conversation: Conversation,
    assistant_name: String,
    in_flight: Option<InFlight>,
}

impl<S: ResponseStreamer> ChatOrchestrator<S> {
    /// Load the stored assistant name and greet with it.
    pub fn new(streamer: S, storage: StorageManager) -> Self {
        let assistant_name = storage.load_assistant_name();
        let conversation = Conversation::with_greeting(Message::model(
            prompts::greeting(&assistant_name),
            &assistant_name,
        ));

        Self {
            streamer,
            storage,
            conversation,
            assistant_name,
            in_flight: None,
        }
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn assistant_name(&self) -> &str {
        &self.assistant_name
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Id of the message currently receiving fragments.
    pub fn placeholder_id(&self) -> Option<&str> {
        self.in_flight.as_ref().map(|f| f.placeholder_id.as_str())
    }

    /// Submit user input and start streaming the reply.
    pub fn submit(&mut self, input: &str) -> SubmitOutcome {
        let user_text = input.trim();
        if user_text.is_empty() {
            return SubmitOutcome::Rejected(Rejection::Empty);
        }
        if self.is_busy() {
            tracing::debug!("Submission ignored while a reply is streaming");
            return SubmitOutcome::Rejected(Rejection::Busy);
        }

        // The new utterance travels separately from the prior turns.
        let request = LlmRequest::for_exchange(
            user_text,
            self.conversation.messages(),
            &self.assistant_name,
        );

        if let Err(e) = self.conversation.append(Message::user(user_text)) {
            tracing::error!("Failed to record user message: {:#}", e);
            return SubmitOutcome::Failed;
        }

        let placeholder = Message::model("", &self.assistant_name);
        let placeholder_id = placeholder.id.clone();
        if let Err(e) = self.conversation.append(placeholder) {
            tracing::error!("Failed to add reply placeholder: {:#}", e);
            return SubmitOutcome::Failed;
        }

        match self.streamer.stream_response(request) {
            Ok(events) => {
                self.in_flight = Some(InFlight {
                    placeholder_id,
                    accumulator: StreamAccumulator::new(),
                    events,
                });
                SubmitOutcome::Started
            }
            Err(e) => {
                self.record_failure(FailureKind::Configuration, &e);
                SubmitOutcome::Failed
            }
        }
    }

    /// Wait for the next event of the in-flight exchange and apply it.
    ///
    /// Returns `None` when nothing is in flight. Cancel-safe: the only await
    /// is the channel receive, and state changes happen after it resolves.
    pub async fn next_stream_event(&mut self) -> Option<StreamProgress> {
        let in_flight = self.in_flight.as_mut()?;
        let event = in_flight.events.recv().await;
        Some(self.apply_event(event))
    }

    /// Drive the in-flight exchange until it completes or fails,
    /// handing each fragment to `on_fragment` as it lands.
    pub async fn run_to_completion<F>(&mut self, mut on_fragment: F) -> Option<StreamProgress>
    where
        F: FnMut(&str),
    {
        while let Some(progress) = self.next_stream_event().await {
            match progress {
                StreamProgress::Fragment(fragment) => on_fragment(&fragment),
                done => return Some(done),
            }
        }
        None
    }

    fn apply_event(&mut self, event: Option<LlmEvent>) -> StreamProgress {
        match event {
            Some(LlmEvent::TextDelta(fragment)) if fragment.is_empty() => {
                StreamProgress::Fragment(fragment)
            }
            Some(LlmEvent::TextDelta(fragment)) => {
                if let Some(in_flight) = self.in_flight.as_mut() {
                    let text = in_flight.accumulator.push_delta(&fragment);
                    if let Err(e) = self.conversation.replace_text(&in_flight.placeholder_id, text) {
                        // The conversation was cleared mid-stream.
                        tracing::debug!("Dropping fragment: {:#}", e);
                    }
                }
                StreamProgress::Fragment(fragment)
            }
            Some(LlmEvent::StreamComplete) => {
                if let Some(in_flight) = self.in_flight.take() {
                    if in_flight.accumulator.is_empty() {
                        tracing::warn!("Reply completed without any text");
                    }
                    tracing::info!(
                        fragments = in_flight.accumulator.fragment_count(),
                        chars = in_flight.accumulator.text().chars().count(),
                        "Reply complete"
                    );
                }
                StreamProgress::Completed
            }
            Some(LlmEvent::Error(message)) => {
                self.record_failure(FailureKind::Transport, &anyhow!(message));
                StreamProgress::Failed
            }
            None => {
                let error = anyhow!("Stream ended without completing");
                self.record_failure(FailureKind::Transport, &error);
                StreamProgress::Failed
            }
        }
    }

    /// Keep whatever partial text arrived, then apologise.
    fn record_failure(&mut self, kind: FailureKind, error: &anyhow::Error) {
        self.in_flight = None;
        tracing::error!(kind = kind.as_str(), "Exchange failed: {:#}", error);

        let apology = Message::model(prompts::APOLOGY, &self.assistant_name);
        if let Err(e) = self.conversation.append(apology) {
            tracing::error!("Failed to add apology: {:#}", e);
        }
    }

    /// Change the assistant name, persist it and announce it.
    ///
    /// Returns the name actually stored after trimming and capping.
    pub fn rename_assistant(&mut self, raw: &str) -> Result<String> {
        let name = prompts::normalize_name(raw)
            .ok_or_else(|| anyhow!("Der Name darf nicht leer sein."))?;

        self.assistant_name = name.clone();
        if let Err(e) = self.storage.save_assistant_name(&name) {
            tracing::warn!("Failed to persist assistant name: {:#}", e);
        }

        self.conversation
            .append(Message::model(prompts::rename_announcement(&name), &name))?;
        tracing::info!(name = %name, "Assistant renamed");
        Ok(name)
    }

    /// Replace the whole conversation with a fresh greeting.
    pub fn clear_conversation(&mut self) {
        let removed = self.conversation.len();
        self.conversation.reset(Message::model(
            prompts::greeting(&self.assistant_name),
            &self.assistant_name,
        ));
        tracing::info!(removed, "Conversation cleared");
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::events::Role;
    use std::sync::{Arc, Mutex};

    /// Replays a fixed list of events and records every request.
    #[derive(Clone, Default)]
    pub(crate) struct ScriptedStreamer {
        pub script: Vec<LlmEvent>,
        pub refuse: bool,
        pub requests: Arc<Mutex<Vec<LlmRequest>>>,
    }

    impl ScriptedStreamer {
        pub fn replying(fragments: &[&str]) -> Self {
            let mut script: Vec<_> = fragments
                .iter()
                .map(|f| LlmEvent::TextDelta(f.to_string()))
                .collect();
            script.push(LlmEvent::StreamComplete);
            Self { script, ..Self::default() }
        }

        pub fn calls(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    impl ResponseStreamer for ScriptedStreamer {
        fn stream_response(&self, request: LlmRequest) -> Result<mpsc::Receiver<LlmEvent>> {
            if self.refuse {
                return Err(anyhow!("API key is missing"));
            }
            self.requests.lock().unwrap().push(request);

            let (tx, rx) = mpsc::channel(self.script.len().max(1));
            for event in &self.script {
                tx.try_send(event.clone()).unwrap();
            }
            Ok(rx)
        }
    }

    fn orchestrator(streamer: ScriptedStreamer) -> (ChatOrchestrator<ScriptedStreamer>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageManager::new(dir.path());
        (ChatOrchestrator::new(streamer, storage), dir)
    }

    fn texts(chat: &ChatOrchestrator<ScriptedStreamer>) -> Vec<(Role, String)> {
        chat.conversation()
            .messages()
            .iter()
            .map(|m| (m.role, m.text.clone()))
            .collect()
    }

    #[test]
    fn starts_with_greeting_for_stored_name() {
        let dir = tempfile::tempdir().unwrap();
        StorageManager::new(dir.path()).save_assistant_name("Nova").unwrap();

        let chat = ChatOrchestrator::new(ScriptedStreamer::default(), StorageManager::new(dir.path()));
        assert_eq!(chat.assistant_name(), "Nova");
        assert_eq!(
            texts(&chat),
            [(Role::Model, "Hallo! Ich bin Nova. Wie kann ich dir heute helfen?".to_string())]
        );
    }

    #[tokio::test]
    async fn fragments_accumulate_into_placeholder() {
        let streamer = ScriptedStreamer::replying(&["Hal", "lo zurück!"]);
        let (mut chat, _dir) = orchestrator(streamer.clone());

        assert_eq!(chat.submit("  Hallo  "), SubmitOutcome::Started);
        assert!(chat.is_busy());

        assert_eq!(chat.next_stream_event().await, Some(StreamProgress::Fragment("Hal".into())));
        let placeholder = chat.placeholder_id().unwrap().to_string();
        assert_eq!(chat.conversation().get(&placeholder).unwrap().text, "Hal");

        assert_eq!(chat.run_to_completion(|_| {}).await, Some(StreamProgress::Completed));
        assert!(!chat.is_busy());

        let messages = texts(&chat);
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1], (Role::User, "Hallo".to_string()));
        assert_eq!(messages[2], (Role::Model, "Hallo zurück!".to_string()));
        assert_eq!(chat.conversation().messages()[2].id, placeholder);
        assert_eq!(streamer.calls(), 1);
    }

    #[tokio::test]
    async fn final_text_is_ordered_concatenation() {
        let fragments = ["Ein", " ", "län", "gerer", " Text", " ", "mit", " vielen", " Teilen", "."];
        let (mut chat, _dir) = orchestrator(ScriptedStreamer::replying(&fragments));

        chat.submit("Erzähl was");
        chat.run_to_completion(|_| {}).await;

        let last = chat.conversation().last().unwrap();
        assert_eq!(last.text, fragments.concat());
    }

    #[test]
    fn blank_input_is_rejected_without_calling_the_adapter() {
        let streamer = ScriptedStreamer::replying(&["x"]);
        let (mut chat, _dir) = orchestrator(streamer.clone());

        for input in ["", "   ", "\n\t "] {
            assert_eq!(chat.submit(input), SubmitOutcome::Rejected(Rejection::Empty));
        }
        assert_eq!(chat.conversation().len(), 1);
        assert_eq!(streamer.calls(), 0);
    }

    #[test]
    fn second_submission_while_busy_is_ignored() {
        let streamer = ScriptedStreamer::replying(&["a", "b"]);
        let (mut chat, _dir) = orchestrator(streamer.clone());

        assert_eq!(chat.submit("eins"), SubmitOutcome::Started);
        let before = chat.conversation().len();

        let outcome = chat.submit("zwei");
        assert_eq!(outcome, SubmitOutcome::Rejected(Rejection::Busy));
        assert!(!outcome.accepted());
        assert_eq!(chat.conversation().len(), before);
        assert_eq!(streamer.calls(), 1);
    }

    #[test]
    fn history_excludes_the_new_utterance_and_placeholder() {
        let streamer = ScriptedStreamer::replying(&["ok"]);
        let (mut chat, _dir) = orchestrator(streamer.clone());

        chat.submit("Wie heißt du?");

        let requests = streamer.requests.lock().unwrap();
        let request = &requests[0];
        assert_eq!(request.message, "Wie heißt du?");
        assert_eq!(request.history.len(), 1);
        assert_eq!(request.history[0].role, "model");
        assert!(request.system_instruction.contains("Dein Name ist Lumi."));
    }

    #[tokio::test]
    async fn failure_without_fragments_leaves_empty_placeholder_and_apology() {
        let streamer = ScriptedStreamer {
            script: vec![LlmEvent::Error("connection reset".into())],
            ..ScriptedStreamer::default()
        };
        let (mut chat, _dir) = orchestrator(streamer);

        chat.submit("Hallo");
        assert_eq!(chat.run_to_completion(|_| {}).await, Some(StreamProgress::Failed));

        let messages = texts(&chat);
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[2], (Role::Model, String::new()));
        assert_eq!(messages[3], (Role::Model, prompts::APOLOGY.to_string()));
        assert!(!chat.is_busy());
    }

    #[tokio::test]
    async fn failure_after_fragments_keeps_partial_text() {
        let streamer = ScriptedStreamer {
            script: vec![
                LlmEvent::TextDelta("Halb".into()),
                LlmEvent::Error("boom".into()),
            ],
            ..ScriptedStreamer::default()
        };
        let (mut chat, _dir) = orchestrator(streamer);

        chat.submit("Hallo");
        chat.run_to_completion(|_| {}).await;

        let messages = texts(&chat);
        assert_eq!(messages[2].1, "Halb");
        assert_eq!(messages[3].1, prompts::APOLOGY);
    }

    #[tokio::test]
    async fn closed_stream_without_terminal_event_counts_as_failure() {
        let streamer = ScriptedStreamer {
            script: vec![LlmEvent::TextDelta("abgeb".into())],
            ..ScriptedStreamer::default()
        };
        let (mut chat, _dir) = orchestrator(streamer);

        chat.submit("Hallo");
        assert_eq!(chat.run_to_completion(|_| {}).await, Some(StreamProgress::Failed));
        assert_eq!(chat.conversation().last().unwrap().text, prompts::APOLOGY);
        assert!(!chat.is_busy());
    }

    #[test]
    fn missing_credential_fails_immediately() {
        let streamer = ScriptedStreamer {
            refuse: true,
            ..ScriptedStreamer::default()
        };
        let (mut chat, _dir) = orchestrator(streamer);

        let outcome = chat.submit("Hallo");
        assert_eq!(outcome, SubmitOutcome::Failed);
        assert!(outcome.accepted());
        assert!(!chat.is_busy());

        let messages = texts(&chat);
        assert_eq!(messages[1], (Role::User, "Hallo".to_string()));
        assert_eq!(messages[2], (Role::Model, String::new()));
        assert_eq!(messages[3], (Role::Model, prompts::APOLOGY.to_string()));
    }

    #[tokio::test]
    async fn rename_applies_to_next_instruction_only() {
        let streamer = ScriptedStreamer::replying(&["ok"]);
        let (mut chat, dir) = orchestrator(streamer.clone());

        chat.submit("Hallo");
        chat.run_to_completion(|_| {}).await;

        assert_eq!(chat.rename_assistant("  Nova ").unwrap(), "Nova");
        assert_eq!(StorageManager::new(dir.path()).load_assistant_name(), "Nova");

        let messages = chat.conversation().messages();
        assert_eq!(messages[0].label(), "Lumi");
        assert_eq!(messages[2].label(), "Lumi");
        let announcement = chat.conversation().last().unwrap();
        assert_eq!(announcement.text, "Alles klar! Du kannst mich ab jetzt \"Nova\" nennen.");
        assert_eq!(announcement.label(), "Nova");

        chat.submit("Wer bist du?");
        let requests = streamer.requests.lock().unwrap();
        assert!(requests[0].system_instruction.contains("Dein Name ist Lumi."));
        assert!(requests[1].system_instruction.contains("Dein Name ist Nova."));
    }

    #[test]
    fn blank_rename_is_refused() {
        let (mut chat, _dir) = orchestrator(ScriptedStreamer::default());
        assert!(chat.rename_assistant("   ").is_err());
        assert_eq!(chat.assistant_name(), "Lumi");
        assert_eq!(chat.conversation().len(), 1);
    }

    #[tokio::test]
    async fn rename_during_stream_does_not_cancel_it() {
        let (mut chat, _dir) = orchestrator(ScriptedStreamer::replying(&["Hal", "lo"]));

        chat.submit("Hallo");
        let placeholder = chat.placeholder_id().unwrap().to_string();
        chat.rename_assistant("Nova").unwrap();
        assert!(chat.is_busy());

        assert_eq!(chat.run_to_completion(|_| {}).await, Some(StreamProgress::Completed));
        let reply = chat.conversation().get(&placeholder).unwrap();
        assert_eq!(reply.text, "Hallo");
        assert_eq!(reply.label(), "Lumi");
    }

    #[tokio::test]
    async fn clear_resets_to_single_greeting() {
        let (mut chat, _dir) = orchestrator(ScriptedStreamer::replying(&["Antwort"]));
        chat.submit("Hallo");
        chat.run_to_completion(|_| {}).await;
        chat.rename_assistant("Mira").unwrap();

        chat.clear_conversation();

        assert_eq!(
            texts(&chat),
            [(Role::Model, "Hallo! Ich bin Mira. Wie kann ich dir heute helfen?".to_string())]
        );
    }

    #[tokio::test]
    async fn clear_during_stream_keeps_streaming_without_placeholder() {
        let (mut chat, _dir) = orchestrator(ScriptedStreamer::replying(&["a", "b"]));

        chat.submit("Hallo");
        chat.clear_conversation();
        assert!(chat.is_busy());

        assert_eq!(chat.run_to_completion(|_| {}).await, Some(StreamProgress::Completed));
        assert_eq!(chat.conversation().len(), 1);
        assert!(!chat.is_busy());
    }

    #[tokio::test]
    async fn idle_orchestrator_has_no_stream_events() {
        let (mut chat, _dir) = orchestrator(ScriptedStreamer::default());
        assert_eq!(chat.next_stream_event().await, None);
        assert_eq!(chat.run_to_completion(|_| {}).await, None);
    }
}
