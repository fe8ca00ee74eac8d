use crate::config::Config;
use crate::events::Message;
use crate::prompts;
use anyhow::{anyhow, bail, Context, Result};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

const STREAM_BUFFER: usize = 1000;

/// Events emitted during LLM streaming
///
/// Every stream ends with exactly one `StreamComplete` or `Error`.
#[derive(Debug, Clone, PartialEq)]
pub enum LlmEvent {
    /// Non-empty text fragment, in receipt order
    TextDelta(String),
    /// Stream completed
    StreamComplete,
    /// Error occurred; fragments already sent stay valid
    Error(String),
}

/// One role-tagged turn in the wire format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    pub role: String,
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Part {
    pub text: String,
}

impl Content {
    fn text(role: &str, text: &str) -> Self {
        Self {
            role: role.to_string(),
            parts: vec![Part { text: text.to_string() }],
        }
    }
}

/// Everything needed for a single exchange
#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub history: Vec<Content>,
    pub message: String,
    pub system_instruction: String,
    pub temperature: f32,
}

impl LlmRequest {
    /// Translate prior messages into turns and build a fresh instruction.
    pub fn for_exchange(user_text: &str, history: &[Message], assistant_name: &str) -> Self {
        let history = history
            .iter()
            .map(|message| Content::text(message.role.as_str(), &message.text))
            .collect();

        Self {
            history,
            message: user_text.to_string(),
            system_instruction: prompts::system_instruction(assistant_name),
            temperature: prompts::TEMPERATURE,
        }
    }

    /// Prior turns followed by the new user turn.
    pub fn contents(&self) -> Vec<Content> {
        let mut contents = self.history.clone();
        contents.push(Content::text("user", &self.message));
        contents
    }
}

/// Source of streamed replies
pub trait ResponseStreamer {
    /// Start one exchange. `Err` means the request could not be made at all.
    fn stream_response(&self, request: LlmRequest) -> Result<mpsc::Receiver<LlmEvent>>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    system_instruction: SystemInstruction,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct SystemInstruction {
    parts: Vec<Part>,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f32,
}

impl From<&LlmRequest> for GenerateContentRequest {
    fn from(request: &LlmRequest) -> Self {
        Self {
            contents: request.contents(),
            system_instruction: SystemInstruction {
                parts: vec![Part { text: request.system_instruction.clone() }],
            },
            generation_config: GenerationConfig {
                temperature: request.temperature,
            },
        }
    }
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    error: Option<ApiError>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
    status: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ApiError,
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.status {
            Some(status) => write!(f, "{} ({})", self.message, status),
            None => f.write_str(&self.message),
        }
    }
}

/// Extract the text carried by one streamed payload.
fn parse_chunk(payload: &str) -> Result<Option<String>> {
    let response: GenerateContentResponse = serde_json::from_str(payload)
        .with_context(|| format!("Malformed stream payload: {}", payload))?;

    if let Some(error) = response.error {
        bail!("Gemini API error: {}", error);
    }

    let text: String = response
        .candidates
        .first()
        .and_then(|candidate| candidate.content.as_ref())
        .map(|content| {
            content
                .parts
                .iter()
                .filter_map(|part| part.text.as_deref())
                .collect()
        })
        .unwrap_or_default();

    Ok((!text.is_empty()).then_some(text))
}

fn describe_http_error(status: reqwest::StatusCode, body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => format!("Gemini API error {}: {}", status, envelope.error),
        Err(_) if body.trim().is_empty() => format!("Gemini API error {}", status),
        Err(_) => format!("Gemini API error {}: {}", status, body.trim()),
    }
}

/// Incremental Server-Sent Events decoder
///
/// Bytes are buffered until a full line is available, so multi-byte
/// characters split across network chunks survive.
#[derive(Debug, Default)]
struct SseDecoder {
    buffer: Vec<u8>,
    data_lines: Vec<String>,
}

impl SseDecoder {
    /// Feed raw bytes, returning every event payload completed by them.
    fn push(&mut self, bytes: &[u8]) -> Result<Vec<String>> {
        self.buffer.extend_from_slice(bytes);

        let mut payloads = Vec::new();
        while let Some(newline_pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline_pos).collect();
            if let Some(payload) = self.process_line(&line[..line.len() - 1])? {
                payloads.push(payload);
            }
        }

        Ok(payloads)
    }

    /// Flush a trailing line without newline and any pending event.
    fn finish(&mut self) -> Result<Option<String>> {
        let rest = std::mem::take(&mut self.buffer);
        let from_line = if rest.is_empty() {
            None
        } else {
            self.process_line(&rest)?
        };

        Ok(from_line.or_else(|| self.dispatch()))
    }

    fn process_line(&mut self, raw: &[u8]) -> Result<Option<String>> {
        let line = std::str::from_utf8(raw).context("Stream is not valid UTF-8")?;
        let line = line.strip_suffix('\r').unwrap_or(line);

        if line.is_empty() {
            return Ok(self.dispatch());
        }

        if let Some(data) = line.strip_prefix("data:") {
            let data = data.strip_prefix(' ').unwrap_or(data);
            self.data_lines.push(data.to_string());
        }

        // Comments and other fields (event, id, retry) carry nothing we use.
        Ok(None)
    }

    fn dispatch(&mut self) -> Option<String> {
        if self.data_lines.is_empty() {
            return None;
        }
        let payload = self.data_lines.join("\n");
        self.data_lines.clear();
        Some(payload)
    }
}

/// LLM client for streaming responses from the Gemini API
#[derive(Clone)]
pub struct LlmClient {
    config: Config,
    client: reqwest::Client,
}

impl LlmClient {
    pub fn new(config: Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { config, client })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        )
    }

    /// Send the request and forward fragments until the body ends.
    async fn stream_gemini(
        client: reqwest::Client,
        url: String,
        api_key: String,
        payload: GenerateContentRequest,
        tx: &mpsc::Sender<LlmEvent>,
    ) -> Result<()> {
        let response = client
            .post(&url)
            .header("x-goog-api-key", api_key)
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await
            .context("Failed to reach the Gemini API")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(anyhow!(describe_http_error(status, &error_text)));
        }

        let mut stream = response.bytes_stream();
        let mut decoder = SseDecoder::default();
        let mut fragments = 0usize;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.context("Connection interrupted while streaming")?;
            for payload in decoder.push(&chunk)? {
                if let Some(text) = parse_chunk(&payload)? {
                    fragments += 1;
                    if tx.send(LlmEvent::TextDelta(text)).await.is_err() {
                        tracing::debug!("Receiver dropped, discarding the rest of the stream");
                        return Ok(());
                    }
                }
            }
        }

        if let Some(payload) = decoder.finish()? {
            if let Some(text) = parse_chunk(&payload)? {
                fragments += 1;
                if tx.send(LlmEvent::TextDelta(text)).await.is_err() {
                    tracing::debug!("Receiver dropped before the final fragment");
                }
            }
        }

        tracing::debug!(fragments, "Gemini stream finished");
        Ok(())
    }
}

impl ResponseStreamer for LlmClient {
    fn stream_response(&self, request: LlmRequest) -> Result<mpsc::Receiver<LlmEvent>> {
        let api_key = self.config.api_key().ok_or_else(|| {
            anyhow!("API key is missing; set the {} environment variable", self.config.api_key_env)
        })?;

        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let client = self.client.clone();
        let url = self.endpoint();
        let payload = GenerateContentRequest::from(&request);

        tracing::info!(
            model = %self.config.model,
            turns = request.history.len(),
            "Starting streamed exchange"
        );

        tokio::spawn(async move {
            let event = match Self::stream_gemini(client, url, api_key, payload, &tx).await {
                Ok(()) => LlmEvent::StreamComplete,
                Err(e) => LlmEvent::Error(format!("{:#}", e)),
            };
            if tx.send(event).await.is_err() {
                tracing::debug!("Receiver dropped before the stream ended");
            }
        });

        Ok(rx)
    }
}
