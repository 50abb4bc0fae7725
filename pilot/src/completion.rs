use std::time::Duration;

use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};

use crate::sse::{SseDecoder, SseEvent};

pub const DEFAULT_BASE_URL: &str = "https://api.perplexity.ai";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A role-tagged message in a chat-completion request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Body of a `/chat/completions` call.
#[derive(Clone, Debug, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub stream: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FinishReason {
    Complete,
    LengthLimited,
    Error,
}

impl FinishReason {
    /// Map an API `finish_reason` string. Anything but `length` counts as a
    /// normal stop.
    pub fn from_api(reason: &str) -> Self {
        match reason {
            "length" => FinishReason::LengthLimited,
            _ => FinishReason::Complete,
        }
    }
}

/// One ordered piece of a streamed generation.
#[derive(Clone, Debug, PartialEq)]
pub struct GenerationChunk {
    pub delta: String,
    pub is_final: bool,
    pub finish_reason: Option<FinishReason>,
    pub error: Option<String>,
}

impl GenerationChunk {
    pub fn delta(text: impl Into<String>) -> Self {
        Self {
            delta: text.into(),
            is_final: false,
            finish_reason: None,
            error: None,
        }
    }

    pub fn finished(reason: FinishReason) -> Self {
        Self {
            delta: String::new(),
            is_final: true,
            finish_reason: Some(reason),
            error: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            delta: String::new(),
            is_final: true,
            finish_reason: Some(FinishReason::Error),
            error: Some(message.into()),
        }
    }
}

pub type ChunkStream = BoxStream<'static, GenerationChunk>;

#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A hosted chat-completion service.
#[async_trait::async_trait]
pub trait CompletionClient: Send + Sync {
    /// Single-shot completion returning the first choice's message content.
    async fn complete(
        &self,
        api_key: &str,
        request: CompletionRequest,
    ) -> Result<String, CompletionError>;

    /// Streamed completion. The stream is lazy and ends with exactly one
    /// final chunk; failures are reported as a final `FinishReason::Error`
    /// chunk instead of an `Err`.
    fn stream(&self, api_key: &str, request: CompletionRequest) -> ChunkStream;
}

// ─── Wire types ───

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<ResponseChoice>,
}

#[derive(Deserialize)]
struct ResponseChoice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ApiErrorBody {
    Detailed { message: String },
    Plain(String),
}

impl ApiErrorBody {
    fn into_message(self) -> String {
        match self {
            ApiErrorBody::Detailed { message } | ApiErrorBody::Plain(message) => message,
        }
    }
}

/// What one `data:` payload contributes to the stream.
#[derive(Debug, PartialEq)]
pub(crate) enum StreamPayload {
    Delta {
        text: String,
        finish: Option<FinishReason>,
    },
    Failed(String),
}

pub(crate) fn parse_stream_payload(data: &str) -> StreamPayload {
    match serde_json::from_str::<StreamResponse>(data) {
        Ok(response) => {
            let mut text = String::new();
            let mut finish = None;
            for choice in response.choices {
                if let Some(content) = choice.delta.content {
                    text.push_str(&content);
                }
                if let Some(reason) = choice.finish_reason.as_deref() {
                    finish = Some(FinishReason::from_api(reason));
                }
            }
            // Error envelopes also deserialize as an empty StreamResponse.
            if text.is_empty()
                && finish.is_none()
                && let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(data)
            {
                return StreamPayload::Failed(envelope.error.into_message());
            }
            StreamPayload::Delta { text, finish }
        }
        Err(e) => match serde_json::from_str::<ErrorEnvelope>(data) {
            Ok(envelope) => StreamPayload::Failed(envelope.error.into_message()),
            Err(_) => StreamPayload::Failed(format!("malformed stream payload: {e}")),
        },
    }
}

/// The single chunk a stream yields when the request itself is refused.
fn rejected(status: reqwest::StatusCode, body: &str) -> GenerationChunk {
    GenerationChunk::failed(api_error(status, body).to_string())
}

/// Decode an SSE response body into generation chunks.
///
/// Deltas are yielded as they arrive. The last `finish_reason` seen is
/// carried to one closing chunk, emitted on `[DONE]` or when the body ends.
/// A transport error or an error payload ends the stream with a failed chunk.
fn decode_chunks<S, B, E>(body: S) -> ChunkStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    Box::pin(async_stream::stream! {
        let mut body = Box::pin(body);
        let mut decoder = SseDecoder::new();
        let mut finish = None;
        'read: while let Some(next) = body.next().await {
            let data = match next {
                Ok(data) => data,
                Err(e) => {
                    yield GenerationChunk::failed(e.to_string());
                    return;
                }
            };
            for event in decoder.push(data.as_ref()) {
                match event {
                    SseEvent::Done => break 'read,
                    SseEvent::Data(payload) => match parse_stream_payload(&payload) {
                        StreamPayload::Delta { text, finish: reason } => {
                            if !text.is_empty() {
                                yield GenerationChunk::delta(text);
                            }
                            if reason.is_some() {
                                finish = reason;
                            }
                        }
                        StreamPayload::Failed(message) => {
                            tracing::warn!("completion stream reported an error: {message}");
                            yield GenerationChunk::failed(message);
                            return;
                        }
                    },
                }
            }
        }
        if let Some(SseEvent::Data(payload)) = decoder.finish()
            && let StreamPayload::Delta { text, finish: reason } = parse_stream_payload(&payload)
        {
            if !text.is_empty() {
                yield GenerationChunk::delta(text);
            }
            if reason.is_some() {
                finish = reason;
            }
        }
        yield GenerationChunk::finished(finish.unwrap_or(FinishReason::Complete));
    })
}

fn api_error(status: reqwest::StatusCode, body: &str) -> CompletionError {
    let message = serde_json::from_str::<ErrorEnvelope>(body)
        .map(|envelope| envelope.error.into_message())
        .unwrap_or_else(|_| body.trim().to_string());
    CompletionError::Api {
        status: status.as_u16(),
        message,
    }
}

/// OpenAI-compatible chat-completion client over reqwest.
#[derive(Clone)]
pub struct ChatClient {
    http: reqwest::Client,
    base_url: String,
}

impl ChatClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

impl Default for ChatClient {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

#[async_trait::async_trait]
impl CompletionClient for ChatClient {
    async fn complete(
        &self,
        api_key: &str,
        mut request: CompletionRequest,
    ) -> Result<String, CompletionError> {
        request.stream = false;
        let resp = self
            .http
            .post(self.endpoint())
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(api_error(status, &body));
        }

        let parsed: CompletionResponse = serde_json::from_str(&body)?;
        Ok(parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }

    fn stream(&self, api_key: &str, mut request: CompletionRequest) -> ChunkStream {
        request.stream = true;
        let http = self.http.clone();
        let url = self.endpoint();
        let api_key = api_key.to_string();

        Box::pin(async_stream::stream! {
            tracing::debug!(model = %request.model, max_tokens = request.max_tokens, "opening completion stream");
            let resp = match http.post(&url).bearer_auth(&api_key).json(&request).send().await {
                Ok(resp) => resp,
                Err(e) => {
                    yield GenerationChunk::failed(CompletionError::from(e).to_string());
                    return;
                }
            };

            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                yield rejected(status, &body);
                return;
            }

            let body = resp.bytes_stream().map(|next| next.map_err(CompletionError::from));
            let mut chunks = decode_chunks(body);
            while let Some(chunk) = chunks.next().await {
                yield chunk;
            }
        })
    }
}
