//! Gemini streaming chat client

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use eventsource_stream::{Event, EventStreamError, Eventsource};
use futures::StreamExt;
use futures::stream::BoxStream;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::{ChatBackend, ChatSession, ChunkStream, Tuning};
use crate::{Error, Result};

/// Default hosted endpoint
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Chat backend for the Gemini generative-language API
#[derive(Clone)]
pub struct GeminiChat {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    model: String,
}

impl GeminiChat {
    #[must_use]
    pub fn new(api_key: SecretString, model: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        }
    }

    fn stream_url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:streamGenerateContent?alt=sse",
            self.base_url,
            urlencoding::encode(&self.model)
        )
    }
}

impl ChatBackend for GeminiChat {
    fn create_session(&self, system_prompt: &str, tuning: Tuning) -> Arc<dyn ChatSession> {
        tracing::debug!(model = %self.model, "opening chat session");
        Arc::new(GeminiSession {
            client: self.client.clone(),
            api_key: self.api_key.clone(),
            url: self.stream_url(),
            system_prompt: system_prompt.to_string(),
            tuning,
            history: Arc::new(Mutex::new(Vec::new())),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<Part>,
}

impl Content {
    fn new(role: Option<&str>, text: &str) -> Self {
        Self {
            role: role.map(ToString::to_string),
            parts: vec![Part {
                text: text.to_string(),
            }],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    system_instruction: Content,
    contents: &'a [Content],
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StreamEvent {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
    error: Option<ApiError>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
}

type History = Arc<Mutex<Vec<Content>>>;

/// One dialogue; history is kept locally and replayed with every request
struct GeminiSession {
    client: reqwest::Client,
    api_key: SecretString,
    url: String,
    system_prompt: String,
    tuning: Tuning,
    history: History,
}

impl GeminiSession {
    fn request_body(&self, contents: &[Content]) -> Result<Vec<u8>> {
        let request = GenerateRequest {
            system_instruction: Content::new(None, &self.system_prompt),
            contents,
            generation_config: GenerationConfig {
                temperature: self.tuning.temperature,
                top_p: self.tuning.top_p,
            },
        };
        Ok(serde_json::to_vec(&request)?)
    }
}

#[async_trait]
impl ChatSession for GeminiSession {
    async fn send_streaming(&self, text: &str) -> Result<ChunkStream> {
        let mut contents = self
            .history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        contents.push(Content::new(Some("user"), text));

        tracing::debug!(turns = contents.len(), "requesting streamed reply");

        let response = self
            .client
            .post(&self.url)
            .header("x-goog-api-key", self.api_key.expose_secret())
            .header("Content-Type", "application/json")
            .body(self.request_body(&contents)?)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Gemini request failed");
                e
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Gemini API error");
            return Err(Error::Generation(format!("Gemini API error {status}: {body}")));
        }

        let state = StreamState {
            events: response.bytes_stream().eventsource().boxed(),
            reply: String::new(),
            user_text: text.to_string(),
            history: Arc::clone(&self.history),
            done: false,
        };

        Ok(futures::stream::unfold(state, next_chunk).boxed())
    }
}

struct StreamState {
    events: BoxStream<'static, std::result::Result<Event, EventStreamError<reqwest::Error>>>,
    reply: String,
    user_text: String,
    history: History,
    done: bool,
}

impl StreamState {
    /// Record the completed exchange so the next request carries it
    fn commit(&mut self) {
        let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        history.push(Content::new(Some("user"), &self.user_text));
        history.push(Content::new(Some("model"), &self.reply));
        tracing::debug!(turns = history.len(), "reply committed to history");
    }
}

async fn next_chunk(mut state: StreamState) -> Option<(Result<String>, StreamState)> {
    if state.done {
        return None;
    }

    loop {
        match state.events.next().await {
            None => {
                state.done = true;
                state.commit();
                return None;
            }
            Some(Err(e)) => {
                tracing::error!(error = %e, "SSE stream error");
                state.done = true;
                return Some((Err(Error::Generation(format!("stream error: {e}"))), state));
            }
            Some(Ok(event)) => match parse_event(&event.data) {
                Ok(Some(text)) => {
                    state.reply.push_str(&text);
                    return Some((Ok(text), state));
                }
                Ok(None) => {}
                Err(e) => {
                    state.done = true;
                    return Some((Err(e), state));
                }
            },
        }
    }
}

/// Extract the text carried by one SSE event
///
/// Returns `None` for events without text (metadata, finish markers).
fn parse_event(data: &str) -> Result<Option<String>> {
    let event: StreamEvent = serde_json::from_str(data)
        .map_err(|e| Error::Generation(format!("malformed stream event: {e}")))?;

    if let Some(error) = event.error {
        return Err(Error::Generation(format!("Gemini stream error: {}", error.message)));
    }
    if let Some(reason) = event.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(Error::Generation(format!("prompt blocked: {reason}")));
    }

    let text: String = event
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    Ok((!text.is_empty()).then_some(text))
}
