//! Speech-to-text (STT) processing

use secrecy::{ExposeSecret, SecretString};

use crate::conversation::RecognitionAlternative;
use crate::language::primary_subtag;
use crate::{Error, Result};

/// Response from `OpenAI` Whisper in `verbose_json` format
#[derive(serde::Deserialize)]
struct WhisperResponse {
    text: String,
    #[serde(default)]
    segments: Vec<WhisperSegment>,
}

#[derive(serde::Deserialize)]
struct WhisperSegment {
    avg_logprob: f32,
}

/// Response from Deepgram transcription API
#[derive(serde::Deserialize)]
struct DeepgramResponse {
    results: DeepgramResults,
}

#[derive(serde::Deserialize)]
struct DeepgramResults {
    channels: Vec<DeepgramChannel>,
}

#[derive(serde::Deserialize)]
struct DeepgramChannel {
    alternatives: Vec<DeepgramAlternative>,
}

#[derive(serde::Deserialize)]
struct DeepgramAlternative {
    transcript: String,
    #[serde(default)]
    confidence: f32,
}

/// STT provider backend
#[derive(Clone, Copy, Debug)]
enum SttProvider {
    Whisper,
    Deepgram,
}

/// Transcription result, alternatives ordered best first
#[derive(Debug, Clone, PartialEq)]
pub struct Transcript {
    pub alternatives: Vec<RecognitionAlternative>,
}

impl Transcript {
    /// Best transcript, if any text was recognized
    #[must_use]
    pub fn best(&self) -> Option<&str> {
        self.alternatives
            .first()
            .map(|a| a.transcript.as_str())
            .filter(|t| !t.trim().is_empty())
    }
}

/// Transcribes speech to text
pub struct SpeechToText {
    client: reqwest::Client,
    api_key: SecretString,
    model: String,
    provider: SttProvider,
}

impl SpeechToText {
    /// Create a new STT instance using `OpenAI` Whisper
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new_whisper(api_key: SecretString, model: String) -> Result<Self> {
        Self::new(api_key, model, SttProvider::Whisper)
    }

    /// Create a new STT instance using Deepgram
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new_deepgram(api_key: SecretString, model: String) -> Result<Self> {
        Self::new(api_key, model, SttProvider::Deepgram)
    }

    fn new(api_key: SecretString, model: String, provider: SttProvider) -> Result<Self> {
        if api_key.expose_secret().is_empty() {
            return Err(Error::Config(format!("{provider:?} API key required for STT")));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            provider,
        })
    }

    /// Transcribe WAV audio spoken in `language`
    ///
    /// # Errors
    ///
    /// Returns error if transcription fails
    pub async fn transcribe(&self, audio: &[u8], language: &str) -> Result<Transcript> {
        let language = primary_subtag(language).to_ascii_lowercase();
        match self.provider {
            SttProvider::Whisper => self.transcribe_whisper(audio, &language).await,
            SttProvider::Deepgram => self.transcribe_deepgram(audio, &language).await,
        }
    }

    /// Transcribe using `OpenAI` Whisper
    async fn transcribe_whisper(&self, audio: &[u8], language: &str) -> Result<Transcript> {
        tracing::debug!(audio_bytes = audio.len(), language, "starting Whisper transcription");

        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(audio.to_vec())
                    .file_name("audio.wav")
                    .mime_str("audio/wav")
                    .map_err(|e| Error::Stt(e.to_string()))?,
            )
            .text("model", self.model.clone())
            .text("language", language.to_string())
            .text("response_format", "verbose_json");

        let response = self
            .client
            .post("https://api.openai.com/v1/audio/transcriptions")
            .bearer_auth(self.api_key.expose_secret())
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Whisper request failed");
                e
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Whisper API error");
            return Err(Error::Stt(format!("Whisper API error {status}: {body}")));
        }

        let result: WhisperResponse = response.json().await?;
        let confidence = whisper_confidence(&result.segments);

        tracing::info!(transcript = %result.text, confidence, "transcription complete");
        Ok(Transcript {
            alternatives: vec![RecognitionAlternative {
                transcript: result.text.trim().to_string(),
                confidence,
            }],
        })
    }

    /// Transcribe using Deepgram
    async fn transcribe_deepgram(&self, audio: &[u8], language: &str) -> Result<Transcript> {
        tracing::debug!(audio_bytes = audio.len(), language, "starting Deepgram transcription");

        let url = format!(
            "https://api.deepgram.com/v1/listen?model={}&language={}&punctuate=true",
            urlencoding::encode(&self.model),
            urlencoding::encode(language)
        );

        let response = self
            .client
            .post(&url)
            .header(
                "Authorization",
                format!("Token {}", self.api_key.expose_secret()),
            )
            .header("Content-Type", "audio/wav")
            .body(audio.to_vec())
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Deepgram request failed");
                e
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Deepgram API error");
            return Err(Error::Stt(format!("Deepgram API error {status}: {body}")));
        }

        let result: DeepgramResponse = response.json().await?;
        let transcript = deepgram_transcript(result);

        tracing::info!(transcript = ?transcript.best(), "transcription complete");
        Ok(transcript)
    }
}

/// Mean segment probability, 1.0 when Whisper reports no segments
fn whisper_confidence(segments: &[WhisperSegment]) -> f32 {
    if segments.is_empty() {
        return 1.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let mean = segments.iter().map(|s| s.avg_logprob).sum::<f32>() / segments.len() as f32;
    mean.exp().clamp(0.0, 1.0)
}

fn deepgram_transcript(response: DeepgramResponse) -> Transcript {
    let alternatives = response
        .results
        .channels
        .into_iter()
        .next()
        .map(|c| {
            c.alternatives
                .into_iter()
                .map(|a| RecognitionAlternative {
                    transcript: a.transcript,
                    confidence: a.confidence,
                })
                .collect()
        })
        .unwrap_or_default();
    Transcript { alternatives }
}
