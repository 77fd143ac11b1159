//! Text-to-speech (TTS) processing

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use super::SpeechSynthesizer;
use crate::{Error, Result};

/// Default hosted endpoint
pub const DEFAULT_BASE_URL: &str = "https://api.elevenlabs.io";

/// Default synthesis model
pub const DEFAULT_MODEL: &str = "eleven_multilingual_v2";

/// Voice used until the user picks another
pub const DEFAULT_VOICE_ID: &str = "x3gYeuNB0kLLYxOZsaSh";

/// A selectable hosted voice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogVoice {
    pub id: &'static str,
    pub name: &'static str,
}

/// Voices offered for selection
pub const VOICE_CATALOG: &[CatalogVoice] = &[
    CatalogVoice {
        id: DEFAULT_VOICE_ID,
        name: "AURA (Default)",
    },
    CatalogVoice {
        id: "pNInz6obpgDQGcFmaJgB",
        name: "Adam (Deep)",
    },
    CatalogVoice {
        id: "21m00Tcm4TlvDq8ikWAM",
        name: "Rachel (Calm)",
    },
    CatalogVoice {
        id: "yD0Zg2jxgfQLY8I2MEHO",
        name: "Arnold (Narrator)",
    },
    CatalogVoice {
        id: "onwK4e9ZLuTAKqWW03F9",
        name: "Daniel (British)",
    },
    CatalogVoice {
        id: "LcfcDJNUP1GQjkzn1xUU",
        name: "Emily (Pleasant)",
    },
    CatalogVoice {
        id: "jsCqWAovK2LkecY7zXl4",
        name: "Freya (Friendly)",
    },
    CatalogVoice {
        id: "pMsXgVXv3BLzUgSXRplE",
        name: "Serena (Expressive)",
    },
];

#[derive(serde::Serialize)]
struct SynthesisRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: VoiceSettings,
}

#[derive(serde::Serialize)]
struct VoiceSettings {
    stability: f32,
    similarity_boost: f32,
}

/// Synthesizes speech through ElevenLabs
pub struct ElevenLabsTts {
    client: reqwest::Client,
    api_key: SecretString,
    model: String,
    base_url: String,
}

impl ElevenLabsTts {
    /// Create a new ElevenLabs synthesizer
    ///
    /// # Errors
    ///
    /// Returns error if the API key is empty
    pub fn new(api_key: SecretString, model: String, base_url: &str) -> Result<Self> {
        if api_key.expose_secret().is_empty() {
            return Err(Error::Config(
                "ElevenLabs API key required for TTS".to_string(),
            ));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, voice_id: &str) -> String {
        format!(
            "{}/v1/text-to-speech/{}",
            self.base_url,
            urlencoding::encode(voice_id)
        )
    }

    fn request<'a>(&'a self, text: &'a str) -> SynthesisRequest<'a> {
        SynthesisRequest {
            text,
            model_id: &self.model,
            voice_settings: VoiceSettings {
                stability: 0.5,
                similarity_boost: 0.75,
            },
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for ElevenLabsTts {
    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<Vec<u8>> {
        tracing::debug!(chars = text.len(), voice = voice_id, "requesting synthesis");

        let response = self
            .client
            .post(self.url(voice_id))
            .header("xi-api-key", self.api_key.expose_secret())
            .header("Accept", "audio/mpeg")
            .json(&self.request(text))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "ElevenLabs API error");
            return Err(Error::Tts(format!("ElevenLabs TTS error {status}: {body}")));
        }

        let audio = response.bytes().await?;
        tracing::debug!(bytes = audio.len(), "synthesis complete");
        Ok(audio.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tts() -> ElevenLabsTts {
        ElevenLabsTts::new(
            SecretString::from("key"),
            DEFAULT_MODEL.to_string(),
            "https://tts.example/",
        )
        .unwrap()
    }

    #[test]
    fn test_empty_key_rejected() {
        let result = ElevenLabsTts::new(
            SecretString::from(""),
            DEFAULT_MODEL.to_string(),
            DEFAULT_BASE_URL,
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_url_includes_voice() {
        assert_eq!(
            tts().url(DEFAULT_VOICE_ID),
            "https://tts.example/v1/text-to-speech/x3gYeuNB0kLLYxOZsaSh"
        );
    }

    #[test]
    fn test_request_body() {
        let tts = tts();
        let body = serde_json::to_value(tts.request("Hello")).unwrap();
        assert_eq!(body["text"], "Hello");
        assert_eq!(body["model_id"], "eleven_multilingual_v2");
        assert!((body["voice_settings"]["stability"].as_f64().unwrap() - 0.5).abs() < 1e-6);
        assert!((body["voice_settings"]["similarity_boost"].as_f64().unwrap() - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_catalog_starts_with_default() {
        assert_eq!(VOICE_CATALOG.len(), 8);
        assert_eq!(VOICE_CATALOG[0].id, DEFAULT_VOICE_ID);
        let mut ids: Vec<_> = VOICE_CATALOG.iter().map(|v| v.id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), VOICE_CATALOG.len());
    }
}
