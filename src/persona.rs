//! Persona configuration
//!
//! The companion's identity, system instruction, greeting and voice
//! parameters. The default persona is compiled into the binary; a JSON file
//! with the same shape can replace it.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::llm::Tuning;
use crate::{Error, Result};

/// Persona compiled into the binary
const EMBEDDED_PERSONA: &str = include_str!("../personas/aura.json");

/// Placeholder replaced with the user's callsign in the greeting
const CALLSIGN_PLACEHOLDER: &str = "{callsign}";

/// Identity and behavior of the companion
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Persona {
    /// Semantic version of this persona file
    pub version: String,

    /// Core identity
    pub identity: Identity,

    /// Voice configuration
    #[serde(default)]
    pub voice: Voice,

    /// Behavior and communication style
    pub personality: Personality,

    /// Sampling parameters
    #[serde(default)]
    pub generation: Generation,
}

/// Core identity of the companion
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// Unique identifier
    pub id: String,

    /// Display name
    pub name: String,

    /// Short descriptive phrase
    pub tagline: Option<String>,
}

/// Voice configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Voice {
    /// Hosted text-to-speech settings
    pub tts: Option<TtsConfig>,

    /// Platform speech engine settings
    #[serde(default)]
    pub native: NativeVoiceConfig,
}

/// Hosted TTS configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TtsConfig {
    /// TTS provider
    pub provider: Option<String>,

    /// Voice identifier
    pub voice: Option<String>,

    /// Synthesis model
    pub model: Option<String>,
}

/// Platform speech engine parameters
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NativeVoiceConfig {
    /// Pitch multiplier (1.0 is the engine default)
    #[serde(default = "default_native_pitch")]
    pub pitch: f32,

    /// Rate multiplier (1.0 is the engine default)
    #[serde(default = "default_native_rate")]
    pub rate: f32,
}

impl Default for NativeVoiceConfig {
    fn default() -> Self {
        Self {
            pitch: default_native_pitch(),
            rate: default_native_rate(),
        }
    }
}

/// Behavior and communication style
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Personality {
    /// System instruction, one line per entry
    pub system_prompt: Vec<String>,

    /// Greeting template; `{callsign}` is replaced with the user's callsign
    pub greeting: String,
}

/// Sampling parameters
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Generation {
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_top_p")]
    pub top_p: f32,
}

impl Default for Generation {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            top_p: default_top_p(),
        }
    }
}

const fn default_native_pitch() -> f32 {
    0.8
}

const fn default_native_rate() -> f32 {
    1.0
}

const fn default_temperature() -> f32 {
    0.8
}

const fn default_top_p() -> f32 {
    0.9
}

impl Persona {
    /// Load the persona compiled into the binary
    ///
    /// # Errors
    ///
    /// Returns error if the embedded JSON is invalid
    pub fn embedded() -> Result<Self> {
        Self::from_json(EMBEDDED_PERSONA)
    }

    /// Load a persona from a JSON file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let persona = Self::from_json(&json)?;
        tracing::info!(path = %path.display(), persona = persona.name(), "loaded persona file");
        Ok(persona)
    }

    fn from_json(json: &str) -> Result<Self> {
        let persona: Self = serde_json::from_str(json)?;
        if persona.personality.system_prompt.is_empty() {
            return Err(Error::Config(format!(
                "persona {} has no system prompt",
                persona.identity.id
            )));
        }
        Ok(persona)
    }

    /// Get the display name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.identity.name
    }

    /// System instruction sent when a chat session opens
    #[must_use]
    pub fn system_prompt(&self) -> String {
        self.personality.system_prompt.join("\n")
    }

    /// Greeting addressed to `callsign`
    #[must_use]
    pub fn greeting(&self, callsign: &str) -> String {
        self.personality
            .greeting
            .replace(CALLSIGN_PLACEHOLDER, callsign)
    }

    /// Hosted TTS voice, if the persona names one
    #[must_use]
    pub fn tts_voice(&self) -> Option<&str> {
        self.voice.tts.as_ref()?.voice.as_deref()
    }

    /// Hosted TTS model, if the persona names one
    #[must_use]
    pub fn tts_model(&self) -> Option<&str> {
        self.voice.tts.as_ref()?.model.as_deref()
    }

    /// Platform speech pitch and rate
    #[must_use]
    pub const fn native_voice(&self) -> NativeVoiceConfig {
        self.voice.native
    }

    /// Chat sampling parameters
    #[must_use]
    pub const fn tuning(&self) -> Tuning {
        Tuning {
            temperature: self.generation.temperature,
            top_p: self.generation.top_p,
        }
    }
}
