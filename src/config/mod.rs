//! Configuration management for the AURA companion
//!
//! Built once at startup and passed explicitly. Precedence is
//! environment > TOML file > persona > defaults.

pub mod file;

use std::path::PathBuf;

use secrecy::SecretString;

use crate::language::{self, DEFAULT_LANGUAGE};
use crate::llm::gemini::DEFAULT_BASE_URL as GEMINI_BASE_URL;
use crate::voice::{DEFAULT_TTS_BASE_URL, DEFAULT_TTS_MODEL, DEFAULT_VOICE_ID};
use crate::{Error, Persona, Result};

use file::AuraConfigFile;

/// Default text generation model
pub const DEFAULT_LLM_MODEL: &str = "gemini-2.5-flash";

/// Companion configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Active persona
    pub persona: Persona,

    /// API keys
    pub api_keys: ApiKeys,

    /// Text generation configuration
    pub llm: LlmConfig,

    /// Voice configuration
    pub voice: VoiceConfig,

    /// Initial conversation language (BCP 47 tag)
    pub language: String,

    /// Directory holding the credential store
    pub data_dir: PathBuf,
}

/// API keys for external services
#[derive(Debug, Clone)]
pub struct ApiKeys {
    /// Text generation key (`API_KEY`), required
    pub gemini: SecretString,

    /// Hosted TTS key; without it all speech uses the platform engine
    pub elevenlabs: Option<SecretString>,

    /// Whisper STT key
    pub openai: Option<SecretString>,

    /// Deepgram STT key
    pub deepgram: Option<SecretString>,
}

/// Text generation configuration
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Model identifier
    pub model: String,

    /// API base URL
    pub base_url: String,
}

/// Voice processing configuration
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// Hosted TTS voice identifier
    pub tts_voice: String,

    /// Hosted TTS model
    pub tts_model: String,

    /// Hosted TTS base URL
    pub tts_base_url: String,

    /// STT model override; provider default when unset
    pub stt_model: Option<String>,

    /// Platform speech command override
    pub native_command: Option<PathBuf>,
}

impl Config {
    /// Load configuration from the environment and the config file
    ///
    /// # Errors
    ///
    /// Returns error if `API_KEY` is not set or the persona cannot be loaded
    pub fn load() -> Result<Self> {
        Self::from_sources(&|key| std::env::var(key).ok(), file::load_config_file())
    }

    /// Build configuration from an environment lookup and a parsed file
    ///
    /// # Errors
    ///
    /// Returns error if the generation key is missing or the persona cannot
    /// be loaded
    pub fn from_sources(env: &dyn Fn(&str) -> Option<String>, fc: AuraConfigFile) -> Result<Self> {
        let var = |key: &str| env(key).filter(|v| !v.trim().is_empty());
        let secret = |value: Option<String>| {
            value
                .filter(|v| !v.trim().is_empty())
                .map(SecretString::from)
        };

        // Persona (env path > toml path > embedded)
        let persona = match var("AURA_PERSONA").or(fc.persona_file) {
            Some(path) => Persona::load(&PathBuf::from(path))?,
            None => Persona::embedded()?,
        };

        // API keys (env > toml)
        let gemini = secret(var("API_KEY").or(fc.api_keys.gemini)).ok_or_else(|| {
            Error::Config(
                "API_KEY is not set; a text generation key is required to start".to_string(),
            )
        })?;
        let api_keys = ApiKeys {
            gemini,
            elevenlabs: secret(var("ELEVENLABS_API_KEY").or(fc.api_keys.elevenlabs)),
            openai: secret(var("OPENAI_API_KEY").or(fc.api_keys.openai)),
            deepgram: secret(var("DEEPGRAM_API_KEY").or(fc.api_keys.deepgram)),
        };

        if api_keys.elevenlabs.is_none() {
            tracing::warn!("ELEVENLABS_API_KEY is not set; replies will use the platform voice");
        }

        let llm = LlmConfig {
            model: var("AURA_LLM_MODEL")
                .or(fc.llm.model)
                .unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string()),
            base_url: var("AURA_GEMINI_URL")
                .or(fc.llm.base_url)
                .unwrap_or_else(|| GEMINI_BASE_URL.to_string()),
        };

        // Voice (env > toml > persona > default)
        let voice = VoiceConfig {
            tts_voice: var("AURA_VOICE")
                .or(fc.voice.tts_voice)
                .or_else(|| persona.tts_voice().map(ToString::to_string))
                .unwrap_or_else(|| DEFAULT_VOICE_ID.to_string()),
            tts_model: var("AURA_TTS_MODEL")
                .or(fc.voice.tts_model)
                .or_else(|| persona.tts_model().map(ToString::to_string))
                .unwrap_or_else(|| DEFAULT_TTS_MODEL.to_string()),
            tts_base_url: var("AURA_ELEVENLABS_URL")
                .or(fc.voice.tts_base_url)
                .unwrap_or_else(|| DEFAULT_TTS_BASE_URL.to_string()),
            stt_model: var("AURA_STT_MODEL").or(fc.voice.stt_model),
            native_command: var("AURA_NATIVE_TTS")
                .or(fc.voice.native_command)
                .map(PathBuf::from),
        };

        let requested_language = var("AURA_LANGUAGE").or(fc.language);
        let language = match requested_language.as_deref().map(|tag| (tag, language::find(tag))) {
            Some((_, Some(found))) => found.tag.to_string(),
            Some((tag, None)) => {
                tracing::warn!(language = tag, "unsupported language, using {DEFAULT_LANGUAGE}");
                DEFAULT_LANGUAGE.to_string()
            }
            None => DEFAULT_LANGUAGE.to_string(),
        };

        // Data directory (~/.local/share/aura on Linux)
        let data_dir = var("AURA_DATA_DIR")
            .or(fc.data_dir)
            .map_or_else(default_data_dir, PathBuf::from);

        Ok(Self {
            persona,
            api_keys,
            llm,
            voice,
            language,
            data_dir,
        })
    }
}

/// Default data directory: `~/.local/share/aura` on Linux
#[must_use]
pub fn default_data_dir() -> PathBuf {
    directories::BaseDirs::new().map_or_else(|| PathBuf::from(".aura"), |d| d.data_dir().join("aura"))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_missing_generation_key_is_fatal() {
        let env = env_of(&[]);
        let result = Config::from_sources(&env, AuraConfigFile::default());
        assert!(matches!(result, Err(Error::Config(_))));

        let blank = env_of(&[("API_KEY", "  ")]);
        assert!(Config::from_sources(&blank, AuraConfigFile::default()).is_err());
    }

    #[test]
    fn test_defaults() {
        let env = env_of(&[("API_KEY", "g")]);
        let config = Config::from_sources(&env, AuraConfigFile::default()).unwrap();

        assert_eq!(config.api_keys.gemini.expose_secret(), "g");
        assert!(config.api_keys.elevenlabs.is_none());
        assert_eq!(config.llm.model, DEFAULT_LLM_MODEL);
        assert_eq!(config.llm.base_url, GEMINI_BASE_URL);
        assert_eq!(config.voice.tts_voice, DEFAULT_VOICE_ID);
        assert_eq!(config.voice.tts_model, DEFAULT_TTS_MODEL);
        assert_eq!(config.language, DEFAULT_LANGUAGE);
        assert!(config.voice.stt_model.is_none());
        assert_eq!(config.persona.name(), "AURA");
    }

    #[test]
    fn test_env_overrides_file() {
        let env = env_of(&[
            ("API_KEY", "env-key"),
            ("AURA_VOICE", "pNInz6obpgDQGcFmaJgB"),
            ("AURA_DATA_DIR", "/tmp/aura-test"),
        ]);
        let mut fc = AuraConfigFile::default();
        fc.api_keys.gemini = Some("file-key".to_string());
        fc.api_keys.elevenlabs = Some("file-tts".to_string());
        fc.voice.tts_voice = Some("21m00Tcm4TlvDq8ikWAM".to_string());
        fc.llm.model = Some("gemini-2.0-flash".to_string());

        let config = Config::from_sources(&env, fc).unwrap();
        assert_eq!(config.api_keys.gemini.expose_secret(), "env-key");
        assert_eq!(
            config.api_keys.elevenlabs.as_ref().map(ExposeSecret::expose_secret),
            Some("file-tts")
        );
        assert_eq!(config.voice.tts_voice, "pNInz6obpgDQGcFmaJgB");
        assert_eq!(config.llm.model, "gemini-2.0-flash");
        assert_eq!(config.data_dir, PathBuf::from("/tmp/aura-test"));
    }

    #[test]
    fn test_language_is_validated() {
        let env = env_of(&[("API_KEY", "g"), ("AURA_LANGUAGE", "ta-in")]);
        let config = Config::from_sources(&env, AuraConfigFile::default()).unwrap();
        assert_eq!(config.language, "ta-IN");

        let env = env_of(&[("API_KEY", "g"), ("AURA_LANGUAGE", "tlh")]);
        let config = Config::from_sources(&env, AuraConfigFile::default()).unwrap();
        assert_eq!(config.language, DEFAULT_LANGUAGE);
    }

    #[test]
    fn test_missing_persona_file_is_error() {
        let env = env_of(&[("API_KEY", "g"), ("AURA_PERSONA", "/nonexistent/persona.json")]);
        assert!(Config::from_sources(&env, AuraConfigFile::default()).is_err());
    }
}
