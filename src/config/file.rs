//! TOML configuration file loading
//!
//! Supports `~/.config/aura/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::Result;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct AuraConfigFile {
    /// Persona JSON file replacing the built-in persona
    #[serde(default)]
    pub persona_file: Option<String>,

    /// Conversation language (BCP 47 tag)
    #[serde(default)]
    pub language: Option<String>,

    /// Directory for the credential store
    #[serde(default)]
    pub data_dir: Option<String>,

    /// Text generation configuration
    #[serde(default)]
    pub llm: LlmFileConfig,

    /// Voice/audio configuration
    #[serde(default)]
    pub voice: VoiceFileConfig,

    /// API keys for external services
    #[serde(default)]
    pub api_keys: ApiKeysFileConfig,
}

/// Text generation configuration
#[derive(Debug, Default, Deserialize)]
pub struct LlmFileConfig {
    /// Model identifier (e.g. "gemini-2.5-flash")
    pub model: Option<String>,

    /// API base URL
    pub base_url: Option<String>,
}

/// Voice processing configuration
#[derive(Debug, Default, Deserialize)]
pub struct VoiceFileConfig {
    /// Hosted TTS voice identifier
    pub tts_voice: Option<String>,

    /// Hosted TTS model
    pub tts_model: Option<String>,

    /// Hosted TTS base URL
    pub tts_base_url: Option<String>,

    /// STT model (e.g. "whisper-1", "nova-2")
    pub stt_model: Option<String>,

    /// Platform speech command (e.g. "/usr/bin/espeak-ng")
    pub native_command: Option<String>,
}

/// API keys configuration
#[derive(Debug, Default, Deserialize)]
pub struct ApiKeysFileConfig {
    pub gemini: Option<String>,
    pub elevenlabs: Option<String>,
    pub openai: Option<String>,
    pub deepgram: Option<String>,
}

/// Load the TOML config file from the standard path
///
/// Returns `AuraConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> AuraConfigFile {
    let Some(path) = config_file_path() else {
        return AuraConfigFile::default();
    };

    if !path.exists() {
        return AuraConfigFile::default();
    }

    match read_config_file(&path) {
        Ok(config) => {
            tracing::info!(path = %path.display(), "loaded config file");
            config
        }
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to load config file, using defaults"
            );
            AuraConfigFile::default()
        }
    }
}

/// Read and parse a config file
///
/// # Errors
///
/// Returns error if the file cannot be read or is not valid TOML
pub fn read_config_file(path: &Path) -> Result<AuraConfigFile> {
    let content = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Return the config file path: `~/.config/aura/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("aura").join("config.toml"))
}
