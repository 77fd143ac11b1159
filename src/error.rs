//! Error types for the AURA companion

use thiserror::Error;

/// Result type alias for companion operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the companion
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error (missing credentials, bad config file)
    #[error("configuration error: {0}")]
    Config(String),

    /// Input rejected before any external call
    #[error("validation error: {0}")]
    Validation(String),

    /// Text generation error
    #[error("generation error: {0}")]
    Generation(String),

    /// Audio device or decoding error
    #[error("audio error: {0}")]
    Audio(String),

    /// Speech-to-text error
    #[error("STT error: {0}")]
    Stt(String),

    /// Text-to-speech error
    #[error("TTS error: {0}")]
    Tts(String),

    /// Native speech engine error
    #[error("native speech error: {0}")]
    NativeSpeech(String),

    /// Speech recognition session error
    #[error("recognition error: {0}")]
    Recognition(String),

    /// Credential store error
    #[error("auth error: {0}")]
    Auth(#[from] crate::auth::AuthError),

    /// The conversation runtime has shut down
    #[error("conversation closed")]
    Closed,

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
