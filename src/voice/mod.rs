//! Voice processing module
//!
//! Speech output goes through hosted TTS with the platform speech engine as
//! fallback. Speech input is captured from the microphone, endpointed locally
//! and transcribed by a hosted STT provider.

mod capture;
mod endpoint;
mod native;
mod playback;
mod recognizer;
mod stt;
mod tts;

use async_trait::async_trait;

pub use capture::{AudioCapture, SAMPLE_RATE, samples_to_wav};
pub use endpoint::{EndpointState, UtteranceDetector};
pub use native::{NativeVoice, SystemSpeech, select_voice};
pub use playback::AudioPlayback;
pub use recognizer::{MicRecognizer, MicRecognizerFactory};
pub use stt::{SpeechToText, Transcript};
pub use tts::{
    CatalogVoice, DEFAULT_BASE_URL as DEFAULT_TTS_BASE_URL, DEFAULT_MODEL as DEFAULT_TTS_MODEL,
    DEFAULT_VOICE_ID, ElevenLabsTts, VOICE_CATALOG,
};

use crate::Result;
use crate::conversation::{PlaybackEvents, RecognitionEvents};

/// Hosted text-to-speech
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize `text` with the given voice, returning encoded audio
    ///
    /// # Errors
    ///
    /// Returns error on transport failure or a non-success response
    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<Vec<u8>>;
}

/// Plays synthesized audio
pub trait AudioOutput: Send + Sync {
    /// Start playing `audio`; lifecycle is reported through `events`
    fn play(&self, audio: Vec<u8>, events: PlaybackEvents);

    /// Halt current playback, if any
    fn stop(&self);
}

/// Platform speech engine
#[async_trait]
pub trait NativeSpeech: Send + Sync {
    /// Voices installed on this system
    ///
    /// # Errors
    ///
    /// Returns error if the engine cannot be queried
    async fn voices(&self) -> Result<Vec<NativeVoice>>;

    /// Speak `text` in `language`; lifecycle is reported through `events`
    fn speak(&self, text: &str, language: &str, events: PlaybackEvents);

    /// Cancel the current utterance, if any
    fn cancel(&self);
}

/// One-shot speech recognition
pub trait SpeechRecognizer: Send {
    /// Open the microphone and recognize one utterance in `language`
    ///
    /// # Errors
    ///
    /// Returns error if recognition cannot be started
    fn start(&mut self, language: &str, events: RecognitionEvents) -> Result<()>;

    /// Close the microphone
    fn stop(&mut self);
}

/// Creates recognizers when the system supports it
pub trait RecognizerFactory: Send + Sync {
    /// `None` when speech recognition is unavailable
    fn create(&self) -> Option<Box<dyn SpeechRecognizer>>;
}
