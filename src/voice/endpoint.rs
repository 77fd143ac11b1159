//! Utterance endpointing
//!
//! Energy-based detection of one spoken utterance in the microphone stream:
//! waits for speech, then reports completion once enough speech has been
//! followed by a stretch of silence.

use super::SAMPLE_RATE;

/// Minimum RMS energy to count a chunk as speech
const ENERGY_THRESHOLD: f32 = 0.03;

/// Minimum speech before an utterance can complete (0.3 s at 16 kHz)
const MIN_SPEECH_SAMPLES: usize = SAMPLE_RATE as usize * 3 / 10;

/// Trailing silence that ends an utterance (0.5 s at 16 kHz)
const SILENCE_SAMPLES: usize = SAMPLE_RATE as usize / 2;

/// Endpointing state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointState {
    /// Waiting for speech
    Waiting,
    /// Speech detected, accumulating the utterance
    Speaking,
    /// Utterance ended
    Complete,
}

/// Detects the end of a spoken utterance
#[derive(Debug)]
pub struct UtteranceDetector {
    state: EndpointState,
    buffer: Vec<f32>,
    speech_samples: usize,
    silence_samples: usize,
}

impl Default for UtteranceDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl UtteranceDetector {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: EndpointState::Waiting,
            buffer: Vec::new(),
            speech_samples: 0,
            silence_samples: 0,
        }
    }

    /// Feed captured samples
    ///
    /// Returns true once the utterance is complete.
    pub fn process(&mut self, samples: &[f32]) -> bool {
        if samples.is_empty() {
            return self.state == EndpointState::Complete;
        }

        let energy = calculate_energy(samples);
        let is_speech = energy > ENERGY_THRESHOLD;

        match self.state {
            EndpointState::Waiting => {
                if is_speech {
                    self.state = EndpointState::Speaking;
                    self.buffer.clear();
                    self.buffer.extend_from_slice(samples);
                    self.speech_samples = samples.len();
                    self.silence_samples = 0;
                    tracing::trace!(energy, "speech detected");
                }
            }
            EndpointState::Speaking => {
                self.buffer.extend_from_slice(samples);

                if is_speech {
                    self.speech_samples += samples.len();
                    self.silence_samples = 0;
                } else {
                    self.silence_samples += samples.len();
                }

                if self.silence_samples > SILENCE_SAMPLES
                    && self.speech_samples >= MIN_SPEECH_SAMPLES
                {
                    tracing::debug!(samples = self.buffer.len(), "utterance complete");
                    self.state = EndpointState::Complete;
                } else if self.silence_samples > SILENCE_SAMPLES * 2 {
                    // A click or cough, not speech
                    tracing::trace!("speech too short, resetting");
                    self.reset();
                }
            }
            EndpointState::Complete => {}
        }

        self.state == EndpointState::Complete
    }

    /// Whether enough speech has been heard to be worth transcribing
    #[must_use]
    pub const fn has_speech(&self) -> bool {
        self.speech_samples >= MIN_SPEECH_SAMPLES
    }

    /// Take the captured utterance, resetting the detector
    pub fn take_utterance(&mut self) -> Vec<f32> {
        let buffer = std::mem::take(&mut self.buffer);
        self.reset();
        buffer
    }

    /// Reset to waiting for speech
    pub fn reset(&mut self) {
        self.state = EndpointState::Waiting;
        self.buffer.clear();
        self.speech_samples = 0;
        self.silence_samples = 0;
    }

    #[must_use]
    pub const fn state(&self) -> EndpointState {
        self.state
    }
}

/// Calculate RMS energy of audio samples
#[allow(clippy::cast_precision_loss)]
fn calculate_energy(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}
