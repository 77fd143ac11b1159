//! Collaborator callbacks
//!
//! Every asynchronous collaborator reports back by sending a [`Signal`] into
//! the runtime. The operation token is baked into the reporting handles so a
//! collaborator cannot report under the wrong operation.

use tokio::sync::mpsc;

use super::OpId;

/// Channel into the conversation runtime
pub type SignalSender = mpsc::UnboundedSender<Signal>;

/// One alternative transcript with its confidence score
#[derive(Debug, Clone, PartialEq)]
pub struct RecognitionAlternative {
    pub transcript: String,
    pub confidence: f32,
}

/// A recognition result: alternatives ordered best first
#[derive(Debug, Clone, PartialEq)]
pub struct RecognitionResult {
    pub is_final: bool,
    pub alternatives: Vec<RecognitionAlternative>,
}

impl RecognitionResult {
    /// Build a final result with a single alternative
    #[must_use]
    pub fn final_transcript(transcript: impl Into<String>, confidence: f32) -> Self {
        Self {
            is_final: true,
            alternatives: vec![RecognitionAlternative {
                transcript: transcript.into(),
                confidence,
            }],
        }
    }
}

/// Events reported by collaborators
#[derive(Debug, Clone)]
pub enum Signal {
    /// Next piece of the streamed reply
    ReplyChunk { turn: OpId, text: String },
    /// Reply stream completed
    ReplyFinished { turn: OpId },
    /// Reply stream failed
    ReplyFailed { turn: OpId, error: String },
    /// Hosted synthesis returned
    Synthesized {
        utterance: OpId,
        result: Result<Vec<u8>, String>,
    },
    /// Audible output began
    PlaybackStarted { utterance: OpId },
    /// Audible output finished
    PlaybackEnded { utterance: OpId },
    /// Audible output failed
    PlaybackFailed { utterance: OpId, error: String },
    /// Recognition session opened the microphone
    ListeningStarted { listen: OpId },
    /// Recognition produced results
    Recognized {
        listen: OpId,
        results: Vec<RecognitionResult>,
    },
    /// Recognition session closed
    ListeningEnded { listen: OpId },
    /// Recognition session failed
    RecognitionFailed { listen: OpId, error: String },
}

/// Lifecycle reporter for one utterance
///
/// Used by both the audio playback path and the native speech fallback.
#[derive(Debug, Clone)]
pub struct PlaybackEvents {
    utterance: OpId,
    tx: SignalSender,
}

impl PlaybackEvents {
    #[must_use]
    pub const fn new(utterance: OpId, tx: SignalSender) -> Self {
        Self { utterance, tx }
    }

    /// Utterance this reporter belongs to
    #[must_use]
    pub const fn utterance(&self) -> OpId {
        self.utterance
    }

    pub fn started(&self) {
        self.send(Signal::PlaybackStarted {
            utterance: self.utterance,
        });
    }

    pub fn ended(&self) {
        self.send(Signal::PlaybackEnded {
            utterance: self.utterance,
        });
    }

    pub fn failed(&self, error: impl ToString) {
        self.send(Signal::PlaybackFailed {
            utterance: self.utterance,
            error: error.to_string(),
        });
    }

    fn send(&self, signal: Signal) {
        // Runtime gone means the session ended; nothing left to update
        let _ = self.tx.send(signal);
    }
}

/// Lifecycle reporter for one recognition run
#[derive(Debug, Clone)]
pub struct RecognitionEvents {
    listen: OpId,
    tx: SignalSender,
}

impl RecognitionEvents {
    #[must_use]
    pub const fn new(listen: OpId, tx: SignalSender) -> Self {
        Self { listen, tx }
    }

    /// Recognition run this reporter belongs to
    #[must_use]
    pub const fn listen(&self) -> OpId {
        self.listen
    }

    pub fn started(&self) {
        self.send(Signal::ListeningStarted {
            listen: self.listen,
        });
    }

    pub fn result(&self, results: Vec<RecognitionResult>) {
        self.send(Signal::Recognized {
            listen: self.listen,
            results,
        });
    }

    pub fn ended(&self) {
        self.send(Signal::ListeningEnded {
            listen: self.listen,
        });
    }

    pub fn failed(&self, error: impl ToString) {
        self.send(Signal::RecognitionFailed {
            listen: self.listen,
            error: error.to_string(),
        });
    }

    fn send(&self, signal: Signal) {
        let _ = self.tx.send(signal);
    }
}
