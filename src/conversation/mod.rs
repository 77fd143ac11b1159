//! Conversation orchestration
//!
//! The [`Orchestrator`] is a synchronous state machine that owns the message
//! log and the avatar state. It never performs I/O: each operation returns
//! [`Effect`]s and collaborators report back through token-tagged
//! [`Signal`]s. The [`Companion`] runtime executes effects on one tokio task,
//! which is the only writer of conversation state.

mod orchestrator;
mod runtime;
mod signal;

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use orchestrator::{Effect, Orchestrator, TRANSMISSION_ERROR};
pub use runtime::{Collaborators, Companion};
pub use signal::{
    PlaybackEvents, RecognitionAlternative, RecognitionEvents, RecognitionResult, Signal,
    SignalSender,
};

/// Opaque message identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(Uuid);

impl MessageId {
    /// Generate a fresh identifier
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Who authored a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Agent,
}

/// A single entry in the transcript
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub sender: Sender,
    pub text: String,
}

impl Message {
    /// Create a user message
    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            sender: Sender::User,
            text: text.into(),
        }
    }

    /// Create an agent message
    #[must_use]
    pub fn agent(text: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            sender: Sender::Agent,
            text: text.into(),
        }
    }
}

/// Conversational phase shown by the avatar
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AvatarState {
    /// Waiting for input
    #[default]
    Idle,
    /// Microphone is open
    Listening,
    /// Reply requested, no content yet
    Thinking,
    /// Reply content arriving or audio playing
    Speaking,
}

impl AvatarState {
    /// Status caption shown under the transcript
    #[must_use]
    pub const fn caption(self) -> &'static str {
        match self {
            Self::Idle => "Awaiting Input",
            Self::Listening => "Listening...",
            Self::Thinking => "Processing...",
            Self::Speaking => "Transmitting...",
        }
    }

    /// Tag handed to the avatar renderer
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Listening => "LISTENING",
            Self::Thinking => "THINKING",
            Self::Speaking => "SPEAKING",
        }
    }
}

impl fmt::Display for AvatarState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Operation token
///
/// Issued from one monotonically increasing counter. A collaborator signal is
/// applied only while its token is still current for its slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OpId(u64);

impl OpId {
    /// Wrap a raw token value
    #[must_use]
    pub const fn from_raw(value: u64) -> Self {
        Self(value)
    }

    /// Raw token value
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Observable conversation state, published after every change
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub messages: Vec<Message>,
    pub avatar: AvatarState,
    pub is_listening: bool,
    pub language: String,
    pub voice_id: String,
}
