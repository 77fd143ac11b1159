//! AURA - voice-enabled conversational companion
//!
//! This library provides the pieces behind the `aura` binary:
//! - Account gate with a local credential store
//! - Conversation orchestration with streamed replies
//! - Spoken output through hosted TTS with a platform speech fallback
//! - Voice input through the microphone and hosted STT
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                    Terminal                          │
//! │   Account gate  │  Chat prompt  │  Avatar status     │
//! └────────────────────┬────────────────────────────────┘
//!                      │ commands / snapshots
//! ┌────────────────────▼────────────────────────────────┐
//! │              Companion runtime                       │
//! │   Orchestrator (state machine)  │  effect executor   │
//! └────────────────────┬────────────────────────────────┘
//!                      │ effects / signals
//! ┌────────────────────▼────────────────────────────────┐
//! │                 Collaborators                        │
//! │   Gemini chat  │  ElevenLabs TTS  │  Native speech  │
//! │   Playback     │  Mic + STT recognizer              │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod auth;
pub mod avatar;
pub mod config;
pub mod conversation;
pub mod error;
pub mod language;
pub mod llm;
pub mod persona;
pub mod setup;
pub mod terminal;
pub mod voice;

pub use config::Config;
pub use conversation::{
    AvatarState, Collaborators, Companion, Effect, Message, Orchestrator, Sender, Signal, Snapshot,
};
pub use error::{Error, Result};
pub use persona::Persona;
