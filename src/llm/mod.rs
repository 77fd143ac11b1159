//! Text generation
//!
//! A [`ChatBackend`] opens one [`ChatSession`] per login. The session keeps
//! the dialogue context; callers send only the newest user message and read
//! the reply as an ordered stream of text chunks.

pub mod gemini;

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;

pub use gemini::GeminiChat;

use crate::Result;

/// Ordered, finite stream of reply text chunks
pub type ChunkStream = BoxStream<'static, Result<String>>;

/// Sampling parameters for a chat session
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tuning {
    pub temperature: f32,
    pub top_p: f32,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            temperature: 0.8,
            top_p: 0.9,
        }
    }
}

/// Creates chat sessions
pub trait ChatBackend: Send + Sync {
    /// Open a new session primed with `system_prompt`
    fn create_session(&self, system_prompt: &str, tuning: Tuning) -> Arc<dyn ChatSession>;
}

/// A stateful dialogue with the model
#[async_trait]
pub trait ChatSession: Send + Sync {
    /// Send one user message and stream the reply
    ///
    /// # Errors
    ///
    /// Returns error if the request cannot be started. Failures after the
    /// first chunk are reported as an `Err` item in the stream.
    async fn send_streaming(&self, text: &str) -> Result<ChunkStream>;
}
