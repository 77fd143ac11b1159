//! Avatar display
//!
//! The avatar is a black box that only learns the current conversational
//! phase. How it animates is up to the renderer.

use std::io::Write;
use std::sync::Mutex;

use crate::conversation::AvatarState;

/// Receives avatar state changes
pub trait AvatarRenderer: Send + Sync {
    /// Show `state`
    fn render(&self, state: AvatarState);
}

/// Renderer that draws nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NullAvatar;

impl AvatarRenderer for NullAvatar {
    fn render(&self, _state: AvatarState) {}
}

/// Prints the status caption as a single terminal line
pub struct StatusLine<W: Write + Send> {
    out: Mutex<W>,
}

impl<W: Write + Send> StatusLine<W> {
    pub const fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }
}

impl StatusLine<std::io::Stderr> {
    /// Status line on stderr
    #[must_use]
    pub fn stderr() -> Self {
        Self::new(std::io::stderr())
    }
}

impl<W: Write + Send> AvatarRenderer for StatusLine<W> {
    fn render(&self, state: AvatarState) {
        let Ok(mut out) = self.out.lock() else {
            return;
        };
        let _ = writeln!(out, "[{}] {}", state.tag(), state.caption());
        let _ = out.flush();
    }
}
