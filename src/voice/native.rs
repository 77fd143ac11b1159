//! Platform speech engine
//!
//! Drives the system speech command (`espeak-ng`/`espeak` on Linux, `say`
//! on macOS) as a subprocess. Text is passed on stdin.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::{OnceCell, oneshot};

use super::NativeSpeech;
use crate::conversation::PlaybackEvents;
use crate::language::primary_subtag;
use crate::{Error, Result};

/// Default espeak pitch (0-99)
const ESPEAK_BASE_PITCH: f32 = 50.0;

/// Default speaking rate in words per minute
const BASE_WORDS_PER_MINUTE: f32 = 175.0;

/// An installed voice
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeVoice {
    /// Identifier passed to the engine's voice flag
    pub id: String,
    /// Display name
    pub name: String,
    /// BCP 47 language tag
    pub language: String,
}

/// Choose a voice for `language`
///
/// Prefers a voice whose primary language subtag matches, then any English
/// voice. `None` leaves the engine on its default voice.
#[must_use]
pub fn select_voice<'a>(voices: &'a [NativeVoice], language: &str) -> Option<&'a NativeVoice> {
    let wanted = primary_subtag(language);
    voices
        .iter()
        .find(|v| primary_subtag(&v.language).eq_ignore_ascii_case(wanted))
        .or_else(|| {
            voices
                .iter()
                .find(|v| primary_subtag(&v.language).eq_ignore_ascii_case("en"))
        })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EngineKind {
    Espeak,
    Say,
}

#[derive(Debug, Clone)]
struct Engine {
    kind: EngineKind,
    program: PathBuf,
}

impl Engine {
    fn from_program(program: PathBuf) -> Self {
        let is_say = program
            .file_stem()
            .and_then(|s| s.to_str())
            .is_some_and(|s| s == "say");
        Self {
            kind: if is_say {
                EngineKind::Say
            } else {
                EngineKind::Espeak
            },
            program,
        }
    }

    fn list_args(&self) -> &'static [&'static str] {
        match self.kind {
            EngineKind::Espeak => &["--voices"],
            EngineKind::Say => &["-v", "?"],
        }
    }

    fn parse_voices(&self, output: &str) -> Vec<NativeVoice> {
        match self.kind {
            EngineKind::Espeak => parse_espeak_voices(output),
            EngineKind::Say => parse_say_voices(output),
        }
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn speak_args(&self, voice: Option<&NativeVoice>, pitch: f32, rate: f32) -> Vec<String> {
        let words_per_minute = (BASE_WORDS_PER_MINUTE * rate).round().max(80.0) as u32;
        let mut args = Vec::new();

        match self.kind {
            EngineKind::Espeak => {
                let espeak_pitch = (ESPEAK_BASE_PITCH * pitch).round().clamp(0.0, 99.0) as u32;
                if let Some(voice) = voice {
                    args.extend(["-v".to_string(), voice.id.clone()]);
                }
                args.extend([
                    "-p".to_string(),
                    espeak_pitch.to_string(),
                    "-s".to_string(),
                    words_per_minute.to_string(),
                    "--stdin".to_string(),
                ]);
            }
            EngineKind::Say => {
                if let Some(voice) = voice {
                    args.extend(["-v".to_string(), voice.id.clone()]);
                }
                args.extend([
                    "-r".to_string(),
                    words_per_minute.to_string(),
                    "-f".to_string(),
                    "-".to_string(),
                ]);
            }
        }

        args
    }
}

/// Speech through the system speech command
pub struct SystemSpeech {
    engine: Option<Engine>,
    pitch: f32,
    rate: f32,
    voices: OnceCell<Vec<NativeVoice>>,
    cancel: Mutex<Option<oneshot::Sender<()>>>,
}

impl SystemSpeech {
    /// Locate the speech engine
    ///
    /// `program` overrides detection. Without an engine every utterance
    /// reports failure.
    #[must_use]
    pub fn detect(program: Option<&Path>, pitch: f32, rate: f32) -> Self {
        let engine = program
            .map(Path::to_path_buf)
            .or_else(|| {
                ["espeak-ng", "espeak", "say"]
                    .iter()
                    .find_map(|bin| which::which(bin).ok())
            })
            .map(Engine::from_program);

        match &engine {
            Some(engine) => {
                tracing::debug!(program = %engine.program.display(), "native speech engine found");
            }
            None => tracing::warn!("no native speech engine found; fallback speech unavailable"),
        }

        Self {
            engine,
            pitch,
            rate,
            voices: OnceCell::new(),
            cancel: Mutex::new(None),
        }
    }

    /// Whether an engine was found
    #[must_use]
    pub const fn is_available(&self) -> bool {
        self.engine.is_some()
    }

    fn replace_cancel(&self, next: Option<oneshot::Sender<()>>) {
        let mut slot = self.cancel.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = slot.take() {
            let _ = previous.send(());
        }
        *slot = next;
    }
}

#[async_trait]
impl NativeSpeech for SystemSpeech {
    async fn voices(&self) -> Result<Vec<NativeVoice>> {
        let engine = self
            .engine
            .as_ref()
            .ok_or_else(|| Error::NativeSpeech("no speech engine available".to_string()))?;

        let voices = self.voices.get_or_try_init(|| list_voices(engine)).await?;
        tracing::debug!(count = voices.len(), "native voices loaded");
        Ok(voices.clone())
    }

    fn speak(&self, text: &str, language: &str, events: PlaybackEvents) {
        let (cancel_tx, cancel_rx) = oneshot::channel();
        self.replace_cancel(Some(cancel_tx));

        let Some(engine) = self.engine.clone() else {
            events.failed("no speech engine available");
            return;
        };

        let text = text.to_string();
        let language = language.to_string();
        let (pitch, rate) = (self.pitch, self.rate);
        let voices = self.voices.get().cloned();

        tokio::spawn(async move {
            let voices = match voices {
                Some(voices) => voices,
                None => list_voices(&engine).await.unwrap_or_default(),
            };
            let voice = select_voice(&voices, &language);
            tracing::debug!(
                utterance = %events.utterance(),
                voice = voice.map_or("default", |v| v.name.as_str()),
                "speaking with native engine"
            );

            match run_engine(&engine, engine.speak_args(voice, pitch, rate), &text, &events, cancel_rx)
                .await
            {
                Ok(()) => events.ended(),
                Err(e) => {
                    tracing::warn!(utterance = %events.utterance(), error = %e, "native speech failed");
                    events.failed(e);
                }
            }
        });
    }

    fn cancel(&self) {
        self.replace_cancel(None);
    }
}

async fn list_voices(engine: &Engine) -> Result<Vec<NativeVoice>> {
    let output = Command::new(&engine.program)
        .args(engine.list_args())
        .stdin(Stdio::null())
        .output()
        .await?;
    if !output.status.success() {
        return Err(Error::NativeSpeech(format!(
            "voice listing exited with {}",
            output.status
        )));
    }
    Ok(engine.parse_voices(&String::from_utf8_lossy(&output.stdout)))
}

async fn run_engine(
    engine: &Engine,
    args: Vec<String>,
    text: &str,
    events: &PlaybackEvents,
    cancel: oneshot::Receiver<()>,
) -> Result<()> {
    let mut child = Command::new(&engine.program)
        .args(&args)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| Error::NativeSpeech(format!("failed to start speech engine: {e}")))?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(text.as_bytes()).await?;
    }

    events.started();

    tokio::select! {
        status = child.wait() => {
            let status = status?;
            if status.success() {
                Ok(())
            } else {
                Err(Error::NativeSpeech(format!("speech engine exited with {status}")))
            }
        }
        _ = cancel => {
            child.kill().await?;
            tracing::debug!(utterance = %events.utterance(), "native speech cancelled");
            Ok(())
        }
    }
}

/// Parse `espeak-ng --voices` output
///
/// Columns: Pty, Language, Age/Gender, VoiceName, File, Other Languages.
fn parse_espeak_voices(output: &str) -> Vec<NativeVoice> {
    output
        .lines()
        .skip(1)
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let _priority = fields.next()?;
            let language = fields.next()?;
            let _age_gender = fields.next()?;
            let name = fields.next()?;
            Some(NativeVoice {
                id: language.to_string(),
                name: name.replace('_', " "),
                language: language.to_string(),
            })
        })
        .collect()
}

/// Parse `say -v '?'` output
///
/// Lines look like `Samantha            en_US    # Hello, my name is Samantha.`
/// where the name may contain spaces.
fn parse_say_voices(output: &str) -> Vec<NativeVoice> {
    output
        .lines()
        .filter_map(|line| {
            let head = line.split('#').next()?.trim_end();
            let (name, locale) = head.rsplit_once(char::is_whitespace)?;
            let name = name.trim();
            if name.is_empty() || locale.is_empty() {
                return None;
            }
            Some(NativeVoice {
                id: name.to_string(),
                name: name.to_string(),
                language: locale.replace('_', "-"),
            })
        })
        .collect()
}
