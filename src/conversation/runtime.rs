//! Async runtime for the conversation
//!
//! A single task owns the [`Orchestrator`]. User commands and collaborator
//! signals are applied one at a time; effects are executed by spawning work
//! that reports back through the signal channel.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::{
    AvatarState, Effect, OpId, Orchestrator, PlaybackEvents, RecognitionEvents, Signal,
    SignalSender, Snapshot,
};
use crate::avatar::AvatarRenderer;
use crate::llm::ChatSession;
use crate::voice::{AudioOutput, NativeSpeech, RecognizerFactory, SpeechRecognizer, SpeechSynthesizer};
use crate::{Error, Result, language};

/// External services the conversation drives
pub struct Collaborators {
    /// Chat session for this login
    pub chat: Arc<dyn ChatSession>,
    /// Hosted TTS, absent when no key is configured
    pub synthesizer: Option<Arc<dyn SpeechSynthesizer>>,
    /// Player for synthesized audio
    pub audio: Arc<dyn AudioOutput>,
    /// Platform speech engine used as fallback
    pub native: Arc<dyn NativeSpeech>,
    /// Source of recognizers, absent when voice input is unavailable
    pub recognizers: Option<Arc<dyn RecognizerFactory>>,
    /// Avatar display
    pub avatar: Arc<dyn AvatarRenderer>,
}

#[derive(Debug)]
enum Command {
    Open(String),
    Submit(String),
    Speak(String),
    ToggleVoice,
    SetLanguage(String),
    SetVoice(String),
    Shutdown,
}

/// Handle to a running conversation
pub struct Companion {
    commands: mpsc::UnboundedSender<Command>,
    snapshots: watch::Receiver<Snapshot>,
    task: JoinHandle<()>,
}

impl Companion {
    /// Start the runtime task for `orchestrator`
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn spawn(orchestrator: Orchestrator, collaborators: Collaborators) -> Self {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (signals_tx, signals_rx) = mpsc::unbounded_channel();
        let initial = orchestrator.snapshot();
        let initial_avatar = initial.avatar;
        let (snapshots_tx, snapshots_rx) = watch::channel(initial);

        collaborators.avatar.render(initial_avatar);

        let actor = Actor {
            orchestrator,
            collaborators,
            signals: signals_tx,
            recognizer: RecognizerSlot::Uncreated,
            reply_task: None,
            snapshots: snapshots_tx,
            last_avatar: initial_avatar,
        };
        let task = tokio::spawn(actor.run(commands_rx, signals_rx));

        Self {
            commands: commands_tx,
            snapshots: snapshots_rx,
            task,
        }
    }

    /// Post `greeting` as the first agent message and speak it
    ///
    /// # Errors
    ///
    /// Returns error if the runtime has shut down
    pub fn open(&self, greeting: impl Into<String>) -> Result<()> {
        self.send(Command::Open(greeting.into()))
    }

    /// Submit typed user input
    ///
    /// # Errors
    ///
    /// Returns error if the runtime has shut down
    pub fn submit(&self, text: impl Into<String>) -> Result<()> {
        self.send(Command::Submit(text.into()))
    }

    /// Speak `text`, interrupting current output
    ///
    /// # Errors
    ///
    /// Returns error if the runtime has shut down
    pub fn speak(&self, text: impl Into<String>) -> Result<()> {
        self.send(Command::Speak(text.into()))
    }

    /// Start or stop voice input
    ///
    /// # Errors
    ///
    /// Returns error if the runtime has shut down
    pub fn toggle_voice_input(&self) -> Result<()> {
        self.send(Command::ToggleVoice)
    }

    /// Switch the conversation language
    ///
    /// # Errors
    ///
    /// Returns error if the tag is not a supported language or the runtime
    /// has shut down
    pub fn set_language(&self, tag: &str) -> Result<()> {
        let language = language::find(tag)
            .ok_or_else(|| Error::Validation(format!("unsupported language: {tag}")))?;
        self.send(Command::SetLanguage(language.tag.to_string()))
    }

    /// Switch the hosted TTS voice
    ///
    /// # Errors
    ///
    /// Returns error if the runtime has shut down
    pub fn set_voice(&self, voice_id: impl Into<String>) -> Result<()> {
        self.send(Command::SetVoice(voice_id.into()))
    }

    /// Watch conversation state
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshots.clone()
    }

    /// Latest published state
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        self.snapshots.borrow().clone()
    }

    /// Stop all output and recognition and end the runtime task
    pub async fn shutdown(self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "conversation task ended abnormally");
        }
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands.send(command).map_err(|_| Error::Closed)
    }
}

enum RecognizerSlot {
    Uncreated,
    Ready(Box<dyn SpeechRecognizer>),
    Unsupported,
}

struct Actor {
    orchestrator: Orchestrator,
    collaborators: Collaborators,
    signals: SignalSender,
    recognizer: RecognizerSlot,
    reply_task: Option<JoinHandle<()>>,
    snapshots: watch::Sender<Snapshot>,
    last_avatar: AvatarState,
}

impl Actor {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut signals: mpsc::UnboundedReceiver<Signal>,
    ) {
        tracing::debug!("conversation runtime started");

        loop {
            let effects = tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.on_command(command),
                },
                Some(signal) = signals.recv() => self.orchestrator.handle(signal),
            };

            for effect in effects {
                self.apply(effect);
            }
            self.publish();
        }

        self.teardown();
        tracing::debug!("conversation runtime stopped");
    }

    fn on_command(&mut self, command: Command) -> Vec<Effect> {
        match command {
            Command::Open(greeting) => self.orchestrator.open(&greeting),
            Command::Submit(text) => self.orchestrator.submit_user_message(&text),
            Command::Speak(text) => self.orchestrator.speak(&text),
            Command::ToggleVoice => {
                if self.ensure_recognizer() {
                    self.orchestrator.toggle_voice_input()
                } else {
                    Vec::new()
                }
            }
            Command::SetLanguage(tag) => {
                tracing::info!(language = %tag, "language changed");
                self.orchestrator.set_language(tag);
                Vec::new()
            }
            Command::SetVoice(voice_id) => {
                tracing::info!(voice = %voice_id, "voice changed");
                self.orchestrator.set_voice(voice_id);
                Vec::new()
            }
            Command::Shutdown => Vec::new(),
        }
    }

    /// Create the recognizer on first use
    fn ensure_recognizer(&mut self) -> bool {
        match self.recognizer {
            RecognizerSlot::Ready(_) => true,
            RecognizerSlot::Unsupported => false,
            RecognizerSlot::Uncreated => {
                let created = self
                    .collaborators
                    .recognizers
                    .as_ref()
                    .and_then(|factory| factory.create());

                if let Some(recognizer) = created {
                    self.recognizer = RecognizerSlot::Ready(recognizer);
                    true
                } else {
                    tracing::warn!("speech recognition is not supported on this system");
                    self.recognizer = RecognizerSlot::Unsupported;
                    false
                }
            }
        }
    }

    fn apply(&mut self, effect: Effect) {
        match effect {
            Effect::StartReply { turn, text } => self.start_reply(turn, text),
            Effect::Silence => {
                self.collaborators.audio.stop();
                self.collaborators.native.cancel();
            }
            Effect::Synthesize {
                utterance,
                text,
                voice_id,
            } => self.synthesize(utterance, text, voice_id),
            Effect::PlayAudio { utterance, audio } => {
                let events = PlaybackEvents::new(utterance, self.signals.clone());
                self.collaborators.audio.play(audio, events);
            }
            Effect::SpeakNative {
                utterance,
                text,
                language,
            } => {
                let events = PlaybackEvents::new(utterance, self.signals.clone());
                self.collaborators.native.speak(&text, &language, events);
            }
            Effect::StartListening { listen, language } => {
                let events = RecognitionEvents::new(listen, self.signals.clone());
                match &mut self.recognizer {
                    RecognizerSlot::Ready(recognizer) => {
                        if let Err(e) = recognizer.start(&language, events.clone()) {
                            events.failed(e);
                        }
                    }
                    _ => events.failed("no recognizer available"),
                }
            }
            Effect::StopListening => {
                if let RecognizerSlot::Ready(recognizer) = &mut self.recognizer {
                    recognizer.stop();
                }
            }
        }
    }

    fn start_reply(&mut self, turn: OpId, text: String) {
        if let Some(previous) = self.reply_task.take() {
            previous.abort();
        }

        let chat = Arc::clone(&self.collaborators.chat);
        let tx = self.signals.clone();

        self.reply_task = Some(tokio::spawn(async move {
            let mut stream = match chat.send_streaming(&text).await {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = tx.send(Signal::ReplyFailed {
                        turn,
                        error: e.to_string(),
                    });
                    return;
                }
            };

            while let Some(chunk) = stream.next().await {
                let signal = match chunk {
                    Ok(text) => Signal::ReplyChunk { turn, text },
                    Err(e) => {
                        let _ = tx.send(Signal::ReplyFailed {
                            turn,
                            error: e.to_string(),
                        });
                        return;
                    }
                };
                if tx.send(signal).is_err() {
                    return;
                }
            }

            let _ = tx.send(Signal::ReplyFinished { turn });
        }));
    }

    fn synthesize(&self, utterance: OpId, text: String, voice_id: String) {
        let tx = self.signals.clone();
        let Some(synthesizer) = self.collaborators.synthesizer.clone() else {
            let _ = tx.send(Signal::Synthesized {
                utterance,
                result: Err("hosted TTS not configured".to_string()),
            });
            return;
        };

        tokio::spawn(async move {
            let result = synthesizer
                .synthesize(&text, &voice_id)
                .await
                .map_err(|e| e.to_string());
            let _ = tx.send(Signal::Synthesized { utterance, result });
        });
    }

    fn publish(&mut self) {
        let next = self.orchestrator.snapshot();
        self.snapshots.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });

        let avatar = self.orchestrator.avatar();
        if avatar != self.last_avatar {
            self.last_avatar = avatar;
            self.collaborators.avatar.render(avatar);
        }
    }

    fn teardown(&mut self) {
        if let Some(task) = self.reply_task.take() {
            task.abort();
        }
        self.collaborators.audio.stop();
        self.collaborators.native.cancel();
        if let RecognizerSlot::Ready(recognizer) = &mut self.recognizer {
            recognizer.stop();
        }
    }
}
