//! Turn-taking state machine
//!
//! Owns the transcript, the avatar state and the current operation tokens.
//! Operations return the effects the runtime must carry out; collaborator
//! results come back through [`Orchestrator::handle`].

use super::{AvatarState, Message, MessageId, OpId, RecognitionResult, Signal, Snapshot};

/// Spoken and displayed when the reply stream fails
pub const TRANSMISSION_ERROR: &str = "I encountered a transmission error. Please try again.";

/// Work the runtime must perform on behalf of the orchestrator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Send the user text to the chat session and stream the reply
    StartReply { turn: OpId, text: String },
    /// Stop any audible output (playback and native speech)
    Silence,
    /// Request hosted synthesis of `text`
    Synthesize {
        utterance: OpId,
        text: String,
        voice_id: String,
    },
    /// Play synthesized audio bytes
    PlayAudio { utterance: OpId, audio: Vec<u8> },
    /// Speak `text` with the platform speech engine
    SpeakNative {
        utterance: OpId,
        text: String,
        language: String,
    },
    /// Open the microphone for one recognition run
    StartListening { listen: OpId, language: String },
    /// Close the microphone
    StopListening,
}

/// Reply currently being streamed
#[derive(Debug)]
struct Turn {
    id: OpId,
    placeholder: MessageId,
    reply: String,
    first_chunk_seen: bool,
}

/// Speech output currently in flight
#[derive(Debug)]
struct Utterance {
    id: OpId,
    text: String,
    fell_back: bool,
}

/// Conversation state machine
#[derive(Debug)]
pub struct Orchestrator {
    messages: Vec<Message>,
    avatar: AvatarState,
    is_listening: bool,
    language: String,
    voice_id: String,
    next_op: u64,
    turn: Option<Turn>,
    utterance: Option<Utterance>,
    listen: Option<OpId>,
}

impl Orchestrator {
    /// Create an empty conversation in the `Idle` state
    #[must_use]
    pub fn new(language: impl Into<String>, voice_id: impl Into<String>) -> Self {
        Self {
            messages: Vec::new(),
            avatar: AvatarState::Idle,
            is_listening: false,
            language: language.into(),
            voice_id: voice_id.into(),
            next_op: 0,
            turn: None,
            utterance: None,
            listen: None,
        }
    }

    /// Post the greeting and speak it
    pub fn open(&mut self, greeting: &str) -> Vec<Effect> {
        self.messages.push(Message::agent(greeting));
        self.speak(greeting)
    }

    /// Submit user input, typed or recognized
    ///
    /// Blank input, or input while a reply is pending, is ignored.
    pub fn submit_user_message(&mut self, text: &str) -> Vec<Effect> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        if self.avatar == AvatarState::Thinking {
            tracing::debug!("reply pending, ignoring submission");
            return Vec::new();
        }

        let mut effects = Vec::new();
        self.interrupt_output(&mut effects);
        self.abandon_listening(&mut effects);

        self.messages.push(Message::user(text));
        let placeholder = Message::agent("");
        let placeholder_id = placeholder.id;
        self.messages.push(placeholder);
        self.avatar = AvatarState::Thinking;

        let turn = self.issue();
        self.turn = Some(Turn {
            id: turn,
            placeholder: placeholder_id,
            reply: String::new(),
            first_chunk_seen: false,
        });
        tracing::debug!(%turn, "reply requested");

        effects.push(Effect::StartReply {
            turn,
            text: text.to_string(),
        });
        effects
    }

    /// Speak `text`, superseding whatever is currently audible
    pub fn speak(&mut self, text: &str) -> Vec<Effect> {
        let mut effects = Vec::new();
        self.interrupt_output(&mut effects);

        if text.trim().is_empty() {
            self.avatar = AvatarState::Idle;
            return effects;
        }

        let utterance = self.issue();
        self.utterance = Some(Utterance {
            id: utterance,
            text: text.to_string(),
            fell_back: false,
        });
        effects.push(Effect::Synthesize {
            utterance,
            text: text.to_string(),
            voice_id: self.voice_id.clone(),
        });
        effects
    }

    /// Open the microphone, or close it if it is open
    ///
    /// Only called once a recognizer exists; an unsupported platform never
    /// reaches the state machine.
    pub fn toggle_voice_input(&mut self) -> Vec<Effect> {
        if self.is_listening {
            return vec![Effect::StopListening];
        }

        let mut effects = Vec::new();
        self.interrupt_output(&mut effects);
        self.avatar = AvatarState::Idle;

        let listen = self.issue();
        self.listen = Some(listen);
        effects.push(Effect::StartListening {
            listen,
            language: self.language.clone(),
        });
        effects
    }

    /// Change the conversation language
    pub fn set_language(&mut self, language: impl Into<String>) {
        self.language = language.into();
    }

    /// Change the hosted TTS voice
    pub fn set_voice(&mut self, voice_id: impl Into<String>) {
        self.voice_id = voice_id.into();
    }

    /// Apply a collaborator signal
    pub fn handle(&mut self, signal: Signal) -> Vec<Effect> {
        match signal {
            Signal::ReplyChunk { turn, text } => {
                self.on_reply_chunk(turn, &text);
                Vec::new()
            }
            Signal::ReplyFinished { turn } => self.on_reply_finished(turn),
            Signal::ReplyFailed { turn, error } => self.on_reply_failed(turn, &error),
            Signal::Synthesized { utterance, result } => self.on_synthesized(utterance, result),
            Signal::PlaybackStarted { utterance } => {
                if self.is_current_utterance(utterance) {
                    self.avatar = AvatarState::Speaking;
                }
                Vec::new()
            }
            Signal::PlaybackEnded { utterance } => {
                self.on_playback_done(utterance);
                Vec::new()
            }
            Signal::PlaybackFailed { utterance, error } => {
                if self.is_current_utterance(utterance) {
                    tracing::warn!(%utterance, error, "speech output failed");
                }
                self.on_playback_done(utterance);
                Vec::new()
            }
            Signal::ListeningStarted { listen } => {
                if self.listen == Some(listen) {
                    self.is_listening = true;
                    self.avatar = AvatarState::Listening;
                }
                Vec::new()
            }
            Signal::Recognized { listen, results } => self.on_recognized(listen, &results),
            Signal::ListeningEnded { listen } => {
                self.on_listening_closed(listen);
                Vec::new()
            }
            Signal::RecognitionFailed { listen, error } => {
                tracing::warn!(%listen, error, "speech recognition error");
                self.on_listening_closed(listen);
                Vec::new()
            }
        }
    }

    /// Transcript in display order
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    #[must_use]
    pub const fn avatar(&self) -> AvatarState {
        self.avatar
    }

    #[must_use]
    pub const fn is_listening(&self) -> bool {
        self.is_listening
    }

    #[must_use]
    pub fn language(&self) -> &str {
        &self.language
    }

    #[must_use]
    pub fn voice_id(&self) -> &str {
        &self.voice_id
    }

    /// Copy of the observable state
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            messages: self.messages.clone(),
            avatar: self.avatar,
            is_listening: self.is_listening,
            language: self.language.clone(),
            voice_id: self.voice_id.clone(),
        }
    }

    fn issue(&mut self) -> OpId {
        self.next_op += 1;
        OpId(self.next_op)
    }

    /// Invalidate the current utterance and silence any output
    fn interrupt_output(&mut self, effects: &mut Vec<Effect>) {
        if let Some(previous) = self.utterance.take() {
            tracing::debug!(utterance = %previous.id, "speech interrupted");
        }
        effects.push(Effect::Silence);
    }

    /// Stop the recognition run and drop its token so later signals are inert
    fn abandon_listening(&mut self, effects: &mut Vec<Effect>) {
        if let Some(listen) = self.listen.take() {
            tracing::debug!(%listen, "recognition run abandoned");
            effects.push(Effect::StopListening);
        }
        self.is_listening = false;
        if self.avatar == AvatarState::Listening {
            self.avatar = AvatarState::Idle;
        }
    }

    fn is_current_utterance(&self, utterance: OpId) -> bool {
        self.utterance.as_ref().is_some_and(|u| u.id == utterance)
    }

    fn current_turn(&mut self, turn: OpId) -> Option<&mut Turn> {
        match self.turn.as_mut() {
            Some(current) if current.id == turn => Some(current),
            _ => {
                tracing::debug!(%turn, "ignoring signal from superseded turn");
                None
            }
        }
    }

    fn set_text(&mut self, id: MessageId, text: &str) {
        if let Some(message) = self.messages.iter_mut().rev().find(|m| m.id == id) {
            text.clone_into(&mut message.text);
        }
    }

    fn on_reply_chunk(&mut self, turn: OpId, chunk: &str) {
        let Some(current) = self.current_turn(turn) else {
            return;
        };
        let first = !current.first_chunk_seen;
        current.first_chunk_seen = true;
        current.reply.push_str(chunk);
        let placeholder = current.placeholder;
        let reply = current.reply.clone();

        if first {
            self.avatar = AvatarState::Speaking;
        }
        self.set_text(placeholder, &reply);
    }

    fn on_reply_finished(&mut self, turn: OpId) -> Vec<Effect> {
        if self.current_turn(turn).is_none() {
            return Vec::new();
        }
        let Some(finished) = self.turn.take() else {
            return Vec::new();
        };
        tracing::debug!(%turn, chars = finished.reply.len(), "reply complete");
        self.speak(&finished.reply)
    }

    fn on_reply_failed(&mut self, turn: OpId, error: &str) -> Vec<Effect> {
        if self.current_turn(turn).is_none() {
            return Vec::new();
        }
        let Some(failed) = self.turn.take() else {
            return Vec::new();
        };
        tracing::error!(%turn, error, "reply stream failed");
        self.set_text(failed.placeholder, TRANSMISSION_ERROR);
        self.speak(TRANSMISSION_ERROR)
    }

    fn on_synthesized(&mut self, utterance: OpId, result: Result<Vec<u8>, String>) -> Vec<Effect> {
        let language = self.language.clone();
        let Some(current) = self.utterance.as_mut().filter(|u| u.id == utterance) else {
            tracing::debug!(%utterance, "ignoring synthesis for superseded utterance");
            return Vec::new();
        };

        match result {
            Ok(audio) => vec![Effect::PlayAudio { utterance, audio }],
            Err(error) if !current.fell_back => {
                tracing::warn!(%utterance, error, "hosted TTS failed, falling back to native speech");
                current.fell_back = true;
                vec![Effect::SpeakNative {
                    utterance,
                    text: current.text.clone(),
                    language,
                }]
            }
            Err(error) => {
                tracing::warn!(%utterance, error, "synthesis failed after fallback");
                self.utterance = None;
                self.avatar = AvatarState::Idle;
                Vec::new()
            }
        }
    }

    fn on_playback_done(&mut self, utterance: OpId) {
        if self.is_current_utterance(utterance) {
            self.utterance = None;
            self.avatar = AvatarState::Idle;
        }
    }

    fn on_recognized(&mut self, listen: OpId, results: &[RecognitionResult]) -> Vec<Effect> {
        if self.listen != Some(listen) {
            tracing::debug!(%listen, "ignoring result from superseded recognition run");
            return Vec::new();
        }
        let transcript = results
            .iter()
            .find(|r| r.is_final)
            .and_then(|r| r.alternatives.first())
            .map(|a| a.transcript.clone());

        match transcript {
            Some(text) => {
                tracing::info!(transcript = %text, "voice input recognized");
                self.submit_user_message(&text)
            }
            None => Vec::new(),
        }
    }

    fn on_listening_closed(&mut self, listen: OpId) {
        if self.listen != Some(listen) {
            return;
        }
        self.listen = None;
        self.is_listening = false;
        if self.avatar == AvatarState::Listening {
            self.avatar = AvatarState::Idle;
        }
    }
}
