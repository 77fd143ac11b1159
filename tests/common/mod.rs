//! Shared test utilities
//!
//! In-memory collaborators for driving a [`Companion`] without network or
//! audio hardware.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::watch;

use aura_companion::avatar::AvatarRenderer;
use aura_companion::conversation::{
    AvatarState, Collaborators, Companion, Orchestrator, PlaybackEvents, RecognitionEvents,
    Snapshot,
};
use aura_companion::llm::{ChatSession, ChunkStream};
use aura_companion::voice::{
    AudioOutput, NativeSpeech, NativeVoice, RecognizerFactory, SpeechRecognizer, SpeechSynthesizer,
};
use aura_companion::{Error, Result};

/// One step of a scripted reply stream
#[derive(Debug, Clone)]
pub enum Step {
    Chunk(&'static str),
    Fail(&'static str),
    /// Stream stays open forever
    Hang,
}

/// Chat session replaying scripted streams, one per message
#[derive(Default)]
pub struct ScriptedChat {
    scripts: Mutex<VecDeque<Vec<Step>>>,
    sent: Mutex<Vec<String>>,
}

impl ScriptedChat {
    pub fn new(scripts: Vec<Vec<Step>>) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts.into()),
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatSession for ScriptedChat {
    async fn send_streaming(&self, text: &str) -> Result<ChunkStream> {
        self.sent.lock().unwrap().push(text.to_string());
        let script = self.scripts.lock().unwrap().pop_front().unwrap_or_default();

        let hangs = script.iter().any(|s| matches!(s, Step::Hang));
        let items: Vec<Result<String>> = script
            .into_iter()
            .take_while(|s| !matches!(s, Step::Hang))
            .map(|s| match s {
                Step::Chunk(text) => Ok(text.to_string()),
                Step::Fail(e) => Err(Error::Generation(e.to_string())),
                Step::Hang => unreachable!(),
            })
            .collect();

        let stream = futures::stream::iter(items);
        if hangs {
            Ok(stream.chain(futures::stream::pending()).boxed())
        } else {
            Ok(stream.boxed())
        }
    }
}

/// Synthesizer returning fixed bytes, or failing
pub struct MockSynth {
    fail: bool,
    requests: Mutex<Vec<(String, String)>>,
}

impl MockSynth {
    pub fn ok() -> Arc<Self> {
        Arc::new(Self {
            fail: false,
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            requests: Mutex::new(Vec::new()),
        })
    }

    /// `(text, voice_id)` pairs in request order
    pub fn requests(&self) -> Vec<(String, String)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl SpeechSynthesizer for MockSynth {
    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<Vec<u8>> {
        self.requests
            .lock()
            .unwrap()
            .push((text.to_string(), voice_id.to_string()));
        if self.fail {
            Err(Error::Tts("quota exceeded".to_string()))
        } else {
            Ok(format!("mp3:{text}").into_bytes())
        }
    }
}

/// Audio output that records clips
///
/// With `auto_finish` each clip starts and ends immediately; otherwise the
/// clip stays "playing" until the test finishes it.
pub struct MockAudio {
    auto_finish: bool,
    played: Mutex<Vec<Vec<u8>>>,
    pending: Mutex<Vec<PlaybackEvents>>,
    stops: Mutex<usize>,
}

impl MockAudio {
    pub fn new(auto_finish: bool) -> Arc<Self> {
        Arc::new(Self {
            auto_finish,
            played: Mutex::new(Vec::new()),
            pending: Mutex::new(Vec::new()),
            stops: Mutex::new(0),
        })
    }

    pub fn played(&self) -> Vec<Vec<u8>> {
        self.played.lock().unwrap().clone()
    }

    pub fn stops(&self) -> usize {
        *self.stops.lock().unwrap()
    }

    /// Finish the oldest clip still playing
    pub fn finish_oldest(&self) {
        let events = {
            let mut pending = self.pending.lock().unwrap();
            (!pending.is_empty()).then(|| pending.remove(0))
        };
        if let Some(events) = events {
            events.ended();
        }
    }
}

impl AudioOutput for MockAudio {
    fn play(&self, audio: Vec<u8>, events: PlaybackEvents) {
        self.played.lock().unwrap().push(audio);
        events.started();
        if self.auto_finish {
            events.ended();
        } else {
            self.pending.lock().unwrap().push(events);
        }
    }

    fn stop(&self) {
        *self.stops.lock().unwrap() += 1;
    }
}

/// Platform speech that records utterances
pub struct MockNative {
    fail: bool,
    spoken: Mutex<Vec<(String, String)>>,
    cancels: Mutex<usize>,
}

impl MockNative {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            fail: false,
            spoken: Mutex::new(Vec::new()),
            cancels: Mutex::new(0),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            spoken: Mutex::new(Vec::new()),
            cancels: Mutex::new(0),
        })
    }

    /// `(text, language)` pairs in order
    pub fn spoken(&self) -> Vec<(String, String)> {
        self.spoken.lock().unwrap().clone()
    }

    pub fn cancels(&self) -> usize {
        *self.cancels.lock().unwrap()
    }
}

#[async_trait]
impl NativeSpeech for MockNative {
    async fn voices(&self) -> Result<Vec<NativeVoice>> {
        Ok(Vec::new())
    }

    fn speak(&self, text: &str, language: &str, events: PlaybackEvents) {
        self.spoken
            .lock()
            .unwrap()
            .push((text.to_string(), language.to_string()));
        if self.fail {
            events.failed("engine missing");
        } else {
            events.started();
            events.ended();
        }
    }

    fn cancel(&self) {
        *self.cancels.lock().unwrap() += 1;
    }
}

/// Shared view of the recognizer a [`MockRecognizers`] factory created
#[derive(Default)]
pub struct RecognizerProbe {
    pub starts: Mutex<Vec<String>>,
    pub stops: Mutex<usize>,
    pub current: Mutex<Option<RecognitionEvents>>,
}

impl RecognizerProbe {
    /// Events handle of the latest run
    pub fn events(&self) -> RecognitionEvents {
        self.current
            .lock()
            .unwrap()
            .clone()
            .expect("recognition was started")
    }
}

struct MockRecognizer {
    probe: Arc<RecognizerProbe>,
}

impl SpeechRecognizer for MockRecognizer {
    fn start(&mut self, language: &str, events: RecognitionEvents) -> Result<()> {
        self.probe.starts.lock().unwrap().push(language.to_string());
        *self.probe.current.lock().unwrap() = Some(events);
        Ok(())
    }

    fn stop(&mut self) {
        *self.probe.stops.lock().unwrap() += 1;
        if let Some(events) = self.probe.current.lock().unwrap().take() {
            events.ended();
        }
    }
}

/// Factory that is either supported or not
pub struct MockRecognizers {
    supported: bool,
    pub probe: Arc<RecognizerProbe>,
    created: Mutex<usize>,
}

impl MockRecognizers {
    pub fn new(supported: bool) -> Arc<Self> {
        Arc::new(Self {
            supported,
            probe: Arc::new(RecognizerProbe::default()),
            created: Mutex::new(0),
        })
    }

    /// Number of creation attempts
    pub fn created(&self) -> usize {
        *self.created.lock().unwrap()
    }
}

impl RecognizerFactory for MockRecognizers {
    fn create(&self) -> Option<Box<dyn SpeechRecognizer>> {
        *self.created.lock().unwrap() += 1;
        self.supported.then(|| {
            Box::new(MockRecognizer {
                probe: Arc::clone(&self.probe),
            }) as Box<dyn SpeechRecognizer>
        })
    }
}

/// Avatar recording every rendered state
#[derive(Default)]
pub struct RecordingAvatar {
    states: Mutex<Vec<AvatarState>>,
}

impl RecordingAvatar {
    pub fn states(&self) -> Vec<AvatarState> {
        self.states.lock().unwrap().clone()
    }
}

impl AvatarRenderer for RecordingAvatar {
    fn render(&self, state: AvatarState) {
        self.states.lock().unwrap().push(state);
    }
}

/// A companion wired to mocks, with handles to inspect them
pub struct Harness {
    pub companion: Companion,
    pub chat: Arc<ScriptedChat>,
    pub synth: Option<Arc<MockSynth>>,
    pub audio: Arc<MockAudio>,
    pub native: Arc<MockNative>,
    pub recognizers: Arc<MockRecognizers>,
    pub avatar: Arc<RecordingAvatar>,
}

/// Builder for [`Harness`]
pub struct HarnessBuilder {
    scripts: Vec<Vec<Step>>,
    synth: Option<Arc<MockSynth>>,
    audio: Arc<MockAudio>,
    native: Arc<MockNative>,
    recognizers: Arc<MockRecognizers>,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        Self {
            scripts: Vec::new(),
            synth: Some(MockSynth::ok()),
            audio: MockAudio::new(true),
            native: MockNative::new(),
            recognizers: MockRecognizers::new(true),
        }
    }

    pub fn replies(mut self, scripts: Vec<Vec<Step>>) -> Self {
        self.scripts = scripts;
        self
    }

    pub fn synth(mut self, synth: Option<Arc<MockSynth>>) -> Self {
        self.synth = synth;
        self
    }

    pub fn audio(mut self, audio: Arc<MockAudio>) -> Self {
        self.audio = audio;
        self
    }

    pub fn native(mut self, native: Arc<MockNative>) -> Self {
        self.native = native;
        self
    }

    pub fn recognition(mut self, supported: bool) -> Self {
        self.recognizers = MockRecognizers::new(supported);
        self
    }

    pub fn spawn(self) -> Harness {
        let chat = ScriptedChat::new(self.scripts);
        let avatar = Arc::new(RecordingAvatar::default());

        let collaborators = Collaborators {
            chat: Arc::clone(&chat) as Arc<dyn ChatSession>,
            synthesizer: self
                .synth
                .clone()
                .map(|s| s as Arc<dyn SpeechSynthesizer>),
            audio: Arc::clone(&self.audio) as Arc<dyn AudioOutput>,
            native: Arc::clone(&self.native) as Arc<dyn NativeSpeech>,
            recognizers: Some(Arc::clone(&self.recognizers) as Arc<dyn RecognizerFactory>),
            avatar: Arc::clone(&avatar) as Arc<dyn AvatarRenderer>,
        };

        let companion = Companion::spawn(Orchestrator::new("en-US", "voice-a"), collaborators);

        Harness {
            companion,
            chat,
            synth: self.synth,
            audio: self.audio,
            native: self.native,
            recognizers: self.recognizers,
            avatar,
        }
    }
}

/// Wait until the published state satisfies `predicate`
pub async fn wait_for(
    rx: &mut watch::Receiver<Snapshot>,
    predicate: impl FnMut(&Snapshot) -> bool,
) -> Snapshot {
    tokio::time::timeout(Duration::from_secs(2), rx.wait_for(predicate))
        .await
        .expect("timed out waiting for state")
        .expect("conversation runtime stopped")
        .clone()
}

/// Poll `condition` until it holds
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition never held");
}

/// Let the runtime drain pending work
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}
