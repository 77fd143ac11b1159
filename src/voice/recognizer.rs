//! Microphone speech recognition
//!
//! One run captures a single utterance, transcribes it with hosted STT and
//! reports one final result.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use super::{
    AudioCapture, RecognizerFactory, SAMPLE_RATE, SpeechRecognizer, SpeechToText, Transcript,
    UtteranceDetector, samples_to_wav,
};
use crate::conversation::{RecognitionEvents, RecognitionResult};
use crate::{Error, Result};

/// Longest a single run keeps the microphone open
const MAX_LISTEN: Duration = Duration::from_secs(15);

/// How often captured audio is handed to the endpointer
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Recognizer backed by the default microphone and hosted STT
pub struct MicRecognizer {
    stt: Arc<SpeechToText>,
    stop: Option<Arc<AtomicBool>>,
}

impl MicRecognizer {
    #[must_use]
    pub const fn new(stt: Arc<SpeechToText>) -> Self {
        Self { stt, stop: None }
    }
}

impl SpeechRecognizer for MicRecognizer {
    fn start(&mut self, language: &str, events: RecognitionEvents) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::Recognition(format!("no async runtime: {e}")))?;

        self.stop();
        let stop = Arc::new(AtomicBool::new(false));
        self.stop = Some(Arc::clone(&stop));

        let stt = Arc::clone(&self.stt);
        let language = language.to_string();

        runtime.spawn(async move {
            let capture_events = events.clone();
            let recorded =
                tokio::task::spawn_blocking(move || record_utterance(&capture_events, &stop)).await;

            let outcome = match recorded {
                Ok(Ok(Some(samples))) => transcribe(&stt, &samples, &language).await,
                Ok(Ok(None)) => Ok(None),
                Ok(Err(e)) => Err(e),
                Err(e) => Err(Error::Recognition(format!("capture task failed: {e}"))),
            };

            match outcome {
                Ok(Some(transcript)) => events.result(vec![RecognitionResult {
                    is_final: true,
                    alternatives: transcript.alternatives,
                }]),
                Ok(None) => tracing::debug!(listen = %events.listen(), "no speech recognized"),
                Err(e) => {
                    tracing::warn!(listen = %events.listen(), error = %e, "recognition failed");
                    events.failed(e);
                }
            }
            events.ended();
        });

        Ok(())
    }

    fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            stop.store(true, Ordering::SeqCst);
        }
    }
}

/// Capture until the utterance ends, the run is stopped, or time runs out
///
/// Returns `None` when no usable speech was heard.
fn record_utterance(events: &RecognitionEvents, stop: &AtomicBool) -> Result<Option<Vec<f32>>> {
    let mut capture = AudioCapture::new()?;
    capture.start()?;
    events.started();

    let mut detector = UtteranceDetector::new();
    let deadline = Instant::now() + MAX_LISTEN;

    loop {
        std::thread::sleep(POLL_INTERVAL);
        if detector.process(&capture.take_buffer()) {
            break;
        }
        if stop.load(Ordering::SeqCst) || Instant::now() >= deadline {
            if !detector.has_speech() {
                return Ok(None);
            }
            break;
        }
    }

    capture.stop();
    Ok(Some(detector.take_utterance()))
}

async fn transcribe(stt: &SpeechToText, samples: &[f32], language: &str) -> Result<Option<Transcript>> {
    let wav = samples_to_wav(samples, SAMPLE_RATE)?;
    let transcript = stt.transcribe(&wav, language).await?;
    Ok(transcript.best().is_some().then_some(transcript))
}

/// Creates [`MicRecognizer`]s when STT and a microphone are available
pub struct MicRecognizerFactory {
    stt: Option<Arc<SpeechToText>>,
}

impl MicRecognizerFactory {
    #[must_use]
    pub fn new(stt: Option<SpeechToText>) -> Self {
        Self {
            stt: stt.map(Arc::new),
        }
    }
}

impl RecognizerFactory for MicRecognizerFactory {
    fn create(&self) -> Option<Box<dyn SpeechRecognizer>> {
        let Some(stt) = &self.stt else {
            tracing::debug!("no STT provider configured");
            return None;
        };
        if !AudioCapture::input_available() {
            tracing::debug!("no input device");
            return None;
        }
        Some(Box::new(MicRecognizer::new(Arc::clone(stt))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_without_stt_is_unsupported() {
        let factory = MicRecognizerFactory::new(None);
        assert!(factory.create().is_none());
    }
}
