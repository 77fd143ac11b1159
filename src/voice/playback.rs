//! Audio playback to speakers

use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, StreamConfig};

use super::AudioOutput;
use crate::conversation::PlaybackEvents;
use crate::{Error, Result};

/// Plays MP3 audio on the default output device
///
/// One clip plays at a time; starting a new clip or calling
/// [`AudioOutput::stop`] halts the current one. The device is opened per
/// clip, so a missing device surfaces as a playback failure.
#[derive(Default)]
pub struct AudioPlayback {
    current: Mutex<Option<Arc<AtomicBool>>>,
}

impl AudioPlayback {
    /// Create a new audio playback instance
    ///
    /// # Errors
    ///
    /// Returns error if no output device is available
    pub fn new() -> Result<Self> {
        let device = cpal::default_host()
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            "audio playback initialized"
        );

        Ok(Self {
            current: Mutex::new(None),
        })
    }

    /// Decode and play MP3 bytes, blocking until done or stopped
    ///
    /// # Errors
    ///
    /// Returns error if decoding or playback fails
    pub fn play_mp3_blocking(mp3_data: &[u8], stop: &AtomicBool) -> Result<()> {
        let (samples, sample_rate) = decode_mp3(mp3_data)?;
        play_samples_blocking(samples, sample_rate, stop, &|| {})
    }

    fn replace_current(&self, next: Option<Arc<AtomicBool>>) {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = current.take() {
            previous.store(true, Ordering::SeqCst);
        }
        *current = next;
    }
}

impl AudioOutput for AudioPlayback {
    fn play(&self, audio: Vec<u8>, events: PlaybackEvents) {
        let stop = Arc::new(AtomicBool::new(false));
        self.replace_current(Some(Arc::clone(&stop)));

        tokio::task::spawn_blocking(move || {
            let result = decode_mp3(&audio).and_then(|(samples, sample_rate)| {
                drop(audio);
                play_reported(samples, sample_rate, &stop, &events, play_samples_blocking)
            });

            match result {
                Ok(()) => events.ended(),
                Err(e) => {
                    tracing::error!(utterance = %events.utterance(), error = %e, "playback failed");
                    events.failed(e);
                }
            }
        });
    }

    fn stop(&self) {
        self.replace_current(None);
    }
}

/// Signature of a blocking player; it calls `on_started` once sound is flowing
type Player = fn(Vec<f32>, u32, &AtomicBool, &dyn Fn()) -> Result<()>;

/// Play decoded samples, reporting started only once the device is running
fn play_reported(
    samples: Vec<f32>,
    sample_rate: u32,
    stop: &AtomicBool,
    events: &PlaybackEvents,
    play: Player,
) -> Result<()> {
    play(samples, sample_rate, stop, &|| events.started())
}

/// Pick an output config at `sample_rate`, preferring mono
fn output_config(device: &Device, sample_rate: u32) -> Result<StreamConfig> {
    let rate = SampleRate(sample_rate);
    let supports = |channels: u16| {
        device.supported_output_configs().ok().and_then(|mut configs| {
            configs.find(|c| {
                c.channels() == channels && c.min_sample_rate() <= rate && c.max_sample_rate() >= rate
            })
        })
    };

    let supported = supports(1)
        .or_else(|| supports(2))
        .ok_or_else(|| Error::Audio(format!("no output config for {sample_rate} Hz")))?;

    Ok(supported.with_sample_rate(rate).config())
}

/// Play mono samples, blocking until finished or `stop` is set
fn play_samples_blocking(
    samples: Vec<f32>,
    sample_rate: u32,
    stop: &AtomicBool,
    on_started: &dyn Fn(),
) -> Result<()> {
    let device = cpal::default_host()
        .default_output_device()
        .ok_or_else(|| Error::Audio("no output device".to_string()))?;
    let config = output_config(&device, sample_rate)?;
    let channels = usize::from(config.channels);

    let sample_count = samples.len();
    let finished = Arc::new(AtomicBool::new(false));
    let finished_in_callback = Arc::clone(&finished);
    let mut position = 0usize;

    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                for frame in data.chunks_mut(channels) {
                    let sample = samples.get(position).copied().unwrap_or_else(|| {
                        finished_in_callback.store(true, Ordering::SeqCst);
                        0.0
                    });
                    frame.fill(sample);
                    position = position.saturating_add(1);
                }
            },
            |err| {
                tracing::error!(error = %err, "audio playback error");
            },
            None,
        )
        .map_err(|e| Error::Audio(e.to_string()))?;

    stream.play().map_err(|e| Error::Audio(e.to_string()))?;
    on_started();

    let duration_ms = (sample_count as u64 * 1000) / u64::from(sample_rate);
    let timeout = Duration::from_millis(duration_ms + 500);
    let start = Instant::now();

    while !finished.load(Ordering::SeqCst) {
        if stop.load(Ordering::SeqCst) {
            tracing::debug!("playback stopped");
            return Ok(());
        }
        if start.elapsed() > timeout {
            break;
        }
        std::thread::sleep(Duration::from_millis(20));
    }

    // Let the device drain its last buffer
    std::thread::sleep(Duration::from_millis(100));
    drop(stream);
    tracing::debug!(samples = sample_count, "playback complete");

    Ok(())
}

/// Decode MP3 bytes to mono f32 samples and their sample rate
fn decode_mp3(mp3_data: &[u8]) -> Result<(Vec<f32>, u32)> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(mp3_data));
    let mut samples = Vec::new();
    let mut sample_rate = None;

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                sample_rate.get_or_insert(frame.sample_rate);
                samples.extend(mix_to_mono(&frame.data, frame.channels));
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(Error::Audio(format!("MP3 decode error: {e}"))),
        }
    }

    match sample_rate {
        Some(rate) if !samples.is_empty() => {
            let rate = u32::try_from(rate)
                .map_err(|_| Error::Audio(format!("invalid MP3 sample rate {rate}")))?;
            Ok((samples, rate))
        }
        _ => Err(Error::Audio("no audio frames decoded".to_string())),
    }
}

/// Convert interleaved i16 PCM to mono f32
#[allow(clippy::cast_precision_loss)]
fn mix_to_mono(data: &[i16], channels: usize) -> Vec<f32> {
    let channels = channels.max(1);
    data.chunks(channels)
        .map(|frame| {
            let sum: f32 = frame.iter().map(|&s| f32::from(s) / 32768.0).sum();
            sum / frame.len() as f32
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;
    use crate::conversation::{OpId, Signal};

    #[test]
    fn test_mix_stereo_to_mono() {
        let mono = mix_to_mono(&[16384, -16384, 16384, 16384], 2);
        assert_eq!(mono.len(), 2);
        assert!(mono[0].abs() < 1e-6);
        assert!((mono[1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_mix_mono_passthrough() {
        let mono = mix_to_mono(&[0, 32767, -32768], 1);
        assert_eq!(mono.len(), 3);
        assert!((mono[2] + 1.0).abs() < 1e-6);
    }

    fn reporter() -> (PlaybackEvents, mpsc::UnboundedReceiver<Signal>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (PlaybackEvents::new(OpId::from_raw(7), tx), rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<Signal>) -> Vec<Signal> {
        std::iter::from_fn(|| rx.try_recv().ok()).collect()
    }

    #[test]
    fn test_no_start_reported_when_device_fails() {
        let (events, mut rx) = reporter();
        let stop = AtomicBool::new(false);
        let result = play_reported(vec![0.0; 160], 16_000, &stop, &events, |_, _, _, _| {
            Err(Error::Audio("no output device".to_string()))
        });

        assert!(result.is_err());
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_start_reported_once_stream_runs() {
        let (events, mut rx) = reporter();
        let stop = AtomicBool::new(false);
        let result = play_reported(vec![0.0; 160], 16_000, &stop, &events, |samples, rate, _, on_started| {
            assert_eq!((samples.len(), rate), (160, 16_000));
            on_started();
            Ok(())
        });

        assert!(result.is_ok());
        let signals = drain(&mut rx);
        assert_eq!(signals.len(), 1);
        assert!(matches!(
            signals[0],
            Signal::PlaybackStarted { utterance } if utterance == OpId::from_raw(7)
        ));
    }

    #[test]
    fn test_decode_rejects_non_audio() {
        assert!(decode_mp3(&[]).is_err());
        assert!(decode_mp3(b"definitely not an mp3 stream").is_err());
    }
}
