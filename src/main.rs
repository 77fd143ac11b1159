use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use clap::{Parser, Subcommand};
use secrecy::SecretString;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use aura_companion::auth::{self, CredentialStore};
use aura_companion::avatar::StatusLine;
use aura_companion::conversation::{Collaborators, Companion, OpId, Orchestrator, PlaybackEvents, Signal};
use aura_companion::llm::{ChatBackend, GeminiChat};
use aura_companion::terminal::{self, ChatExit};
use aura_companion::voice::{
    AudioCapture, AudioOutput, AudioPlayback, ElevenLabsTts, MicRecognizerFactory, NativeSpeech,
    RecognizerFactory, SpeechSynthesizer, SpeechToText, SystemSpeech, VOICE_CATALOG,
};
use aura_companion::Config;

/// AURA - voice-enabled conversational companion
#[derive(Parser)]
#[command(name = "aura", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Interactive first-run setup
    Setup,
    /// Test speech output
    TestTts {
        /// Text to speak
        #[arg(default_value = "Hello! This is a test of the text to speech system.")]
        text: String,
        /// Use the platform speech engine instead of hosted TTS
        #[arg(long)]
        native: bool,
    },
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// List hosted and platform voices
    Voices,
    /// Send a (simulated) verification link
    Verify {
        /// Account e-mail address
        email: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Logs go to stderr so they never interleave with streamed replies
    let filter = match cli.verbose {
        0 => "warn,aura_companion=warn",
        1 => "info,aura_companion=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    if let Some(cmd) = cli.command {
        return match cmd {
            Command::Setup => aura_companion::setup::run_setup(),
            Command::TestTts { text, native } => test_tts(&text, native).await,
            Command::TestMic { duration } => test_mic(duration).await,
            Command::Voices => list_voices().await,
            Command::Verify { email } => {
                println!("{}", auth::request_verification(&email)?);
                Ok(())
            }
        };
    }

    let config = Config::load()?;
    tracing::debug!(?config, "loaded configuration");

    let store = CredentialStore::new(&config.data_dir);
    let backend = GeminiChat::new(
        config.api_keys.gemini.clone(),
        config.llm.model.clone(),
        config.llm.base_url.clone(),
    );
    let voice = build_voice(&config)?;

    tracing::info!(
        model = %config.llm.model,
        language = %config.language,
        hosted_tts = voice.synthesizer.is_some(),
        "AURA ready"
    );

    while let Some(callsign) = terminal::run_gate(&store)? {
        // Each login gets a fresh chat context
        let chat = backend.create_session(&config.persona.system_prompt(), config.persona.tuning());
        let companion = Companion::spawn(
            Orchestrator::new(config.language.clone(), config.voice.tts_voice.clone()),
            Collaborators {
                chat,
                synthesizer: voice.synthesizer.clone(),
                audio: Arc::clone(&voice.audio),
                native: Arc::clone(&voice.native),
                recognizers: voice.recognizers.clone(),
                avatar: Arc::new(StatusLine::stderr()),
            },
        );

        companion.open(config.persona.greeting(&callsign))?;
        let exit = terminal::run_chat(&companion, config.persona.name()).await;
        companion.shutdown().await;

        match exit? {
            ChatExit::Logout => println!("Logged out.\n"),
            ChatExit::Quit => break,
        }
    }

    Ok(())
}

/// Speech collaborators shared by every session
struct VoiceStack {
    synthesizer: Option<Arc<dyn SpeechSynthesizer>>,
    audio: Arc<dyn AudioOutput>,
    native: Arc<dyn NativeSpeech>,
    recognizers: Option<Arc<dyn RecognizerFactory>>,
}

fn build_voice(config: &Config) -> anyhow::Result<VoiceStack> {
    let native_voice = config.persona.native_voice();
    let native = SystemSpeech::detect(
        config.voice.native_command.as_deref(),
        native_voice.pitch,
        native_voice.rate,
    );

    let (audio, output_ok) = match AudioPlayback::new() {
        Ok(playback) => (playback, true),
        Err(e) => {
            tracing::warn!(error = %e, "audio output unavailable, using the platform voice");
            (AudioPlayback::default(), false)
        }
    };

    let synthesizer: Option<Arc<dyn SpeechSynthesizer>> = match &config.api_keys.elevenlabs {
        Some(key) if output_ok => Some(Arc::new(ElevenLabsTts::new(
            key.clone(),
            config.voice.tts_model.clone(),
            &config.voice.tts_base_url,
        )?)),
        _ => None,
    };

    let stt = speech_to_text(config)?;
    if stt.is_none() {
        tracing::info!("no STT key configured; voice input disabled");
    }

    Ok(VoiceStack {
        synthesizer,
        audio: Arc::new(audio),
        native: Arc::new(native),
        recognizers: Some(Arc::new(MicRecognizerFactory::new(stt))),
    })
}

/// Whisper when an `OpenAI` key is set, otherwise Deepgram
fn speech_to_text(config: &Config) -> anyhow::Result<Option<SpeechToText>> {
    let model = config.voice.stt_model.clone();
    if let Some(key) = &config.api_keys.openai {
        let model = model.unwrap_or_else(|| "whisper-1".to_string());
        return Ok(Some(SpeechToText::new_whisper(key.clone(), model)?));
    }
    if let Some(key) = &config.api_keys.deepgram {
        let model = model.unwrap_or_else(|| "nova-2".to_string());
        return Ok(Some(SpeechToText::new_deepgram(key.clone(), model)?));
    }
    Ok(None)
}

/// Test speech output: hosted TTS first, platform speech on failure
async fn test_tts(text: &str, native: bool) -> anyhow::Result<()> {
    println!("Testing TTS with text: \"{text}\"\n");

    let config = Config::load()?;

    let key = config.api_keys.elevenlabs.clone().filter(|_| !native);
    let Some(key) = key else {
        return test_native(&config, text).await;
    };

    match test_hosted(&config, key, text).await {
        Ok(()) => {
            println!("\n---");
            println!("If you heard the speech, hosted TTS is working!");
            Ok(())
        }
        Err(e) => {
            println!("Hosted TTS failed: {e}");
            test_native(&config, text).await
        }
    }
}

async fn test_hosted(config: &Config, key: SecretString, text: &str) -> anyhow::Result<()> {
    let tts = ElevenLabsTts::new(key, config.voice.tts_model.clone(), &config.voice.tts_base_url)?;

    println!("Synthesizing speech...");
    let mp3_data = tts.synthesize(text, &config.voice.tts_voice).await?;
    println!("Got {} bytes of audio data", mp3_data.len());

    println!("Playing audio...");
    tokio::task::spawn_blocking(move || {
        AudioPlayback::play_mp3_blocking(&mp3_data, &AtomicBool::new(false))
    })
    .await??;

    Ok(())
}

async fn test_native(config: &Config, text: &str) -> anyhow::Result<()> {
    let pitch_rate = config.persona.native_voice();
    let speech = SystemSpeech::detect(
        config.voice.native_command.as_deref(),
        pitch_rate.pitch,
        pitch_rate.rate,
    );
    if !speech.is_available() {
        anyhow::bail!("no platform speech engine found (install espeak-ng)");
    }

    println!("Speaking with the platform engine ({})...", config.language);
    let (tx, mut rx) = mpsc::unbounded_channel();
    speech.speak(text, &config.language, PlaybackEvents::new(OpId::from_raw(1), tx));

    while let Some(signal) = rx.recv().await {
        match signal {
            Signal::PlaybackEnded { .. } => break,
            Signal::PlaybackFailed { error, .. } => anyhow::bail!("native speech failed: {error}"),
            _ => {}
        }
    }

    println!("\n---");
    println!("If you heard the speech, the platform voice is working!");
    Ok(())
}

/// Test microphone input
#[allow(clippy::future_not_send)]
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let mut capture = AudioCapture::new()?;
    capture.start()?;
    println!("---");

    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let samples = capture.take_buffer();
        let energy = calculate_rms(&samples);
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "#".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!(
            "[{:2}s] RMS: {:.4} | Peak: {:.4} | [{}]",
            i + 1,
            energy,
            peak,
            meter
        );
    }

    capture.stop();

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: pactl info | grep 'Default Source'");
    println!("  3. Run: arecord -l (to list devices)");

    Ok(())
}

/// Calculate RMS energy
#[allow(clippy::cast_precision_loss)]
fn calculate_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// List hosted catalog voices and installed platform voices
async fn list_voices() -> anyhow::Result<()> {
    println!("Hosted voices:");
    for (i, voice) in VOICE_CATALOG.iter().enumerate() {
        println!("  {}. {:<22} {}", i + 1, voice.name, voice.id);
    }

    let speech = SystemSpeech::detect(None, 1.0, 1.0);
    println!("\nPlatform voices:");
    match speech.voices().await {
        Ok(voices) if voices.is_empty() => println!("  (none installed)"),
        Ok(voices) => {
            for voice in voices {
                println!("  {:<10} {:<24} {}", voice.language, voice.name, voice.id);
            }
        }
        Err(e) => println!("  unavailable: {e}"),
    }

    Ok(())
}
