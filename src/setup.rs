//! Interactive first-run setup wizard (`aura setup`)

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use dialoguer::{Confirm, Input, Select};

use crate::config::file::{ApiKeysFileConfig, AuraConfigFile, VoiceFileConfig};
use crate::language::{DEFAULT_LANGUAGE, SUPPORTED_LANGUAGES};
use crate::voice::{DEFAULT_VOICE_ID, VOICE_CATALOG};

/// Speech-to-text providers offered by the wizard
const STT_PROVIDERS: [&str; 3] = ["None (typed input only)", "OpenAI Whisper", "Deepgram"];

/// Run the interactive setup wizard
///
/// # Errors
///
/// Returns error if user input fails or config cannot be written
pub fn run_setup() -> anyhow::Result<()> {
    println!("AURA Setup\n");

    let existing = crate::config::file::load_config_file();
    let config_path = crate::config::file::config_file_path()
        .unwrap_or_else(|| PathBuf::from("~/.config/aura/config.toml"));

    if config_path.exists() {
        println!("Existing config found at {}\n", config_path.display());
    }

    // 1. Text generation key (required)
    let gemini = prompt_key(
        "Gemini API key",
        "API_KEY",
        existing.api_keys.gemini.as_deref(),
        false,
    )?;

    // 2. Hosted voice (optional)
    let elevenlabs = prompt_key(
        "ElevenLabs API key",
        "ELEVENLABS_API_KEY, blank for the platform voice",
        existing.api_keys.elevenlabs.as_deref(),
        true,
    )?;

    let current_voice = existing
        .voice
        .tts_voice
        .as_deref()
        .unwrap_or(DEFAULT_VOICE_ID);
    let voice_labels: Vec<&str> = VOICE_CATALOG.iter().map(|v| v.name).collect();
    let voice_idx = Select::new()
        .with_prompt("Select a voice")
        .items(&voice_labels)
        .default(
            VOICE_CATALOG
                .iter()
                .position(|v| v.id == current_voice)
                .unwrap_or(0),
        )
        .interact()?;

    // 3. Language
    let current_language = existing.language.as_deref().unwrap_or(DEFAULT_LANGUAGE);
    let language_labels: Vec<String> = SUPPORTED_LANGUAGES
        .iter()
        .map(|l| format!("{} ({})", l.name, l.tag))
        .collect();
    let language_idx = Select::new()
        .with_prompt("Conversation language")
        .items(&language_labels)
        .default(
            SUPPORTED_LANGUAGES
                .iter()
                .position(|l| l.tag.eq_ignore_ascii_case(current_language))
                .unwrap_or(0),
        )
        .interact()?;

    // 4. Voice input
    let default_stt = if existing.api_keys.openai.is_some() {
        1
    } else if existing.api_keys.deepgram.is_some() {
        2
    } else {
        0
    };
    let stt_idx = Select::new()
        .with_prompt("Voice input provider")
        .items(&STT_PROVIDERS)
        .default(default_stt)
        .interact()?;

    let mut api_keys = ApiKeysFileConfig {
        gemini,
        elevenlabs,
        openai: None,
        deepgram: None,
    };
    let mut stt_model = None;
    match stt_idx {
        1 => {
            api_keys.openai = prompt_key(
                "OpenAI API key",
                "OPENAI_API_KEY",
                existing.api_keys.openai.as_deref(),
                false,
            )?;
            stt_model = Some(prompt_model(existing.voice.stt_model.as_deref(), "whisper-1")?);
        }
        2 => {
            api_keys.deepgram = prompt_key(
                "Deepgram API key",
                "DEEPGRAM_API_KEY",
                existing.api_keys.deepgram.as_deref(),
                false,
            )?;
            stt_model = Some(prompt_model(existing.voice.stt_model.as_deref(), "nova-2")?);
        }
        _ => {}
    }

    let config_file = AuraConfigFile {
        persona_file: existing.persona_file,
        language: Some(SUPPORTED_LANGUAGES[language_idx].tag.to_string()),
        data_dir: existing.data_dir,
        llm: existing.llm,
        voice: VoiceFileConfig {
            tts_voice: Some(VOICE_CATALOG[voice_idx].id.to_string()),
            stt_model,
            ..existing.voice
        },
        api_keys,
    };

    if config_path.exists() {
        let overwrite = Confirm::new()
            .with_prompt("Overwrite the existing config?")
            .default(true)
            .interact()?;
        if !overwrite {
            println!("Config left unchanged");
            return Ok(());
        }
    }

    write_config(&config_path, &config_file)?;
    println!("\nConfig written to {}", config_path.display());
    println!("\nSetup complete! Run `aura` to start.");

    Ok(())
}

/// Ask for an API key, keeping the current one on blank input
fn prompt_key(
    label: &str,
    hint: &str,
    existing: Option<&str>,
    optional: bool,
) -> anyhow::Result<Option<String>> {
    let prompt = existing.map_or_else(
        || format!("{label} ({hint})"),
        |k| format!("{label} (current: {}, leave blank to keep)", mask(k)),
    );

    let input: String = Input::new()
        .with_prompt(&prompt)
        .allow_empty(optional || existing.is_some())
        .interact_text()?;

    let input = input.trim();
    Ok(if input.is_empty() {
        existing.map(str::to_string)
    } else {
        Some(input.to_string())
    })
}

fn prompt_model(existing: Option<&str>, default: &str) -> anyhow::Result<String> {
    Ok(Input::new()
        .with_prompt("STT model")
        .default(existing.unwrap_or(default).to_string())
        .interact_text()?)
}

/// Show only the ends of a key
fn mask(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() > 8 {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{head}...{tail}")
    } else {
        "****".to_string()
    }
}

/// Serialize and write the config file
fn write_config(path: &Path, config: &AuraConfigFile) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    std::fs::write(path, serialize_config(config))?;
    Ok(())
}

/// Serialize config to a readable TOML string
fn serialize_config(config: &AuraConfigFile) -> String {
    let mut out = String::new();

    for (key, val) in [
        ("persona_file", &config.persona_file),
        ("language", &config.language),
        ("data_dir", &config.data_dir),
    ] {
        if let Some(v) = val {
            let _ = writeln!(out, "{key} = {}", quote(v));
        }
    }
    if !out.is_empty() {
        out.push('\n');
    }

    let llm = &config.llm;
    section(
        &mut out,
        "llm",
        &[("model", &llm.model), ("base_url", &llm.base_url)],
    );

    let voice = &config.voice;
    section(
        &mut out,
        "voice",
        &[
            ("tts_voice", &voice.tts_voice),
            ("tts_model", &voice.tts_model),
            ("tts_base_url", &voice.tts_base_url),
            ("stt_model", &voice.stt_model),
            ("native_command", &voice.native_command),
        ],
    );

    let ak = &config.api_keys;
    section(
        &mut out,
        "api_keys",
        &[
            ("gemini", &ak.gemini),
            ("elevenlabs", &ak.elevenlabs),
            ("openai", &ak.openai),
            ("deepgram", &ak.deepgram),
        ],
    );

    out
}

/// Append a table with its set fields; nothing when all are unset
fn section(out: &mut String, name: &str, fields: &[(&str, &Option<String>)]) {
    if fields.iter().all(|(_, v)| v.is_none()) {
        return;
    }
    let _ = writeln!(out, "[{name}]");
    for (key, val) in fields {
        if let Some(v) = val {
            let _ = writeln!(out, "{key} = {}", quote(v));
        }
    }
    out.push('\n');
}

/// TOML basic string
fn quote(value: &str) -> String {
    toml::Value::String(value.to_string()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialized_config_reads_back() {
        let mut config = AuraConfigFile {
            language: Some("hi-IN".to_string()),
            ..AuraConfigFile::default()
        };
        config.voice.tts_voice = Some("onwK4e9ZLuTAKqWW03F9".to_string());
        config.api_keys.gemini = Some("key \"with\" quotes".to_string());

        let toml = serialize_config(&config);
        assert!(!toml.contains("[llm]"));

        let parsed: AuraConfigFile = toml::from_str(&toml).unwrap();
        assert_eq!(parsed.language.as_deref(), Some("hi-IN"));
        assert_eq!(parsed.voice.tts_voice.as_deref(), Some("onwK4e9ZLuTAKqWW03F9"));
        assert_eq!(parsed.api_keys.gemini.as_deref(), Some("key \"with\" quotes"));
        assert!(parsed.api_keys.elevenlabs.is_none());
    }

    #[test]
    fn test_mask() {
        assert_eq!(mask("abcd1234efgh"), "abcd...efgh");
        assert_eq!(mask("short"), "****");
    }
}
