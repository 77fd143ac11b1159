//! Terminal front end
//!
//! The account gate runs first; once a callsign is known the chat loop reads
//! typed lines and slash commands while a printer task follows the
//! conversation state and writes reply text as it streams in.

use std::io::Write;

use dialoguer::{Input, Password, Select};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::auth::{self, CredentialStore};
use crate::conversation::{Companion, Message, MessageId, Sender, Snapshot};
use crate::language::SUPPORTED_LANGUAGES;
use crate::voice::{CatalogVoice, VOICE_CATALOG};

const GATE_ACTIONS: [&str; 4] = ["Log in", "Sign up", "Verify email", "Quit"];

const HELP: &str = "\
Commands:
  /mic            start or stop voice input
  /lang <tag>     switch conversation language (e.g. /lang fr-FR)
  /langs          list supported languages
  /voice <n|id>   switch hosted voice
  /voices         list hosted voices
  /logout         end this session
  /quit           exit
Anything else is sent to the companion.";

/// Run the account gate until the user logs in or quits
///
/// Returns the callsign of the logged-in user, or `None` on quit.
///
/// # Errors
///
/// Returns error if terminal input fails
pub fn run_gate(store: &CredentialStore) -> anyhow::Result<Option<String>> {
    loop {
        let action = Select::new()
            .with_prompt("AURA access")
            .items(&GATE_ACTIONS)
            .default(0)
            .interact()?;

        let outcome = match action {
            0 => {
                let email = prompt_text("Email")?;
                let password = prompt_password()?;
                store.login(email.trim(), &password)
            }
            1 => {
                let callsign = prompt_text("Callsign")?;
                let email = prompt_text("Email")?;
                let password = prompt_password()?;
                store.signup(email.trim(), &password, callsign.trim())
            }
            2 => {
                let email = prompt_text("Email")?;
                match auth::request_verification(&email) {
                    Ok(notice) => println!("{notice}\n"),
                    Err(e) => eprintln!("{e}\n"),
                }
                continue;
            }
            _ => return Ok(None),
        };

        match outcome {
            Ok(callsign) => {
                println!("\nWelcome, {callsign}.\n");
                return Ok(Some(callsign));
            }
            Err(e) => eprintln!("{e}\n"),
        }
    }
}

fn prompt_text(label: &str) -> anyhow::Result<String> {
    Ok(Input::new()
        .with_prompt(label)
        .allow_empty(true)
        .interact_text()?)
}

fn prompt_password() -> anyhow::Result<String> {
    Ok(Password::new()
        .with_prompt("Password")
        .allow_empty_password(true)
        .interact()?)
}

/// How a chat session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatExit {
    /// Return to the account gate
    Logout,
    /// Leave the program
    Quit,
}

/// A parsed line of chat input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatInput {
    Say(String),
    Mic,
    Language(Option<String>),
    Languages,
    Voice(Option<String>),
    Voices,
    Help,
    Logout,
    Quit,
    Unknown(String),
    Empty,
}

/// Parse one line typed at the chat prompt
#[must_use]
pub fn parse_input(line: &str) -> ChatInput {
    let line = line.trim();
    if line.is_empty() {
        return ChatInput::Empty;
    }
    let Some(command) = line.strip_prefix('/') else {
        return ChatInput::Say(line.to_string());
    };

    let (name, arg) = command
        .split_once(char::is_whitespace)
        .map_or((command, None), |(n, a)| (n, Some(a.trim().to_string())));
    let arg = arg.filter(|a| !a.is_empty());

    match name.to_ascii_lowercase().as_str() {
        "mic" => ChatInput::Mic,
        "lang" | "language" => ChatInput::Language(arg),
        "langs" | "languages" => ChatInput::Languages,
        "voice" => ChatInput::Voice(arg),
        "voices" => ChatInput::Voices,
        "help" | "?" => ChatInput::Help,
        "logout" => ChatInput::Logout,
        "quit" | "exit" => ChatInput::Quit,
        _ => ChatInput::Unknown(name.to_string()),
    }
}

/// Find a catalog voice by 1-based list position, id or name
#[must_use]
pub fn resolve_voice(arg: &str) -> Option<&'static CatalogVoice> {
    let arg = arg.trim();
    if let Ok(index) = arg.parse::<usize>() {
        return index.checked_sub(1).and_then(|i| VOICE_CATALOG.get(i));
    }
    VOICE_CATALOG.iter().find(|v| {
        v.id == arg
            || v
                .name
                .split_whitespace()
                .next()
                .is_some_and(|first| first.eq_ignore_ascii_case(arg))
    })
}

/// Run the chat loop for one logged-in session
///
/// # Errors
///
/// Returns error if reading from the terminal fails or the conversation
/// runtime has stopped
pub async fn run_chat(companion: &Companion, agent_name: &str) -> anyhow::Result<ChatExit> {
    println!("Type a message, or /help for commands.\n");

    let printer = spawn_printer(companion.subscribe(), agent_name.to_string());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    let exit = loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => break ChatExit::Quit,
        };
        let Some(line) = line else {
            break ChatExit::Quit;
        };

        match parse_input(&line) {
            ChatInput::Empty => {}
            ChatInput::Say(text) => companion.submit(text)?,
            ChatInput::Mic => companion.toggle_voice_input()?,
            ChatInput::Language(Some(tag)) => match companion.set_language(&tag) {
                Ok(()) => println!("Language set to {tag}"),
                Err(e) => eprintln!("{e}"),
            },
            ChatInput::Language(None) => {
                println!("Current language: {}", companion.snapshot().language);
            }
            ChatInput::Languages => {
                let current = companion.snapshot().language;
                for language in SUPPORTED_LANGUAGES {
                    let marker = if language.tag == current { '*' } else { ' ' };
                    println!(" {marker} {:<6} {}", language.tag, language.name);
                }
            }
            ChatInput::Voice(Some(arg)) => match resolve_voice(&arg) {
                Some(voice) => {
                    companion.set_voice(voice.id)?;
                    println!("Voice set to {}", voice.name);
                }
                None => eprintln!("Unknown voice: {arg} (see /voices)"),
            },
            ChatInput::Voice(None) | ChatInput::Voices => {
                let current = companion.snapshot().voice_id;
                for (i, voice) in VOICE_CATALOG.iter().enumerate() {
                    let marker = if voice.id == current { '*' } else { ' ' };
                    println!(" {marker} {}. {}", i + 1, voice.name);
                }
            }
            ChatInput::Help => println!("{HELP}"),
            ChatInput::Logout => break ChatExit::Logout,
            ChatInput::Quit => break ChatExit::Quit,
            ChatInput::Unknown(name) => eprintln!("Unknown command: /{name} (see /help)"),
        }
    };

    printer.abort();
    println!();
    Ok(exit)
}

fn spawn_printer(mut snapshots: watch::Receiver<Snapshot>, agent_name: String) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut printer = TranscriptPrinter::new(agent_name);
        loop {
            let update = printer.update(&snapshots.borrow_and_update().messages);
            if !update.is_empty() {
                let mut stdout = std::io::stdout().lock();
                let _ = stdout.write_all(update.as_bytes());
                let _ = stdout.flush();
            }
            if snapshots.changed().await.is_err() {
                break;
            }
        }
    })
}

/// Turns successive transcripts into incremental terminal output
///
/// The newest message may still be growing; only its new suffix is written.
/// A message whose text was replaced rather than extended is written again
/// on a fresh line.
#[derive(Debug)]
pub struct TranscriptPrinter {
    agent_name: String,
    settled: usize,
    open: Option<(MessageId, String)>,
}

impl TranscriptPrinter {
    #[must_use]
    pub const fn new(agent_name: String) -> Self {
        Self {
            agent_name,
            settled: 0,
            open: None,
        }
    }

    /// Output needed to bring the terminal up to date with `messages`
    pub fn update(&mut self, messages: &[Message]) -> String {
        let mut out = String::new();
        let last = messages.len().saturating_sub(1);

        for (i, message) in messages.iter().enumerate().skip(self.settled) {
            let printed = self
                .open
                .take()
                .filter(|(id, _)| *id == message.id)
                .map(|(_, text)| text);

            match printed {
                Some(prefix) if message.text.starts_with(&prefix) => {
                    out.push_str(&message.text[prefix.len()..]);
                }
                Some(_) => {
                    out.push('\n');
                    self.push_header(&mut out, message);
                    out.push_str(&message.text);
                }
                None => {
                    self.push_header(&mut out, message);
                    out.push_str(&message.text);
                }
            }

            if i < last {
                out.push('\n');
                self.settled = i + 1;
            } else {
                self.open = Some((message.id, message.text.clone()));
            }
        }

        out
    }

    fn push_header(&self, out: &mut String, message: &Message) {
        match message.sender {
            Sender::User => out.push_str("you: "),
            Sender::Agent => {
                out.push_str(&self.agent_name);
                out.push_str(": ");
            }
        }
    }
}
