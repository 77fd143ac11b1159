//! Conversation runtime integration tests
//!
//! Drives a [`Companion`] end to end against in-memory collaborators.

use aura_companion::Error;
use aura_companion::conversation::{AvatarState, RecognitionResult, Sender, TRANSMISSION_ERROR};

mod common;
use common::{
    Harness, HarnessBuilder, MockAudio, MockNative, MockSynth, Step, eventually, settle, wait_for,
};

#[tokio::test]
async fn test_greeting_is_posted_and_spoken() {
    let h = HarnessBuilder::new().spawn();
    let mut rx = h.companion.subscribe();

    h.companion.open("Hello, Nova!").unwrap();

    let snap = wait_for(&mut rx, |s| s.messages.len() == 1).await;
    assert_eq!(snap.messages[0].sender, Sender::Agent);
    assert_eq!(snap.messages[0].text, "Hello, Nova!");

    eventually(|| h.audio.played().len() == 1).await;
    assert_eq!(
        h.synth.as_ref().unwrap().requests(),
        vec![("Hello, Nova!".to_string(), "voice-a".to_string())]
    );
    assert_eq!(h.audio.played()[0], b"mp3:Hello, Nova!".to_vec());

    eventually(|| {
        h.avatar.states()
            == vec![AvatarState::Idle, AvatarState::Speaking, AvatarState::Idle]
    })
    .await;
    assert!(h.native.spoken().is_empty());

    h.companion.shutdown().await;
}

#[tokio::test]
async fn test_streamed_reply_fills_agent_message_and_is_spoken() {
    let h = HarnessBuilder::new()
        .replies(vec![vec![Step::Chunk("Hel"), Step::Chunk("lo "), Step::Chunk("there")]])
        .spawn();
    let mut rx = h.companion.subscribe();

    h.companion.submit("hi").unwrap();

    let snap = wait_for(&mut rx, |s| {
        s.messages.len() == 2 && s.messages[1].text == "Hello there"
    })
    .await;
    assert_eq!(snap.messages[0].sender, Sender::User);
    assert_eq!(snap.messages[0].text, "hi");
    assert_eq!(snap.messages[1].sender, Sender::Agent);

    eventually(|| h.audio.played().len() == 1).await;
    assert_eq!(h.chat.sent(), vec!["hi".to_string()]);
    assert_eq!(
        h.synth.as_ref().unwrap().requests(),
        vec![("Hello there".to_string(), "voice-a".to_string())]
    );

    wait_for(&mut rx, |s| s.avatar == AvatarState::Idle).await;
    let states = h.avatar.states();
    let thinking = states.iter().position(|s| *s == AvatarState::Thinking);
    let speaking = states.iter().position(|s| *s == AvatarState::Speaking);
    assert!(thinking.is_some());
    assert!(thinking < speaking);

    h.companion.shutdown().await;
}

#[tokio::test]
async fn test_stream_failure_shows_and_speaks_error() {
    let h = HarnessBuilder::new()
        .replies(vec![vec![Step::Chunk("partial ans"), Step::Fail("connection reset")]])
        .spawn();
    let mut rx = h.companion.subscribe();

    h.companion.submit("tell me a story").unwrap();

    let snap = wait_for(&mut rx, |s| {
        s.messages.len() == 2 && s.messages[1].text == TRANSMISSION_ERROR
    })
    .await;
    assert_eq!(snap.messages[0].text, "tell me a story");

    eventually(|| h.audio.played().len() == 1).await;
    assert_eq!(
        h.synth.as_ref().unwrap().requests()[0].0,
        TRANSMISSION_ERROR.to_string()
    );

    h.companion.shutdown().await;
}

#[tokio::test]
async fn test_synthesis_failure_falls_back_to_native_speech() {
    let h = HarnessBuilder::new()
        .synth(Some(MockSynth::failing()))
        .replies(vec![vec![Step::Chunk("Sure thing.")]])
        .spawn();
    let mut rx = h.companion.subscribe();

    h.companion.submit("can you help").unwrap();

    eventually(|| !h.native.spoken().is_empty()).await;
    assert_eq!(
        h.native.spoken(),
        vec![("Sure thing.".to_string(), "en-US".to_string())]
    );
    assert!(h.audio.played().is_empty());

    wait_for(&mut rx, |s| s.avatar == AvatarState::Idle).await;
    h.companion.shutdown().await;
}

#[tokio::test]
async fn test_missing_synthesizer_uses_native_speech() {
    let h = HarnessBuilder::new().synth(None).spawn();

    h.companion.open("Welcome back.").unwrap();

    eventually(|| h.native.spoken().len() == 1).await;
    assert_eq!(h.native.spoken()[0].0, "Welcome back.");
    assert!(h.audio.played().is_empty());

    h.companion.shutdown().await;
}

#[tokio::test]
async fn test_failed_fallback_returns_to_idle() {
    let h = HarnessBuilder::new()
        .synth(Some(MockSynth::failing()))
        .native(MockNative::failing())
        .spawn();
    let mut rx = h.companion.subscribe();

    h.companion.open("Hello").unwrap();

    eventually(|| h.native.spoken().len() == 1).await;
    let snap = wait_for(&mut rx, |s| s.messages.len() == 1).await;
    assert_eq!(snap.avatar, AvatarState::Idle);

    settle().await;
    assert_eq!(h.native.spoken().len(), 1);
    assert_eq!(h.companion.snapshot().avatar, AvatarState::Idle);

    h.companion.shutdown().await;
}

#[tokio::test]
async fn test_submission_while_thinking_is_ignored() {
    let h = HarnessBuilder::new().replies(vec![vec![Step::Hang]]).spawn();
    let mut rx = h.companion.subscribe();

    h.companion.submit("first").unwrap();
    wait_for(&mut rx, |s| s.avatar == AvatarState::Thinking).await;

    h.companion.submit("second").unwrap();
    settle().await;

    let snap = h.companion.snapshot();
    assert_eq!(snap.messages.len(), 2);
    assert_eq!(snap.messages[0].text, "first");
    assert_eq!(h.chat.sent(), vec!["first".to_string()]);

    h.companion.shutdown().await;
}

#[tokio::test]
async fn test_blank_submission_is_ignored() {
    let h = HarnessBuilder::new().spawn();

    h.companion.submit("   ").unwrap();
    settle().await;

    assert!(h.companion.snapshot().messages.is_empty());
    assert!(h.chat.sent().is_empty());

    h.companion.shutdown().await;
}

#[tokio::test]
async fn test_new_submission_interrupts_speech_and_ignores_stale_playback() {
    let audio = MockAudio::new(false);
    let h = HarnessBuilder::new()
        .audio(audio)
        .replies(vec![vec![Step::Chunk("one")], vec![Step::Hang]])
        .spawn();
    let mut rx = h.companion.subscribe();

    h.companion.submit("a").unwrap();
    eventually(|| h.audio.played().len() == 1).await;
    wait_for(&mut rx, |s| s.avatar == AvatarState::Speaking).await;

    let stops_before = h.audio.stops();
    h.companion.submit("b").unwrap();
    wait_for(&mut rx, |s| s.avatar == AvatarState::Thinking).await;
    assert!(h.audio.stops() > stops_before);
    assert!(h.native.cancels() > 0);

    // The superseded clip reports completion late
    h.audio.finish_oldest();
    settle().await;
    assert_eq!(h.companion.snapshot().avatar, AvatarState::Thinking);

    h.companion.shutdown().await;
}

#[tokio::test]
async fn test_voice_input_submits_recognized_speech() {
    let h = HarnessBuilder::new()
        .replies(vec![vec![Step::Chunk("It is noon.")]])
        .spawn();
    let mut rx = h.companion.subscribe();
    let probe = std::sync::Arc::clone(&h.recognizers.probe);

    h.companion.toggle_voice_input().unwrap();
    eventually(|| probe.starts.lock().unwrap().len() == 1).await;
    assert_eq!(probe.starts.lock().unwrap()[0], "en-US");

    let events = probe.events();
    events.started();
    let snap = wait_for(&mut rx, |s| s.is_listening).await;
    assert_eq!(snap.avatar, AvatarState::Listening);

    events.result(vec![RecognitionResult::final_transcript("what time is it", 0.92)]);

    let snap = wait_for(&mut rx, |s| {
        s.messages.len() == 2 && s.messages[1].text == "It is noon."
    })
    .await;
    assert_eq!(snap.messages[0].sender, Sender::User);
    assert_eq!(snap.messages[0].text, "what time is it");
    assert_eq!(h.chat.sent(), vec!["what time is it".to_string()]);

    wait_for(&mut rx, |s| !s.is_listening).await;
    h.companion.shutdown().await;
}

#[tokio::test]
async fn test_toggle_stops_listening() {
    let h = HarnessBuilder::new().spawn();
    let mut rx = h.companion.subscribe();
    let probe = std::sync::Arc::clone(&h.recognizers.probe);

    h.companion.toggle_voice_input().unwrap();
    eventually(|| probe.current.lock().unwrap().is_some()).await;
    probe.events().started();
    wait_for(&mut rx, |s| s.is_listening).await;

    h.companion.toggle_voice_input().unwrap();
    let snap = wait_for(&mut rx, |s| !s.is_listening).await;
    assert_eq!(snap.avatar, AvatarState::Idle);
    assert_eq!(*probe.stops.lock().unwrap(), 1);
    assert!(snap.messages.is_empty());

    h.companion.shutdown().await;
}

#[tokio::test]
async fn test_typed_message_discards_late_voice_result() {
    let h = HarnessBuilder::new()
        .replies(vec![vec![Step::Chunk("answer"), Step::Hang]])
        .spawn();
    let mut rx = h.companion.subscribe();
    let probe = std::sync::Arc::clone(&h.recognizers.probe);

    h.companion.toggle_voice_input().unwrap();
    eventually(|| probe.current.lock().unwrap().is_some()).await;
    let events = probe.events();
    events.started();
    wait_for(&mut rx, |s| s.is_listening).await;

    h.companion.submit("typed").unwrap();
    let snap = wait_for(&mut rx, |s| {
        !s.is_listening && s.messages.len() == 2 && s.messages[1].text == "answer"
    })
    .await;
    assert_eq!(*probe.stops.lock().unwrap(), 1);
    assert_eq!(snap.avatar, AvatarState::Speaking);

    // Speech buffered before the stop is still transcribed
    events.result(vec![RecognitionResult::final_transcript("spoken", 0.9)]);
    settle().await;

    let after = h.companion.snapshot();
    assert_eq!(after.messages, snap.messages);
    assert_eq!(after.avatar, AvatarState::Speaking);
    assert_eq!(h.chat.sent(), vec!["typed".to_string()]);

    h.companion.shutdown().await;
}

#[tokio::test]
async fn test_unsupported_recognition_is_a_no_op() {
    let h = HarnessBuilder::new().recognition(false).spawn();

    h.companion.toggle_voice_input().unwrap();
    h.companion.toggle_voice_input().unwrap();
    settle().await;

    let snap = h.companion.snapshot();
    assert!(!snap.is_listening);
    assert_eq!(snap.avatar, AvatarState::Idle);
    assert_eq!(h.recognizers.created(), 1);

    h.companion.shutdown().await;
}

#[tokio::test]
async fn test_language_change_applies_to_listening_and_fallback() {
    let h = HarnessBuilder::new().synth(None).spawn();
    let mut rx = h.companion.subscribe();
    let probe = std::sync::Arc::clone(&h.recognizers.probe);

    assert!(matches!(
        h.companion.set_language("tlh-QO"),
        Err(Error::Validation(_))
    ));
    h.companion.set_language("fr-fr").unwrap();
    wait_for(&mut rx, |s| s.language == "fr-FR").await;

    h.companion.open("Bonjour").unwrap();
    eventually(|| h.native.spoken().len() == 1).await;
    assert_eq!(h.native.spoken()[0].1, "fr-FR");

    h.companion.toggle_voice_input().unwrap();
    eventually(|| probe.starts.lock().unwrap().len() == 1).await;
    assert_eq!(probe.starts.lock().unwrap()[0], "fr-FR");

    h.companion.shutdown().await;
}

#[tokio::test]
async fn test_voice_change_applies_to_next_utterance() {
    let h = HarnessBuilder::new().spawn();
    let mut rx = h.companion.subscribe();

    h.companion.set_voice("21m00Tcm4TlvDq8ikWAM").unwrap();
    wait_for(&mut rx, |s| s.voice_id == "21m00Tcm4TlvDq8ikWAM").await;

    h.companion.speak("Testing the new voice").unwrap();
    eventually(|| h.audio.played().len() == 1).await;
    assert_eq!(
        h.synth.as_ref().unwrap().requests(),
        vec![(
            "Testing the new voice".to_string(),
            "21m00Tcm4TlvDq8ikWAM".to_string()
        )]
    );

    h.companion.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_silences_output() {
    let Harness {
        companion,
        audio,
        native,
        ..
    } = HarnessBuilder::new().audio(MockAudio::new(false)).spawn();

    companion.speak("a long monologue").unwrap();
    eventually(|| audio.played().len() == 1).await;

    let stops_before = audio.stops();
    let cancels_before = native.cancels();
    companion.shutdown().await;

    assert!(audio.stops() > stops_before);
    assert!(native.cancels() > cancels_before);
}
