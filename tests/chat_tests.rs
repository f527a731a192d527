mod common;

use common::{config, write_preprocessed, FakeBackend, RecordingSleeper};
use happychatter::chat::LOG_HEADER;
use happychatter::{ChatSession, ModelKind, ModelSession};
use std::sync::Arc;
use tempfile::TempDir;

fn chat(models: &TempDir, logs: &TempDir, backend: &Arc<FakeBackend>) -> ChatSession {
    let session = ModelSession::builder(backend.clone())
        .config(config(models.path()))
        .sleeper(Arc::new(RecordingSleeper::default()))
        .open(ModelKind::DialoSmall)
        .unwrap();
    ChatSession::new(session, logs.path()).unwrap()
}

#[test]
fn test_new_log_has_header() {
    let models = TempDir::new().unwrap();
    let logs = TempDir::new().unwrap();
    let backend = Arc::new(FakeBackend::new());

    let chat = chat(&models, &logs, &backend);

    assert!(chat.log_path().starts_with(logs.path()));
    assert_eq!(std::fs::read_to_string(chat.log_path()).unwrap(), LOG_HEADER);
    assert!(chat.transcript().is_empty());
}

#[test]
fn test_turns_build_transcript_and_log() {
    let models = TempDir::new().unwrap();
    let logs = TempDir::new().unwrap();
    let backend = Arc::new(FakeBackend::new().reply("\n  Hello there  \nignored"));
    let mut chat = chat(&models, &logs, &backend);

    assert_eq!(chat.turn("Hi").unwrap(), "Hello there");
    assert_eq!(chat.turn("How are you?").unwrap(), "Hello there");

    assert_eq!(chat.transcript(), "Hi\nHello there\nHow are you?\nHello there\n");
    let prompts: Vec<String> = backend
        .calls
        .generations
        .lock()
        .iter()
        .map(|(prompt, _)| prompt.clone())
        .collect();
    assert_eq!(prompts, vec!["Hi\n", "Hi\nHello there\nHow are you?\n"]);

    let log = std::fs::read_to_string(chat.log_path()).unwrap();
    assert_eq!(
        log,
        format!(
            "{}Human: Hi\nBot: Hello there\nHuman: How are you?\nBot: Hello there\n",
            LOG_HEADER
        )
    );
}

#[test]
fn test_turn_warm_loads_only_when_trained() {
    let models = TempDir::new().unwrap();
    let logs = TempDir::new().unwrap();
    let backend = Arc::new(FakeBackend::new());
    let mut chat = chat(&models, &logs, &backend);

    chat.turn("Hi").unwrap();
    assert!(backend.calls.trainings.lock().is_empty());

    write_preprocessed(chat.session().cache(), ModelKind::DialoSmall);
    chat.turn("Again").unwrap();

    let trainings = backend.calls.trainings.lock();
    assert_eq!(trainings.len(), 1);
    assert!(trainings[0].1.load_preprocessed_data);
    assert!(!trainings[0].1.save_preprocessed_data);
}

#[test]
fn test_clear_keeps_log() {
    let models = TempDir::new().unwrap();
    let logs = TempDir::new().unwrap();
    let backend = Arc::new(FakeBackend::new());
    let mut chat = chat(&models, &logs, &backend);

    chat.turn("Hi").unwrap();
    chat.clear();
    chat.turn("Fresh start").unwrap();

    let prompts = backend.calls.generations.lock();
    assert_eq!(prompts[1].0, "Fresh start\n");
    let log = std::fs::read_to_string(chat.log_path()).unwrap();
    assert!(log.contains("Human: Hi\n"));
    assert!(log.contains("Human: Fresh start\n"));
}

#[test]
fn test_two_chats_get_separate_logs() {
    let models = TempDir::new().unwrap();
    let logs = TempDir::new().unwrap();
    let backend = Arc::new(FakeBackend::new());

    let first = chat(&models, &logs, &backend);
    let second = chat(&models, &logs, &backend);

    assert_ne!(first.log_path(), second.log_path());
}
