#![allow(dead_code)]

use happychatter::cache::{MARKER_FILE, PREPROCESSED_FILE};
use happychatter::retry::{CancelToken, Sleeper};
use happychatter::{
    Backend, BackendError, CacheLayout, EventHandler, GenerationSettings, LifecycleEvent, LoadedModel,
    RawGeneration, SessionConfig, TrainingArgs,
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// What the fake models have been asked to do, shared across every model a
/// backend hands out.
#[derive(Default)]
pub struct Calls {
    pub fetches: AtomicUsize,
    pub loads: AtomicUsize,
    pub generations: Mutex<Vec<(String, GenerationSettings)>>,
    pub trainings: Mutex<Vec<(PathBuf, TrainingArgs)>>,
}

impl Calls {
    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

pub struct FakeBackend {
    pub calls: Arc<Calls>,
    fetch_failures: Mutex<VecDeque<String>>,
    load_failures: Mutex<VecDeque<String>>,
    reply: String,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(Calls::default()),
            fetch_failures: Mutex::new(VecDeque::new()),
            load_failures: Mutex::new(VecDeque::new()),
            reply: "\nHello there\nHow are you today?".to_string(),
        }
    }

    /// Each message fails one fetch, in order.
    pub fn fail_fetches(self, messages: &[&str]) -> Self {
        self.fetch_failures
            .lock()
            .extend(messages.iter().map(|m| m.to_string()));
        self
    }

    pub fn fail_loads(self, messages: &[&str]) -> Self {
        self.load_failures
            .lock()
            .extend(messages.iter().map(|m| m.to_string()));
        self
    }

    /// Queues more fetch failures after the backend is shared.
    pub fn push_fetch_failure(&self, message: &str) {
        self.fetch_failures.lock().push_back(message.to_string());
    }

    pub fn reply(mut self, text: &str) -> Self {
        self.reply = text.to_string();
        self
    }

    fn model(&self, publisher_id: &str) -> Box<dyn LoadedModel> {
        Box::new(FakeModel {
            publisher_id: publisher_id.to_string(),
            reply: self.reply.clone(),
            calls: self.calls.clone(),
        })
    }
}

impl Backend for FakeBackend {
    fn fetch(&self, publisher_id: &str) -> Result<Box<dyn LoadedModel>, BackendError> {
        self.calls.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.fetch_failures.lock().pop_front() {
            return Err(BackendError::new(message));
        }
        Ok(self.model(publisher_id))
    }

    fn load(&self, publisher_id: &str, _dir: &Path) -> Result<Box<dyn LoadedModel>, BackendError> {
        self.calls.loads.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.load_failures.lock().pop_front() {
            return Err(BackendError::new(message));
        }
        Ok(self.model(publisher_id))
    }
}

pub struct FakeModel {
    publisher_id: String,
    reply: String,
    calls: Arc<Calls>,
}

impl LoadedModel for FakeModel {
    fn save(&self, dir: &Path) -> Result<(), BackendError> {
        std::fs::write(dir.join(MARKER_FILE), self.publisher_id.as_bytes())
            .map_err(|e| BackendError::fatal(e.to_string()))
    }

    fn generate(&mut self, prompt: &str, settings: &GenerationSettings) -> Result<RawGeneration, BackendError> {
        self.calls
            .generations
            .lock()
            .push((prompt.to_string(), settings.clone()));
        Ok(RawGeneration::new(self.reply.clone()))
    }

    fn train(&mut self, file: &Path, args: &TrainingArgs) -> Result<(), BackendError> {
        self.calls.trainings.lock().push((file.to_path_buf(), args.clone()));
        if let Some(path) = &args.save_preprocessed_data_path {
            std::fs::write(path, b"{}").map_err(|e| BackendError::fatal(e.to_string()))?;
        }
        Ok(())
    }
}

/// Records every requested delay without actually waiting.
#[derive(Default)]
pub struct RecordingSleeper {
    pub delays: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration, cancel: &CancelToken) -> bool {
        self.delays.lock().push(duration);
        !cancel.is_cancelled()
    }
}

/// Cancels the token the first time a wait starts, like a user hitting Ctrl-C
/// during a backoff. Later waits return immediately.
#[derive(Default)]
pub struct CancellingSleeper {
    fired: AtomicBool,
}

impl Sleeper for CancellingSleeper {
    fn sleep(&self, _duration: Duration, cancel: &CancelToken) -> bool {
        if self.fired.swap(true, Ordering::SeqCst) {
            return !cancel.is_cancelled();
        }
        cancel.cancel();
        false
    }
}

#[derive(Default)]
pub struct EventLog(pub Mutex<Vec<LifecycleEvent>>);

impl EventLog {
    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.0.lock().clone()
    }
}

impl EventHandler for EventLog {
    fn handle(&self, event: &LifecycleEvent) {
        self.0.lock().push(event.clone());
    }
}

pub fn config(dir: &Path) -> SessionConfig {
    SessionConfig::new(CacheLayout::new(dir))
}

pub fn write_preprocessed(cache: &CacheLayout, kind: happychatter::ModelKind) {
    let dir = cache.ensure_preprocessed_dir(kind).unwrap();
    std::fs::write(dir.join(PREPROCESSED_FILE), b"{}").unwrap();
}
