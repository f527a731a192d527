use crate::backend::{Backend, BackendError, LoadedModel, RawGeneration};
use crate::cache::CacheLayout;
use crate::catalog::{self, CatalogEntry, ModelKind};
use crate::envconfig::EnvConfig;
use crate::error::{Error, Result};
use crate::events::{EventHandler, LifecycleEvent};
use crate::generation::{extract_reply, GenerationParameters, GenerationSettings};
use crate::retry::{self, CancelToken, RetryError, RetryPolicy, Sleeper, ThreadSleeper};
use crate::training::{TrainOutcome, TrainingArgs, TrainingRequest};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    pub cache: CacheLayout,
    pub retry: RetryPolicy,
}

impl SessionConfig {
    pub fn new(cache: CacheLayout) -> Self {
        Self {
            cache,
            retry: RetryPolicy::default(),
        }
    }

    pub fn from_env(env: &EnvConfig) -> Self {
        Self {
            cache: CacheLayout::new(&env.models_dir),
            retry: RetryPolicy::default().max_attempts(env.max_retries),
        }
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// The loaded tokenizer+model pair owned by exactly one session.
pub struct ModelHandle {
    model: Box<dyn LoadedModel>,
    from_cache: bool,
}

impl ModelHandle {
    pub fn from_cache(&self) -> bool {
        self.from_cache
    }
}

pub struct SessionBuilder {
    backend: Arc<dyn Backend>,
    config: SessionConfig,
    sleeper: Arc<dyn Sleeper>,
    cancel: CancelToken,
    events: Option<Arc<dyn EventHandler>>,
}

impl SessionBuilder {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            config: SessionConfig::default(),
            sleeper: Arc::new(ThreadSleeper),
            cancel: CancelToken::new(),
            events: None,
        }
    }

    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Interrupts the retry waits of the initial load only.
    pub fn cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn events(mut self, events: Arc<dyn EventHandler>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn open(self, kind: ModelKind) -> Result<ModelSession> {
        let loader = Loader {
            backend: self.backend,
            config: self.config,
            sleeper: self.sleeper,
            events: self.events,
        };
        let entry = kind.entry();
        let handle = loader.load(entry, &self.cancel)?;

        Ok(ModelSession {
            entry,
            loader,
            handle,
            parameters: None,
        })
    }

    pub fn open_key(self, key: &str) -> Result<ModelSession> {
        let entry = catalog::resolve(key)?;
        self.open(entry.kind)
    }
}

struct Loader {
    backend: Arc<dyn Backend>,
    config: SessionConfig,
    sleeper: Arc<dyn Sleeper>,
    events: Option<Arc<dyn EventHandler>>,
}

impl Loader {
    fn emit(&self, event: LifecycleEvent) {
        if let Some(events) = &self.events {
            events.handle(&event);
        }
    }

    fn load(&self, entry: &'static CatalogEntry, cancel: &CancelToken) -> Result<ModelHandle> {
        let kind = entry.kind;
        info!(model = entry.key, publisher = entry.publisher_id, "loading model");
        self.emit(LifecycleEvent::Loading { model: kind });

        let result = retry::run(
            &self.config.retry,
            self.sleeper.as_ref(),
            cancel,
            |notice| {
                self.emit(LifecycleEvent::Retrying {
                    model: kind,
                    attempt: notice.attempt,
                    kind: notice.kind,
                    delay: notice.delay,
                })
            },
            |_| self.load_once(entry),
        );

        let err = match result {
            Ok(handle) => {
                self.emit(LifecycleEvent::Ready {
                    model: kind,
                    from_cache: handle.from_cache,
                });
                return Ok(handle);
            }
            Err(RetryError::Fatal(source)) => Error::ModelLoad {
                model: entry.key.to_string(),
                source,
            },
            Err(RetryError::Exhausted { attempts, last }) => Error::RetriesExhausted {
                model: entry.key.to_string(),
                attempts,
                source: last,
            },
            Err(RetryError::Cancelled { waited }) => Error::Cancelled {
                model: entry.key.to_string(),
                waited,
            },
        };

        self.emit(LifecycleEvent::Failed {
            model: kind,
            message: err.to_string(),
        });
        Err(err)
    }

    fn load_once(&self, entry: &CatalogEntry) -> std::result::Result<ModelHandle, BackendError> {
        let cache = &self.config.cache;
        let dir = cache.model_dir(entry.kind);

        let reason = if cache.is_cached(entry.kind) {
            match self.backend.load(entry.publisher_id, &dir) {
                Ok(model) => {
                    debug!(dir = %dir.display(), "loaded from cache");
                    return Ok(ModelHandle {
                        model,
                        from_cache: true,
                    });
                }
                Err(err) => {
                    debug!(dir = %dir.display(), error = %err, "cached snapshot unusable, fetching");
                    format!("cached snapshot unusable: {}", err)
                }
            }
        } else {
            "not cached".to_string()
        };
        self.emit(LifecycleEvent::CacheMiss {
            model: entry.kind,
            reason,
        });

        let model = self.backend.fetch(entry.publisher_id)?;
        cache.ensure_model_dir(entry.kind).map_err(|e| {
            BackendError::fatal(format!("cannot create {}: {}", dir.display(), e))
        })?;
        model.save(&dir)?;
        info!(dir = %dir.display(), "model saved to cache");

        Ok(ModelHandle {
            model,
            from_cache: false,
        })
    }
}

/// The model lifecycle wrapper.
///
/// Resolves a catalog key, loads the model from the cache directory or
/// downloads it from the hub (retrying transient failures), and then serves
/// generation and training calls against the loaded model until dropped.
pub struct ModelSession {
    entry: &'static CatalogEntry,
    loader: Loader,
    handle: ModelHandle,
    parameters: Option<GenerationParameters>,
}

impl ModelSession {
    /// Opens `key` with default configuration and a blocking sleeper.
    pub fn open(key: &str, backend: Arc<dyn Backend>) -> Result<Self> {
        SessionBuilder::new(backend).open_key(key)
    }

    pub fn builder(backend: Arc<dyn Backend>) -> SessionBuilder {
        SessionBuilder::new(backend)
    }

    pub fn entry(&self) -> &'static CatalogEntry {
        self.entry
    }

    pub fn kind(&self) -> ModelKind {
        self.entry.kind
    }

    pub fn handle(&self) -> &ModelHandle {
        &self.handle
    }

    pub fn cache(&self) -> &CacheLayout {
        &self.loader.config.cache
    }

    /// Switches to another model. On failure the current model stays loaded.
    pub fn set_model(&mut self, kind: ModelKind) -> Result<()> {
        self.set_model_with(kind, &CancelToken::new())
    }

    /// Like [`set_model`](Self::set_model), but `cancel` can interrupt the
    /// retry waits of this load.
    pub fn set_model_with(&mut self, kind: ModelKind, cancel: &CancelToken) -> Result<()> {
        let entry = kind.entry();
        let handle = self.loader.load(entry, cancel)?;
        self.entry = entry;
        self.handle = handle;
        Ok(())
    }

    /// Applies a custom parameter set; it stays in effect until replaced or reset.
    pub fn set_parameters(&mut self, parameters: GenerationParameters) -> Result<()> {
        parameters.validate()?;
        self.parameters = Some(parameters);
        Ok(())
    }

    pub fn reset_parameters(&mut self) {
        self.parameters = None;
    }

    pub fn parameters(&self) -> Option<&GenerationParameters> {
        self.parameters.as_ref()
    }

    pub fn has_custom_parameters(&self) -> bool {
        self.parameters.is_some()
    }

    pub fn active_settings(&self) -> GenerationSettings {
        match &self.parameters {
            Some(parameters) => parameters.to_settings(),
            None => GenerationSettings::implicit_default(),
        }
    }

    /// Generates a continuation of `prompt` and returns its first non-blank
    /// line together with the raw backend result.
    pub fn generate(&mut self, prompt: &str) -> Result<(String, RawGeneration)> {
        let settings = self.active_settings();
        debug!(model = self.entry.key, custom = self.parameters.is_some(), "generating");

        let raw = self
            .handle
            .model
            .generate(prompt, &settings)
            .map_err(Error::Generation)?;
        let reply = extract_reply(&raw.text).to_string();
        Ok((reply, raw))
    }

    pub fn train(&mut self, request: &TrainingRequest) -> Result<TrainOutcome> {
        let kind = self.entry.kind;
        let cache = &self.loader.config.cache;
        let preprocessed = cache.preprocessed_path(kind);

        let args = if request.load_only {
            if !cache.has_preprocessed(kind) {
                debug!(path = %preprocessed.display(), "no preprocessed data, skipping");
                return Ok(TrainOutcome::Skipped);
            }
            TrainingArgs::load_from(preprocessed, request.epochs)
        } else {
            if preprocessed.exists() {
                debug!(path = %preprocessed.display(), "overwriting preprocessed data");
            }
            cache.ensure_preprocessed_dir(kind)?;
            TrainingArgs::save_to(preprocessed, request.epochs)
        };

        info!(model = self.entry.key, epochs = request.epochs, "training");
        self.handle
            .model
            .train(&request.file_path, &args)
            .map_err(Error::Training)?;
        Ok(TrainOutcome::Trained { args })
    }

    pub fn train_file(&mut self, file: &Path, epochs: u32) -> Result<TrainOutcome> {
        self.train(&TrainingRequest::new(file).epochs(epochs))
    }
}
