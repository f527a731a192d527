pub mod backend;
pub mod cache;
pub mod catalog;
pub mod chat;
pub mod downloader;
pub mod envconfig;
pub mod error;
pub mod events;
pub mod format;
pub mod generation;
pub mod progress;
pub mod retry;
pub mod session;
pub mod training;

pub use backend::{Backend, BackendError, LoadedModel, ProcessBackend, RawGeneration};
pub use cache::CacheLayout;
pub use catalog::{CatalogEntry, ModelKind};
pub use chat::ChatSession;
pub use downloader::DownloadManager;
pub use envconfig::EnvConfig;
pub use error::{Error, Result};
pub use events::{EventHandler, LifecycleEvent};
pub use generation::{GenerationParameters, GenerationSettings};
pub use retry::{CancelToken, RetryPolicy, Sleeper};
pub use session::{ModelSession, SessionBuilder, SessionConfig};
pub use training::{TrainOutcome, TrainingArgs, TrainingRequest};
