use crate::backend::BackendError;
use std::time::Duration;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unknown model: {0}")]
    UnknownModel(String),

    #[error("failed to load {model}: {source}")]
    ModelLoad {
        model: String,
        #[source]
        source: BackendError,
    },

    #[error("gave up loading {model} after {attempts} attempts: {source}")]
    RetriesExhausted {
        model: String,
        attempts: u32,
        #[source]
        source: BackendError,
    },

    #[error("loading {model} was cancelled after waiting {waited:?}")]
    Cancelled { model: String, waited: Duration },

    #[error("generation failed: {0}")]
    Generation(#[source] BackendError),

    #[error("training failed: {0}")]
    Training(#[source] BackendError),

    #[error("invalid generation parameters: {0}")]
    InvalidParameters(String),

    #[error("worker: {0}")]
    Worker(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for the failures a caller may reasonably retry later on its own.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::RetriesExhausted { .. } => true,
            Error::ModelLoad { source, .. } => source.is_transient(),
            _ => false,
        }
    }
}
