pub mod process;

pub use process::ProcessBackend;

use crate::generation::GenerationSettings;
use crate::training::TrainingArgs;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransientKind {
    ConnectionBroken,
    TimedOut,
}

impl fmt::Display for TransientKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransientKind::ConnectionBroken => f.write_str("connection broken"),
            TransientKind::TimedOut => f.write_str("timed out"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transient(TransientKind),
    Fatal,
}

/// Classifies a failure message the way the hub client reports it.
pub fn classify(message: &str) -> ErrorKind {
    if message.contains("Connection broken") {
        ErrorKind::Transient(TransientKind::ConnectionBroken)
    } else if message.contains("timed out") {
        ErrorKind::Transient(TransientKind::TimedOut)
    } else {
        ErrorKind::Fatal
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct BackendError {
    kind: ErrorKind,
    message: String,
}

impl BackendError {
    /// Builds an error whose kind is derived from the message.
    pub fn new(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            kind: classify(&message),
            message,
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Fatal,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn transient_kind(&self) -> Option<TransientKind> {
        match self.kind {
            ErrorKind::Transient(kind) => Some(kind),
            ErrorKind::Fatal => None,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.transient_kind().is_some()
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Output of one generation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawGeneration {
    pub text: String,
    /// Everything the backend returned, kept for logging.
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl RawGeneration {
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            payload: serde_json::json!({ "text": text }),
            text,
        }
    }
}

/// The seam to the machine-learning library that owns tokenizers, weights,
/// sampling and gradient descent.
///
/// A [`Backend`] knows how to obtain a model (from the hub or from a cache
/// directory); the resulting [`LoadedModel`] is the tokenizer+model pair that
/// a session owns for its whole lifetime.
pub trait Backend: Send + Sync {
    /// Downloads tokenizer and model from the upstream hub.
    fn fetch(&self, publisher_id: &str) -> Result<Box<dyn LoadedModel>, BackendError>;

    /// Loads tokenizer and model from a cache directory written by [`LoadedModel::save`].
    fn load(&self, publisher_id: &str, dir: &Path) -> Result<Box<dyn LoadedModel>, BackendError>;
}

pub trait LoadedModel: Send {
    fn save(&self, dir: &Path) -> Result<(), BackendError>;

    fn generate(
        &mut self,
        prompt: &str,
        settings: &GenerationSettings,
    ) -> Result<RawGeneration, BackendError>;

    fn train(&mut self, file: &Path, args: &TrainingArgs) -> Result<(), BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(
            classify("('Connection broken: IncompleteRead(0 bytes read)')"),
            ErrorKind::Transient(TransientKind::ConnectionBroken)
        );
        assert_eq!(
            classify("HTTPSConnectionPool: Read timed out. (read timeout=10)"),
            ErrorKind::Transient(TransientKind::TimedOut)
        );
        assert_eq!(classify("No space left on device"), ErrorKind::Fatal);
        // matching is case sensitive, like the hub client's messages
        assert_eq!(classify("connection broken"), ErrorKind::Fatal);
    }

    #[test]
    fn test_fatal_ignores_message() {
        let err = BackendError::fatal("Read timed out");
        assert!(!err.is_transient());
        assert_eq!(err.to_string(), "Read timed out");
    }
}
