use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainingRequest {
    pub file_path: PathBuf,
    pub epochs: u32,
    /// Only resume from previously preprocessed data; do nothing if there is none.
    pub load_only: bool,
}

impl TrainingRequest {
    pub fn new(file_path: impl Into<PathBuf>) -> Self {
        Self {
            file_path: file_path.into(),
            epochs: 1,
            load_only: false,
        }
    }

    /// A speculative warm load issued before a chat turn.
    pub fn warm_load() -> Self {
        Self {
            file_path: PathBuf::new(),
            epochs: 1,
            load_only: true,
        }
    }

    pub fn epochs(mut self, epochs: u32) -> Self {
        self.epochs = epochs;
        self
    }

    pub fn load_only(mut self, load_only: bool) -> Self {
        self.load_only = load_only;
        self
    }
}

/// Arguments handed to the backend's training call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingArgs {
    pub num_train_epochs: u32,
    pub save_preprocessed_data: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub save_preprocessed_data_path: Option<PathBuf>,
    pub load_preprocessed_data: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load_preprocessed_data_path: Option<PathBuf>,
}

impl TrainingArgs {
    pub fn save_to(path: PathBuf, epochs: u32) -> Self {
        Self {
            num_train_epochs: epochs,
            save_preprocessed_data: true,
            save_preprocessed_data_path: Some(path),
            load_preprocessed_data: false,
            load_preprocessed_data_path: None,
        }
    }

    pub fn load_from(path: PathBuf, epochs: u32) -> Self {
        Self {
            num_train_epochs: epochs,
            save_preprocessed_data: false,
            save_preprocessed_data_path: None,
            load_preprocessed_data: true,
            load_preprocessed_data_path: Some(path),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrainOutcome {
    Trained { args: TrainingArgs },
    /// `load_only` was requested and no preprocessed data exists.
    Skipped,
}

impl TrainOutcome {
    pub fn is_skipped(&self) -> bool {
        matches!(self, TrainOutcome::Skipped)
    }
}
