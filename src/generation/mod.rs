use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A full, caller-chosen parameter set. Once applied to a session it stays in
/// effect until replaced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParameters {
    pub min_length: usize,
    pub max_length: usize,
    pub do_sample: bool,
    pub early_stopping: bool,
    pub num_beams: usize,
    pub temperature: f32,
    pub top_k: usize,
    pub top_p: f32,
    /// 0 leaves n-gram repetition unconstrained.
    pub no_repeat_ngram_size: usize,
    pub bad_words: Option<BTreeSet<String>>,
}

impl Default for GenerationParameters {
    fn default() -> Self {
        Self {
            min_length: 10,
            max_length: 50,
            do_sample: true,
            early_stopping: false,
            num_beams: 1,
            temperature: 0.7,
            top_k: 50,
            top_p: 1.0,
            no_repeat_ngram_size: 1,
            bad_words: None,
        }
    }
}

impl GenerationParameters {
    pub fn validate(&self) -> Result<()> {
        if self.num_beams < 1 {
            return Err(Error::InvalidParameters("num_beams must be at least 1".into()));
        }
        if !(self.temperature.is_finite() && self.temperature > 0.0) {
            return Err(Error::InvalidParameters(format!(
                "temperature must be positive, got {}",
                self.temperature
            )));
        }
        if self.top_k < 1 {
            return Err(Error::InvalidParameters("top_k must be at least 1".into()));
        }
        if !(self.top_p > 0.0 && self.top_p <= 1.0) {
            return Err(Error::InvalidParameters(format!(
                "top_p must be in (0, 1], got {}",
                self.top_p
            )));
        }
        if self.min_length > self.max_length {
            return Err(Error::InvalidParameters(format!(
                "min_length {} exceeds max_length {}",
                self.min_length, self.max_length
            )));
        }
        Ok(())
    }

    pub fn to_settings(&self) -> GenerationSettings {
        GenerationSettings {
            min_length: Some(self.min_length),
            max_length: Some(self.max_length),
            do_sample: Some(self.do_sample),
            early_stopping: Some(self.early_stopping),
            num_beams: Some(self.num_beams),
            temperature: Some(self.temperature),
            top_k: Some(self.top_k),
            top_p: Some(self.top_p),
            no_repeat_ngram_size: Some(self.no_repeat_ngram_size),
            bad_words: self
                .bad_words
                .as_ref()
                .map(|words| words.iter().cloned().collect()),
        }
    }
}

/// What actually goes to the backend. Unset fields take the backend's own
/// defaults and are left out of the serialized form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub do_sample: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub early_stopping: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_beams: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub no_repeat_ngram_size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bad_words: Option<Vec<String>>,
}

impl GenerationSettings {
    /// The set used while no custom parameters have been applied.
    pub fn implicit_default() -> Self {
        Self {
            no_repeat_ngram_size: Some(2),
            do_sample: Some(true),
            top_k: Some(50),
            temperature: Some(0.7),
            ..Default::default()
        }
    }
}

/// Returns the first line of `text` that is not blank, or `""`.
///
/// Surrounding whitespace of the chosen line is kept; callers trim if needed.
pub fn extract_reply(text: &str) -> &str {
    text.lines()
        .find(|line| !line.trim().is_empty())
        .unwrap_or("")
}
