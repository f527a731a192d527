use crate::catalog::ModelKind;
use std::path::{Path, PathBuf};

/// File whose presence marks a model snapshot as already cached.
pub const MARKER_FILE: &str = "pytorch_model.bin";
pub const PREPROCESSED_DIR: &str = "preprocessed_data";
pub const PREPROCESSED_FILE: &str = "preprocess.json";

/// On-disk layout of cached model snapshots:
///
/// ```text
/// <root>/<key>/pytorch_model.bin
/// <root>/<key>/preprocessed_data/preprocess.json
/// ```
///
/// Nothing here takes a lock; two sessions writing the same key race.
#[derive(Debug, Clone)]
pub struct CacheLayout {
    root: PathBuf,
}

impl CacheLayout {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn model_dir(&self, kind: ModelKind) -> PathBuf {
        self.root.join(kind.key())
    }

    pub fn marker_path(&self, kind: ModelKind) -> PathBuf {
        self.model_dir(kind).join(MARKER_FILE)
    }

    pub fn is_cached(&self, kind: ModelKind) -> bool {
        self.marker_path(kind).exists()
    }

    pub fn preprocessed_path(&self, kind: ModelKind) -> PathBuf {
        self.model_dir(kind)
            .join(PREPROCESSED_DIR)
            .join(PREPROCESSED_FILE)
    }

    pub fn has_preprocessed(&self, kind: ModelKind) -> bool {
        self.preprocessed_path(kind).is_file()
    }

    pub fn ensure_model_dir(&self, kind: ModelKind) -> std::io::Result<PathBuf> {
        let dir = self.model_dir(kind);
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    pub fn ensure_preprocessed_dir(&self, kind: ModelKind) -> std::io::Result<PathBuf> {
        let dir = self.model_dir(kind).join(PREPROCESSED_DIR);
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Size on disk of the cached snapshot, not counting subdirectories.
    pub fn cached_size(&self, kind: ModelKind) -> Option<u64> {
        if !self.is_cached(kind) {
            return None;
        }

        let mut total = 0u64;
        for entry in std::fs::read_dir(self.model_dir(kind)).ok()?.flatten() {
            if let Ok(metadata) = entry.metadata() {
                if metadata.is_file() {
                    total += metadata.len();
                }
            }
        }
        Some(total)
    }
}

impl Default for CacheLayout {
    fn default() -> Self {
        Self::new(crate::envconfig::models_dir())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths() {
        let layout = CacheLayout::new("models");
        assert_eq!(
            layout.marker_path(ModelKind::NeoSmall),
            PathBuf::from("models/neo-small/pytorch_model.bin")
        );
        assert_eq!(
            layout.preprocessed_path(ModelKind::Aeona),
            PathBuf::from("models/aeona/preprocessed_data/preprocess.json")
        );
    }

    #[test]
    fn test_cache_state() {
        let dir = tempfile::tempdir().unwrap();
        let layout = CacheLayout::new(dir.path());

        assert!(!layout.is_cached(ModelKind::DialoSmall));
        assert_eq!(layout.cached_size(ModelKind::DialoSmall), None);

        let model_dir = layout.ensure_model_dir(ModelKind::DialoSmall).unwrap();
        std::fs::write(model_dir.join(MARKER_FILE), b"weights").unwrap();
        std::fs::write(model_dir.join("config.json"), b"{}").unwrap();
        layout.ensure_preprocessed_dir(ModelKind::DialoSmall).unwrap();

        assert!(layout.is_cached(ModelKind::DialoSmall));
        assert_eq!(layout.cached_size(ModelKind::DialoSmall), Some(9));
        assert!(!layout.has_preprocessed(ModelKind::DialoSmall));
    }
}
