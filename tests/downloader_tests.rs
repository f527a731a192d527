mod common;

use common::{config, FakeBackend, RecordingSleeper};
use happychatter::{downloader, Error, ModelKind, ModelSession};
use std::sync::Arc;
use tempfile::TempDir;

#[test]
fn test_download_all_continues_past_failures() {
    let dir = TempDir::new().unwrap();
    let backend = Arc::new(FakeBackend::new().fail_fetches(&["404 Client Error: Not Found"]));
    let sleeper = Arc::new(RecordingSleeper::default());

    let results = downloader::download_all(|kind| {
        ModelSession::builder(backend.clone())
            .config(config(dir.path()))
            .sleeper(sleeper.clone())
            .open(kind)
    });

    let kinds: Vec<ModelKind> = results.iter().map(|(kind, _)| *kind).collect();
    assert_eq!(kinds, ModelKind::ALL.to_vec());

    let failed: Vec<ModelKind> = results
        .iter()
        .filter(|(_, result)| result.is_err())
        .map(|(kind, _)| *kind)
        .collect();
    assert_eq!(failed, vec![ModelKind::NeoSmall]);
    assert!(matches!(results[0].1, Err(Error::ModelLoad { .. })));

    let cache = happychatter::CacheLayout::new(dir.path());
    assert!(!cache.is_cached(ModelKind::NeoSmall));
    assert!(ModelKind::ALL[1..].iter().all(|&kind| cache.is_cached(kind)));
    assert_eq!(backend.calls.fetches(), 13);
}

#[test]
fn test_download_all_skips_fetch_for_cached_models() {
    let dir = TempDir::new().unwrap();
    let backend = Arc::new(FakeBackend::new());
    let sleeper = Arc::new(RecordingSleeper::default());
    let open = |kind: ModelKind| {
        ModelSession::builder(backend.clone())
            .config(config(dir.path()))
            .sleeper(sleeper.clone())
            .open(kind)
    };

    assert!(downloader::download_all(open).iter().all(|(_, r)| r.is_ok()));
    assert!(downloader::download_all(open).iter().all(|(_, r)| r.is_ok()));

    assert_eq!(backend.calls.fetches(), 13);
    assert_eq!(backend.calls.loads(), 13);
}
