use super::support::{jpeg, negative_plate, plate, recompress, DownModel, ScriptedModel};
use platelens::cache::{LocalTier, LocalTierConfig, PersistentTier};
use platelens::coordinator::{CacheCoordinator, Origin};
use platelens::imaging::ContentHasher;
use platelens::pipeline::{AnalysisPipeline, PipelineError, PipelineSettings};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tempfile::tempdir;

#[tokio::test]
async fn test_cold_then_warm_then_semantic() {
    let dir = tempdir().unwrap();
    let store = PersistentTier::open(&dir.path().join("analyses.db")).unwrap();
    let model = ScriptedModel::tacos();
    let original = jpeg(&plate(), 95);

    let mut first = CacheCoordinator::new(
        LocalTier::in_memory(50, 30),
        store.clone(),
        model.pipeline(),
    );

    let cold = first.resolve(&original).await.unwrap();
    assert_eq!(cold.origin, Origin::Generated);
    assert_eq!(cold.record.subject_name, "Beef Tacos");
    assert_eq!(model.detail_calls.load(Ordering::SeqCst), 1);
    assert_eq!(store.count_for_digest(&cold.digest).unwrap(), 1);

    let warm = first.resolve(&original).await.unwrap();
    assert_eq!(warm.origin, Origin::LocalExact);
    assert_eq!(warm.record, cold.record);
    let calls_after_warm = model.total_calls();

    // another caller with an empty local tier sees a recompressed copy
    let copy = recompress(&original, 80);
    assert_ne!(ContentHasher::new().digest(&copy), cold.digest);

    let mut second = CacheCoordinator::new(
        LocalTier::in_memory(50, 30),
        store.clone(),
        model.pipeline(),
    );
    let semantic = second.resolve(&copy).await.unwrap();
    assert_eq!(semantic.origin, Origin::RemoteSemantic);
    assert_eq!(semantic.record, cold.record);
    assert_eq!(model.total_calls(), calls_after_warm + 1);
    assert_eq!(model.detail_calls.load(Ordering::SeqCst), 1);
    assert!(second.local().lookup_exact(&semantic.digest).is_some());
    // semantic hits are not written back to the shared store
    assert_eq!(store.count().unwrap(), 1);
}

#[tokio::test]
async fn test_recompressed_copy_is_local_similar() {
    let model = ScriptedModel::tacos();
    let mut coord = CacheCoordinator::new(
        LocalTier::in_memory(50, 30),
        PersistentTier::open_in_memory().unwrap(),
        model.pipeline(),
    );
    let original = jpeg(&plate(), 95);
    coord.resolve(&original).await.unwrap();
    let calls = model.total_calls();

    let copy = recompress(&original, 80);
    let similar = coord.resolve(&copy).await.unwrap();
    assert_eq!(similar.origin, Origin::LocalSimilar);
    assert_eq!(model.total_calls(), calls);

    // now cached under its own digest too
    let exact = coord.resolve(&copy).await.unwrap();
    assert_eq!(exact.origin, Origin::LocalExact);
    assert_eq!(coord.local().len(), 2);
}

#[tokio::test]
async fn test_unrelated_photo_is_not_similar() {
    let model = ScriptedModel::new(
        r#"{"is_food": true, "confidence": 0.8, "subject_name": "Beef Tacos", "category": "Mexican"}"#,
        r#"{"subject_name": "Mystery Stew"}"#,
    );
    let mut coord = CacheCoordinator::new(
        LocalTier::in_memory(50, 30),
        PersistentTier::open_in_memory().unwrap(),
        model.pipeline(),
    );
    coord.resolve(&jpeg(&plate(), 95)).await.unwrap();

    let other = coord.resolve(&jpeg(&negative_plate(), 95)).await.unwrap();
    assert_eq!(other.origin, Origin::Generated);
    assert_eq!(model.detail_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_remote_exact_from_shared_store() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("analyses.db");
    let model = ScriptedModel::tacos();
    let photo = jpeg(&plate(), 90);

    let mut writer = CacheCoordinator::new(
        LocalTier::in_memory(5, 30),
        PersistentTier::open(&db).unwrap(),
        model.pipeline(),
    );
    writer.resolve(&photo).await.unwrap();
    drop(writer);

    // reopen from disk with a model that would fail if reached
    let mut reader = CacheCoordinator::new(
        LocalTier::in_memory(5, 30),
        PersistentTier::open(&db).unwrap(),
        AnalysisPipeline::new(Arc::new(DownModel), PipelineSettings::default()),
    );
    let hit = reader.resolve(&photo).await.unwrap();
    assert_eq!(hit.origin, Origin::RemoteExact);
    assert_eq!(hit.record.category, "Mexican");
}

#[tokio::test]
async fn test_not_food_is_not_cached() {
    let model = ScriptedModel::not_food();
    let store = PersistentTier::open_in_memory().unwrap();
    let mut coord = CacheCoordinator::new(
        LocalTier::in_memory(5, 30),
        store.clone(),
        model.pipeline(),
    );
    let photo = jpeg(&negative_plate(), 90);

    let err = coord.resolve(&photo).await.unwrap_err();
    assert!(matches!(err, PipelineError::NotFood { .. }));
    assert!(!err.is_retryable());
    assert_eq!(model.detail_calls.load(Ordering::SeqCst), 0);
    assert!(coord.local().is_empty());
    assert_eq!(store.count().unwrap(), 0);

    // asked again, the pipeline runs again
    assert!(coord.resolve(&photo).await.is_err());
    assert_eq!(model.identify_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_model_down_is_retryable_and_subject_guess_skipped() {
    let mut coord = CacheCoordinator::new(
        LocalTier::in_memory(5, 30),
        PersistentTier::open_in_memory().unwrap(),
        AnalysisPipeline::new(Arc::new(DownModel), PipelineSettings::default()),
    );
    let err = coord.resolve(b"raw bytes, not an image").await.unwrap_err();
    assert!(matches!(err, PipelineError::ModelUnavailable { .. }));
    assert!(err.is_retryable());
    assert!(coord.local().is_empty());
}

#[tokio::test]
async fn test_snapshot_backed_local_tier_survives_restart() {
    let dir = tempdir().unwrap();
    let snapshot = dir.path().join("local.json");
    let model = ScriptedModel::tacos();
    let photo = jpeg(&plate(), 90);
    let config = LocalTierConfig::default().with_snapshot(&snapshot);

    let mut coord = CacheCoordinator::new(
        LocalTier::open(config.clone()),
        PersistentTier::open_in_memory().unwrap(),
        model.pipeline(),
    );
    coord.resolve(&photo).await.unwrap();
    drop(coord);

    let mut restarted = CacheCoordinator::new(
        LocalTier::open(config),
        PersistentTier::open_in_memory().unwrap(),
        AnalysisPipeline::new(Arc::new(DownModel), PipelineSettings::default()),
    );
    let hit = restarted.resolve(&photo).await.unwrap();
    assert_eq!(hit.origin, Origin::LocalExact);
}

#[tokio::test]
async fn test_purges_apply_to_both_tiers() {
    let dir = tempdir().unwrap();
    let store = PersistentTier::open(&dir.path().join("analyses.db")).unwrap();
    let model = ScriptedModel::tacos();
    let mut coord = CacheCoordinator::new(
        LocalTier::in_memory(50, 30),
        store.clone(),
        model.pipeline(),
    );
    coord.resolve(&jpeg(&plate(), 90)).await.unwrap();

    let summary = coord.purge_above_calories(1000.0).unwrap();
    assert_eq!(summary.total(), 0);

    let summary = coord.purge_older_than(1).unwrap();
    assert_eq!(summary.total(), 0);

    let summary = coord.purge_above_calories(600.0).unwrap();
    assert_eq!((summary.local, summary.persistent), (1, 1));
    assert_eq!(store.count().unwrap(), 0);
}
