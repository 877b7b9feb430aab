use std::collections::BTreeMap;
use std::fs;

use anyhow::Result;
use checkpoint::{CheckpointStore, SaveRequest, StatePayload};
use engine_core::{Error, RetainMode, RetainSpec, VerifyMode};
use tempfile::TempDir;

fn store_at(root: &TempDir) -> CheckpointStore {
    engine_core::logging::init();
    CheckpointStore::new(root.path())
}

fn payload_with(blobs: &[(&str, Vec<u8>)]) -> StatePayload {
    let mut payload = StatePayload::new();
    for (name, bytes) in blobs {
        payload.insert(*name, bytes.clone());
    }
    payload
}

fn training_payload(epoch: u64) -> StatePayload {
    payload_with(&[
        ("model_state", vec![epoch as u8; 4096]),
        ("optimizer_state", vec![(epoch * 2) as u8; 2048]),
    ])
}

#[test]
fn test_save_load_round_trip() -> Result<()> {
    let root = TempDir::new()?;
    let store = store_at(&root);

    let request = SaveRequest::new(training_payload(1), 1, 500)
        .with_metric("val_loss", 0.42);
    store.save(&request)?;

    let loaded = store.load("epoch-1")?;
    assert_eq!(loaded.payload, training_payload(1));
    assert_eq!(loaded.metadata.epoch, 1);
    assert_eq!(loaded.metadata.step, 500);
    assert_eq!(loaded.metadata.metrics["val_loss"], 0.42);
    Ok(())
}

#[test]
fn test_digest_consistency_across_artifacts() -> Result<()> {
    // The metadata digest, the sidecar digest, and the digest of the
    // actual state bytes must all agree after a save.
    let root = TempDir::new()?;
    let store = store_at(&root);
    let state_path = store.save(&SaveRequest::new(training_payload(3), 3, 0))?;

    let loaded = store.load("epoch-3")?;
    let sidecar = fs::read_to_string(root.path().join("epoch-3/state.sha256"))?;
    let recomputed = storage::sha256_file(&state_path)?;

    assert_eq!(loaded.metadata.digest_sha256, sidecar.trim());
    assert_eq!(loaded.metadata.digest_sha256, recomputed);
    Ok(())
}

#[test]
fn test_retention_keeps_union_of_last_and_best() -> Result<()> {
    let root = TempDir::new()?;
    let store = store_at(&root);

    // Losses improve then regress: epoch 3 is the all-time best
    let losses = [(1u64, 0.9), (2, 0.5), (3, 0.1), (4, 0.4), (5, 0.6)];
    let spec = RetainSpec {
        keep_last: Some(2),
        best_k: Some(1),
        best_metric: Some("val_loss".to_string()),
        mode: RetainMode::Min,
    };
    for (epoch, loss) in losses {
        let request = SaveRequest::new(training_payload(epoch), epoch, epoch * 100)
            .with_metric("val_loss", loss)
            .with_retain(spec.clone());
        store.save(&request)?;
    }

    // Best (epoch-3) survives even though it fell out of the recency window
    assert_eq!(store.list()?, vec!["epoch-3", "epoch-4", "epoch-5"]);
    Ok(())
}

#[test]
fn test_retention_monotonic_losses_converge_last_and_best() -> Result<()> {
    // When losses only improve, the best checkpoints and the latest
    // checkpoints are the same set.
    let root = TempDir::new()?;
    let store = store_at(&root);

    let losses = [(1u64, 0.9), (2, 0.7), (3, 0.5), (4, 0.3)];
    let spec = RetainSpec {
        keep_last: Some(2),
        best_k: Some(2),
        best_metric: Some("val_loss".to_string()),
        mode: RetainMode::Min,
    };
    for (epoch, loss) in losses {
        let request = SaveRequest::new(training_payload(epoch), epoch, 0)
            .with_metric("val_loss", loss)
            .with_retain(spec.clone());
        store.save(&request)?;
    }

    assert_eq!(store.list()?, vec!["epoch-3", "epoch-4"]);
    Ok(())
}

#[test]
fn test_retention_nonmonotonic_losses_keep_early_best() -> Result<()> {
    // Early epochs had the best losses; the recency window alone would
    // have discarded them.
    let root = TempDir::new()?;
    let store = store_at(&root);

    let losses = [(1u64, 0.2), (2, 0.3), (3, 0.9), (4, 0.8)];
    let spec = RetainSpec {
        keep_last: Some(1),
        best_k: Some(2),
        best_metric: Some("val_loss".to_string()),
        mode: RetainMode::Min,
    };
    for (epoch, loss) in losses {
        let request = SaveRequest::new(training_payload(epoch), epoch, 0)
            .with_metric("val_loss", loss)
            .with_retain(spec.clone());
        store.save(&request)?;
    }

    assert_eq!(store.list()?, vec!["epoch-1", "epoch-2", "epoch-4"]);
    Ok(())
}

#[test]
fn test_named_checkpoint_does_not_distort_best_k() -> Result<()> {
    // A checkpoint saved under a caller-chosen name records its metric
    // in the best index but is not a retention candidate. It must not
    // occupy a best-k slot that belongs to an epoch directory.
    let root = TempDir::new()?;
    let store = store_at(&root);

    let spec = RetainSpec {
        keep_last: Some(1),
        best_k: Some(2),
        best_metric: Some("val_loss".to_string()),
        mode: RetainMode::Min,
    };
    for (epoch, loss) in [(1u64, 0.10), (2, 0.20), (3, 0.90)] {
        let request = SaveRequest::new(training_payload(epoch), epoch, 0)
            .with_metric("val_loss", loss)
            .with_retain(spec.clone());
        store.save(&request)?;
    }
    let mut best_ever = SaveRequest::new(training_payload(9), 3, 0)
        .with_metric("val_loss", 0.05)
        .with_retain(spec.clone());
    best_ever.dir_name = Some("final".to_string());
    store.save(&best_ever)?;

    // epoch-1 and epoch-2 hold the two best slots; "final" is outside
    // retention entirely
    assert_eq!(store.list()?, vec!["epoch-1", "epoch-2", "epoch-3"]);
    assert!(root.path().join("final").exists());
    Ok(())
}

#[test]
fn test_retention_max_mode_keeps_highest_accuracy() -> Result<()> {
    let root = TempDir::new()?;
    let store = store_at(&root);

    let accuracies = [(1u64, 0.70), (2, 0.95), (3, 0.80), (4, 0.75)];
    let spec = RetainSpec {
        keep_last: Some(1),
        best_k: Some(1),
        best_metric: Some("accuracy".to_string()),
        mode: RetainMode::Max,
    };
    for (epoch, acc) in accuracies {
        let request = SaveRequest::new(training_payload(epoch), epoch, 0)
            .with_metric("accuracy", acc)
            .with_retain(spec.clone());
        store.save(&request)?;
    }

    assert_eq!(store.list()?, vec!["epoch-2", "epoch-4"]);
    Ok(())
}

#[test]
fn test_crash_between_state_and_metadata() -> Result<()> {
    let root = TempDir::new()?;
    let store = store_at(&root);
    store.save(&SaveRequest::new(training_payload(1), 1, 0))?;

    // Metadata is the last artifact written; removing it reproduces a
    // crash after the state landed but before the save committed
    fs::remove_file(root.path().join("epoch-1/metadata.json"))?;

    match store.load("epoch-1") {
        Err(Error::MissingMetadata { dir }) => assert_eq!(dir, "epoch-1"),
        other => panic!("expected MissingMetadata, got {other:?}"),
    }
    Ok(())
}

#[test]
fn test_corruption_detected_strict_recovered_permissive() -> Result<()> {
    let root = TempDir::new()?;
    let store = store_at(&root);
    let state_path = store.save(&SaveRequest::new(training_payload(1), 1, 0))?;

    let mut bytes = fs::read(&state_path)?;
    let mid = bytes.len() / 2;
    bytes[mid] ^= 0xff;
    fs::write(&state_path, &bytes)?;

    assert!(matches!(store.load("epoch-1"), Err(Error::Integrity { .. })));

    // Permissive mode is for forensics: the load proceeds past the
    // digest check, though the payload may still fail to decode
    let result = store.load_with("epoch-1", VerifyMode::Permissive);
    assert!(!matches!(result, Err(Error::Integrity { .. })));
    Ok(())
}

#[test]
fn test_resume_replays_rng_sequence() -> Result<()> {
    let root = TempDir::new()?;
    let mut store = CheckpointStore::new(root.path());

    let rng = std::sync::Arc::new(checkpoint::ProcessRng::from_seed(1234));
    let mut registry = checkpoint::RngRegistry::empty();
    registry.register(rng.clone());
    store.set_rng(registry);

    store.save(&SaveRequest::new(training_payload(1), 1, 0))?;
    let draws_after_save: Vec<u64> = (0..8).map(|_| rng.next_u64()).collect();

    // Simulate a restart: restore from the checkpoint and draw again
    let loaded = store.load("epoch-1")?;
    assert!(loaded.rng.is_some());
    store.restore_rng(&loaded);
    let draws_after_resume: Vec<u64> = (0..8).map(|_| rng.next_u64()).collect();

    assert_eq!(draws_after_save, draws_after_resume);
    Ok(())
}

#[test]
fn test_legacy_v1_metadata_still_loads() -> Result<()> {
    let root = TempDir::new()?;
    let store = store_at(&root);
    store.save(&SaveRequest::new(training_payload(4), 4, 400))?;

    let loaded = store.load("epoch-4")?;
    let v1 = serde_json::json!({
        "schema_version": "1",
        "checkpoint_sha256": loaded.metadata.digest_sha256,
        "metrics": {"val_loss": 0.3},
        "epoch": 4,
        "step": 400,
    });
    fs::write(
        root.path().join("epoch-4/metadata.json"),
        serde_json::to_vec(&v1)?,
    )?;

    let upgraded = store.load("epoch-4")?;
    assert_eq!(upgraded.metadata.schema_version, "2");
    assert_eq!(upgraded.metadata.metrics["val_loss"], 0.3);
    assert_eq!(upgraded.metadata.step, 400);
    Ok(())
}

#[test]
fn test_foreign_directories_survive_retention() -> Result<()> {
    let root = TempDir::new()?;
    let store = store_at(&root);

    fs::create_dir_all(root.path().join("tensorboard"))?;
    fs::write(root.path().join("notes.txt"), b"experiment 12")?;

    for epoch in 1..=3 {
        let request = SaveRequest::new(training_payload(epoch), epoch, 0)
            .with_retain(RetainSpec::keep_last(1));
        store.save(&request)?;
    }

    assert_eq!(store.list()?, vec!["epoch-3"]);
    assert!(root.path().join("tensorboard").exists());
    assert!(root.path().join("notes.txt").exists());
    Ok(())
}

#[test]
fn test_resave_same_epoch_overwrites() -> Result<()> {
    let root = TempDir::new()?;
    let store = store_at(&root);

    store.save(
        &SaveRequest::new(training_payload(1), 1, 100).with_metric("val_loss", 0.5),
    )?;
    store.save(
        &SaveRequest::new(training_payload(2), 1, 200).with_metric("val_loss", 0.4),
    )?;

    let loaded = store.load("epoch-1")?;
    assert_eq!(loaded.payload, training_payload(2));
    assert_eq!(loaded.metadata.step, 200);
    Ok(())
}

#[test]
fn test_run_manifest_written_alongside_checkpoints() -> Result<()> {
    let root = TempDir::new()?;
    let store = store_at(&root);
    store.save(&SaveRequest::new(training_payload(1), 1, 0))?;

    let manifest: serde_json::Value = serde_json::from_slice(&fs::read(
        root.path().join("run_manifest.json"),
    )?)?;
    assert!(manifest["engine_version"].is_string());
    assert!(manifest["written_utc"].is_string());
    Ok(())
}

#[test]
fn test_metrics_are_independent_of_retention_metric() -> Result<()> {
    // Extra metrics are recorded in metadata even when retention only
    // tracks one of them.
    let root = TempDir::new()?;
    let store = store_at(&root);

    let mut metrics = BTreeMap::new();
    metrics.insert("val_loss".to_string(), 0.3);
    metrics.insert("grad_norm".to_string(), 1.7);
    let request = SaveRequest {
        payload: training_payload(1),
        epoch: 1,
        step: 0,
        metrics,
        ..SaveRequest::default()
    };
    store.save(&request)?;

    let loaded = store.load("epoch-1")?;
    assert_eq!(loaded.metadata.metrics.len(), 2);
    assert_eq!(loaded.metadata.metrics["grad_norm"], 1.7);
    Ok(())
}
