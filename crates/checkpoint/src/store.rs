//! Checkpoint store
//!
//! Orchestrates the full save and load flows over one checkpoint root.
//! Each checkpoint lives in its own `epoch-<N>` directory holding the
//! state file, its digest sidecar, versioned metadata, and optionally a
//! serialized RNG snapshot. Every file is written atomically; the save
//! order (state, digest, rng, metadata) makes `metadata.json` the
//! commit point, so a crash mid-save leaves a directory that loads as
//! "missing metadata" rather than as corruption.
//!
//! The store assumes a single writer per root. Readers may run
//! concurrently with a writer because of the atomic rename discipline.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use engine_core::{Epoch, Error, Problem, Result, RetainSpec, RetentionReport, Step, StoreConfig, VerifyMode};
use serde_json::Value;
use storage::{atomic::read_file, digest, finite_metric, to_canonical, write_atomic};
use tracing::{debug, info, warn};

use crate::payload::{BincodeCodec, PayloadCodec, StatePayload};
use crate::provenance;
use crate::retention::{self, parse_epoch, RetentionManager};
use crate::rng::{RngRegistry, RngSnapshot};
use crate::schema::{self, Metadata};

const DIGEST_FILE: &str = "state.sha256";
const METADATA_FILE: &str = "metadata.json";
const RNG_FILE: &str = "rng.json";

/// One checkpoint save
#[derive(Debug, Clone, Default)]
pub struct SaveRequest {
    pub payload: StatePayload,
    pub epoch: Epoch,
    pub step: Step,

    /// Metric values recorded in metadata; the retention metric (if the
    /// request carries a retain spec naming one) also lands in the
    /// best index
    pub metrics: BTreeMap<String, f64>,

    pub notes: Option<String>,

    /// Override for the directory name; defaults to `epoch-<epoch>`
    pub dir_name: Option<String>,

    /// Retention policy applied after the save completes
    pub retain: Option<RetainSpec>,
}

impl SaveRequest {
    pub fn new(payload: StatePayload, epoch: Epoch, step: Step) -> Self {
        Self {
            payload,
            epoch,
            step,
            ..Self::default()
        }
    }

    pub fn with_metric(mut self, name: impl Into<String>, value: f64) -> Self {
        self.metrics.insert(name.into(), value);
        self
    }

    pub fn with_retain(mut self, spec: RetainSpec) -> Self {
        self.retain = Some(spec);
        self
    }
}

/// A checkpoint read back from disk
#[derive(Debug, Clone)]
pub struct LoadedCheckpoint {
    pub payload: StatePayload,
    pub metadata: Metadata,

    /// RNG snapshot, if one was persisted with the checkpoint
    pub rng: Option<RngSnapshot>,
}

/// Synchronous checkpoint store over one root directory
pub struct CheckpointStore {
    root: PathBuf,
    config: StoreConfig,
    codecs: Vec<Box<dyn PayloadCodec>>,
    rng: RngRegistry,
}

impl CheckpointStore {
    /// Store with the default configuration and codec
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_config(root, StoreConfig::default())
    }

    pub fn with_config(root: impl Into<PathBuf>, config: StoreConfig) -> Self {
        Self {
            root: root.into(),
            config,
            codecs: vec![Box::new(BincodeCodec)],
            rng: RngRegistry::default(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Replace the RNG registry (e.g. with a deterministic one)
    pub fn set_rng(&mut self, rng: RngRegistry) {
        self.rng = rng;
    }

    pub fn rng(&self) -> &RngRegistry {
        &self.rng
    }

    /// Register an additional payload codec. Load probes codecs in
    /// registration order; save always uses the first.
    pub fn register_codec(&mut self, codec: Box<dyn PayloadCodec>) {
        self.codecs.push(codec);
    }

    fn retention(&self) -> RetentionManager {
        RetentionManager::new(&self.root)
    }

    /// Persist a checkpoint and apply retention if requested.
    ///
    /// Returns the path of the written state file. Retention and
    /// provenance run after the checkpoint itself is durable; a
    /// provenance failure never fails the save.
    pub fn save(&self, request: &SaveRequest) -> Result<PathBuf> {
        if let Some(spec) = &request.retain {
            spec.validate()?;
        }
        for (name, value) in &request.metrics {
            finite_metric(name, *value)?;
        }

        let dir_name = request
            .dir_name
            .clone()
            .unwrap_or_else(|| format!("epoch-{}", request.epoch));
        let dir = self.root.join(&dir_name);

        let codec = &self.codecs[0];
        let state_bytes = codec.serialize(&request.payload)?;
        let state_path = dir.join(format!("state.{}", codec.extension()));
        write_atomic(&state_path, &state_bytes)?;

        let digest_hex = digest::sha256_hex(&state_bytes);
        write_atomic(&dir.join(DIGEST_FILE), format!("{digest_hex}\n").as_bytes())?;

        if self.config.include_rng {
            let snapshot = self.rng.capture();
            write_atomic(&dir.join(RNG_FILE), &to_canonical(&snapshot)?)?;
        }

        let mut metadata = Metadata::new(digest_hex, request.epoch, request.step);
        metadata.metrics = request.metrics.clone();
        metadata.notes = request.notes.clone();
        // Metadata is the commit point: until it lands, the directory
        // reads back as an incomplete save
        write_atomic(&dir.join(METADATA_FILE), &to_canonical(&metadata)?)?;

        info!(
            dir = %dir.display(),
            epoch = request.epoch,
            step = request.step,
            bytes = state_bytes.len(),
            "Saved checkpoint"
        );

        if let Some(spec) = &request.retain {
            let manager = self.retention();
            if let Some(metric) = &spec.best_metric {
                match request.metrics.get(metric) {
                    Some(value) => manager.record_metric(&dir_name, metric, *value)?,
                    None => warn!(
                        dir = dir_name,
                        metric,
                        "Retention metric not in save request; checkpoint is only eligible via keep_last"
                    ),
                }
            }
            manager.retain(spec)?;
        }

        provenance::write_run_manifest(&self.root, self.config.lock_file.as_deref());

        Ok(state_path)
    }

    /// Load a checkpoint directory under the configured verify mode
    pub fn load(&self, dir_name: &str) -> Result<LoadedCheckpoint> {
        self.load_with(dir_name, self.config.verify)
    }

    /// Load the checkpoint with the largest epoch number, if any exists
    pub fn load_latest(&self) -> Result<Option<LoadedCheckpoint>> {
        let dirs = self.retention().epoch_dirs()?;
        match dirs.last() {
            Some((_, path)) => Ok(Some(self.load(&retention::dir_name(path))?)),
            None => Ok(None),
        }
    }

    pub fn load_with(&self, dir_name: &str, verify: VerifyMode) -> Result<LoadedCheckpoint> {
        let dir = self.root.join(dir_name);

        let (codec, state_path) = self.probe_state(&dir).ok_or_else(|| Error::MissingPayload {
            dir: dir_name.to_string(),
        })?;
        let state_bytes = read_file(&state_path)?;

        let metadata_doc = self.read_json(&dir.join(METADATA_FILE)).map_err(|e| match e {
            Error::Io(io) if io.kind() == std::io::ErrorKind::NotFound => {
                Error::MissingMetadata {
                    dir: dir_name.to_string(),
                }
            }
            other => other,
        })?;
        let metadata = schema::parse(&metadata_doc)?;

        if let Err(e) = self.verify_digest(&state_path, &state_bytes, &metadata.digest_sha256) {
            match verify {
                VerifyMode::Strict => return Err(e),
                VerifyMode::Permissive => {
                    warn!(dir = dir_name, error = %e, "Digest mismatch ignored in permissive mode");
                }
            }
        }

        let payload = codec.deserialize(&state_bytes)?;

        let rng = match self.read_json(&dir.join(RNG_FILE)) {
            Ok(doc) => Some(serde_json::from_value(doc)?),
            Err(Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(e),
        };

        debug!(dir = dir_name, epoch = metadata.epoch, "Loaded checkpoint");
        Ok(LoadedCheckpoint {
            payload,
            metadata,
            rng,
        })
    }

    /// Snapshot the registered RNG sources
    pub fn capture_rng(&self) -> RngSnapshot {
        self.rng.capture()
    }

    /// Restore the process RNG sources from a loaded checkpoint
    pub fn restore_rng(&self, checkpoint: &LoadedCheckpoint) {
        if let Some(snapshot) = &checkpoint.rng {
            self.rng.restore(snapshot);
        }
    }

    /// Apply a retention policy to the root outside of a save
    pub fn retain(&self, spec: &RetainSpec) -> Result<RetentionReport> {
        self.retention().retain(spec)
    }

    /// Checkpoint directory names under the root, ascending by epoch.
    ///
    /// Names come from the directories themselves, so zero-padded
    /// spellings like `epoch-0005` are preserved.
    pub fn list(&self) -> Result<Vec<String>> {
        Ok(self
            .retention()
            .epoch_dirs()?
            .iter()
            .map(|(_, path)| retention::dir_name(path))
            .collect())
    }

    /// Structurally verify one checkpoint directory without loading it.
    ///
    /// Returns an empty list iff the directory is complete and
    /// internally consistent. Findings are descriptive; nothing is
    /// modified.
    pub fn verify_dir(&self, dir_name: &str) -> Vec<Problem> {
        let mut problems = Vec::new();
        let dir = self.root.join(dir_name);

        if parse_epoch(dir_name).is_none() {
            problems.push(Problem::new(
                "dir",
                format!("{dir_name:?} is not a checkpoint directory name"),
            ));
        }

        let state = self.probe_state(&dir);
        if state.is_none() {
            problems.push(Problem::new("state", "state file is missing"));
        }

        let metadata = match self.read_json(&dir.join(METADATA_FILE)) {
            Ok(doc) => match schema::parse(&doc) {
                Ok(meta) => Some(meta),
                Err(e) => {
                    problems.push(Problem::new("metadata", e.to_string()));
                    None
                }
            },
            Err(e) => {
                problems.push(Problem::new("metadata", e.to_string()));
                None
            }
        };

        if let (Some((_, state_path)), Some(meta)) = (&state, &metadata) {
            match digest::sha256_file(state_path) {
                Ok(actual) if actual != meta.digest_sha256 => {
                    problems.push(Problem::new(
                        "digest",
                        "state file does not match metadata digest",
                    ));
                }
                Ok(_) => {}
                Err(e) => problems.push(Problem::new("digest", e.to_string())),
            }

            match read_file(&dir.join(DIGEST_FILE)) {
                Ok(sidecar) => {
                    let sidecar = String::from_utf8_lossy(&sidecar);
                    if sidecar.trim() != meta.digest_sha256 {
                        problems.push(Problem::new(
                            "digest_sidecar",
                            "sidecar digest does not match metadata digest",
                        ));
                    }
                }
                Err(_) => {
                    problems.push(Problem::new("digest_sidecar", "digest sidecar is missing"));
                }
            }
        }

        problems
    }

    /// Find the state file by probing each registered codec's extension
    fn probe_state(&self, dir: &Path) -> Option<(&dyn PayloadCodec, PathBuf)> {
        for codec in &self.codecs {
            let path = dir.join(format!("state.{}", codec.extension()));
            if path.is_file() {
                return Some((codec.as_ref(), path));
            }
        }
        None
    }

    fn read_json(&self, path: &Path) -> Result<Value> {
        let bytes = read_file(path)?;
        serde_json::from_slice(&bytes).map_err(|e| Error::Schema {
            message: format!("malformed JSON in {}: {e}", path.display()),
        })
    }

    fn verify_digest(&self, path: &Path, bytes: &[u8], expected: &str) -> Result<()> {
        digest::verify(bytes, expected).map_err(|e| match e {
            Error::Integrity {
                expected, actual, ..
            } => Error::Integrity {
                path: path.display().to_string(),
                expected,
                actual,
            },
            other => other,
        })
    }
}
