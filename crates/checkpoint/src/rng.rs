//! RNG state capture and restore
//!
//! Sources are modeled as a capability registry: each [`RngSource`] can
//! snapshot its state to a JSON value and restore from one. Capture
//! never fails (sources that cannot snapshot are skipped), and
//! restoring a snapshot that lacks an entry for a source is a no-op.
//! This is what makes training resumable bit-for-bit across process
//! restarts while degrading gracefully when a source is absent.

use std::collections::BTreeMap;
use std::sync::Arc;

use engine_core::Result;
use parking_lot::Mutex;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde_json::Value;
use tracing::{debug, warn};

/// Mapping from source name to an opaque serialized generator state
pub type RngSnapshot = BTreeMap<String, Value>;

/// A snapshot-capable random number generator
pub trait RngSource: Send + Sync {
    /// Stable source name used as the snapshot key (e.g. "process")
    fn name(&self) -> &str;

    fn snapshot(&self) -> Result<Value>;

    fn restore(&self, state: &Value) -> Result<()>;
}

/// Process-wide generator backed by a serializable ChaCha20 stream
pub struct ProcessRng {
    state: Mutex<ChaCha20Rng>,
}

impl ProcessRng {
    /// Seed from OS entropy
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ChaCha20Rng::from_entropy()),
        }
    }

    /// Deterministic seeding, for reproducible runs
    pub fn from_seed(seed: u64) -> Self {
        Self {
            state: Mutex::new(ChaCha20Rng::seed_from_u64(seed)),
        }
    }

    pub fn next_u64(&self) -> u64 {
        self.state.lock().next_u64()
    }

    pub fn fill_bytes(&self, dest: &mut [u8]) {
        self.state.lock().fill_bytes(dest);
    }
}

impl Default for ProcessRng {
    fn default() -> Self {
        Self::new()
    }
}

impl RngSource for ProcessRng {
    fn name(&self) -> &str {
        "process"
    }

    fn snapshot(&self) -> Result<Value> {
        let guard = self.state.lock();
        Ok(serde_json::to_value(&*guard)?)
    }

    fn restore(&self, state: &Value) -> Result<()> {
        let restored: ChaCha20Rng = serde_json::from_value(state.clone())?;
        *self.state.lock() = restored;
        Ok(())
    }
}

/// Registry of the RNG sources present in this process
pub struct RngRegistry {
    sources: Vec<Arc<dyn RngSource>>,
}

impl RngRegistry {
    /// Registry with no sources; capture yields an empty snapshot
    pub fn empty() -> Self {
        Self {
            sources: Vec::new(),
        }
    }

    pub fn register(&mut self, source: Arc<dyn RngSource>) {
        self.sources.push(source);
    }

    pub fn sources(&self) -> impl Iterator<Item = &Arc<dyn RngSource>> {
        self.sources.iter()
    }

    /// Snapshot every source that can be snapshotted.
    ///
    /// Never fails: a source whose snapshot errors is omitted with a
    /// warning.
    pub fn capture(&self) -> RngSnapshot {
        let mut snapshot = RngSnapshot::new();
        for source in &self.sources {
            match source.snapshot() {
                Ok(state) => {
                    snapshot.insert(source.name().to_string(), state);
                }
                Err(e) => {
                    warn!(source = source.name(), error = %e, "Skipping RNG source during capture");
                }
            }
        }
        snapshot
    }

    /// Restore every source that has an entry in the snapshot.
    ///
    /// Sources without an entry are left untouched; entries that fail
    /// to restore are logged and skipped.
    pub fn restore(&self, snapshot: &RngSnapshot) {
        for source in &self.sources {
            let Some(state) = snapshot.get(source.name()) else {
                debug!(source = source.name(), "No snapshot entry for RNG source");
                continue;
            };
            if let Err(e) = source.restore(state) {
                warn!(source = source.name(), error = %e, "Failed to restore RNG source");
            }
        }
    }
}

impl Default for RngRegistry {
    /// Registry holding a single entropy-seeded process generator
    fn default() -> Self {
        Self {
            sources: vec![Arc::new(ProcessRng::new())],
        }
    }
}
