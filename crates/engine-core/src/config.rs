//! Store configuration types

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// How digest verification failures are handled during load
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VerifyMode {
    /// Digest mismatch fails the load (default)
    #[default]
    Strict,

    /// Digest mismatch logs a warning and the payload loads anyway.
    /// Intended for forensic recovery only.
    Permissive,
}

/// Checkpoint store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Capture and persist RNG state alongside each checkpoint
    pub include_rng: bool,

    /// Digest verification policy applied by `load`
    pub verify: VerifyMode,

    /// Dependency lockfile digested into `run_manifest.json`, if any
    pub lock_file: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            include_rng: true,
            verify: VerifyMode::Strict,
            lock_file: None,
        }
    }
}
