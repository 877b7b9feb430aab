//! Best-effort run provenance
//!
//! Alongside the checkpoints a `run_manifest.json` records where and
//! when the run happened. Provenance is informational only: if any of
//! it cannot be gathered or written, the save still succeeds and the
//! failure is logged.

use std::env;
use std::path::{Path, PathBuf};

use chrono::Utc;
use engine_core::format_utc;
use serde::{Deserialize, Serialize};
use storage::{sha256_file, write_atomic};
use tracing::{debug, warn};

/// Name of the provenance file at the checkpoint root
pub const RUN_MANIFEST_FILE: &str = "run_manifest.json";

/// Environment variable carrying the VCS revision of the running build
const GIT_COMMIT_ENV: &str = "GIT_COMMIT";

/// Provenance record for a training run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunManifest {
    /// UTC timestamp of the write, RFC 3339
    pub written_utc: String,

    pub os: String,
    pub arch: String,
    pub engine_version: String,

    /// VCS revision, if `GIT_COMMIT` was set in the environment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vcs_revision: Option<String>,

    /// Hex SHA-256 of the dependency lock file, if one was configured
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock_digest: Option<String>,
}

impl RunManifest {
    /// Gather provenance from the current process.
    ///
    /// Every field degrades independently; a missing revision or an
    /// unreadable lock file just leaves that field out.
    pub fn capture(lock_file: Option<&Path>) -> Self {
        let vcs_revision = env::var(GIT_COMMIT_ENV)
            .ok()
            .filter(|v| !v.trim().is_empty());

        let lock_digest = lock_file.and_then(|path| match sha256_file(path) {
            Ok(digest) => Some(digest),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Could not digest lock file for provenance");
                None
            }
        });

        Self {
            written_utc: format_utc(Utc::now()),
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            vcs_revision,
            lock_digest,
        }
    }
}

/// Write `run_manifest.json` under `root`, best-effort.
///
/// Returns the written path, or `None` if the write failed. Never
/// propagates an error; provenance must not fail a save.
pub fn write_run_manifest(root: &Path, lock_file: Option<&Path>) -> Option<PathBuf> {
    let manifest = RunManifest::capture(lock_file);
    let path = root.join(RUN_MANIFEST_FILE);

    let bytes = match serde_json::to_vec_pretty(&manifest) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(error = %e, "Could not encode run manifest");
            return None;
        }
    };

    match write_atomic(&path, &bytes) {
        Ok(path) => {
            debug!(path = %path.display(), "Wrote run manifest");
            Some(path)
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Could not write run manifest");
            None
        }
    }
}
