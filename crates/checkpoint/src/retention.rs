//! Checkpoint retention
//!
//! Prunes a checkpoint root down to the union of "last N by epoch" and
//! "best K by recorded metric". The best-k selection reads the
//! persisted `best_index.json` written at save time rather than
//! re-reading per-checkpoint metadata, so a checkpoint with no recorded
//! metric can only survive through the keep-last window.
//!
//! Only directories named `epoch-<N>` are retention candidates;
//! anything else under the root is never touched.

use std::fs;
use std::path::{Path, PathBuf};

use engine_core::{BestIndexEntry, Epoch, Error, RetainMode, RetainSpec, RetentionReport, Result};
use storage::{atomic::read_file, finite_metric, write_atomic};
use tracing::{debug, info, warn};

/// Name of the best-metric index file at the retention root
pub const BEST_INDEX_FILE: &str = "best_index.json";

/// Parse an epoch number out of a directory name, if it is a candidate.
///
/// Accepts exactly `epoch-<digits>`; anything else (including names
/// with a suffix or non-numeric tail) is not a candidate.
pub fn parse_epoch(name: &str) -> Option<Epoch> {
    let digits = name.strip_prefix("epoch-")?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Final path component as a string
pub(crate) fn dir_name(path: &Path) -> String {
    path.file_name().unwrap_or_default().to_string_lossy().into_owned()
}

/// Applies retention policy to one checkpoint root
pub struct RetentionManager {
    root: PathBuf,
}

impl RetentionManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn index_path(&self) -> PathBuf {
        self.root.join(BEST_INDEX_FILE)
    }

    /// Candidate checkpoint directories under the root, ascending by
    /// epoch number. A missing root yields an empty list.
    pub fn epoch_dirs(&self) -> Result<Vec<(Epoch, PathBuf)>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut dirs = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            if let Some(epoch) = parse_epoch(&name.to_string_lossy()) {
                dirs.push((epoch, entry.path()));
            }
        }
        dirs.sort_by_key(|(epoch, _)| *epoch);
        Ok(dirs)
    }

    /// Read the persisted best-metric index.
    ///
    /// Absent file means no metrics were ever recorded. A file that
    /// exists but does not parse is a schema failure, not an empty
    /// index.
    pub fn read_index(&self) -> Result<Vec<BestIndexEntry>> {
        let path = self.index_path();
        let bytes = match read_file(&path) {
            Ok(bytes) => bytes,
            Err(Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Vec::new())
            }
            Err(e) => return Err(e),
        };
        serde_json::from_slice(&bytes).map_err(|e| Error::Schema {
            message: format!("malformed {BEST_INDEX_FILE}: {e}"),
        })
    }

    fn write_index(&self, entries: &[BestIndexEntry]) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(entries)?;
        write_atomic(&self.index_path(), &bytes)?;
        Ok(())
    }

    /// Record a metric value for a checkpoint directory.
    ///
    /// The index holds at most one record per path. Re-saving a
    /// directory drops its old entry and appends the new one, so
    /// recording order always reflects the latest save.
    pub fn record_metric(&self, dir_name: &str, metric: &str, value: f64) -> Result<()> {
        let value = finite_metric(metric, value)?;
        let mut entries = self.read_index()?;

        entries.retain(|e| e.path != dir_name);
        entries.push(BestIndexEntry {
            path: dir_name.to_string(),
            metric_value: value,
        });

        debug!(dir = dir_name, metric, value, "Recorded metric in best index");
        self.write_index(&entries)
    }

    /// The K candidate index entries with the best metric values.
    ///
    /// Entries outside the candidate set (stale paths, or checkpoints
    /// saved under a non-epoch directory name) are filtered out before
    /// the cut so they never consume a best-k slot. Stable sort: among
    /// equal metric values the earlier-recorded entry wins.
    fn best_entries(
        &self,
        k: usize,
        mode: RetainMode,
        candidates: &[String],
    ) -> Result<Vec<BestIndexEntry>> {
        let mut entries: Vec<BestIndexEntry> = self
            .read_index()?
            .into_iter()
            .filter(|e| candidates.iter().any(|name| *name == e.path))
            .collect();
        entries.sort_by(|a, b| {
            let ord = a
                .metric_value
                .partial_cmp(&b.metric_value)
                .unwrap_or(std::cmp::Ordering::Equal);
            match mode {
                RetainMode::Min => ord,
                RetainMode::Max => ord.reverse(),
            }
        });
        entries.truncate(k);
        Ok(entries)
    }

    /// Apply `spec` to the root, deleting every candidate directory not
    /// covered by the keep-last window or the best-k set.
    ///
    /// A spec with neither `keep_last` nor `best_k` keeps everything.
    /// After deletion the best index is rewritten to mention only
    /// surviving directories.
    pub fn retain(&self, spec: &RetainSpec) -> Result<RetentionReport> {
        spec.validate()?;

        let dirs = self.epoch_dirs()?;
        let total = dirs.len();

        if spec.keep_last.is_none() && spec.best_k.is_none() {
            return Ok(RetentionReport {
                total,
                kept: dirs.into_iter().map(|(e, _)| e).collect(),
                pruned: Vec::new(),
            });
        }

        let names: Vec<String> = dirs.iter().map(|(_, path)| dir_name(path)).collect();
        let best = match spec.best_k {
            Some(k) => self.best_entries(k, spec.mode, &names)?,
            None => Vec::new(),
        };

        let mut keep: Vec<&str> = Vec::new();
        if let Some(n) = spec.keep_last {
            // dirs is ascending, so the last n are the most recent
            for name in names.iter().rev().take(n) {
                keep.push(name);
            }
        }
        for entry in &best {
            keep.push(&entry.path);
        }

        let mut kept = Vec::new();
        let mut pruned = Vec::new();
        for ((epoch, path), name) in dirs.iter().zip(&names) {
            if keep.contains(&name.as_str()) {
                kept.push(*epoch);
                continue;
            }
            match fs::remove_dir_all(path) {
                Ok(()) => {
                    debug!(epoch, path = %path.display(), "Pruned checkpoint directory");
                    pruned.push(*epoch);
                }
                Err(e) => {
                    warn!(epoch, path = %path.display(), error = %e, "Failed to prune checkpoint directory");
                    kept.push(*epoch);
                }
            }
        }

        // Drop index entries for directories that no longer exist;
        // entries for non-candidate directories stay as long as the
        // directory does
        let index = self.read_index()?;
        let survivors: Vec<BestIndexEntry> = index
            .into_iter()
            .filter(|e| self.root.join(&e.path).is_dir())
            .collect();
        self.write_index(&survivors)?;

        info!(
            total,
            kept = kept.len(),
            pruned = pruned.len(),
            "Retention pass complete"
        );
        Ok(RetentionReport {
            total,
            kept,
            pruned,
        })
    }
}
