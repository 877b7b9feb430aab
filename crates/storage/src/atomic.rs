//! Atomic file writes
//!
//! Readers never observe a partial file: data is written to a uniquely
//! named temporary sibling, synced, and renamed over the destination.
//! The temp file lives in the same directory as the destination so the
//! rename stays on one filesystem.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use engine_core::{Error, Result};
use tracing::debug;
use uuid::Uuid;

/// Generate a unique temporary sibling path for `path`
fn temp_path(path: &Path) -> PathBuf {
    let temp_name = format!(
        ".{}.{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy(),
        Uuid::new_v4()
    );
    path.with_file_name(temp_name)
}

/// Write `data` to `path` atomically.
///
/// Creates parent directories if absent. On any failure before the
/// rename the destination is left untouched; the temp file is removed
/// best-effort. I/O errors propagate unchanged, with no retries.
pub fn write_atomic(path: &Path, data: &[u8]) -> Result<PathBuf> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let tmp = temp_path(path);
    debug!(path = %path.display(), tmp = %tmp.display(), size = data.len(), "Writing file atomically");

    let result = (|| -> Result<()> {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(data)?;
        file.sync_all()?;
        fs::rename(&tmp, path)?;
        Ok(())
    })();

    if let Err(e) = result {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }

    Ok(path.to_path_buf())
}

/// Read an entire file, mapping absence to `Error::Io` with NotFound kind
pub fn read_file(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(Error::from)
}
