//! Core type definitions for the checkpoint persistence engine

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Training step and epoch counters
pub type Step = u64;
pub type Epoch = u64;

/// Direction in which a retention metric is compared
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RetainMode {
    /// Smaller metric values are better (e.g. validation loss)
    #[default]
    Min,

    /// Larger metric values are better (e.g. accuracy)
    Max,
}

/// Retention policy combining "keep last N" and "keep best K by metric"
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetainSpec {
    /// Keep the N checkpoints with the largest epoch number
    pub keep_last: Option<usize>,

    /// Keep the K checkpoints with the best recorded metric
    pub best_k: Option<usize>,

    /// Name of the metric driving the best-k selection
    pub best_metric: Option<String>,

    /// Comparison direction for the best-k metric
    pub mode: RetainMode,
}

impl RetainSpec {
    /// Keep only the most recent `n` checkpoints
    pub fn keep_last(n: usize) -> Self {
        Self {
            keep_last: Some(n),
            ..Self::default()
        }
    }

    /// Checks structural consistency of the policy
    pub fn validate(&self) -> Result<()> {
        if self.best_k.is_some() && self.best_metric.is_none() {
            return Err(Error::Retention {
                message: "best_k requires best_metric".to_string(),
            });
        }
        Ok(())
    }
}

/// One record of the `best_index.json` file at the retention root
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BestIndexEntry {
    /// Checkpoint directory name relative to the root (e.g. "epoch-3")
    pub path: String,

    /// Recorded metric value for that checkpoint
    pub metric_value: f64,
}

/// Summary of a retention pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionReport {
    /// Number of candidate checkpoint directories considered
    pub total: usize,

    /// Epochs that survived, ascending
    pub kept: Vec<Epoch>,

    /// Epochs that were deleted, ascending
    pub pruned: Vec<Epoch>,
}

/// Provenance bag recorded inside checkpoint metadata
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EnvironmentInfo {
    /// Operating system family (e.g. "linux")
    pub os: String,

    /// CPU architecture (e.g. "x86_64")
    pub arch: String,

    /// Version of the engine that wrote the checkpoint
    pub engine_version: String,

    /// UTC timestamp of the capture, RFC 3339
    pub captured_utc: String,
}

impl EnvironmentInfo {
    /// Snapshot the current process environment
    pub fn capture() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            captured_utc: format_utc(Utc::now()),
        }
    }
}

/// A single structural validation finding (field + reason)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Problem {
    /// Dotted path of the offending field (e.g. "run.id")
    pub field: String,

    /// Human-readable description of what is wrong
    pub reason: String,
}

impl Problem {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Formats a timestamp the way every engine document records time
pub fn format_utc(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}
