//! Versioned checkpoint metadata
//!
//! Every checkpoint directory carries a `metadata.json` tagged with a
//! schema version. The current schema is v2; legacy v1 documents load
//! only through the explicit upgrade path, and anything else is
//! rejected rather than silently accepted.

use std::collections::BTreeMap;

use engine_core::{EnvironmentInfo, Epoch, Error, Result, Step};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Current metadata schema version tag
pub const METADATA_SCHEMA_VERSION: &str = "2";

/// Per-checkpoint metadata document, schema v2
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Metadata {
    /// Schema tag; always [`METADATA_SCHEMA_VERSION`] after a save
    pub schema_version: String,

    /// Hex SHA-256 of the state file
    pub digest_sha256: String,

    /// Provenance of the writing process
    pub environment: EnvironmentInfo,

    /// Caller-supplied metric values
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,

    /// Training epoch at save time
    pub epoch: Epoch,

    /// Training step at save time
    pub step: Step,

    /// Free-form caller notes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl Metadata {
    pub fn new(digest_sha256: String, epoch: Epoch, step: Step) -> Self {
        Self {
            schema_version: METADATA_SCHEMA_VERSION.to_string(),
            digest_sha256,
            environment: EnvironmentInfo::capture(),
            metrics: BTreeMap::new(),
            epoch,
            step,
            notes: None,
        }
    }
}

/// Structural predicate: does the document declare the current schema?
pub fn is_current(doc: &Value) -> bool {
    doc.get("schema_version").and_then(Value::as_str) == Some(METADATA_SCHEMA_VERSION)
}

/// Parse a metadata document, upgrading legacy v1 content.
///
/// Unknown schema tags fail with `Error::Schema` so that
/// forward-incompatible documents are never half-trusted.
pub fn parse(doc: &Value) -> Result<Metadata> {
    if is_current(doc) {
        return serde_json::from_value(doc.clone()).map_err(|e| Error::Schema {
            message: format!("malformed v2 metadata: {e}"),
        });
    }
    match doc.get("schema_version").and_then(Value::as_str) {
        Some("1") | Some("1.0") => upgrade_from_v1(doc),
        Some(other) => Err(Error::Schema {
            message: format!("unsupported metadata schema_version: {other:?}"),
        }),
        None => Err(Error::Schema {
            message: "metadata has no schema_version".to_string(),
        }),
    }
}

/// Pure, deterministic upgrade of a legacy v1 metadata document.
///
/// v1 recorded the state digest under `checkpoint_sha256` and carried
/// no environment section.
pub fn upgrade_from_v1(doc: &Value) -> Result<Metadata> {
    let digest = doc
        .get("checkpoint_sha256")
        .or_else(|| doc.get("digest_sha256"))
        .and_then(Value::as_str)
        .ok_or_else(|| Error::Schema {
            message: "v1 metadata has no checkpoint_sha256".to_string(),
        })?;

    let metrics = doc
        .get("metrics")
        .and_then(Value::as_object)
        .map(|m| {
            m.iter()
                .filter_map(|(k, v)| v.as_f64().map(|f| (k.clone(), f)))
                .collect()
        })
        .unwrap_or_default();

    debug!("Upgrading v1 metadata document to v2");
    Ok(Metadata {
        schema_version: METADATA_SCHEMA_VERSION.to_string(),
        digest_sha256: digest.to_string(),
        environment: doc
            .get("environment")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default(),
        metrics,
        epoch: doc.get("epoch").and_then(Value::as_u64).unwrap_or(0),
        step: doc.get("step").and_then(Value::as_u64).unwrap_or(0),
        notes: doc
            .get("notes")
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}
