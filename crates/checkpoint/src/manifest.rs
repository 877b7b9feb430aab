//! Lightweight checkpoint manifest (schema `codex.checkpoint.v2`)
//!
//! A sibling format to the per-epoch metadata, used by standalone
//! description and validation tooling. Shares the canonical codec and
//! digest machinery: the manifest digest is the SHA-256 of the
//! canonical encoding with the `digest` field itself excluded.

use engine_core::{Error, Problem, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use storage::{canonical_bytes, sha256_hex};

/// Schema identifier for v2 manifests
pub const SCHEMA_ID: &str = "codex.checkpoint.v2";

/// Metadata describing the run that produced a checkpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunMeta {
    pub id: String,
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub framework: Option<String>,
}

/// Metadata for the primary weights artifact
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WeightsMeta {
    pub format: String,
    pub bytes: u64,
}

/// Optimizer checkpoint metadata
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OptimizerMeta {
    pub name: String,
    pub bytes: u64,
}

/// Structured representation of a v2 manifest
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ManifestV2 {
    pub schema: String,
    pub run: RunMeta,
    pub weights: WeightsMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optimizer: Option<OptimizerMeta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

impl ManifestV2 {
    pub fn new(run: RunMeta, weights: WeightsMeta) -> Self {
        Self {
            schema: SCHEMA_ID.to_string(),
            run,
            weights,
            optimizer: None,
            notes: None,
            digest: None,
        }
    }

    /// Fill in the canonical digest over the manifest content
    pub fn with_digest(mut self) -> Result<Self> {
        let doc = serde_json::to_value(&self)?;
        self.digest = Some(manifest_digest(&doc)?);
        Ok(self)
    }

    /// Recompute the digest and compare against the recorded one
    pub fn verify_digest(&self) -> Result<()> {
        let recorded = self.digest.as_deref().ok_or_else(|| Error::Schema {
            message: "manifest has no digest to verify".to_string(),
        })?;
        let doc = serde_json::to_value(self)?;
        let actual = manifest_digest(&doc)?;
        if actual != recorded {
            return Err(Error::Integrity {
                path: "manifest".to_string(),
                expected: recorded.to_string(),
                actual,
            });
        }
        Ok(())
    }
}

/// Structural predicate: does the document declare the v2 schema id?
pub fn is_v2(doc: &Value) -> bool {
    doc.get("schema").and_then(Value::as_str) == Some(SCHEMA_ID)
}

/// SHA-256 of the canonical encoding with the `digest` field excluded
pub fn manifest_digest(doc: &Value) -> Result<String> {
    let mut content: Map<String, Value> = doc
        .as_object()
        .ok_or_else(|| Error::Schema {
            message: "manifest must be a JSON object".to_string(),
        })?
        .clone();
    content.remove("digest");
    let bytes = canonical_bytes(&Value::Object(content))?;
    Ok(sha256_hex(&bytes))
}

/// Structural validation of a manifest document.
///
/// Returns an empty list iff valid; malformed-but-parseable input
/// yields problem descriptions, never an error, so callers can
/// batch-report every issue at once.
pub fn validate_manifest(doc: &Value) -> Vec<Problem> {
    let mut problems = Vec::new();

    let Some(obj) = doc.as_object() else {
        return vec![Problem::new("", "manifest must be a JSON object")];
    };

    match obj.get("schema").and_then(Value::as_str) {
        None => problems.push(Problem::new("schema", "missing required section")),
        Some(schema) if schema != SCHEMA_ID => {
            problems.push(Problem::new(
                "schema",
                format!("unexpected schema id {schema:?}"),
            ));
        }
        Some(_) => {}
    }

    let run = obj.get("run").and_then(Value::as_object);
    match run {
        None => problems.push(Problem::new("run", "missing required section")),
        Some(run) => {
            if run.get("id").and_then(Value::as_str).is_none()
                && obj.get("run_id").and_then(Value::as_str).is_none()
            {
                problems.push(Problem::new("run.id", "missing run identifier"));
            }
            if run.get("created_at").and_then(Value::as_str).is_none()
                && obj.get("created_utc").and_then(Value::as_str).is_none()
            {
                problems.push(Problem::new("run.created_at", "missing creation timestamp"));
            }
        }
    }

    match obj.get("weights").and_then(Value::as_object) {
        None => problems.push(Problem::new("weights", "missing required section")),
        Some(weights) => {
            if weights.get("format").and_then(Value::as_str).is_none() {
                problems.push(Problem::new("weights.format", "missing artifact format"));
            }
            if weights.get("bytes").and_then(Value::as_u64).is_none() {
                problems.push(Problem::new("weights.bytes", "missing artifact size"));
            }
        }
    }

    problems
}

/// Upgrade a legacy v1 manifest to v2.
///
/// `meta.id` becomes `run.id`, `meta.created_at` becomes
/// `run.created_at`, the `weights` section is copied verbatim, and the
/// schema id is set to [`SCHEMA_ID`]. Already-v2 documents are returned
/// unchanged, so the upgrade is idempotent.
pub fn upgrade_from_v1(doc: &Value) -> Result<Value> {
    if is_v2(doc) {
        return Ok(doc.clone());
    }

    let meta = doc.get("meta").and_then(Value::as_object);
    let mut run = Map::new();
    run.insert(
        "id".to_string(),
        json!(meta
            .and_then(|m| m.get("id"))
            .and_then(Value::as_str)
            .unwrap_or("unknown")),
    );
    run.insert(
        "created_at".to_string(),
        json!(meta
            .and_then(|m| m.get("created_at"))
            .and_then(Value::as_str)
            .unwrap_or("")),
    );
    if let Some(framework) = meta.and_then(|m| m.get("framework")).and_then(Value::as_str) {
        run.insert("framework".to_string(), json!(framework));
    }

    let mut upgraded = Map::new();
    upgraded.insert("schema".to_string(), json!(SCHEMA_ID));
    upgraded.insert("run".to_string(), Value::Object(run));
    upgraded.insert(
        "weights".to_string(),
        doc.get("weights").cloned().unwrap_or_else(|| json!({})),
    );
    for key in ["optimizer", "notes"] {
        if let Some(value) = doc.get(key) {
            if !value.is_null() {
                upgraded.insert(key.to_string(), value.clone());
            }
        }
    }

    let upgraded = Value::Object(upgraded);
    let problems = validate_manifest(&upgraded);
    if !problems.is_empty() {
        return Err(Error::Schema {
            message: format!("v1 manifest cannot be upgraded: {problems:?}"),
        });
    }
    Ok(upgraded)
}
