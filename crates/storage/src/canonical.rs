//! Canonical JSON encoding
//!
//! A serialization with no degrees of freedom: object keys sorted
//! lexicographically at every nesting level, no insignificant
//! whitespace, serde_json number formatting. Two logically-equal
//! documents always produce identical bytes, which is what makes
//! digests reproducible across independent writers.
//!
//! Non-finite floats are rejected rather than coerced. `serde_json`'s
//! `Value` cannot represent NaN or infinity, so the check sits at the
//! ingestion boundary: every caller-supplied float enters a document
//! through [`finite_metric`].

use engine_core::{Error, Result};
use serde::Serialize;
use serde_json::Value;

/// Reject NaN and ±infinity before a metric value enters a document
pub fn finite_metric(name: &str, value: f64) -> Result<f64> {
    if !value.is_finite() {
        return Err(Error::Encode {
            message: format!("metric {name:?} is not a finite number: {value}"),
        });
    }
    Ok(value)
}

/// Encode a JSON value canonically
pub fn canonical_bytes(value: &Value) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(256);
    write_value(value, &mut out)?;
    Ok(out)
}

/// Serialize any document to canonical bytes
pub fn to_canonical<T: Serialize>(doc: &T) -> Result<Vec<u8>> {
    let value = serde_json::to_value(doc)?;
    canonical_bytes(&value)
}

fn write_value(value: &Value, out: &mut Vec<u8>) -> Result<()> {
    match value {
        Value::Null => out.extend_from_slice(b"null"),
        Value::Bool(true) => out.extend_from_slice(b"true"),
        Value::Bool(false) => out.extend_from_slice(b"false"),
        Value::Number(n) => {
            // Value cannot hold non-finite numbers; guard anyway so a
            // future representation change fails loudly instead of
            // emitting invalid JSON.
            if let Some(f) = n.as_f64() {
                if !f.is_finite() {
                    return Err(Error::Encode {
                        message: format!("non-finite number in document: {f}"),
                    });
                }
            }
            out.extend_from_slice(n.to_string().as_bytes());
        }
        Value::String(s) => write_string(s, out)?,
        Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_value(item, out)?;
            }
            out.push(b']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_unstable();
            out.push(b'{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_string(key, out)?;
                out.push(b':');
                write_value(&map[*key], out)?;
            }
            out.push(b'}');
        }
    }
    Ok(())
}

fn write_string(s: &str, out: &mut Vec<u8>) -> Result<()> {
    let escaped = serde_json::to_string(s)?;
    out.extend_from_slice(escaped.as_bytes());
    Ok(())
}
