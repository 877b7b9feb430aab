//! Opaque payload container and its on-disk codec
//!
//! The engine never interprets training state. A payload is an ordered
//! map of named byte blobs (e.g. `model_state`, `optimizer_state`)
//! whose only contract is a byte-identical round-trip. The codec seam
//! keeps the store format-agnostic.

use std::collections::BTreeMap;

use bytes::Bytes;
use engine_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// Magic bytes identifying a state file written by [`BincodeCodec`]
pub const STATE_MAGIC: [u8; 4] = *b"CKPS";

/// Binary container format version
pub const STATE_FORMAT_VERSION: u32 = 1;

/// Named byte-blob map supplied by the training loop
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatePayload {
    entries: BTreeMap<String, Bytes>,
}

impl StatePayload {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a named blob
    pub fn insert(&mut self, name: impl Into<String>, blob: impl Into<Bytes>) {
        self.entries.insert(name.into(), blob.into());
    }

    pub fn get(&self, name: &str) -> Option<&Bytes> {
        self.entries.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Bytes)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total payload size across all blobs, in bytes
    pub fn total_bytes(&self) -> u64 {
        self.entries.values().map(|b| b.len() as u64).sum()
    }
}

/// Pluggable payload serializer
pub trait PayloadCodec: Send + Sync {
    /// State-file extension written and probed by the store (no dot)
    fn extension(&self) -> &'static str;

    fn serialize(&self, payload: &StatePayload) -> Result<Vec<u8>>;

    fn deserialize(&self, bytes: &[u8]) -> Result<StatePayload>;
}

/// Default codec: magic + format version + bincode-encoded blob map
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeCodec;

impl PayloadCodec for BincodeCodec {
    fn extension(&self) -> &'static str {
        "bin"
    }

    fn serialize(&self, payload: &StatePayload) -> Result<Vec<u8>> {
        let body = bincode::serialize(&payload.entries)
            .map_err(|e| Error::Serialization(format!("failed to encode payload: {e}")))?;
        let mut buf = Vec::with_capacity(8 + body.len());
        buf.extend_from_slice(&STATE_MAGIC);
        buf.extend_from_slice(&STATE_FORMAT_VERSION.to_le_bytes());
        buf.extend_from_slice(&body);
        Ok(buf)
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<StatePayload> {
        if bytes.len() < 8 || bytes[0..4] != STATE_MAGIC {
            return Err(Error::Schema {
                message: "not a recognized checkpoint state file".to_string(),
            });
        }
        let version = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        if version != STATE_FORMAT_VERSION {
            return Err(Error::Schema {
                message: format!(
                    "unsupported state format version {version} (expected {STATE_FORMAT_VERSION})"
                ),
            });
        }
        let entries: BTreeMap<String, Bytes> = bincode::deserialize(&bytes[8..])
            .map_err(|e| Error::Serialization(format!("failed to decode payload: {e}")))?;
        Ok(StatePayload { entries })
    }
}
