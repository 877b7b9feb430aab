//! Checkpoint persistence and retention for training state
//!
//! Durably persists opaque training payloads to a versioned, atomically
//! written directory structure and prunes old checkpoints under a
//! combined "keep last N" + "keep best K by metric" policy.
//!
//! The engine is synchronous and assumes a single writer per checkpoint
//! root; it does not implement cross-process locking. Concurrent saves
//! to the same root can race on `best_index.json` and on retention
//! decisions.

pub mod manifest;
pub mod payload;
pub mod provenance;
pub mod retention;
pub mod rng;
pub mod schema;
pub mod store;

pub use manifest::{is_v2, manifest_digest, upgrade_from_v1, validate_manifest, ManifestV2};
pub use payload::{BincodeCodec, PayloadCodec, StatePayload};
pub use retention::RetentionManager;
pub use rng::{ProcessRng, RngRegistry, RngSnapshot, RngSource};
pub use schema::{Metadata, METADATA_SCHEMA_VERSION};
pub use store::{CheckpointStore, LoadedCheckpoint, SaveRequest};
