//! Storage - Leaf I/O primitives for the checkpoint engine
//!
//! Provides the three building blocks every persisted document goes
//! through:
//! - Atomic writes (write to .tmp, fsync, then rename)
//! - Canonical JSON encoding (sorted keys, no whitespace, finite numbers)
//! - SHA-256 digest computation and verification
//!
//! # Example
//!
//! ```no_run
//! use storage::{atomic, digest};
//!
//! # fn example() -> engine_core::Result<()> {
//! let path = std::path::Path::new("/tmp/checkpoints/epoch-1/state.bin");
//! atomic::write_atomic(path, &[1, 2, 3])?;
//! let hex = digest::sha256_file(path)?;
//! digest::verify(&std::fs::read(path)?, &hex)?;
//! # Ok(())
//! # }
//! ```

pub mod atomic;
pub mod canonical;
pub mod digest;

pub use atomic::write_atomic;
pub use canonical::{canonical_bytes, finite_metric, to_canonical};
pub use digest::{sha256_file, sha256_hex, verify};
