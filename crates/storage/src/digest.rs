//! SHA-256 digest computation and verification
//!
//! Digests are used purely for integrity verification, not as a defense
//! against adversarial tampering.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use engine_core::{Error, Result};
use sha2::{Digest, Sha256};

const CHUNK_SIZE: usize = 128 * 1024;

/// Hex-encoded SHA-256 of a byte slice
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex_string(&hasher.finalize())
}

/// Hex-encoded SHA-256 of a file, read in chunks
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex_string(&hasher.finalize()))
}

/// Verify `data` against a recorded hex digest
pub fn verify(data: &[u8], expected_hex: &str) -> Result<()> {
    let actual = sha256_hex(data);
    if actual != expected_hex.trim() {
        return Err(Error::Integrity {
            path: String::new(),
            expected: expected_hex.trim().to_string(),
            actual,
        });
    }
    Ok(())
}

fn hex_string(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        s.push_str(&format!("{b:02x}"));
    }
    s
}
