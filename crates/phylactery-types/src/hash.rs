//! SHA-256 content digests rendered as lowercase hex.

use sha2::{Digest, Sha256};

/// Hash a string and return the 64-character lowercase hex digest.
pub fn sha256_hex(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}
