//! Records of the append-only, hash-chained commit log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `previous_hash` of the first entry in every chain.
///
/// 68 characters, four more than a SHA-256 hex digest. Existing chains
/// depend on this exact literal.
pub const GENESIS_HASH: &str =
    "00000000000000000000000000000000000000000000000000000000000000000000";

/// A single ground-truth record in the commit log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Position in the chain (0-indexed).
    pub index: u64,
    /// The raw recorded text.
    pub content: String,
    /// Caller-defined record kind (e.g. `interaction`, `axiom`).
    pub entry_type: String,
    /// When the entry was appended.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    /// `chain_hash` of the preceding entry, or [`GENESIS_HASH`].
    pub previous_hash: String,
    /// Digest of `content` alone.
    pub content_hash: String,
    /// Digest binding this entry to its predecessor.
    pub chain_hash: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_genesis_literal() {
        assert_eq!(GENESIS_HASH.len(), 68);
        assert!(GENESIS_HASH.chars().all(|c| c == '0'));
    }

    #[test]
    fn test_log_entry_json_keys() {
        let entry = LogEntry {
            index: 0,
            content: "hello".to_string(),
            entry_type: "interaction".to_string(),
            timestamp: Utc::now(),
            previous_hash: GENESIS_HASH.to_string(),
            content_hash: "c".repeat(64),
            chain_hash: "d".repeat(64),
        };
        let value = serde_json::to_value(&entry).unwrap();
        for key in [
            "index",
            "content",
            "entry_type",
            "timestamp",
            "previous_hash",
            "content_hash",
            "chain_hash",
        ] {
            assert!(value.get(key).is_some(), "missing key {key}");
        }
        let back: LogEntry = serde_json::from_value(value).unwrap();
        assert_eq!(back.content, "hello");
    }
}
