//! Hash-chained commit log of raw ground-truth records.
//!
//! Every interaction is appended to an append-only ledger where each entry's
//! `chain_hash` covers its predecessor's `chain_hash`, its content, its type
//! and its timestamp, forming a tamper-evident chain. The chain is written
//! through to the key-value store before an append is acknowledged.

use chrono::{DateTime, Utc};
use phylactery_types::error::{PhylacteryError, PhylacteryResult};
use phylactery_types::hash::sha256_hex;
use phylactery_types::ledger::{LogEntry, GENESIS_HASH};
use phylactery_types::storage::KeyValueStore;
use sha2::{Digest, Sha256};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};

/// Storage key of the ledger.
pub const COMMIT_LOG_KEY: &str = "immutable_commit_log";

/// The first inconsistency found while walking the chain.
///
/// `index` is the entry's position in the chain.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainBreak {
    #[error("chain break at index {index}: expected previous_hash {expected} but found {found}")]
    PreviousHashMismatch {
        index: u64,
        expected: String,
        found: String,
    },
    #[error("hash mismatch at index {index}: expected {expected} but found {found}")]
    ChainHashMismatch {
        index: u64,
        expected: String,
        found: String,
    },
    #[error("content hash mismatch at index {index}")]
    ContentHashMismatch { index: u64 },
}

impl ChainBreak {
    /// Position of the offending entry.
    pub fn index(&self) -> u64 {
        match self {
            ChainBreak::PreviousHashMismatch { index, .. }
            | ChainBreak::ChainHashMismatch { index, .. }
            | ChainBreak::ContentHashMismatch { index } => *index,
        }
    }
}

/// `SHA-256(previous_hash ++ content ++ entry_type ++ timestamp_millis)`.
fn compute_chain_hash(
    previous_hash: &str,
    content: &str,
    entry_type: &str,
    timestamp: &DateTime<Utc>,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(previous_hash.as_bytes());
    hasher.update(content.as_bytes());
    hasher.update(entry_type.as_bytes());
    hasher.update(timestamp.timestamp_millis().to_string().as_bytes());
    hex::encode(hasher.finalize())
}

struct ChainState {
    entries: Vec<LogEntry>,
    tip: String,
}

/// Append-only, tamper-evident ledger.
///
/// Thread-safe; appends are serialised through one mutex so the persisted
/// document always matches the in-memory chain.
pub struct ImmutableCommitLog {
    state: Mutex<ChainState>,
    kv: Arc<dyn KeyValueStore>,
}

impl ImmutableCommitLog {
    /// Open the ledger, loading any previously persisted chain.
    ///
    /// An unreadable or malformed document leaves the ledger empty.
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        let entries = load_entries(kv.as_ref());
        let tip = entries
            .last()
            .map(|e| e.chain_hash.clone())
            .unwrap_or_else(|| GENESIS_HASH.to_string());
        if !entries.is_empty() {
            info!(entries = entries.len(), "Loaded commit log");
        }
        Self {
            state: Mutex::new(ChainState { entries, tip }),
            kv,
        }
    }

    /// Append a record and return its chain hash.
    ///
    /// The hash is only returned once the whole chain has been written to the
    /// backing store; if that write fails the entry is rolled back.
    pub fn append(&self, content: &str, entry_type: &str) -> PhylacteryResult<String> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        let timestamp = Utc::now();
        let previous_hash = state.tip.clone();
        let chain_hash = compute_chain_hash(&previous_hash, content, entry_type, &timestamp);
        let entry = LogEntry {
            index: state.entries.len() as u64,
            content: content.to_string(),
            entry_type: entry_type.to_string(),
            timestamp,
            previous_hash,
            content_hash: sha256_hex(content),
            chain_hash: chain_hash.clone(),
        };
        let index = entry.index;
        state.entries.push(entry);

        if let Err(e) = self.persist(&state.entries) {
            state.entries.pop();
            warn!(index, error = %e, "Commit log write failed, append rolled back");
            return Err(e);
        }

        state.tip = chain_hash.clone();
        debug!(index, entry_type, "Appended commit log entry");
        Ok(chain_hash)
    }

    /// Walk the chain from genesis and recompute every hash.
    pub fn verify_integrity(&self) -> Result<(), ChainBreak> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        verify_entries(&state.entries)
    }

    /// Boolean form of [`verify_integrity`](Self::verify_integrity); a break
    /// is logged with the offending index.
    pub fn verify_chain(&self) -> bool {
        match self.verify_integrity() {
            Ok(()) => {
                info!(entries = self.size(), "Commit log chain verified");
                true
            }
            Err(brk) => {
                error!(index = brk.index(), "Commit log integrity failure: {brk}");
                false
            }
        }
    }

    /// Content of the entry at `index`.
    pub fn get_content(&self, index: u64) -> Option<String> {
        self.get(index).map(|e| e.content)
    }

    /// Content digest of the entry at `index`.
    pub fn get_content_hash(&self, index: u64) -> Option<String> {
        self.get(index).map(|e| e.content_hash)
    }

    /// The entry at `index`.
    pub fn get(&self, index: u64) -> Option<LogEntry> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        usize::try_from(index)
            .ok()
            .and_then(|i| state.entries.get(i))
            .cloned()
    }

    /// Number of entries in the chain.
    pub fn size(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entries
            .len()
    }

    /// Whether the chain is empty.
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Chain hash of the newest entry, or the genesis sentinel.
    pub fn get_latest_hash(&self) -> String {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .tip
            .clone()
    }

    /// Up to the most recent `n` entries (cloned).
    pub fn recent(&self, n: usize) -> Vec<LogEntry> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let start = state.entries.len().saturating_sub(n);
        state.entries[start..].to_vec()
    }

    /// The complete chain as a JSON array, for external backup.
    pub fn export_for_sync(&self) -> serde_json::Value {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        serde_json::to_value(&state.entries).unwrap_or_else(|e| {
            warn!(error = %e, "Failed to serialize commit log for export");
            serde_json::Value::Array(Vec::new())
        })
    }

    fn persist(&self, entries: &[LogEntry]) -> PhylacteryResult<()> {
        let doc = serde_json::to_string(entries)
            .map_err(|e| PhylacteryError::Serialization(e.to_string()))?;
        self.kv.put(COMMIT_LOG_KEY, &doc)
    }
}

fn verify_entries(entries: &[LogEntry]) -> Result<(), ChainBreak> {
    let mut expected_previous = GENESIS_HASH.to_string();

    for (position, entry) in entries.iter().enumerate() {
        let index = position as u64;
        if entry.previous_hash != expected_previous {
            return Err(ChainBreak::PreviousHashMismatch {
                index,
                expected: expected_previous,
                found: entry.previous_hash.clone(),
            });
        }

        let recomputed = compute_chain_hash(
            &entry.previous_hash,
            &entry.content,
            &entry.entry_type,
            &entry.timestamp,
        );
        if recomputed != entry.chain_hash {
            return Err(ChainBreak::ChainHashMismatch {
                index,
                expected: recomputed,
                found: entry.chain_hash.clone(),
            });
        }

        if sha256_hex(&entry.content) != entry.content_hash {
            return Err(ChainBreak::ContentHashMismatch { index });
        }

        expected_previous = entry.chain_hash.clone();
    }

    Ok(())
}

fn load_entries(kv: &dyn KeyValueStore) -> Vec<LogEntry> {
    match kv.get(COMMIT_LOG_KEY) {
        Ok(Some(doc)) => match serde_json::from_str::<Vec<LogEntry>>(&doc) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "Malformed commit log document, starting empty");
                Vec::new()
            }
        },
        Ok(None) => Vec::new(),
        Err(e) => {
            warn!(error = %e, "Failed to read commit log, starting empty");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::InMemoryKvStore;

    struct FailingKvStore;

    impl KeyValueStore for FailingKvStore {
        fn put(&self, _key: &str, _value: &str) -> PhylacteryResult<()> {
            Err(PhylacteryError::Storage("disk full".to_string()))
        }
        fn get(&self, _key: &str) -> PhylacteryResult<Option<String>> {
            Err(PhylacteryError::Storage("unreadable".to_string()))
        }
        fn delete(&self, _key: &str) -> PhylacteryResult<()> {
            Ok(())
        }
    }

    fn new_log() -> ImmutableCommitLog {
        ImmutableCommitLog::new(Arc::new(InMemoryKvStore::new()))
    }

    #[test]
    fn test_chain_integrity() {
        let log = new_log();
        log.append("A", "interaction").unwrap();
        log.append("B", "interaction").unwrap();
        log.append("C", "axiom").unwrap();

        assert_eq!(log.size(), 3);
        assert!(log.verify_chain());

        let entries = log.recent(3);
        assert_eq!(entries[0].previous_hash, GENESIS_HASH);
        assert_eq!(entries[1].previous_hash, entries[0].chain_hash);
        assert_eq!(entries[2].previous_hash, entries[1].chain_hash);
        assert_eq!(entries[2].index, 2);
    }

    #[test]
    fn test_tamper_detection() {
        let log = new_log();
        log.append("A", "interaction").unwrap();
        log.append("B", "interaction").unwrap();
        log.append("C", "interaction").unwrap();

        {
            let mut state = log.state.lock().unwrap();
            state.entries[1].content = "B'".to_string();
        }

        assert!(!log.verify_chain());
        let brk = log.verify_integrity().unwrap_err();
        assert_eq!(brk.index(), 1);
        assert!(matches!(brk, ChainBreak::ChainHashMismatch { .. }));
    }

    #[test]
    fn test_reorder_detection() {
        let log = new_log();
        log.append("A", "interaction").unwrap();
        log.append("B", "interaction").unwrap();
        log.append("C", "interaction").unwrap();

        {
            let mut state = log.state.lock().unwrap();
            state.entries.swap(1, 2);
        }

        let brk = log.verify_integrity().unwrap_err();
        assert!(matches!(brk, ChainBreak::PreviousHashMismatch { .. }));
        assert_eq!(brk.index(), 1);
    }

    #[test]
    fn test_content_hash_tamper_detection() {
        let log = new_log();
        log.append("A", "interaction").unwrap();
        {
            let mut state = log.state.lock().unwrap();
            state.entries[0].content_hash = sha256_hex("forged");
        }
        assert_eq!(
            log.verify_integrity(),
            Err(ChainBreak::ContentHashMismatch { index: 0 })
        );
    }

    #[test]
    fn test_tip_changes() {
        let log = new_log();
        assert_eq!(log.get_latest_hash(), GENESIS_HASH);
        assert!(log.is_empty());

        let h1 = log.append("first", "interaction").unwrap();
        assert_eq!(log.get_latest_hash(), h1);
        assert_eq!(h1.len(), 64);

        let h2 = log.append("second", "interaction").unwrap();
        assert_eq!(log.get_latest_hash(), h2);
        assert_ne!(h1, h2);
    }

    #[test]
    fn test_lookup_out_of_range() {
        let log = new_log();
        log.append("only", "interaction").unwrap();
        assert_eq!(log.get_content(0).as_deref(), Some("only"));
        assert_eq!(log.get_content_hash(0), Some(sha256_hex("only")));
        assert_eq!(log.get_content(1), None);
        assert_eq!(log.get_content_hash(99), None);
        assert!(log.get(u64::MAX).is_none());
    }

    #[test]
    fn test_append_rolled_back_on_write_failure() {
        let log = ImmutableCommitLog::new(Arc::new(FailingKvStore));
        assert!(log.is_empty());
        assert!(log.append("lost", "interaction").is_err());
        assert_eq!(log.size(), 0);
        assert_eq!(log.get_latest_hash(), GENESIS_HASH);
    }

    #[test]
    fn test_persisted_and_reloaded() {
        let kv: Arc<dyn KeyValueStore> = Arc::new(InMemoryKvStore::new());
        let hash = {
            let log = ImmutableCommitLog::new(kv.clone());
            log.append("A", "interaction").unwrap();
            log.append("B", "interaction").unwrap()
        };
        let reloaded = ImmutableCommitLog::new(kv);
        assert_eq!(reloaded.size(), 2);
        assert_eq!(reloaded.get_latest_hash(), hash);
        assert!(reloaded.verify_chain());

        let next = reloaded.append("C", "interaction").unwrap();
        assert_ne!(next, hash);
        assert!(reloaded.verify_chain());
    }

    #[test]
    fn test_export_for_sync() {
        let log = new_log();
        log.append("A", "interaction").unwrap();
        log.append("B", "interaction").unwrap();
        let exported = log.export_for_sync();
        let arr = exported.as_array().unwrap();
        assert_eq!(arr.len(), 2);
        assert_eq!(arr[1]["content"], "B");
        assert_eq!(arr[0]["previous_hash"], GENESIS_HASH);
    }

    #[test]
    fn test_malformed_document_starts_empty() {
        let kv = Arc::new(InMemoryKvStore::new());
        kv.put(COMMIT_LOG_KEY, "{not json").unwrap();
        let log = ImmutableCommitLog::new(kv);
        assert!(log.is_empty());
        assert!(log.verify_chain());
    }
}
