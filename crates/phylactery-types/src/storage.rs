//! The key-value persistence seam.
//!
//! The memory engine stores whole JSON documents under fixed string keys.
//! Backends are expected to be durable once `put` returns `Ok`.

use crate::error::PhylacteryResult;

/// A durable string-keyed document store.
pub trait KeyValueStore: Send + Sync {
    /// Store `value` under `key`, replacing any previous value.
    fn put(&self, key: &str, value: &str) -> PhylacteryResult<()>;

    /// Fetch the value stored under `key`.
    fn get(&self, key: &str) -> PhylacteryResult<Option<String>>;

    /// Remove `key` if present.
    fn delete(&self, key: &str) -> PhylacteryResult<()>;
}
