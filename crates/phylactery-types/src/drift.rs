//! Drift measurements comparing a recollection with its ground truth.

use crate::memory::MemoryId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One drift measurement.
///
/// `recalled_content` is ephemeral: it is never serialized, and records
/// reloaded from storage carry an empty string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftScore {
    pub entry_id: MemoryId,
    #[serde(skip)]
    pub recalled_content: String,
    pub ground_truth_hash: String,
    /// Cosine similarity in `[0, 1]`.
    pub cosine_similarity: f32,
    /// `1 - cosine_similarity`.
    pub drift_magnitude: f32,
    pub flagged_for_review: bool,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}
