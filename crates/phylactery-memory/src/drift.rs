//! Drift detection between recollections and recorded ground truth.
//!
//! Each measurement embeds both texts, scores their cosine similarity and
//! appends the result to the history. Only the newest `history_limit`
//! measurements are persisted; the running figures cover every measurement
//! this process has seen plus whatever was restored. Measurements whose
//! magnitude exceeds the alert threshold are flagged and logged; nothing
//! here fails.

use crate::commit_log::ImmutableCommitLog;
use crate::embedding::HashingEmbedder;
use chrono::Utc;
use phylactery_types::config::DriftConfig;
use phylactery_types::drift::DriftScore;
use phylactery_types::hash::sha256_hex;
use phylactery_types::memory::{MemoryEntry, MemoryId};
use phylactery_types::storage::KeyValueStore;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Storage key of the measurement history.
pub const DRIFT_HISTORY_KEY: &str = "drift_history";

/// Whether a drift magnitude warrants review. The threshold itself passes.
pub fn is_flagged(drift_magnitude: f32, alert_threshold: f32) -> bool {
    drift_magnitude > alert_threshold
}

/// Scores and remembers semantic drift.
pub struct DriftDetector {
    config: DriftConfig,
    embedder: HashingEmbedder,
    kv: Arc<dyn KeyValueStore>,
    history: Mutex<VecDeque<DriftScore>>,
}

impl DriftDetector {
    /// Create a detector, restoring history from `kv`.
    pub fn new(config: DriftConfig, embedder: HashingEmbedder, kv: Arc<dyn KeyValueStore>) -> Self {
        let history = load_history(kv.as_ref());
        Self {
            config,
            embedder,
            kv,
            history: Mutex::new(history),
        }
    }

    /// Measure how far `recalled` has drifted from `ground_truth`.
    pub fn measure_drift(&self, entry_id: &MemoryId, recalled: &str, ground_truth: &str) -> DriftScore {
        let similarity = self.embedder.similarity(recalled, ground_truth).clamp(0.0, 1.0);
        let drift_magnitude = 1.0 - similarity;
        let score = DriftScore {
            entry_id: entry_id.clone(),
            recalled_content: recalled.to_string(),
            ground_truth_hash: sha256_hex(ground_truth),
            cosine_similarity: similarity,
            drift_magnitude,
            flagged_for_review: is_flagged(drift_magnitude, self.config.alert_threshold),
            timestamp: Utc::now(),
        };

        let average = {
            let mut history = self.history.lock().unwrap_or_else(|e| e.into_inner());
            history.push_back(score.clone());
            self.persist_locked(&history);
            mean(history.iter())
        };

        if score.flagged_for_review {
            warn!(
                entry_id = %entry_id,
                drift = drift_magnitude,
                threshold = self.config.alert_threshold,
                "Memory drift alert"
            );
        } else {
            debug!(entry_id = %entry_id, drift = drift_magnitude, average, "Measured drift");
        }
        score
    }

    /// Measure a stored entry against the ledger record at `index`.
    /// Returns `None` when the ledger has no such record.
    pub fn measure_against_log(
        &self,
        entry: &MemoryEntry,
        log: &ImmutableCommitLog,
        index: u64,
    ) -> Option<DriftScore> {
        let truth = log.get_content(index)?;
        Some(self.measure_drift(&entry.id, &entry.content, &truth))
    }

    /// Mean magnitude over every measurement held (0 when empty).
    pub fn average_drift(&self) -> f32 {
        let history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        mean(history.iter())
    }

    /// `mean(last window) - mean(previous window)`; 0 with fewer than
    /// `2 * window` measurements.
    pub fn drift_trend(&self, window: usize) -> f32 {
        let history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        if window == 0 || history.len() < window * 2 {
            return 0.0;
        }
        let len = history.len();
        let recent = mean(history.range(len - window..));
        let previous = mean(history.range(len - 2 * window..len - window));
        recent - previous
    }

    /// Trend over the configured default window.
    pub fn default_trend(&self) -> f32 {
        self.drift_trend(self.config.trend_window)
    }

    /// Flagged measurements, most recent first.
    pub fn flagged_entries(&self, limit: usize) -> Vec<DriftScore> {
        let history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        history
            .iter()
            .rev()
            .filter(|s| s.flagged_for_review)
            .take(limit)
            .cloned()
            .collect()
    }

    /// Number of measurements held, including those not persisted.
    pub fn history_len(&self) -> usize {
        self.history.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Write the newest `history_limit` measurements.
    fn persist_locked(&self, history: &VecDeque<DriftScore>) {
        let skip = history.len().saturating_sub(self.config.history_limit);
        let tail: Vec<&DriftScore> = history.iter().skip(skip).collect();
        let doc = match serde_json::to_string(&tail) {
            Ok(doc) => doc,
            Err(e) => {
                warn!(error = %e, "Failed to serialize drift history");
                return;
            }
        };
        if let Err(e) = self.kv.put(DRIFT_HISTORY_KEY, &doc) {
            warn!(error = %e, "Failed to persist drift history");
        }
    }
}

fn mean<'a>(scores: impl Iterator<Item = &'a DriftScore>) -> f32 {
    let (sum, count) = scores.fold((0.0f32, 0usize), |(s, n), d| (s + d.drift_magnitude, n + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f32
    }
}

fn load_history(kv: &dyn KeyValueStore) -> VecDeque<DriftScore> {
    match kv.get(DRIFT_HISTORY_KEY) {
        Ok(Some(doc)) => serde_json::from_str(&doc).unwrap_or_else(|e| {
            warn!(error = %e, "Malformed drift history, starting empty");
            VecDeque::new()
        }),
        Ok(None) => VecDeque::new(),
        Err(e) => {
            warn!(error = %e, "Failed to read drift history, starting empty");
            VecDeque::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::InMemoryKvStore;
    use phylactery_types::memory::MemoryTier;

    fn setup() -> (DriftDetector, Arc<dyn KeyValueStore>) {
        let kv: Arc<dyn KeyValueStore> = Arc::new(InMemoryKvStore::new());
        let detector = DriftDetector::new(DriftConfig::default(), HashingEmbedder::default(), kv.clone());
        (detector, kv)
    }

    fn id() -> MemoryId {
        MemoryId::from("entry-1")
    }

    #[test]
    fn test_identical_text_no_drift() {
        let (detector, _) = setup();
        let text = "the user graduated from university in 2019";
        let score = detector.measure_drift(&id(), text, text);
        assert!(score.cosine_similarity > 0.95);
        assert!(score.drift_magnitude < 0.05);
        assert!(!score.flagged_for_review);
        assert_eq!(score.ground_truth_hash, sha256_hex(text));
    }

    #[test]
    fn test_disjoint_text_flagged() {
        let (detector, _) = setup();
        let score = detector.measure_drift(
            &id(),
            "quantum physics describes subatomic particles",
            "banana bread recipe needs flour sugar",
        );
        assert!(score.cosine_similarity < 0.7);
        assert!(score.flagged_for_review);
        assert_eq!(detector.flagged_entries(10).len(), 1);
    }

    #[test]
    fn test_flag_threshold_is_strict() {
        assert!(!is_flagged(0.15, 0.15));
        assert!(is_flagged(0.150_001, 0.15));
        assert!(!is_flagged(0.0, 0.15));
    }

    #[test]
    fn test_trend_needs_two_windows() {
        let (detector, _) = setup();
        for _ in 0..3 {
            detector.measure_drift(&id(), "same words here", "same words here");
        }
        assert_eq!(detector.drift_trend(2), 0.0);
        assert_eq!(detector.drift_trend(0), 0.0);
    }

    #[test]
    fn test_trend_rising() {
        let (detector, _) = setup();
        for _ in 0..2 {
            detector.measure_drift(&id(), "walked the dog today", "walked the dog today");
        }
        for _ in 0..2 {
            detector.measure_drift(&id(), "walked the dog today", "painted the kitchen walls");
        }
        assert!(detector.drift_trend(2) > 0.0);
        assert!(detector.average_drift() > 0.0);
    }

    #[test]
    fn test_flagged_most_recent_first() {
        let (detector, _) = setup();
        detector.measure_drift(&MemoryId::from("first"), "apples oranges", "engines pistons");
        detector.measure_drift(&MemoryId::from("ok"), "same same text", "same same text");
        detector.measure_drift(&MemoryId::from("second"), "violin concerto", "tax return forms");
        let flagged = detector.flagged_entries(10);
        assert_eq!(flagged.len(), 2);
        assert_eq!(flagged[0].entry_id, MemoryId::from("second"));
        assert_eq!(flagged[1].entry_id, MemoryId::from("first"));
        assert_eq!(detector.flagged_entries(1).len(), 1);
    }

    #[test]
    fn test_history_reload_drops_recalled_content() {
        let (detector, kv) = setup();
        detector.measure_drift(&id(), "private recollection text", "ground truth text");
        let reloaded = DriftDetector::new(DriftConfig::default(), HashingEmbedder::default(), kv);
        assert_eq!(reloaded.history_len(), 1);
        let score = &reloaded.flagged_entries(10)[0];
        assert_eq!(score.recalled_content, "");
        assert_eq!(score.entry_id, id());
    }

    #[test]
    fn test_history_bounded() {
        let kv: Arc<dyn KeyValueStore> = Arc::new(InMemoryKvStore::new());
        let config = DriftConfig {
            history_limit: 5,
            ..Default::default()
        };
        let detector = DriftDetector::new(config.clone(), HashingEmbedder::default(), kv.clone());
        for i in 0..8 {
            detector.measure_drift(&MemoryId::from(format!("m-{i}").as_str()), "alpha beta", "gamma delta");
        }
        assert_eq!(detector.history_len(), 8);
        let reloaded = DriftDetector::new(config, HashingEmbedder::default(), kv);
        assert_eq!(reloaded.history_len(), 5);
        assert_eq!(reloaded.flagged_entries(1)[0].entry_id, MemoryId::from("m-7"));
        assert_eq!(reloaded.flagged_entries(10).last().unwrap().entry_id, MemoryId::from("m-3"));
    }

    #[test]
    fn test_average_covers_measurements_past_persist_limit() {
        let kv: Arc<dyn KeyValueStore> = Arc::new(InMemoryKvStore::new());
        let config = DriftConfig {
            history_limit: 2,
            ..Default::default()
        };
        let detector = DriftDetector::new(config, HashingEmbedder::default(), kv);
        let drifted = detector.measure_drift(
            &MemoryId::from("drifted"),
            "quantum physics describes subatomic particles",
            "banana bread recipe needs flour sugar",
        );
        let same_a = detector.measure_drift(&id(), "same same text", "same same text");
        let same_b = detector.measure_drift(&id(), "same same text", "same same text");
        assert!(drifted.flagged_for_review);

        let expected = (drifted.drift_magnitude + same_a.drift_magnitude + same_b.drift_magnitude) / 3.0;
        assert!((detector.average_drift() - expected).abs() < 1e-5);
        assert!(detector.average_drift() > 0.2);
        assert_eq!(detector.history_len(), 3);

        let flagged = detector.flagged_entries(10);
        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged[0].entry_id, MemoryId::from("drifted"));
    }

    #[test]
    fn test_measure_against_log() {
        let (detector, kv) = setup();
        let log = ImmutableCommitLog::new(kv);
        log.append("we adopted a cat named Miso", "interaction").unwrap();
        let entry = MemoryEntry::new(MemoryTier::Episodic, "we adopted a cat named Miso");

        let score = detector.measure_against_log(&entry, &log, 0).unwrap();
        assert!(!score.flagged_for_review);
        assert!(detector.measure_against_log(&entry, &log, 5).is_none());
    }
}
