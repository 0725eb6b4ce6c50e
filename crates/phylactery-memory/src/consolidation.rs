//! Memory consolidation: promote, decay and prune episodic memory.
//!
//! A cycle runs the three steps in a fixed order against the episodic tier.
//! Promotion copies high-value, frequently recalled episodes into the
//! semantic tier; decay shrinks the retention weight of stale, never-recalled
//! episodes; pruning removes episodes whose weight fell below the floor.

use crate::store::TieredMemoryStore;
use chrono::{Local, Timelike, Utc};
use phylactery_types::config::ConsolidationConfig;
use phylactery_types::memory::{
    ConsolidationReport, ConsolidationStats, MemoryEntry, MemoryId, MemoryTier, Metadata,
    CATEGORY_KEY,
};
use phylactery_types::storage::KeyValueStore;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Storage key of the lifetime counters.
pub const CONSOLIDATION_STATS_KEY: &str = "consolidation_stats";

/// Category given to semantic entries created by promotion.
pub const CONSOLIDATED_CATEGORY: &str = "consolidated_episodic";

/// Provenance metadata keys on promoted entries.
pub const SOURCE_EPISODIC_ID_KEY: &str = "source_episodic_id";
pub const ORIGINAL_Q_VALUE_KEY: &str = "original_q_value";
pub const RETRIEVAL_COUNT_KEY: &str = "retrieval_count";

/// Memory consolidation engine.
pub struct ConsolidationEngine {
    store: Arc<TieredMemoryStore>,
    config: ConsolidationConfig,
    kv: Arc<dyn KeyValueStore>,
    /// Held for the whole cycle so two cycles never interleave.
    stats: Mutex<ConsolidationStats>,
}

impl ConsolidationEngine {
    /// Create an engine, restoring lifetime counters from `kv`.
    pub fn new(
        store: Arc<TieredMemoryStore>,
        config: ConsolidationConfig,
        kv: Arc<dyn KeyValueStore>,
    ) -> Self {
        let stats = load_stats(kv.as_ref());
        Self {
            store,
            config,
            kv,
            stats: Mutex::new(stats),
        }
    }

    /// The engine's configuration.
    pub fn config(&self) -> &ConsolidationConfig {
        &self.config
    }

    /// Run a consolidation cycle: promote, then decay, then prune.
    pub fn consolidate(&self) -> ConsolidationReport {
        let start = std::time::Instant::now();
        let mut stats = self.stats.lock().unwrap_or_else(|e| e.into_inner());

        let promoted = self.promote();
        let decayed = self.decay();
        let pruned = self.prune();

        let report = ConsolidationReport {
            promoted,
            decayed,
            pruned,
            duration_ms: start.elapsed().as_millis() as u64,
        };
        stats.absorb(&report);
        self.persist_stats(&stats);

        info!(
            promoted,
            decayed,
            pruned,
            duration_ms = report.duration_ms,
            "Consolidation cycle complete"
        );
        report
    }

    /// Lifetime counters.
    pub fn stats(&self) -> ConsolidationStats {
        self.stats.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Whether `hour` (0-23) lies in the configured nightly window.
    /// A window whose start is after its end wraps past midnight.
    pub fn is_consolidation_time(&self, hour: u32) -> bool {
        let (start, end) = (self.config.window_start_hour, self.config.window_end_hour);
        if start <= end {
            (start..=end).contains(&hour)
        } else {
            hour >= start || hour <= end
        }
    }

    /// [`is_consolidation_time`](Self::is_consolidation_time) for the
    /// current local hour.
    pub fn is_consolidation_time_now(&self) -> bool {
        self.is_consolidation_time(Local::now().hour())
    }

    fn promote(&self) -> u64 {
        let already_promoted: HashSet<String> = self
            .store
            .tier_entries(MemoryTier::Semantic)
            .into_iter()
            .filter_map(|e| e.metadata.get(SOURCE_EPISODIC_ID_KEY).cloned())
            .collect();

        let candidates: Vec<MemoryEntry> = self
            .store
            .tier_entries(MemoryTier::Episodic)
            .into_iter()
            .filter(|e| {
                e.q_value > self.config.promote_q_threshold
                    && e.retrieval_count >= self.config.promote_min_retrievals
                    && !already_promoted.contains(e.id.as_str())
            })
            .collect();

        for source in &candidates {
            let id = self.store.insert_entry(promoted_copy(self.store.embedder(), source));
            debug!(source = %source.id, entry_id = %id, "Promoted episodic memory");
        }
        candidates.len() as u64
    }

    fn decay(&self) -> u64 {
        let cutoff = Utc::now() - chrono::Duration::days(self.config.decay_after_days);
        let factor = self.config.decay_factor;
        self.store.update_tier(MemoryTier::Episodic, |entry| {
            if entry.timestamp < cutoff && entry.retrieval_count == 0 {
                entry.q_value *= factor;
                true
            } else {
                false
            }
        })
    }

    fn prune(&self) -> u64 {
        let doomed: Vec<MemoryId> = self
            .store
            .tier_entries(MemoryTier::Episodic)
            .into_iter()
            .filter(|e| e.q_value < self.config.prune_q_threshold)
            .map(|e| e.id)
            .collect();
        if doomed.is_empty() {
            return 0;
        }
        self.store.remove_ids(MemoryTier::Episodic, &doomed)
    }

    fn persist_stats(&self, stats: &ConsolidationStats) {
        let doc = match serde_json::to_string(stats) {
            Ok(doc) => doc,
            Err(e) => {
                warn!(error = %e, "Failed to serialize consolidation stats");
                return;
            }
        };
        if let Err(e) = self.kv.put(CONSOLIDATION_STATS_KEY, &doc) {
            warn!(error = %e, "Failed to persist consolidation stats");
        }
    }
}

/// A semantic copy of `source` carrying provenance metadata.
fn promoted_copy(embedder: &crate::embedding::HashingEmbedder, source: &MemoryEntry) -> MemoryEntry {
    let mut metadata = Metadata::new();
    metadata.insert(CATEGORY_KEY.to_string(), CONSOLIDATED_CATEGORY.to_string());
    metadata.insert(SOURCE_EPISODIC_ID_KEY.to_string(), source.id.to_string());
    metadata.insert(ORIGINAL_Q_VALUE_KEY.to_string(), source.q_value.to_string());
    metadata.insert(RETRIEVAL_COUNT_KEY.to_string(), source.retrieval_count.to_string());

    let mut entry = MemoryEntry::new(MemoryTier::Semantic, source.content.clone())
        .with_embedding(embedder.embed(&source.content))
        .with_metadata(metadata)
        .with_q_value(source.q_value);
    entry.session_id = source.session_id.clone();
    entry
}

fn load_stats(kv: &dyn KeyValueStore) -> ConsolidationStats {
    match kv.get(CONSOLIDATION_STATS_KEY) {
        Ok(Some(doc)) => serde_json::from_str(&doc).unwrap_or_else(|e| {
            warn!(error = %e, "Malformed consolidation stats, starting from zero");
            ConsolidationStats::default()
        }),
        Ok(None) => ConsolidationStats::default(),
        Err(e) => {
            warn!(error = %e, "Failed to read consolidation stats");
            ConsolidationStats::default()
        }
    }
}
