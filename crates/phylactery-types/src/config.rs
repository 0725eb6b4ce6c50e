//! Configuration types for the memory engine.
//!
//! Every tunable that governs tier capacity, learning, consolidation and
//! drift alerting lives here and is handed to each component's constructor.
//! All fields have defaults, so a partial `config.toml` is always valid.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration loaded from `~/.phylactery/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhylacteryConfig {
    /// Directory holding the SQLite key-value database.
    pub data_dir: PathBuf,
    /// Default log filter when `RUST_LOG` is unset.
    pub log_level: String,
    /// Embedding engine parameters.
    pub embedding: EmbeddingConfig,
    /// Tiered store parameters.
    pub memory: MemoryConfig,
    /// Consolidation policy parameters.
    pub consolidation: ConsolidationConfig,
    /// Drift detector parameters.
    pub drift: DriftConfig,
}

impl Default for PhylacteryConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_level: "info".to_string(),
            embedding: EmbeddingConfig::default(),
            memory: MemoryConfig::default(),
            consolidation: ConsolidationConfig::default(),
            drift: DriftConfig::default(),
        }
    }
}

impl PhylacteryConfig {
    /// Path of the SQLite database inside `data_dir`.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("phylactery.db")
    }
}

/// `~/.phylactery`, or `./.phylactery` when no home directory is known.
pub fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".phylactery"))
        .unwrap_or_else(|| PathBuf::from(".phylactery"))
}

/// Hashing bag-of-words embedding parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Vector length.
    pub dimensions: usize,
    /// Buckets incremented per token.
    pub hashes_per_token: usize,
    /// Shortest token (in chars) that contributes to the vector.
    pub min_token_len: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            dimensions: 128,
            hashes_per_token: 4,
            min_token_len: 3,
        }
    }
}

/// Tiered store parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Working tier ring capacity; the oldest entry is evicted beyond this.
    pub working_capacity: usize,
    /// Step size of the retention update applied on every retrieval.
    pub learning_rate: f32,
    /// Reward used when a caller does not supply one.
    pub default_reward: f32,
    /// `q_value` of a freshly created entry.
    pub initial_q_value: f32,
    /// How many recent working entries feed a synthesized session summary.
    pub session_summary_entries: usize,
    /// Per-entry character cap inside a synthesized session summary.
    pub session_summary_entry_chars: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            working_capacity: 100,
            learning_rate: 0.1,
            default_reward: 0.1,
            initial_q_value: 0.5,
            session_summary_entries: 10,
            session_summary_entry_chars: 100,
        }
    }
}

/// Consolidation policy parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsolidationConfig {
    /// Episodic entries strictly above this `q_value` are promotion candidates.
    pub promote_q_threshold: f32,
    /// Minimum retrieval count for promotion.
    pub promote_min_retrievals: u64,
    /// Unaccessed episodic entries older than this decay.
    pub decay_after_days: i64,
    /// Multiplier applied to `q_value` on decay.
    pub decay_factor: f32,
    /// Episodic entries strictly below this `q_value` are pruned.
    pub prune_q_threshold: f32,
    /// Period of the background maintenance loop.
    pub interval_secs: u64,
    /// First hour (local, inclusive) of the nightly consolidation window.
    pub window_start_hour: u32,
    /// Last hour (local, inclusive) of the nightly consolidation window.
    pub window_end_hour: u32,
}

impl Default for ConsolidationConfig {
    fn default() -> Self {
        Self {
            promote_q_threshold: 0.7,
            promote_min_retrievals: 3,
            decay_after_days: 7,
            decay_factor: 0.95,
            prune_q_threshold: 0.1,
            interval_secs: 86_400,
            window_start_hour: 1,
            window_end_hour: 5,
        }
    }
}

/// Drift detector parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriftConfig {
    /// Magnitudes strictly above this are flagged for review.
    pub alert_threshold: f32,
    /// Measurements retained in the persisted history.
    pub history_limit: usize,
    /// Default window for trend computation.
    pub trend_window: usize,
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            alert_threshold: 0.15,
            history_limit: 1000,
            trend_window: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PhylacteryConfig::default();
        assert_eq!(config.embedding.dimensions, 128);
        assert_eq!(config.memory.working_capacity, 100);
        assert_eq!(config.drift.alert_threshold, 0.15);
        assert_eq!(config.drift.history_limit, 1000);
        assert!(config.database_path().ends_with("phylactery.db"));
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: PhylacteryConfig = toml::from_str(
            r#"
            log_level = "debug"

            [memory]
            working_capacity = 16

            [drift]
            alert_threshold = 0.2
            "#,
        )
        .unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.memory.working_capacity, 16);
        assert_eq!(config.memory.learning_rate, 0.1);
        assert_eq!(config.drift.alert_threshold, 0.2);
        assert_eq!(config.drift.history_limit, 1000);
        assert_eq!(config.consolidation, ConsolidationConfig::default());
    }
}
