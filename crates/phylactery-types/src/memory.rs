//! Memory entry types: ids, tiers, entries, and maintenance reports.
//!
//! `MemoryEntry` serializes to the persisted record layout: integer
//! millisecond timestamps, the embedding as a comma-separated string with six
//! decimals, and metadata as a flat string-to-string object.

use crate::hash::sha256_hex;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use uuid::Uuid;

/// Metadata key holding a semantic entry's category.
pub const CATEGORY_KEY: &str = "category";

/// Metadata key holding an episodic entry's kind (e.g. `session_summary`).
pub const TYPE_KEY: &str = "type";

/// Small named-float map describing affect at the time of an entry.
pub type EmotionalSnapshot = BTreeMap<String, f32>;

/// Open-ended string metadata attached to an entry.
pub type Metadata = BTreeMap<String, String>;

/// Unique identifier for a memory entry, unique across all tiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemoryId(pub String);

impl MemoryId {
    /// Create a new random MemoryId.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Borrow the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MemoryId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MemoryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MemoryId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Retention class of a memory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryTier {
    /// Volatile ring of recent turns; never persisted.
    Working,
    /// Significant events and session summaries.
    Episodic,
    /// Categorized long-lived knowledge.
    Semantic,
    /// Foundational axioms; append-only in practice.
    CoreIdentity,
}

impl MemoryTier {
    /// All tiers, in retention order.
    pub const ALL: [MemoryTier; 4] = [
        MemoryTier::Working,
        MemoryTier::Episodic,
        MemoryTier::Semantic,
        MemoryTier::CoreIdentity,
    ];

    /// Tiers written to durable storage.
    pub const PERSISTENT: [MemoryTier; 3] = [
        MemoryTier::Episodic,
        MemoryTier::Semantic,
        MemoryTier::CoreIdentity,
    ];

    /// Wire label of the tier.
    pub fn label(self) -> &'static str {
        match self {
            MemoryTier::Working => "working",
            MemoryTier::Episodic => "episodic",
            MemoryTier::Semantic => "semantic",
            MemoryTier::CoreIdentity => "core_identity",
        }
    }

    /// Key under which the tier is stored, or `None` for the working tier.
    pub fn storage_key(self) -> Option<&'static str> {
        match self {
            MemoryTier::Working => None,
            MemoryTier::Episodic => Some("phylactery_episodic"),
            MemoryTier::Semantic => Some("phylactery_semantic"),
            MemoryTier::CoreIdentity => Some("phylactery_core_identity"),
        }
    }

    /// Whether mutations to this tier are persisted.
    pub fn is_persistent(self) -> bool {
        self.storage_key().is_some()
    }
}

impl std::fmt::Display for MemoryTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl std::str::FromStr for MemoryTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "working" => Ok(MemoryTier::Working),
            "episodic" => Ok(MemoryTier::Episodic),
            "semantic" => Ok(MemoryTier::Semantic),
            "core_identity" | "core" => Ok(MemoryTier::CoreIdentity),
            other => Err(format!("unknown memory tier '{other}'")),
        }
    }
}

/// A single memory held in one of the four tiers.
///
/// Two entries are equal iff their ids are equal. `content_hash` is fixed at
/// construction and is never recomputed, even when loaded from storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub id: MemoryId,
    pub tier: MemoryTier,
    pub content: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub session_id: Option<String>,
    pub q_value: f32,
    #[serde(default)]
    pub drift_score: f32,
    #[serde(default)]
    pub retrieval_count: u64,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_access_time: DateTime<Utc>,
    pub content_hash: String,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "embedding_csv"
    )]
    pub embedding: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emotional_snapshot: Option<EmotionalSnapshot>,
    #[serde(default, deserialize_with = "stringified_map::deserialize")]
    pub metadata: Metadata,
}

impl MemoryEntry {
    /// Create an entry with a fresh id, the current time, and default stats.
    pub fn new(tier: MemoryTier, content: impl Into<String>) -> Self {
        let content = content.into();
        let now = Utc::now();
        Self {
            id: MemoryId::new(),
            tier,
            content_hash: sha256_hex(&content),
            content,
            timestamp: now,
            session_id: None,
            q_value: 0.5,
            drift_score: 0.0,
            retrieval_count: 0,
            last_access_time: now,
            embedding: None,
            emotional_snapshot: None,
            metadata: Metadata::new(),
        }
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_emotional_snapshot(mut self, snapshot: Option<EmotionalSnapshot>) -> Self {
        self.emotional_snapshot = snapshot;
        self
    }

    pub fn with_q_value(mut self, q_value: f32) -> Self {
        self.q_value = q_value;
        self
    }

    /// The `category` metadata tag, if any.
    pub fn category(&self) -> Option<&str> {
        self.metadata.get(CATEGORY_KEY).map(String::as_str)
    }

    /// Whether the current content still matches the digest taken at creation.
    pub fn content_intact(&self) -> bool {
        sha256_hex(&self.content) == self.content_hash
    }

    /// Register one retrieval and move `q_value` toward `reward`.
    ///
    /// `q ← q + α·(reward − q)`. Not clamped: with `reward ≤ 1` and
    /// `0 < α ≤ 1` the value never passes 1.0.
    pub fn record_retrieval(&mut self, reward: f32, learning_rate: f32, now: DateTime<Utc>) {
        self.retrieval_count += 1;
        self.last_access_time = now;
        self.q_value += learning_rate * (reward - self.q_value);
    }
}

impl PartialEq for MemoryEntry {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for MemoryEntry {}

impl Hash for MemoryEntry {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Retrieval ranking strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalStrategy {
    /// Cosine similarity against the query embedding.
    #[default]
    Semantic,
    /// Fraction of query words contained in the content.
    Keyword,
    /// Weighted blend of semantic and keyword scores.
    Hybrid,
    /// Newer entries first.
    Recency,
    /// Semantic candidates re-ranked by learned `q_value`.
    MemRl,
}

impl std::str::FromStr for RetrievalStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "semantic" => Ok(RetrievalStrategy::Semantic),
            "keyword" => Ok(RetrievalStrategy::Keyword),
            "hybrid" => Ok(RetrievalStrategy::Hybrid),
            "recency" => Ok(RetrievalStrategy::Recency),
            "memrl" | "mem_rl" => Ok(RetrievalStrategy::MemRl),
            other => Err(format!("unknown retrieval strategy '{other}'")),
        }
    }
}

/// Report from one consolidation cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsolidationReport {
    /// Episodic entries copied into the semantic tier.
    pub promoted: u64,
    /// Episodic entries whose `q_value` decayed.
    pub decayed: u64,
    /// Episodic entries removed.
    pub pruned: u64,
    /// How long the cycle took.
    pub duration_ms: u64,
}

/// Lifetime consolidation counters, persisted under `consolidation_stats`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsolidationStats {
    pub total_consolidations: u64,
    pub memories_promoted: u64,
    pub memories_decayed: u64,
    pub memories_pruned: u64,
}

impl ConsolidationStats {
    /// Fold one cycle's report into the lifetime counters.
    pub fn absorb(&mut self, report: &ConsolidationReport) {
        self.total_consolidations += 1;
        self.memories_promoted += report.promoted;
        self.memories_decayed += report.decayed;
        self.memories_pruned += report.pruned;
    }
}

/// Snapshot of store-wide statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryStats {
    pub session_id: String,
    pub working: usize,
    pub episodic: usize,
    pub semantic: usize,
    pub core_identity: usize,
    /// Mean `q_value` over the persistent tiers (0 when empty).
    pub avg_q_value: f32,
    /// Sum of `retrieval_count` over the persistent tiers.
    pub total_retrievals: u64,
}

/// Serde adapter for `Option<Vec<f32>>` stored as `"0.100000,0.250000,..."`.
mod embedding_csv {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<Vec<f32>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(v) => {
                let joined = v
                    .iter()
                    .map(|x| format!("{x:.6}"))
                    .collect::<Vec<_>>()
                    .join(",");
                serializer.serialize_str(&joined)
            }
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<f32>>, D::Error> {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        let Some(raw) = raw else {
            return Ok(None);
        };
        if raw.trim().is_empty() {
            return Ok(None);
        }
        raw.split(',')
            .map(|part| part.trim().parse::<f32>())
            .collect::<Result<Vec<_>, _>>()
            .map(Some)
            .map_err(serde::de::Error::custom)
    }
}

/// Accepts any JSON scalars as metadata values and stores them as strings.
mod stringified_map {
    use super::Metadata;
    use serde::{Deserialize, Deserializer};
    use std::collections::BTreeMap;

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Metadata, D::Error> {
        let raw: Option<BTreeMap<String, serde_json::Value>> = Option::deserialize(deserializer)?;
        Ok(raw
            .unwrap_or_default()
            .into_iter()
            .map(|(k, v)| {
                let s = match v {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                };
                (k, s)
            })
            .collect())
    }
}
