//! The four-tier memory store.
//!
//! Each tier is an id-keyed arena with an insertion-ordered index, guarded by
//! its own `RwLock`. A global id → tier map lets lookups find an entry without
//! scanning; it is only modified while the owning tier's write lock is held,
//! so a tier list and the global index never disagree. Persistent tiers are
//! rewritten to the key-value store under that same write lock, which keeps
//! the persisted documents in mutation order.
//!
//! Persistence failures are logged and the in-memory state stays
//! authoritative; load failures leave the affected tier empty.

use crate::embedding::HashingEmbedder;
use crate::retrieval::{self, RetrievalResult};
use crate::tier::TierState;
use chrono::Utc;
use dashmap::DashMap;
use phylactery_types::config::MemoryConfig;
use phylactery_types::memory::{
    EmotionalSnapshot, MemoryEntry, MemoryId, MemoryStats, MemoryTier, Metadata,
    RetrievalStrategy, CATEGORY_KEY, TYPE_KEY,
};
use phylactery_types::storage::KeyValueStore;
use sha2::{Digest, Sha256};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// `type` metadata value of synthesized or supplied session summaries.
pub const SESSION_SUMMARY_TYPE: &str = "session_summary";

struct SessionState {
    id: String,
    last_emotion: Option<EmotionalSnapshot>,
}

impl SessionState {
    fn fresh() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            last_emotion: None,
        }
    }
}

/// Tiered memory store with learned retention weights.
pub struct TieredMemoryStore {
    config: MemoryConfig,
    embedder: HashingEmbedder,
    kv: Arc<dyn KeyValueStore>,
    working: RwLock<TierState>,
    episodic: RwLock<TierState>,
    semantic: RwLock<TierState>,
    core_identity: RwLock<TierState>,
    index: DashMap<MemoryId, MemoryTier>,
    session: Mutex<SessionState>,
}

impl TieredMemoryStore {
    /// Create a store and load the persistent tiers from `kv`.
    pub fn new(config: MemoryConfig, embedder: HashingEmbedder, kv: Arc<dyn KeyValueStore>) -> Self {
        let store = Self {
            config,
            embedder,
            kv,
            working: RwLock::new(TierState::default()),
            episodic: RwLock::new(TierState::default()),
            semantic: RwLock::new(TierState::default()),
            core_identity: RwLock::new(TierState::default()),
            index: DashMap::new(),
            session: Mutex::new(SessionState::fresh()),
        };
        for tier in MemoryTier::PERSISTENT {
            store.load_tier(tier);
        }
        store
    }

    /// The embedder used for entries and queries.
    pub fn embedder(&self) -> &HashingEmbedder {
        &self.embedder
    }

    /// Id of the current conversational session.
    pub fn session_id(&self) -> String {
        self.session.lock().unwrap_or_else(|e| e.into_inner()).id.clone()
    }

    // -- Tier adds --

    /// Append a conversational turn to working memory, evicting the oldest
    /// turn once capacity is exceeded.
    pub fn add_working(
        &self,
        content: &str,
        emotional_snapshot: Option<EmotionalSnapshot>,
    ) -> MemoryId {
        let entry = self
            .new_entry(MemoryTier::Working, content)
            .with_embedding(self.embedder.embed(content))
            .with_emotional_snapshot(finite_snapshot(emotional_snapshot));
        self.insert(entry)
    }

    /// Record a significant event.
    pub fn add_episodic(
        &self,
        content: &str,
        metadata: Metadata,
        emotional_snapshot: Option<EmotionalSnapshot>,
    ) -> MemoryId {
        let entry = self
            .new_entry(MemoryTier::Episodic, content)
            .with_embedding(self.embedder.embed(content))
            .with_metadata(metadata)
            .with_emotional_snapshot(finite_snapshot(emotional_snapshot));
        self.insert(entry)
    }

    /// Record categorized knowledge.
    pub fn add_semantic(&self, content: &str, category: &str, mut metadata: Metadata) -> MemoryId {
        metadata.insert(CATEGORY_KEY.to_string(), category.to_string());
        let entry = self
            .new_entry(MemoryTier::Semantic, content)
            .with_embedding(self.embedder.embed(content))
            .with_metadata(metadata);
        self.insert(entry)
    }

    /// Record a core-identity axiom. Axioms carry no embedding and there is
    /// no API to remove them.
    pub fn add_core_identity(&self, content: &str, metadata: Metadata) -> MemoryId {
        let entry = self
            .new_entry(MemoryTier::CoreIdentity, content)
            .with_metadata(metadata);
        self.insert(entry)
    }

    fn new_entry(&self, tier: MemoryTier, content: &str) -> MemoryEntry {
        MemoryEntry::new(tier, content)
            .with_q_value(self.config.initial_q_value)
            .with_session(self.session_id())
    }

    fn insert(&self, entry: MemoryEntry) -> MemoryId {
        let tier = entry.tier;
        let id = entry.id.clone();
        if let Some(snapshot) = &entry.emotional_snapshot {
            self.session
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .last_emotion = Some(snapshot.clone());
        }

        let mut state = self.write(tier);
        self.index.insert(id.clone(), tier);
        state.push(entry);

        if tier == MemoryTier::Working {
            while state.len() > self.config.working_capacity {
                if let Some(evicted) = state.pop_oldest() {
                    self.index.remove(&evicted.id);
                    debug!(entry_id = %evicted.id, "Evicted oldest working memory");
                }
            }
        }
        self.persist_locked(tier, &state);
        debug!(entry_id = %id, tier = %tier, "Added memory");
        id
    }

    // -- Reads --

    /// Look up an entry in any tier.
    pub fn get(&self, id: &MemoryId) -> Option<MemoryEntry> {
        let tier = *self.index.get(id)?;
        self.read(tier).get(id).cloned()
    }

    /// Whether an entry with this id exists in any tier.
    pub fn contains(&self, id: &MemoryId) -> bool {
        self.index.contains_key(id)
    }

    /// Number of entries in a tier.
    pub fn tier_len(&self, tier: MemoryTier) -> usize {
        self.read(tier).len()
    }

    /// A consistent snapshot of a tier, oldest first.
    pub fn tier_entries(&self, tier: MemoryTier) -> Vec<MemoryEntry> {
        self.read(tier).snapshot()
    }

    /// The most recent `limit` working turns, oldest first.
    pub fn get_working_context(&self, limit: usize) -> Vec<MemoryEntry> {
        self.read(MemoryTier::Working).newest(limit)
    }

    /// Empty working memory.
    pub fn clear_working_memory(&self) {
        let mut state = self.write(MemoryTier::Working);
        for id in state.drain_ids() {
            self.index.remove(&id);
        }
    }

    /// Top `top_k` entries of `tier` by cosine similarity to `query`.
    /// Entries without embeddings are excluded.
    pub fn semantic_search(&self, tier: MemoryTier, query: &str, top_k: usize) -> Vec<MemoryEntry> {
        let snapshot = self.tier_entries(tier);
        retrieval::rank_semantic(&snapshot, &self.embedder.embed(query), top_k)
            .into_iter()
            .map(|r| r.entry)
            .collect()
    }

    /// Rank a tier with any retrieval strategy.
    pub fn retrieve(
        &self,
        tier: MemoryTier,
        query: &str,
        strategy: RetrievalStrategy,
        top_k: usize,
    ) -> Vec<RetrievalResult> {
        let snapshot = self.tier_entries(tier);
        retrieval::retrieve(&snapshot, &self.embedder, query, strategy, top_k, Utc::now())
    }

    /// Semantic entries tagged with `category`, highest `q_value` first.
    pub fn semantic_by_category(&self, category: &str, limit: usize) -> Vec<MemoryEntry> {
        let mut matches: Vec<MemoryEntry> = self
            .read(MemoryTier::Semantic)
            .iter()
            .filter(|e| e.category() == Some(category))
            .cloned()
            .collect();
        matches.sort_by(|a, b| {
            b.q_value
                .partial_cmp(&a.q_value)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matches.truncate(limit);
        matches
    }

    // -- Learning --

    /// Register a retrieval of `id` and apply the retention update with
    /// `reward` (the configured default when `None` or not finite). Returns
    /// the new `q_value`, or `None` for an unknown id.
    pub fn record_retrieval(&self, id: &MemoryId, reward: Option<f32>) -> Option<f32> {
        let reward = match reward {
            Some(r) if r.is_finite() => r,
            Some(r) => {
                warn!(entry_id = %id, reward = r, "Ignoring non-finite reward, using default");
                self.config.default_reward
            }
            None => self.config.default_reward,
        };
        let learning_rate = self.config.learning_rate;
        let q_value = self.update_entry(id, |entry| {
            entry.record_retrieval(reward, learning_rate, Utc::now());
            entry.q_value
        })?;
        debug!(entry_id = %id, q_value, "Updated retention weight");
        Some(q_value)
    }

    /// Store the latest drift magnitude measured for `id`. Non-finite
    /// magnitudes are refused.
    pub fn set_drift_score(&self, id: &MemoryId, drift_magnitude: f32) -> bool {
        if !drift_magnitude.is_finite() {
            return false;
        }
        self.update_entry(id, |entry| entry.drift_score = drift_magnitude)
            .is_some()
    }

    /// Apply `f` to one entry under its tier's write lock and persist.
    pub(crate) fn update_entry<R>(
        &self,
        id: &MemoryId,
        f: impl FnOnce(&mut MemoryEntry) -> R,
    ) -> Option<R> {
        let tier = *self.index.get(id)?;
        let mut state = self.write(tier);
        let result = f(state.get_mut(id)?);
        self.persist_locked(tier, &state);
        Some(result)
    }

    /// Apply `f` to every entry of a tier; persists when any call returned
    /// `true`. Returns how many did.
    pub(crate) fn update_tier(&self, tier: MemoryTier, mut f: impl FnMut(&mut MemoryEntry) -> bool) -> u64 {
        let mut state = self.write(tier);
        let changed = state.iter_mut().fold(0u64, |n, e| n + u64::from(f(e)));
        if changed > 0 {
            self.persist_locked(tier, &state);
        }
        changed
    }

    /// Remove each id from `tier` if it is still present there.
    pub(crate) fn remove_ids(&self, tier: MemoryTier, ids: &[MemoryId]) -> u64 {
        let mut state = self.write(tier);
        let mut removed = 0;
        for id in ids {
            if state.remove(id).is_some() {
                self.index.remove(id);
                removed += 1;
            }
        }
        if removed > 0 {
            self.persist_locked(tier, &state);
        }
        removed
    }

    /// Insert a fully built entry (used for promotion).
    pub(crate) fn insert_entry(&self, entry: MemoryEntry) -> MemoryId {
        self.insert(entry)
    }

    // -- Sessions --

    /// End the current session.
    ///
    /// Stores `summary` (or one synthesized from the latest working turns) as
    /// an episodic `session_summary` carrying the session's most recent
    /// emotional snapshot, clears working memory, and starts a new session.
    /// Returns the summary's id, or `None` when there was nothing to record.
    pub fn close_session(&self, summary: Option<&str>) -> Option<MemoryId> {
        let text = match summary {
            Some(s) => Some(s.to_string()),
            None => self.synthesize_summary(),
        };

        let (session_id, emotion) = {
            let session = self.session.lock().unwrap_or_else(|e| e.into_inner());
            (session.id.clone(), session.last_emotion.clone())
        };

        let summary_id = text.map(|text| {
            let mut metadata = Metadata::new();
            metadata.insert(TYPE_KEY.to_string(), SESSION_SUMMARY_TYPE.to_string());
            self.add_episodic(&text, metadata, emotion)
        });

        self.clear_working_memory();
        let next = {
            let mut session = self.session.lock().unwrap_or_else(|e| e.into_inner());
            *session = SessionState::fresh();
            session.id.clone()
        };
        info!(closed = %session_id, next = %next, "Closed session");
        summary_id
    }

    fn synthesize_summary(&self) -> Option<String> {
        let turns = self.get_working_context(self.config.session_summary_entries);
        if turns.is_empty() {
            return None;
        }
        let cap = self.config.session_summary_entry_chars;
        let parts: Vec<String> = turns
            .iter()
            .map(|e| e.content.chars().take(cap).collect())
            .collect();
        Some(parts.join(" | "))
    }

    // -- Integrity and export --

    /// Running SHA-256 over all core-identity axioms sorted by id, each
    /// contributing its content then its id.
    pub fn compute_identity_hash(&self) -> String {
        let mut axioms = self.tier_entries(MemoryTier::CoreIdentity);
        axioms.sort_by(|a, b| a.id.cmp(&b.id));
        let mut hasher = Sha256::new();
        for axiom in &axioms {
            hasher.update(axiom.content.as_bytes());
            hasher.update(axiom.id.as_str().as_bytes());
        }
        hex::encode(hasher.finalize())
    }

    /// Every persistent tier plus session metadata, for external backup.
    pub fn export_for_sync(&self) -> serde_json::Value {
        let mut doc = serde_json::Map::new();
        doc.insert(
            "export_time".to_string(),
            serde_json::json!(Utc::now().timestamp_millis()),
        );
        doc.insert("session_id".to_string(), serde_json::json!(self.session_id()));
        for tier in MemoryTier::PERSISTENT {
            let entries = self.tier_entries(tier);
            let value = serde_json::to_value(&entries).unwrap_or_else(|e| {
                warn!(tier = %tier, error = %e, "Failed to serialize tier for export");
                serde_json::Value::Array(Vec::new())
            });
            doc.insert(tier.label().to_string(), value);
        }
        serde_json::Value::Object(doc)
    }

    /// Store-wide counts and retention statistics.
    pub fn stats(&self) -> MemoryStats {
        let mut q_sum = 0.0f32;
        let mut count = 0usize;
        let mut total_retrievals = 0u64;
        for tier in MemoryTier::PERSISTENT {
            for entry in self.read(tier).iter() {
                q_sum += entry.q_value;
                count += 1;
                total_retrievals += entry.retrieval_count;
            }
        }
        MemoryStats {
            session_id: self.session_id(),
            working: self.tier_len(MemoryTier::Working),
            episodic: self.tier_len(MemoryTier::Episodic),
            semantic: self.tier_len(MemoryTier::Semantic),
            core_identity: self.tier_len(MemoryTier::CoreIdentity),
            avg_q_value: if count > 0 { q_sum / count as f32 } else { 0.0 },
            total_retrievals,
        }
    }

    // -- Locking and persistence --

    fn lock_for(&self, tier: MemoryTier) -> &RwLock<TierState> {
        match tier {
            MemoryTier::Working => &self.working,
            MemoryTier::Episodic => &self.episodic,
            MemoryTier::Semantic => &self.semantic,
            MemoryTier::CoreIdentity => &self.core_identity,
        }
    }

    fn read(&self, tier: MemoryTier) -> RwLockReadGuard<'_, TierState> {
        self.lock_for(tier).read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self, tier: MemoryTier) -> RwLockWriteGuard<'_, TierState> {
        self.lock_for(tier).write().unwrap_or_else(|e| e.into_inner())
    }

    /// Rewrite a persistent tier's document. Caller holds the tier lock.
    fn persist_locked(&self, tier: MemoryTier, state: &TierState) {
        let Some(key) = tier.storage_key() else {
            return;
        };
        let entries: Vec<&MemoryEntry> = state.iter().collect();
        let doc = match serde_json::to_string(&entries) {
            Ok(doc) => doc,
            Err(e) => {
                warn!(tier = %tier, error = %e, "Failed to serialize tier");
                return;
            }
        };
        if let Err(e) = self.kv.put(key, &doc) {
            warn!(tier = %tier, error = %e, "Failed to persist tier");
        }
    }

    fn load_tier(&self, tier: MemoryTier) {
        let Some(key) = tier.storage_key() else {
            return;
        };
        let doc = match self.kv.get(key) {
            Ok(Some(doc)) => doc,
            Ok(None) => return,
            Err(e) => {
                warn!(tier = %tier, error = %e, "Failed to read tier, starting empty");
                return;
            }
        };
        let records: Vec<serde_json::Value> = match serde_json::from_str(&doc) {
            Ok(records) => records,
            Err(e) => {
                warn!(tier = %tier, error = %e, "Malformed tier document, starting empty");
                return;
            }
        };

        let mut state = self.write(tier);
        for record in records {
            let mut entry: MemoryEntry = match serde_json::from_value(record) {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(tier = %tier, error = %e, "Skipping malformed memory record");
                    continue;
                }
            };
            if self.index.contains_key(&entry.id) {
                warn!(entry_id = %entry.id, tier = %tier, "Skipping duplicate memory id");
                continue;
            }
            entry.tier = tier;
            let stale = entry
                .embedding
                .as_ref()
                .is_some_and(|v| v.len() != self.embedder.dimensions());
            if stale {
                debug!(entry_id = %entry.id, "Re-embedding entry with mismatched dimensions");
                entry.embedding = Some(self.embedder.embed(&entry.content));
            }
            self.index.insert(entry.id.clone(), tier);
            state.push(entry);
        }
        info!(tier = %tier, entries = state.len(), "Loaded memory tier");
    }
}

/// Drop snapshot dimensions that cannot round-trip through JSON.
fn finite_snapshot(snapshot: Option<EmotionalSnapshot>) -> Option<EmotionalSnapshot> {
    snapshot.map(|mut s| {
        s.retain(|_, v| v.is_finite());
        s
    })
}
