//! Tiered memory engine for a long-running conversational agent.
//!
//! Provides:
//! - **Embedding engine**: deterministic hashing bag-of-words vectors
//! - **Commit log**: append-only, hash-chained ground-truth ledger
//! - **Tiered store**: working / episodic / semantic / core-identity tiers
//! - **Consolidation**: periodic promote, decay and prune pass over episodic memory
//! - **Drift detection**: scores how far a recollection strayed from the ledger
//!
//! All state is persisted as JSON documents through a [`KeyValueStore`].

pub mod commit_log;
pub mod consolidation;
pub mod drift;
pub mod embedding;
pub mod kv;
pub mod maintenance;
pub mod migration;
pub mod retrieval;
pub mod store;

mod tier;

pub use commit_log::{ChainBreak, ImmutableCommitLog};
pub use consolidation::ConsolidationEngine;
pub use drift::DriftDetector;
pub use embedding::{cosine_similarity, HashingEmbedder};
pub use kv::{InMemoryKvStore, SqliteKvStore};
pub use phylactery_types::storage::KeyValueStore;
pub use retrieval::RetrievalResult;
pub use store::TieredMemoryStore;
