//! Wires every memory component to one SQLite-backed key-value store.

use crate::ui;
use phylactery_memory::{
    ConsolidationEngine, DriftDetector, HashingEmbedder, ImmutableCommitLog, KeyValueStore,
    SqliteKvStore, TieredMemoryStore,
};
use phylactery_types::config::PhylacteryConfig;
use phylactery_types::error::PhylacteryResult;
use std::sync::Arc;
use tracing::debug;

/// All memory components sharing one backing store.
pub struct Phylactery {
    pub store: Arc<TieredMemoryStore>,
    pub log: ImmutableCommitLog,
    pub drift: DriftDetector,
    pub consolidation: Arc<ConsolidationEngine>,
}

impl Phylactery {
    /// Open `<data_dir>/phylactery.db` and load every component from it.
    pub fn open(config: &PhylacteryConfig) -> PhylacteryResult<Self> {
        let path = config.database_path();
        let kv: Arc<dyn KeyValueStore> = Arc::new(SqliteKvStore::open(&path)?);
        debug!(path = %path.display(), "Opened memory database");

        let embedder = HashingEmbedder::new(config.embedding.clone());
        let store = Arc::new(TieredMemoryStore::new(
            config.memory.clone(),
            embedder.clone(),
            kv.clone(),
        ));
        let log = ImmutableCommitLog::new(kv.clone());
        let drift = DriftDetector::new(config.drift.clone(), embedder, kv.clone());
        let consolidation = Arc::new(ConsolidationEngine::new(
            store.clone(),
            config.consolidation.clone(),
            kv,
        ));

        Ok(Self {
            store,
            log,
            drift,
            consolidation,
        })
    }
}

/// Open the store or exit with a diagnostic.
pub fn boot(config: &PhylacteryConfig) -> Phylactery {
    match Phylactery::open(config) {
        Ok(p) => p,
        Err(e) => {
            ui::error_with_fix(
                &format!("Failed to open memory database: {e}"),
                &format!(
                    "Check that {} is writable and not locked by another process",
                    config.data_dir.display()
                ),
            );
            std::process::exit(1);
        }
    }
}
