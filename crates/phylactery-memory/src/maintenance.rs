//! Background maintenance: periodic consolidation and recall audits.

use crate::commit_log::ImmutableCommitLog;
use crate::consolidation::ConsolidationEngine;
use crate::drift::DriftDetector;
use crate::store::TieredMemoryStore;
use phylactery_types::drift::DriftScore;
use phylactery_types::memory::MemoryId;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Run a consolidation cycle every `interval` until `shutdown` changes.
///
/// Each cycle runs on the blocking pool. A tick that arrives while the
/// previous cycle is still running is skipped.
pub fn spawn_maintenance_loop(
    engine: Arc<ConsolidationEngine>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    let busy = Arc::new(AtomicBool::new(false));
    info!(interval_secs = interval.as_secs(), "Starting memory maintenance loop");

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown.changed() => {
                    info!("Maintenance loop: shutdown signal received");
                    break;
                }
            }

            if busy
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
            {
                debug!("Maintenance loop: skipping tick (busy)");
                continue;
            }

            let engine = engine.clone();
            let busy_clone = busy.clone();
            let jh = tokio::task::spawn_blocking(move || engine.consolidate());
            tokio::spawn(async move {
                if let Err(e) = jh.await {
                    warn!(error = %e, "Consolidation cycle panicked");
                }
                busy_clone.store(false, Ordering::SeqCst);
            });
        }
    })
}

/// Measure drift for each `(entry_id, log_index)` pair and record the
/// magnitude on the entry. Pairs naming an unknown entry or ledger record
/// are skipped.
pub fn audit_recall(
    store: &TieredMemoryStore,
    log: &ImmutableCommitLog,
    detector: &DriftDetector,
    pairs: &[(MemoryId, u64)],
) -> Vec<DriftScore> {
    let mut scores = Vec::with_capacity(pairs.len());
    for (entry_id, index) in pairs {
        let Some(entry) = store.get(entry_id) else {
            debug!(entry_id = %entry_id, "Recall audit: unknown entry");
            continue;
        };
        let Some(score) = detector.measure_against_log(&entry, log, *index) else {
            debug!(entry_id = %entry_id, index, "Recall audit: no ledger record");
            continue;
        };
        store.set_drift_score(entry_id, score.drift_magnitude);
        scores.push(score);
    }
    scores
}
