//! remember, search, recall, stats, identity-hash, export.

use super::parse_or_exit;
use crate::boot::boot;
use crate::ui;
use phylactery_types::config::PhylacteryConfig;
use phylactery_types::memory::{MemoryId, MemoryTier, Metadata, RetrievalStrategy};

pub fn cmd_remember(config: &PhylacteryConfig, content: &str, tier: &str, category: &str) {
    let tier: MemoryTier = parse_or_exit(tier, "memory tier");
    let p = boot(config);
    let id = match tier {
        MemoryTier::Episodic => p.store.add_episodic(content, Metadata::new(), None),
        MemoryTier::Semantic => p.store.add_semantic(content, category, Metadata::new()),
        MemoryTier::CoreIdentity => p.store.add_core_identity(content, Metadata::new()),
        MemoryTier::Working => {
            ui::error("Working memory is volatile and cannot be written from the CLI");
            ui::hint("Use --tier episodic, semantic or core-identity");
            std::process::exit(2);
        }
    };
    ui::success(&format!("Stored {tier} memory"));
    println!("{id}");
}

pub fn cmd_search(
    config: &PhylacteryConfig,
    query: &str,
    tier: &str,
    top_k: usize,
    strategy: &str,
    json: bool,
) {
    let tier: MemoryTier = parse_or_exit(tier, "memory tier");
    let strategy: RetrievalStrategy = parse_or_exit(strategy, "retrieval strategy");
    let p = boot(config);
    let results = p.store.retrieve(tier, query, strategy, top_k);

    if json {
        let rows: Vec<serde_json::Value> = results
            .iter()
            .map(|r| {
                serde_json::json!({
                    "id": r.entry.id,
                    "score": r.score,
                    "strategy": r.strategy,
                    "q_value": r.entry.q_value,
                    "content": r.entry.content,
                })
            })
            .collect();
        ui::json(&serde_json::Value::Array(rows));
        return;
    }

    ui::section(&format!("{} results in {tier} for \"{query}\"", results.len()));
    ui::blank();
    if results.is_empty() {
        ui::hint("No matching memories");
        return;
    }
    for (i, r) in results.iter().enumerate() {
        ui::ranked(i + 1, r.score, r.entry.id.as_str(), &r.entry.content);
    }
}

pub fn cmd_recall(config: &PhylacteryConfig, id: &str, reward: Option<f32>) {
    let p = boot(config);
    match p.store.record_retrieval(&MemoryId::from(id), reward) {
        Some(q_value) => ui::kv_ok("q_value", &format!("{q_value:.4}")),
        None => {
            ui::error(&format!("No memory with id {id}"));
            std::process::exit(1);
        }
    }
}

pub fn cmd_stats(config: &PhylacteryConfig, json: bool) {
    let p = boot(config);
    let stats = p.store.stats();
    let log_size = p.log.size();
    let consolidation = p.consolidation.stats();

    if json {
        ui::json(&serde_json::json!({
            "memory": stats,
            "ledger_entries": log_size,
            "consolidation": consolidation,
            "average_drift": p.drift.average_drift(),
        }));
        return;
    }

    ui::section("Phylactery Memory");
    ui::blank();
    ui::kv("Data dir", &config.data_dir.display().to_string());
    for tier in MemoryTier::ALL {
        let count = p.store.tier_len(tier).to_string();
        if tier.is_persistent() {
            ui::kv(tier.label(), &count);
        } else {
            ui::kv(tier.label(), &format!("{count} (volatile)"));
        }
    }
    ui::kv("Avg q_value", &format!("{:.3}", stats.avg_q_value));
    ui::kv("Retrievals", &stats.total_retrievals.to_string());
    ui::kv("Ledger", &format!("{log_size} entries"));
    ui::kv(
        "Consolidations",
        &consolidation.total_consolidations.to_string(),
    );
    ui::kv("Avg drift", &format!("{:.3}", p.drift.average_drift()));
}

pub fn cmd_identity_hash(config: &PhylacteryConfig) {
    let p = boot(config);
    println!("{}", p.store.compute_identity_hash());
}

pub fn cmd_export(config: &PhylacteryConfig) {
    let p = boot(config);
    ui::json(&serde_json::json!({
        "memory": p.store.export_for_sync(),
        "commit_log": p.log.export_for_sync(),
    }));
}
