//! consolidate, maintain, drift measure / audit / report.

use crate::boot::boot;
use crate::ui;
use phylactery_memory::maintenance::{audit_recall, spawn_maintenance_loop};
use phylactery_types::config::PhylacteryConfig;
use phylactery_types::memory::MemoryId;
use std::time::Duration;

pub fn cmd_consolidate(config: &PhylacteryConfig, json: bool) {
    let p = boot(config);
    let report = p.consolidation.consolidate();
    let stats = p.consolidation.stats();

    if json {
        ui::json(&serde_json::json!({ "report": report, "lifetime": stats }));
        return;
    }

    ui::section("Consolidation cycle");
    ui::blank();
    ui::kv_ok("Promoted", &report.promoted.to_string());
    ui::kv("Decayed", &report.decayed.to_string());
    ui::kv("Pruned", &report.pruned.to_string());
    ui::kv("Duration", &format!("{}ms", report.duration_ms));
    ui::blank();
    ui::kv("Total cycles", &stats.total_consolidations.to_string());
    ui::kv(
        "Lifetime",
        &format!(
            "{} promoted, {} decayed, {} pruned",
            stats.memories_promoted, stats.memories_decayed, stats.memories_pruned
        ),
    );
    if !p.consolidation.is_consolidation_time_now() {
        ui::hint("Outside the configured nightly window; scheduled runs wait for it");
    }
}

pub fn cmd_maintain(config: &PhylacteryConfig, interval_secs: Option<u64>) {
    let p = boot(config);
    let interval = Duration::from_secs(interval_secs.unwrap_or(p.consolidation.config().interval_secs));

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            ui::error(&format!("Failed to start async runtime: {e}"));
            std::process::exit(1);
        }
    };

    rt.block_on(async {
        let (tx, rx) = tokio::sync::watch::channel(false);
        let handle = spawn_maintenance_loop(p.consolidation.clone(), interval, rx);
        ui::success(&format!(
            "Maintenance running every {}s (Ctrl+C to stop)",
            interval.as_secs()
        ));
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to listen for Ctrl+C");
        }
        let _ = tx.send(true);
        let _ = handle.await;
    });

    let stats = p.consolidation.stats();
    ui::kv("Total cycles", &stats.total_consolidations.to_string());
}

pub fn cmd_drift_measure(config: &PhylacteryConfig, entry_id: &str, recalled: &str, ground_truth: &str) {
    let p = boot(config);
    let score = p
        .drift
        .measure_drift(&MemoryId::from(entry_id), recalled, ground_truth);
    ui::kv("Similarity", &format!("{:.4}", score.cosine_similarity));
    if score.flagged_for_review {
        ui::kv_warn("Drift", &format!("{:.4} (flagged)", score.drift_magnitude));
    } else {
        ui::kv_ok("Drift", &format!("{:.4}", score.drift_magnitude));
    }
}

pub fn cmd_drift_audit(config: &PhylacteryConfig, entry_id: &str, index: u64) {
    let p = boot(config);
    let scores = audit_recall(&p.store, &p.log, &p.drift, &[(MemoryId::from(entry_id), index)]);
    match scores.first() {
        Some(score) => {
            ui::kv("Similarity", &format!("{:.4}", score.cosine_similarity));
            if score.flagged_for_review {
                ui::kv_warn("Drift", &format!("{:.4} (flagged)", score.drift_magnitude));
            } else {
                ui::kv_ok("Drift", &format!("{:.4}", score.drift_magnitude));
            }
        }
        None => {
            ui::error(&format!("No memory {entry_id} or no ledger record {index}"));
            std::process::exit(1);
        }
    }
}

pub fn cmd_drift_report(config: &PhylacteryConfig, limit: usize, json: bool) {
    let p = boot(config);
    let flagged = p.drift.flagged_entries(limit);

    if json {
        ui::json(&serde_json::json!({
            "measurements": p.drift.history_len(),
            "average_drift": p.drift.average_drift(),
            "trend": p.drift.default_trend(),
            "flagged": flagged,
        }));
        return;
    }

    ui::section("Memory drift");
    ui::blank();
    ui::kv("Measurements", &p.drift.history_len().to_string());
    ui::kv("Average", &format!("{:.4}", p.drift.average_drift()));
    let trend = p.drift.default_trend();
    if trend > 0.0 {
        ui::kv_warn("Trend", &format!("{trend:+.4}"));
    } else {
        ui::kv_ok("Trend", &format!("{trend:+.4}"));
    }
    if flagged.is_empty() {
        return;
    }
    ui::blank();
    ui::section("Flagged for review");
    for score in &flagged {
        println!(
            "    {}  {}  drift {:.4}",
            score.timestamp.format("%Y-%m-%d %H:%M:%S"),
            score.entry_id,
            score.drift_magnitude
        );
    }
}
