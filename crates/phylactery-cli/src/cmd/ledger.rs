//! log append / verify / show.

use crate::boot::boot;
use crate::ui;
use phylactery_types::config::PhylacteryConfig;

pub fn cmd_log_append(config: &PhylacteryConfig, content: &str, entry_type: &str) {
    let p = boot(config);
    match p.log.append(content, entry_type) {
        Ok(hash) => println!("{hash}"),
        Err(e) => {
            ui::error_with_fix(
                &format!("Ledger append failed: {e}"),
                "The record was not stored; retry once the database is writable",
            );
            std::process::exit(1);
        }
    }
}

pub fn cmd_log_verify(config: &PhylacteryConfig) {
    let p = boot(config);
    match p.log.verify_integrity() {
        Ok(()) => {
            ui::success(&format!("Ledger intact ({} entries)", p.log.size()));
            ui::kv("Tip", &p.log.get_latest_hash());
        }
        Err(brk) => {
            ui::error(&brk.to_string());
            ui::kv_warn("Broken at", &brk.index().to_string());
            std::process::exit(1);
        }
    }
}

pub fn cmd_log_show(config: &PhylacteryConfig, limit: usize, json: bool) {
    let p = boot(config);
    let entries = p.log.recent(limit);

    if json {
        ui::json(&serde_json::to_value(&entries).unwrap_or_default());
        return;
    }

    ui::section(&format!("Ledger ({} of {} entries)", entries.len(), p.log.size()));
    ui::blank();
    for entry in &entries {
        println!(
            "  {:>5}  {}  {:<12} {}",
            entry.index,
            entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
            entry.entry_type,
            ui::preview(&entry.content, 60)
        );
    }
}
