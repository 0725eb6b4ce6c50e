//! Clap CLI definitions for Phylactery.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub const AFTER_HELP: &str = "\
\x1b[1;36mExamples:\x1b[0m
  phylactery remember \"User's birthday is March 3\"      Record an episodic memory
  phylactery remember \"Prefers tea\" --tier semantic --category preferences
  phylactery search \"birthday\" --strategy mem-rl          Rank memories for a query
  phylactery log append \"raw transcript line\"            Append to the ground-truth ledger
  phylactery log verify                                  Check the ledger hash chain
  phylactery consolidate                                 Promote, decay and prune episodic memory
  phylactery drift report                                Show drift statistics";

/// Phylactery: tiered, integrity-verifiable memory for long-running agents.
#[derive(Parser)]
#[command(name = "phylactery", version, about, after_help = AFTER_HELP)]
pub struct Cli {
    /// Path to config file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Add a memory and print its id.
    Remember {
        /// Memory content.
        content: String,
        /// Target tier: episodic, semantic or core-identity.
        #[arg(long, default_value = "episodic")]
        tier: String,
        /// Category tag (semantic tier only).
        #[arg(long, default_value = "general")]
        category: String,
    },
    /// Rank the memories of a tier against a query.
    Search {
        /// Query text.
        query: String,
        /// Tier to search.
        #[arg(long, default_value = "episodic")]
        tier: String,
        /// Maximum number of results.
        #[arg(long, default_value = "5")]
        top_k: usize,
        /// Ranking strategy: semantic, keyword, hybrid, recency or mem-rl.
        #[arg(long, default_value = "semantic")]
        strategy: String,
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Report that a memory was useful (updates its retention weight).
    Recall {
        /// Memory id.
        id: String,
        /// Reward in [0, 1]; defaults to the configured reward.
        #[arg(long)]
        reward: Option<f32>,
    },
    /// Ground-truth ledger operations [*].
    #[command(subcommand)]
    Log(LogCommands),
    /// Run one consolidation cycle.
    Consolidate {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Run consolidation periodically until interrupted.
    Maintain {
        /// Seconds between cycles; defaults to the configured interval.
        #[arg(long)]
        interval_secs: Option<u64>,
    },
    /// Drift measurement and reporting [*].
    #[command(subcommand)]
    Drift(DriftCommands),
    /// Show store statistics.
    Stats {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Print the hash over all core-identity axioms.
    IdentityHash,
    /// Print every persistent tier and the ledger as one JSON document.
    Export,
}

#[derive(Subcommand)]
pub enum LogCommands {
    /// Append a record and print its chain hash.
    Append {
        /// Record content.
        content: String,
        /// Record type.
        #[arg(long, default_value = "interaction")]
        entry_type: String,
    },
    /// Verify the hash chain; exits non-zero on a break.
    Verify,
    /// Show the most recent records.
    Show {
        /// Number of records.
        #[arg(long, default_value = "10")]
        limit: usize,
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
pub enum DriftCommands {
    /// Score a recollection against its ground truth.
    Measure {
        /// Memory id the recollection belongs to.
        entry_id: String,
        /// Recalled text.
        recalled: String,
        /// Ground-truth text.
        ground_truth: String,
    },
    /// Compare a stored memory with a ledger record and record the drift.
    Audit {
        /// Memory id.
        entry_id: String,
        /// Ledger index holding the ground truth.
        index: u64,
    },
    /// Show average drift, trend and flagged measurements.
    Report {
        /// Maximum flagged measurements to list.
        #[arg(long, default_value = "10")]
        limit: usize,
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
}
