//! Phylactery CLI: operator front-end for the tiered memory store.
//!
//! Every command opens `<data_dir>/phylactery.db`, performs one operation
//! and exits.

mod boot;
mod cli;
mod cmd;
mod config;
mod ui;

use crate::cli::*;
use clap::Parser;
use phylactery_types::config::PhylacteryConfig;
use std::path::Path;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

fn init_tracing_stderr(default_level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Subscriber active while the configured log level is not yet known.
fn bootstrap_subscriber<W>(make_writer: W) -> impl tracing::Subscriber + Send + Sync + 'static
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(make_writer)
        .finish()
}

fn load_config_logged(path: Option<&Path>) -> PhylacteryConfig {
    tracing::subscriber::with_default(bootstrap_subscriber(std::io::stderr), || {
        config::load_config(path)
    })
}

fn main() {
    let cli = Cli::parse();
    let config = load_config_logged(cli.config.as_deref());
    init_tracing_stderr(&config.log_level);

    match cli.command {
        Commands::Remember {
            content,
            tier,
            category,
        } => cmd::memory::cmd_remember(&config, &content, &tier, &category),
        Commands::Search {
            query,
            tier,
            top_k,
            strategy,
            json,
        } => cmd::memory::cmd_search(&config, &query, &tier, top_k, &strategy, json),
        Commands::Recall { id, reward } => cmd::memory::cmd_recall(&config, &id, reward),
        Commands::Log(sub) => match sub {
            LogCommands::Append {
                content,
                entry_type,
            } => cmd::ledger::cmd_log_append(&config, &content, &entry_type),
            LogCommands::Verify => cmd::ledger::cmd_log_verify(&config),
            LogCommands::Show { limit, json } => cmd::ledger::cmd_log_show(&config, limit, json),
        },
        Commands::Consolidate { json } => cmd::maintenance::cmd_consolidate(&config, json),
        Commands::Maintain { interval_secs } => {
            cmd::maintenance::cmd_maintain(&config, interval_secs)
        }
        Commands::Drift(sub) => match sub {
            DriftCommands::Measure {
                entry_id,
                recalled,
                ground_truth,
            } => cmd::maintenance::cmd_drift_measure(&config, &entry_id, &recalled, &ground_truth),
            DriftCommands::Audit { entry_id, index } => {
                cmd::maintenance::cmd_drift_audit(&config, &entry_id, index)
            }
            DriftCommands::Report { limit, json } => {
                cmd::maintenance::cmd_drift_report(&config, limit, json)
            }
        },
        Commands::Stats { json } => cmd::memory::cmd_stats(&config, json),
        Commands::IdentityHash => cmd::memory::cmd_identity_hash(&config),
        Commands::Export => cmd::memory::cmd_export(&config),
    }
}
