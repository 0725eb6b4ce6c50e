//! Core types and traits for the Phylactery tiered memory store.
//!
//! This crate defines the shared data structures used by the memory engine
//! and the CLI: entries, ledger records, drift scores, configuration and the
//! key-value storage seam. It contains no business logic.

pub mod config;
pub mod drift;
pub mod error;
pub mod hash;
pub mod ledger;
pub mod memory;
pub mod storage;
