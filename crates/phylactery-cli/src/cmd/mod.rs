//! Command implementations by domain.

pub mod ledger;
pub mod maintenance;
pub mod memory;

use crate::ui;
use std::str::FromStr;

/// Parse a command-line value or exit with the parser's message.
pub(crate) fn parse_or_exit<T: FromStr<Err = String>>(value: &str, what: &str) -> T {
    match value.parse() {
        Ok(v) => v,
        Err(e) => {
            ui::error_with_fix(&e, &format!("Pass a valid {what}; see --help"));
            std::process::exit(2);
        }
    }
}
