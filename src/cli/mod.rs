//! Command-line interface for swe-env.
//!
//! Provides commands for fetching SWE-bench records and driving
//! interactive episodes.

mod commands;

pub use commands::{parse_cli, run_with_cli, Cli};
