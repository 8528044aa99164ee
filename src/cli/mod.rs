//! Command-line interface for draft-forge.
//!
//! Provides the poller, worker and migration commands.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands};
