//! Command-line interface for kopi.
//!
//! Provides commands for debating, inspecting and editing stored
//! conversations, database maintenance and provider checks.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands};
