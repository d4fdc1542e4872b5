//! Command-line interface for debate-forge.
//!
//! Provides the `serve` and `run` commands.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands, RunArgs, ServeArgs};
