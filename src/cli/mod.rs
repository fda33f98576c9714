//! Command-line interface for row-audit.
//!
//! Provides the `classify` batch command plus `pool` and `types` for
//! inspecting what a run would use.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands};
