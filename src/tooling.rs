//! Tooling
//!
//! Command-line surface over the backup pipeline.

pub mod cli;

pub use cli::{Cli, CliContext, Commands};
