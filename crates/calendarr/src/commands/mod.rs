//! Subcommand implementations.

pub mod config;
pub mod once;
pub mod preview;
pub mod run;
