//! Subcommand implementations

pub mod log;
pub mod run;
