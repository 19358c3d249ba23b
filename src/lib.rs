//! Agon - Optimization Contest Benchmark Harness
//!
//! Runs a contest solution over a catalog of test inputs, scores each case
//! with the judge, and keeps a history of results to compare and rank
//! submissions against.
//!
//! # Architecture
//!
//! - **agon-common**: shared score types and statistics
//! - **nike**: score parsing, process execution, worker pool, live display
//! - **mnemosyne**: run/history/standings logs and baselines
//! - **commands**: the `run` and `log` subcommands wiring them together

pub mod catalog;
pub mod commands;
pub mod config;
pub mod constants;
pub mod filter;

// Re-export commonly used types
pub use catalog::TestCatalog;
pub use config::{ConfigError, ContestConfig};
pub use filter::Filter;
