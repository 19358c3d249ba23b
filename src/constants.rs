//! Application-wide constants
//!
//! Defaults and well-known names used by the CLI.

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Contest configuration file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "contest.toml";

/// Environment variable overriding the configuration file path
pub const CONFIG_FILE_ENV: &str = "CONTEST_CONFIG_FILE";

/// Environment variable overriding the worker count
pub const WORKERS_ENV: &str = "AGON_WORKERS";

/// Default number of concurrent workers
pub const DEFAULT_WORKERS: usize = 1;

/// Default tracing filter when `RUST_LOG` is unset
pub const DEFAULT_LOG_FILTER: &str = "agon=info,nike=warn,mnemosyne=warn";

// =============================================================================
// TEST DATA
// =============================================================================

/// Seed list inside a test set directory
pub const SEEDS_FILE: &str = "seeds.txt";

/// Input file extension
pub const INPUT_EXTENSION: &str = "txt";

// =============================================================================
// LOG COMMAND
// =============================================================================

/// History entries listed by `agon log`
pub const HISTORY_LIST_SIZE: usize = 30;

/// Alias selecting the best-known score vector
pub const BEST_ALIAS: &str = "best";
