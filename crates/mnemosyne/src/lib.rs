//! Mnemosyne - score history and ranking.
//!
//! Append-only log files recording every run of the harness:
//!
//! - `run.csv`: one summary line per run
//! - `history.csv`: the full score vector of each commented run
//! - `result.csv`: standings entries, newest first below a header
//!
//! Baselines for delta display and rank queries are derived from these files
//! through [`BaselineProvider`].

pub mod baseline;
pub mod error;
pub mod history;
pub mod layout;
pub mod run_log;
pub mod standings;
pub mod table;

pub use baseline::BaselineProvider;
pub use error::{HistoryError, HistoryResult};
pub use history::HistoryLog;
pub use layout::LogLayout;
pub use standings::StandingsLog;
pub use table::ScoreTable;

/// Number of most recent entries consulted for best scores and ranks.
pub const MAX_HISTORY_REF_SIZE: usize = 10_000;

/// Timestamp in the `MM/DD hh:mm:ss` form used by every log file.
pub fn log_timestamp<Tz>(at: &chrono::DateTime<Tz>) -> String
where
    Tz: chrono::TimeZone,
    Tz::Offset: std::fmt::Display,
{
    at.format("%m/%d %H:%M:%S").to_string()
}

/// Current local time as a log timestamp.
pub fn now_timestamp() -> String {
    log_timestamp(&chrono::Local::now())
}
