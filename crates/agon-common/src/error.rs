//! Error type shared across agon crates.

use thiserror::Error;

/// Errors that cross crate boundaries.
#[derive(Error, Debug)]
pub enum AgonError {
    /// Configuration could not be read or is inconsistent
    #[error("Configuration error: {0}")]
    Config(String),

    /// A test input file does not exist
    #[error("Input file not found: {0}")]
    InputMissing(String),

    /// No usable score line in process output
    #[error("Score parse error: {0}")]
    ScoreParse(String),

    /// Subprocess could not be spawned or awaited
    #[error("Process error: {0}")]
    Process(String),

    /// Log file is malformed
    #[error("History error: {0}")]
    History(String),

    /// File I/O error
    #[error("File error: {0}")]
    File(#[from] std::io::Error),
}

impl AgonError {
    /// Whether this error aborts the whole run rather than a single task.
    pub fn is_fatal(&self) -> bool {
        matches!(self, AgonError::Config(_) | AgonError::History(_))
    }
}

/// Result type alias using AgonError
pub type AgonResult<T> = Result<T, AgonError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatality() {
        assert!(AgonError::Config("bad".into()).is_fatal());
        assert!(!AgonError::InputMissing("0001.txt".into()).is_fatal());
        assert!(!AgonError::ScoreParse("no marker".into()).is_fatal());
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: AgonError = io.into();
        assert_eq!(err.to_string(), "File error: gone");
    }
}
