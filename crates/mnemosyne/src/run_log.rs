//! `run.csv`: one summary line per run.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use agon_common::RunSummary;

use crate::error::{HistoryError, HistoryResult};
use crate::history::read_optional;

pub fn append(path: &Path, summary: &RunSummary) -> HistoryResult<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| HistoryError::io(path, e))?;
    writeln!(file, "{}", summary.to_log_line()).map_err(|e| HistoryError::io(path, e))
}

/// Raw lines of the run log, oldest first.
pub fn read_lines(path: &Path) -> HistoryResult<Vec<String>> {
    Ok(read_optional(path)?
        .unwrap_or_default()
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(str::to_string)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_append_summaries() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run.csv");

        append(&path, &RunSummary::from_scores("10/17 10:00:00", "a", &[100, 200, 0])).unwrap();
        append(&path, &RunSummary::from_scores("10/17 10:05:00", "", &[])).unwrap();

        let lines = read_lines(&path).unwrap();
        assert_eq!(lines, vec![
            "10/17 10:00:00,a,2,1,300,141,150".to_string(),
            "10/17 10:05:00,,0,0,0,0,0".to_string(),
        ]);
    }
}
