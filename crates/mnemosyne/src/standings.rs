//! `result.csv`: standings entries for the system-test set.
//!
//! The file starts with a header line; entries are inserted right below it,
//! so the newest submission is always on line 2.

use std::fs;
use std::io::Write;
use std::path::Path;

use agon_common::{RankDirection, Score};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{HistoryError, HistoryResult};
use crate::history::{parse_scores, read_optional};
use crate::table::ScoreTable;
use crate::MAX_HISTORY_REF_SIZE;

#[derive(Debug, Clone)]
pub struct StandingsLog {
    labels: Vec<String>,
    table: ScoreTable,
}

impl StandingsLog {
    pub fn empty(test_count: usize, direction: RankDirection) -> Self {
        Self {
            labels: Vec::new(),
            table: ScoreTable::new(test_count, direction),
        }
    }

    /// Write the header if the file does not exist yet.
    pub fn ensure_header(
        path: &Path,
        direction: RankDirection,
        rel_eval: bool,
        visualizer_url: &str,
    ) -> HistoryResult<bool> {
        if path.exists() {
            return Ok(false);
        }
        let header = format!("{},{},{}\n", direction.header_label(), rel_eval, visualizer_url);
        fs::write(path, header).map_err(|e| HistoryError::io(path, e))?;
        Ok(true)
    }

    /// Insert a submission line directly after the header.
    pub fn insert(path: &Path, sequence: u64, comment: &str, scores: &[Score]) -> HistoryResult<()> {
        let content = read_optional(path)?.unwrap_or_default();
        let mut lines: Vec<&str> = content.lines().collect();

        let mut entry = format!("{:04}:{},", sequence, comment);
        for score in scores {
            entry.push_str(&score.to_string());
            entry.push(',');
        }
        lines.insert(lines.len().min(1), entry.as_str());

        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut tmp = NamedTempFile::new_in(dir).map_err(|e| HistoryError::io(dir, e))?;
        for line in &lines {
            writeln!(tmp, "{}", line).map_err(|e| HistoryError::io(tmp.path(), e))?;
        }
        tmp.persist(path).map_err(|source| HistoryError::Persist {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(())
    }

    /// Load the newest `MAX_HISTORY_REF_SIZE` submissions.
    pub fn load(path: &Path, test_count: usize, direction: RankDirection) -> HistoryResult<Self> {
        let mut log = Self::empty(test_count, direction);
        let content = match read_optional(path)? {
            Some(content) => content,
            None => return Ok(log),
        };

        let mut rows: Vec<(String, Vec<Score>)> = Vec::new();
        for (index, line) in content.lines().enumerate().skip(1) {
            if line.trim().is_empty() {
                continue;
            }
            if rows.len() == MAX_HISTORY_REF_SIZE {
                break;
            }
            let mut fields = line.split(',');
            let label = fields.next().unwrap_or_default();
            if !label.contains(':') {
                return Err(HistoryError::Malformed {
                    path: path.to_path_buf(),
                    line: index + 1,
                    reason: format!("expected `sequence:comment`, got `{}`", label),
                });
            }
            rows.push((label.to_string(), parse_scores(fields)));
        }

        // file order is newest first
        for (label, scores) in rows.into_iter().rev() {
            log.labels.push(label);
            log.table.push_row(scores);
        }

        debug!(path = %path.display(), entries = log.labels.len(), "Loaded standings");
        Ok(log)
    }

    pub fn table(&self) -> &ScoreTable {
        &self.table
    }

    /// `sequence:comment` labels, oldest first.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_header_written_once() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("result.csv");

        assert!(StandingsLog::ensure_header(&path, RankDirection::Minimize, false, "http://vis").unwrap());
        assert!(!StandingsLog::ensure_header(&path, RankDirection::Maximize, true, "").unwrap());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "rank_min,false,http://vis\n");
    }

    #[test]
    fn test_insert_places_newest_on_second_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("result.csv");
        StandingsLog::ensure_header(&path, RankDirection::Minimize, false, "").unwrap();

        StandingsLog::insert(&path, 0, "first", &[10, 20]).unwrap();
        StandingsLog::insert(&path, 1, "second", &[8, 25]).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "rank_min,false,");
        assert_eq!(lines[1], "0001:second,8,25,");
        assert_eq!(lines[2], "0000:first,10,20,");
    }

    #[test]
    fn test_load_orders_oldest_first() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("result.csv");
        StandingsLog::ensure_header(&path, RankDirection::Minimize, false, "").unwrap();
        StandingsLog::insert(&path, 0, "first", &[10, 20]).unwrap();
        StandingsLog::insert(&path, 1, "second", &[8, 25]).unwrap();

        let log = StandingsLog::load(&path, 2, RankDirection::Minimize).unwrap();
        assert_eq!(log.labels(), &["0000:first".to_string(), "0001:second".to_string()]);
        assert_eq!(log.table().last(0), Some(8));
        assert_eq!(log.table().best(1), Some(20));
        assert_eq!(log.table().rank(9, 0), 2);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        let log = StandingsLog::load(&dir.path().join("result.csv"), 4, RankDirection::Minimize).unwrap();
        assert!(log.is_empty());
        assert_eq!(log.table().best(0), None);
    }

    #[test]
    fn test_load_rejects_unlabelled_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("result.csv");
        std::fs::write(&path, "rank_min,false,\n12,13,\n").unwrap();
        let err = StandingsLog::load(&path, 2, RankDirection::Minimize).unwrap_err();
        assert!(matches!(err, HistoryError::Malformed { line: 2, .. }));
    }
}
