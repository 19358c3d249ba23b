//! `history.csv`: one full score vector per logged run.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use agon_common::{HistoryEntry, RankDirection, Score, TestId};
use tracing::debug;

use crate::error::{HistoryError, HistoryResult};
use crate::table::ScoreTable;
use crate::MAX_HISTORY_REF_SIZE;

/// Header fields of a retained history line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    pub timestamp: String,
    pub sequence: u64,
    pub comment: String,
}

/// The retained tail of the history log.
#[derive(Debug, Clone)]
pub struct HistoryLog {
    entries: Vec<EntryInfo>,
    table: ScoreTable,
}

impl HistoryLog {
    pub fn empty(test_count: usize, direction: RankDirection) -> Self {
        Self {
            entries: Vec::new(),
            table: ScoreTable::new(test_count, direction),
        }
    }

    /// Load the most recent `MAX_HISTORY_REF_SIZE` entries. A missing file is an empty history.
    pub fn load(path: &Path, test_count: usize, direction: RankDirection) -> HistoryResult<Self> {
        let mut log = Self::empty(test_count, direction);
        let content = match read_optional(path)? {
            Some(content) => content,
            None => return Ok(log),
        };

        let lines: Vec<(usize, &str)> = content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .collect();
        let skip = lines.len().saturating_sub(MAX_HISTORY_REF_SIZE);

        for &(index, line) in &lines[skip..] {
            let (info, scores) = parse_line(line).map_err(|reason| HistoryError::Malformed {
                path: path.to_path_buf(),
                line: index + 1,
                reason,
            })?;
            log.entries.push(info);
            log.table.push_row(scores);
        }

        debug!(path = %path.display(), entries = log.entries.len(), "Loaded history");
        Ok(log)
    }

    /// Append one entry as a new line.
    pub fn append(path: &Path, entry: &HistoryEntry) -> HistoryResult<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| HistoryError::io(path, e))?;
        writeln!(file, "{}", entry.to_log_line()).map_err(|e| HistoryError::io(path, e))
    }

    /// Sequence number for the next entry: the counter of the last line plus one, or 0.
    pub fn next_sequence(path: &Path) -> HistoryResult<u64> {
        let content = match read_optional(path)? {
            Some(content) => content,
            None => return Ok(0),
        };
        let Some((index, last)) = content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .last()
        else {
            return Ok(0);
        };

        let (info, _) = parse_line(last).map_err(|reason| HistoryError::Malformed {
            path: path.to_path_buf(),
            line: index + 1,
            reason,
        })?;
        Ok(info.sequence + 1)
    }

    pub fn table(&self) -> &ScoreTable {
        &self.table
    }

    pub fn entries(&self) -> &[EntryInfo] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Index of the retained entry with the given sequence number.
    pub fn position(&self, sequence: u64) -> Option<usize> {
        self.entries.iter().rposition(|e| e.sequence == sequence)
    }

    pub fn scores(&self, index: usize) -> Option<&[Score]> {
        self.table.row(index)
    }

    pub fn last_score(&self, test_id: TestId) -> Option<Score> {
        self.table.last(test_id)
    }
}

pub(crate) fn read_optional(path: &Path) -> HistoryResult<Option<String>> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(HistoryError::io(path, e)),
    }
}

/// Unparseable score fields count as no result.
pub(crate) fn parse_scores<'a>(fields: impl Iterator<Item = &'a str>) -> Vec<Score> {
    let mut fields: Vec<&str> = fields.map(str::trim).collect();
    // trailing comma
    if fields.last().is_some_and(|f| f.is_empty()) {
        fields.pop();
    }
    fields
        .into_iter()
        .map(|field| field.parse().unwrap_or(0))
        .collect()
}

fn parse_line(line: &str) -> Result<(EntryInfo, Vec<Score>), String> {
    let mut fields = line.split(',');
    let timestamp = fields.next().unwrap_or_default().to_string();
    let sequence = fields
        .next()
        .ok_or_else(|| "missing sequence field".to_string())?
        .trim()
        .parse::<u64>()
        .map_err(|e| format!("invalid sequence: {}", e))?;
    let comment = fields
        .next()
        .ok_or_else(|| "missing comment field".to_string())?
        .to_string();

    Ok((
        EntryInfo {
            timestamp,
            sequence,
            comment,
        },
        parse_scores(fields),
    ))
}
