//! In-memory score vectors with best-score and rank queries.

use agon_common::{RankDirection, Score, TestId, is_valid_score};

/// Retained score vectors, oldest first, each padded to `test_count`.
#[derive(Debug, Clone)]
pub struct ScoreTable {
    direction: RankDirection,
    test_count: usize,
    rows: Vec<Vec<Score>>,
    best: Vec<Option<Score>>,
}

impl ScoreTable {
    pub fn new(test_count: usize, direction: RankDirection) -> Self {
        Self {
            direction,
            test_count,
            rows: Vec::new(),
            best: vec![None; test_count],
        }
    }

    /// Build from rows in chronological order.
    pub fn from_rows<I>(rows: I, test_count: usize, direction: RankDirection) -> Self
    where
        I: IntoIterator<Item = Vec<Score>>,
    {
        let mut table = Self::new(test_count, direction);
        for row in rows {
            table.push_row(row);
        }
        table
    }

    /// Append a row, padding missing tests with 0 and dropping extra columns.
    pub fn push_row(&mut self, mut row: Vec<Score>) {
        row.resize(self.test_count, 0);
        for (slot, &score) in self.best.iter_mut().zip(&row) {
            if !is_valid_score(score) {
                continue;
            }
            *slot = Some(match *slot {
                Some(current) => self.direction.optimum(current, score),
                None => score,
            });
        }
        self.rows.push(row);
    }

    pub fn direction(&self) -> RankDirection {
        self.direction
    }

    pub fn test_count(&self) -> usize {
        self.test_count
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row(&self, index: usize) -> Option<&[Score]> {
        self.rows.get(index).map(Vec::as_slice)
    }

    /// Best valid score ever seen for a test.
    pub fn best(&self, test_id: TestId) -> Option<Score> {
        self.best.get(test_id).copied().flatten()
    }

    pub fn best_scores(&self) -> &[Option<Score>] {
        &self.best
    }

    /// Score of the newest row, if it is valid.
    pub fn last(&self, test_id: TestId) -> Option<Score> {
        self.rows
            .last()
            .and_then(|row| row.get(test_id).copied())
            .filter(|&score| is_valid_score(score))
    }

    /// 1-based position of `score` among the retained valid scores of a test.
    ///
    /// Ties share the better position: only strictly better entries push the rank down.
    pub fn rank(&self, score: Score, test_id: TestId) -> usize {
        let better = self
            .rows
            .iter()
            .filter_map(|row| row.get(test_id).copied())
            .filter(|&past| is_valid_score(past) && self.direction.is_better(past, score))
            .count();
        better + 1
    }
}
