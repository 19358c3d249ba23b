//! Baseline scores a run is compared against.

use agon_common::{RankDirection, Score, TestId};

use crate::error::HistoryResult;
use crate::history::HistoryLog;
use crate::layout::LogLayout;
use crate::standings::StandingsLog;
use crate::table::ScoreTable;

/// Source of "last" and "best" scores for a test set.
///
/// The last run always comes from the local history. Best scores and ranks come
/// from the local history, or from the standings file for system-test sets.
#[derive(Debug, Clone)]
pub enum BaselineProvider {
    Local(HistoryLog),
    SystemTest {
        history: HistoryLog,
        standings: StandingsLog,
    },
}

impl BaselineProvider {
    /// No history at all.
    pub fn empty(test_count: usize, direction: RankDirection) -> Self {
        BaselineProvider::Local(HistoryLog::empty(test_count, direction))
    }

    pub fn load(
        layout: &LogLayout,
        test_count: usize,
        direction: RankDirection,
        system_test: bool,
    ) -> HistoryResult<Self> {
        let history = HistoryLog::load(&layout.history_log(), test_count, direction)?;
        if !system_test {
            return Ok(BaselineProvider::Local(history));
        }
        let standings = StandingsLog::load(&layout.results(), test_count, direction)?;
        Ok(BaselineProvider::SystemTest { history, standings })
    }

    pub fn history(&self) -> &HistoryLog {
        match self {
            BaselineProvider::Local(history) => history,
            BaselineProvider::SystemTest { history, .. } => history,
        }
    }

    /// Table used for best scores and ranks. An empty standings file falls back to local history.
    pub fn reference(&self) -> &ScoreTable {
        match self {
            BaselineProvider::Local(history) => history.table(),
            BaselineProvider::SystemTest { history, standings } => {
                if standings.is_empty() {
                    history.table()
                } else {
                    standings.table()
                }
            }
        }
    }

    pub fn last(&self, test_id: TestId) -> Option<Score> {
        self.history().last_score(test_id)
    }

    pub fn best(&self, test_id: TestId) -> Option<Score> {
        self.reference().best(test_id)
    }

    pub fn rank(&self, score: Score, test_id: TestId) -> usize {
        self.reference().rank(score, test_id)
    }

    /// Number of retained entries the rank is taken among, counting the current run.
    pub fn field_size(&self) -> usize {
        self.reference().len() + 1
    }

    pub fn direction(&self) -> RankDirection {
        self.reference().direction()
    }
}
