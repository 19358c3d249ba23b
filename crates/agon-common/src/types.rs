//! Domain types used across the harness.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Test case ID type
pub type TestId = usize;

/// Score reported by the judge. Non-positive values mean no result.
pub type Score = i64;

/// Whether a score is a real measurement.
pub fn is_valid_score(score: Score) -> bool {
    score > 0
}

/// Zero-padded four digit label used for input files and log entries.
pub fn format_test_id(id: TestId) -> String {
    format!("{:04}", id)
}

/// Which end of the score range wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankDirection {
    /// Smaller scores are better
    #[default]
    Minimize,
    /// Larger scores are better
    Maximize,
}

impl RankDirection {
    pub fn from_rank_min(rank_min: bool) -> Self {
        if rank_min {
            RankDirection::Minimize
        } else {
            RankDirection::Maximize
        }
    }

    /// True when `a` is strictly better than `b`.
    pub fn is_better(self, a: Score, b: Score) -> bool {
        match self {
            RankDirection::Minimize => a < b,
            RankDirection::Maximize => a > b,
        }
    }

    /// The better of two scores.
    pub fn optimum(self, a: Score, b: Score) -> Score {
        if self.is_better(b, a) { b } else { a }
    }

    /// Label written into the standings header.
    pub fn header_label(self) -> &'static str {
        match self {
            RankDirection::Minimize => "rank_min",
            RankDirection::Maximize => "rank_max",
        }
    }
}

impl fmt::Display for RankDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RankDirection::Minimize => write!(f, "minimize"),
            RankDirection::Maximize => write!(f, "maximize"),
        }
    }
}

/// One input scenario of a test set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    pub id: TestId,
    pub input_path: PathBuf,
    pub seed: Option<String>,
    /// Tokens from the first line of the input file
    pub params: Vec<String>,
}

impl TestCase {
    pub fn label(&self) -> String {
        format_test_id(self.id)
    }
}

/// Outcome of one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub test_id: TestId,
    pub score: Score,
}

impl ScoreRecord {
    pub fn new(test_id: TestId, score: Score) -> Self {
        Self { test_id, score }
    }

    pub fn failed(test_id: TestId) -> Self {
        Self { test_id, score: 0 }
    }

    pub fn is_valid(&self) -> bool {
        is_valid_score(self.score)
    }
}

/// Score change of one test against a baseline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DeltaRecord {
    pub test_id: TestId,
    pub old_score: Score,
    pub new_score: Score,
    pub ratio_percent: f64,
}

impl DeltaRecord {
    /// `old_score` must be a valid score.
    pub fn new(test_id: TestId, old_score: Score, new_score: Score) -> Self {
        let ratio_percent = (new_score - old_score) as f64 * 100.0 / old_score as f64;
        Self {
            test_id,
            old_score,
            new_score,
            ratio_percent,
        }
    }
}

impl fmt::Display for DeltaRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}->{}({:+.1}%)",
            format_test_id(self.test_id),
            self.old_score,
            self.new_score,
            self.ratio_percent
        )
    }
}

/// Pass/fail counts and means over a set of scores.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ScoreStats {
    pub ok_count: usize,
    pub ng_count: usize,
    pub score_sum: i64,
    pub log_score_sum: f64,
}

impl ScoreStats {
    pub fn from_scores(scores: &[Score]) -> Self {
        let mut stats = Self::default();
        for &score in scores {
            stats.add(score);
        }
        stats
    }

    pub fn add(&mut self, score: Score) {
        if is_valid_score(score) {
            self.ok_count += 1;
            self.score_sum += score;
            self.log_score_sum += (score as f64).ln();
        } else {
            self.ng_count += 1;
        }
    }

    pub fn geometric_mean(&self) -> i64 {
        if self.ok_count == 0 {
            return 0;
        }
        (self.log_score_sum / self.ok_count as f64).exp().round() as i64
    }

    pub fn arithmetic_mean(&self) -> i64 {
        if self.ok_count == 0 {
            return 0;
        }
        self.score_sum / self.ok_count as i64
    }
}

/// One row of the run log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub timestamp: String,
    pub comment: String,
    pub ok_count: usize,
    pub ng_count: usize,
    pub score_sum: i64,
    pub geometric_mean: i64,
    pub arithmetic_mean: i64,
}

impl RunSummary {
    pub fn from_scores(timestamp: impl Into<String>, comment: impl Into<String>, scores: &[Score]) -> Self {
        let stats = ScoreStats::from_scores(scores);
        Self {
            timestamp: timestamp.into(),
            comment: comment.into(),
            ok_count: stats.ok_count,
            ng_count: stats.ng_count,
            score_sum: stats.score_sum,
            geometric_mean: stats.geometric_mean(),
            arithmetic_mean: stats.arithmetic_mean(),
        }
    }

    /// `timestamp,comment,ok,ng,sum,gm,am`
    pub fn to_log_line(&self) -> String {
        format!(
            "{},{},{},{},{},{},{}",
            self.timestamp,
            self.comment,
            self.ok_count,
            self.ng_count,
            self.score_sum,
            self.geometric_mean,
            self.arithmetic_mean
        )
    }
}

/// One row of the history log: a full score vector of a logged run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    pub timestamp: String,
    pub sequence: u64,
    pub comment: String,
    pub scores: Vec<Score>,
}

impl HistoryEntry {
    /// `timestamp,NNNN,comment,s0,s1,...,` with the trailing comma other tools expect.
    pub fn to_log_line(&self) -> String {
        let mut line = format!("{},{:04},{},", self.timestamp, self.sequence, self.comment);
        for score in &self.scores {
            line.push_str(&score.to_string());
            line.push(',');
        }
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_direction() {
        let min = RankDirection::Minimize;
        let max = RankDirection::Maximize;
        assert!(min.is_better(90, 100));
        assert!(!min.is_better(100, 100));
        assert!(max.is_better(110, 100));
        assert_eq!(min.optimum(100, 90), 90);
        assert_eq!(max.optimum(100, 90), 100);
        assert_eq!(RankDirection::from_rank_min(false), max);
    }

    #[test]
    fn test_stats_from_scores() {
        let stats = ScoreStats::from_scores(&[100, 200, 0]);
        assert_eq!(stats.ok_count, 2);
        assert_eq!(stats.ng_count, 1);
        assert_eq!(stats.score_sum, 300);
        assert_eq!(stats.geometric_mean(), 141);
        assert_eq!(stats.arithmetic_mean(), 150);
    }

    #[test]
    fn test_stats_empty() {
        let stats = ScoreStats::from_scores(&[0, -1]);
        assert_eq!(stats.ok_count, 0);
        assert_eq!(stats.geometric_mean(), 0);
        assert_eq!(stats.arithmetic_mean(), 0);
    }

    #[test]
    fn test_delta_record() {
        let delta = DeltaRecord::new(3, 100, 90);
        assert!((delta.ratio_percent + 10.0).abs() < 1e-9);
        assert_eq!(delta.to_string(), "[0003] 100->90(-10.0%)");
    }

    #[test]
    fn test_summary_line() {
        let summary = RunSummary::from_scores("10/17 12:00:00", "greedy", &[100, 200, 0]);
        assert_eq!(summary.to_log_line(), "10/17 12:00:00,greedy,2,1,300,141,150");
    }

    #[test]
    fn test_summary_json() {
        let summary = RunSummary::from_scores("10/17 12:00:00", "greedy", &[100, 200, 0]);
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["geometric_mean"], 141);
        assert_eq!(json["ng_count"], 1);
        assert_eq!(json["comment"], "greedy");
    }

    #[test]
    fn test_history_line() {
        let entry = HistoryEntry {
            timestamp: "10/17 12:00:00".into(),
            sequence: 7,
            comment: "sa".into(),
            scores: vec![5, -1, 8],
        };
        assert_eq!(entry.to_log_line(), "10/17 12:00:00,0007,sa,5,-1,8,");
    }
}
