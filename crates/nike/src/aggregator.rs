//! Running statistics over the tasks of one run.

use agon_common::{DeltaRecord, RankDirection, Score, ScoreRecord, ScoreStats, TestId};
use mnemosyne::BaselineProvider;

/// Number of percentage-delta buckets.
pub const HISTOGRAM_BUCKETS: usize = 13;

/// Entries kept in each top-k delta list.
pub const TOP_DELTAS: usize = 3;

/// Column labels matching [`bucket_index`].
pub const BUCKET_LABELS: [&str; HISTOGRAM_BUCKETS] = [
    "-160", "-80", "-40", "-20", "-10", "<0", "0", "+10", "+20", "+40", "+80", "+160", ">160",
];

/// Bucket of a percentage delta.
///
/// Buckets are `(-inf,-160] (-160,-80] (-80,-40] (-40,-20] (-20,-10] (-10,0) {0}
/// (0,10] (10,20] (20,40] (40,80] (80,160] (160,+inf)`.
pub fn bucket_index(delta: f64) -> usize {
    if delta <= -160.0 {
        0
    } else if delta <= -80.0 {
        1
    } else if delta <= -40.0 {
        2
    } else if delta <= -20.0 {
        3
    } else if delta <= -10.0 {
        4
    } else if delta < 0.0 {
        5
    } else if delta == 0.0 {
        6
    } else if delta <= 10.0 {
        7
    } else if delta <= 20.0 {
        8
    } else if delta <= 40.0 {
        9
    } else if delta <= 80.0 {
        10
    } else if delta <= 160.0 {
        11
    } else {
        12
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeltaHistogram {
    counts: [u64; HISTOGRAM_BUCKETS],
}

impl DeltaHistogram {
    pub fn record(&mut self, delta: f64) {
        self.counts[bucket_index(delta)] += 1;
    }

    pub fn counts(&self) -> &[u64; HISTOGRAM_BUCKETS] {
        &self.counts
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaOrder {
    /// Largest ratio first
    Increase,
    /// Most negative ratio first
    Decrease,
}

/// Fixed-capacity list of the most extreme deltas.
///
/// Insertion keeps the list sorted; an entry equal to an existing one goes after it.
#[derive(Debug, Clone)]
pub struct TopDeltas {
    order: DeltaOrder,
    items: Vec<DeltaRecord>,
}

impl TopDeltas {
    pub fn new(order: DeltaOrder) -> Self {
        Self {
            order,
            items: Vec::with_capacity(TOP_DELTAS + 1),
        }
    }

    pub fn insert(&mut self, record: DeltaRecord) {
        let pos = self
            .items
            .iter()
            .position(|existing| self.outranks(&record, existing))
            .unwrap_or(self.items.len());
        if pos >= TOP_DELTAS {
            return;
        }
        self.items.insert(pos, record);
        self.items.truncate(TOP_DELTAS);
    }

    fn outranks(&self, a: &DeltaRecord, b: &DeltaRecord) -> bool {
        match self.order {
            DeltaOrder::Increase => a.ratio_percent > b.ratio_percent,
            DeltaOrder::Decrease => a.ratio_percent < b.ratio_percent,
        }
    }

    pub fn items(&self) -> &[DeltaRecord] {
        &self.items
    }

    pub fn order(&self) -> DeltaOrder {
        self.order
    }
}

/// Histogram and top lists against one baseline.
#[derive(Debug, Clone)]
pub struct Comparison {
    pub histogram: DeltaHistogram,
    pub increases: TopDeltas,
    pub decreases: TopDeltas,
}

impl Default for Comparison {
    fn default() -> Self {
        Self {
            histogram: DeltaHistogram::default(),
            increases: TopDeltas::new(DeltaOrder::Increase),
            decreases: TopDeltas::new(DeltaOrder::Decrease),
        }
    }
}

impl Comparison {
    fn record(&mut self, test_id: TestId, baseline: Option<Score>, score: Score) {
        // baselines are only ever valid scores, so the ratio is finite
        let Some(old) = baseline else {
            return;
        };
        let delta = DeltaRecord::new(test_id, old, score);
        self.histogram.record(delta.ratio_percent);
        if delta.ratio_percent > 0.0 {
            self.increases.insert(delta);
        } else if delta.ratio_percent < 0.0 {
            self.decreases.insert(delta);
        }
    }
}

/// Aggregate state of a run. Callers serialize access.
#[derive(Debug, Clone)]
pub struct ScoreAggregator {
    direction: RankDirection,
    best_per_test: Vec<Option<Score>>,
    stats: ScoreStats,
    failed: Vec<TestId>,
    vs_last: Comparison,
    vs_best: Comparison,
}

impl ScoreAggregator {
    pub fn new(test_count: usize, direction: RankDirection) -> Self {
        Self {
            direction,
            best_per_test: vec![None; test_count],
            stats: ScoreStats::default(),
            failed: Vec::new(),
            vs_last: Comparison::default(),
            vs_best: Comparison::default(),
        }
    }

    /// Fold one finished task into the aggregate.
    pub fn record(&mut self, record: ScoreRecord, baselines: &BaselineProvider) {
        let ScoreRecord { test_id, score } = record;
        self.stats.add(score);
        if !record.is_valid() {
            self.failed.push(test_id);
            return;
        }

        if let Some(slot) = self.best_per_test.get_mut(test_id) {
            *slot = Some(match *slot {
                Some(current) => self.direction.optimum(current, score),
                None => score,
            });
        }

        self.vs_last.record(test_id, baselines.last(test_id), score);
        self.vs_best.record(test_id, baselines.best(test_id), score);
    }

    pub fn direction(&self) -> RankDirection {
        self.direction
    }

    pub fn stats(&self) -> &ScoreStats {
        &self.stats
    }

    pub fn ok_count(&self) -> usize {
        self.stats.ok_count
    }

    pub fn ng_count(&self) -> usize {
        self.stats.ng_count
    }

    pub fn geometric_mean(&self) -> i64 {
        self.stats.geometric_mean()
    }

    pub fn arithmetic_mean(&self) -> i64 {
        self.stats.arithmetic_mean()
    }

    pub fn best(&self, test_id: TestId) -> Option<Score> {
        self.best_per_test.get(test_id).copied().flatten()
    }

    /// Retained score per test, 0 where no task produced a valid score.
    pub fn final_scores(&self) -> Vec<Score> {
        self.best_per_test.iter().map(|s| s.unwrap_or(0)).collect()
    }

    /// Failed test ids in completion order.
    pub fn failed(&self) -> &[TestId] {
        &self.failed
    }

    /// The `n` most recent failures, sorted by id.
    pub fn recent_failures(&self, n: usize) -> Vec<TestId> {
        let start = self.failed.len().saturating_sub(n);
        let mut recent = self.failed[start..].to_vec();
        recent.sort_unstable();
        recent
    }

    pub fn vs_last(&self) -> &Comparison {
        &self.vs_last
    }

    pub fn vs_best(&self) -> &Comparison {
        &self.vs_best
    }
}
