//! Per-invocation state shared by the workers of a run.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use agon_common::{TestCase, TestId};
use mnemosyne::BaselineProvider;

use tracing::{debug, warn};

use crate::aggregator::ScoreAggregator;
use crate::display::{Frame, LiveDisplay};
use crate::executor::{ExecutionOutcome, Executor};

/// Pool sizing for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSettings {
    /// Number of concurrent workers
    pub workers: usize,
    /// How many times every test id is executed
    pub repetitions: usize,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            workers: 1,
            repetitions: 1,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
    pub started: Instant,
}

impl Progress {
    pub fn new(total: usize) -> Self {
        Self {
            completed: 0,
            total,
            started: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

/// Everything mutated by workers. Guarded by one lock in [`RunContext`].
pub struct RunState {
    pub aggregator: ScoreAggregator,
    pub progress: Progress,
    /// Test id currently executing in each worker slot
    pub executing: Vec<Option<TestId>>,
    display: LiveDisplay,
}

impl RunState {
    fn refresh(&mut self, force: bool) -> bool {
        let frame = Frame {
            aggregator: &self.aggregator,
            progress: &self.progress,
            executing: &self.executing,
        };
        self.display.refresh(&frame, force)
    }

    pub fn display(&self) -> &LiveDisplay {
        &self.display
    }

    /// Failures go to the log only when no frame shows them; log lines would break the redraw.
    pub fn logs_failures(&self) -> bool {
        !self.display.is_drawing()
    }
}

/// Inputs and shared state of one run, handed to every worker.
pub struct RunContext {
    cases: Vec<TestCase>,
    baselines: BaselineProvider,
    executor: Arc<dyn Executor>,
    settings: RunSettings,
    state: Mutex<RunState>,
    shutdown: Arc<AtomicBool>,
}

impl RunContext {
    pub fn new(
        cases: Vec<TestCase>,
        baselines: BaselineProvider,
        executor: Arc<dyn Executor>,
        settings: RunSettings,
        display: LiveDisplay,
    ) -> Self {
        let test_count = cases.iter().map(|c| c.id + 1).max().unwrap_or(0);
        let workers = settings.workers.max(1);
        let state = RunState {
            aggregator: ScoreAggregator::new(test_count, baselines.direction()),
            progress: Progress::new(0),
            executing: vec![None; workers],
            display,
        };
        Self {
            cases,
            baselines,
            executor,
            settings: RunSettings { workers, ..settings },
            state: Mutex::new(state),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn case(&self, test_id: TestId) -> Option<&TestCase> {
        self.cases
            .get(test_id)
            .filter(|c| c.id == test_id)
            .or_else(|| self.cases.iter().find(|c| c.id == test_id))
    }

    pub fn cases(&self) -> &[TestCase] {
        &self.cases
    }

    pub fn baselines(&self) -> &BaselineProvider {
        &self.baselines
    }

    pub fn executor(&self) -> &dyn Executor {
        self.executor.as_ref()
    }

    pub fn settings(&self) -> RunSettings {
        self.settings
    }

    /// Flag that stops workers from taking further tasks once set.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    pub fn lock_state(&self) -> MutexGuard<'_, RunState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn into_state(self) -> RunState {
        self.state.into_inner().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn start(&self, total: usize) {
        let mut state = self.lock_state();
        state.progress = Progress::new(total);
        state.refresh(true);
    }

    pub(crate) fn begin(&self, slot: usize, test_id: TestId) {
        if let Some(entry) = self.lock_state().executing.get_mut(slot) {
            *entry = Some(test_id);
        }
    }

    /// Record a finished task and attempt a redraw, all under one lock.
    pub(crate) fn complete(&self, slot: usize, outcome: &ExecutionOutcome) {
        let mut state = self.lock_state();
        if let Some(e) = &outcome.error {
            if state.logs_failures() {
                warn!(test = outcome.test_id, error = %e, "Task failed");
            } else {
                debug!(test = outcome.test_id, error = %e, "Task failed");
            }
        }
        state.aggregator.record(outcome.record(), &self.baselines);
        state.progress.completed += 1;
        if let Some(entry) = state.executing.get_mut(slot) {
            *entry = None;
        }
        state.refresh(false);
    }

    pub(crate) fn finish(&self) {
        self.lock_state().refresh(true);
    }
}
