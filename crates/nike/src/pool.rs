//! Fixed-size worker pool over a bounded task queue.

use std::sync::Arc;

use agon_common::TestId;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::context::RunContext;
use crate::executor::{ExecError, ExecutionOutcome};

/// One execution of one test case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Task {
    pub test_id: TestId,
    pub repetition: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolReport {
    pub completed: usize,
    /// Tasks left in the queue after a shutdown request
    pub cancelled: usize,
}

pub struct WorkerPool {
    ctx: Arc<RunContext>,
}

impl WorkerPool {
    pub fn new(ctx: Arc<RunContext>) -> Self {
        Self { ctx }
    }

    /// Every test id once per repetition, repetition-major.
    pub fn tasks(test_ids: &[TestId], repetitions: usize) -> Vec<Task> {
        (0..repetitions.max(1))
            .flat_map(|repetition| {
                test_ids.iter().map(move |&test_id| Task {
                    test_id,
                    repetition,
                })
            })
            .collect()
    }

    /// Execute all tasks for `test_ids` and wait for the workers to drain the queue.
    pub async fn run(&self, test_ids: &[TestId]) -> PoolReport {
        let settings = self.ctx.settings();
        let tasks = Self::tasks(test_ids, settings.repetitions);
        let total = tasks.len();
        info!(tasks = total, workers = settings.workers, "Starting worker pool");
        self.ctx.start(total);

        let (tx, rx) = mpsc::channel(total.max(1));
        for task in tasks {
            if tx.send(task).await.is_err() {
                break;
            }
        }
        // closed queue: workers exit once it is drained
        drop(tx);

        let rx = Arc::new(Mutex::new(rx));
        let mut workers = JoinSet::new();
        for slot in 0..settings.workers {
            workers.spawn(worker(slot, Arc::clone(&self.ctx), Arc::clone(&rx)));
        }

        let mut completed = 0;
        while let Some(result) = workers.join_next().await {
            match result {
                Ok(done) => completed += done,
                Err(e) => error!("Worker task failed: {}", e),
            }
        }

        self.ctx.finish();
        let report = PoolReport {
            completed,
            cancelled: total - completed,
        };
        if report.cancelled > 0 {
            warn!(cancelled = report.cancelled, "Run interrupted before all tasks finished");
        }
        report
    }
}

async fn worker(
    slot: usize,
    ctx: Arc<RunContext>,
    queue: Arc<Mutex<mpsc::Receiver<Task>>>,
) -> usize {
    let mut done = 0;
    loop {
        if ctx.is_shutdown() {
            debug!(slot, "Worker stopping on shutdown");
            break;
        }
        let Some(task) = queue.lock().await.recv().await else {
            break;
        };

        let outcome = match ctx.case(task.test_id) {
            Some(case) => {
                ctx.begin(slot, task.test_id);
                ctx.executor().execute(case).await
            }
            None => {
                warn!(test = task.test_id, "Task refers to an unknown test case");
                ExecutionOutcome::failed(
                    task.test_id,
                    ExecError::InputMissing(format!("{:04}", task.test_id).into()),
                    Default::default(),
                )
            }
        };
        ctx.complete(slot, &outcome);
        done += 1;
    }
    done
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RunSettings;
    use crate::display::LiveDisplay;
    use crate::executor::{Executor, MockExecutor};
    use agon_common::{RankDirection, Score, TestCase};
    use async_trait::async_trait;
    use mnemosyne::BaselineProvider;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn cases(n: usize) -> Vec<TestCase> {
        (0..n)
            .map(|id| TestCase {
                id,
                input_path: PathBuf::from(format!("{:04}.txt", id)),
                seed: None,
                params: vec![],
            })
            .collect()
    }

    fn context(n: usize, executor: Arc<dyn Executor>, workers: usize, repetitions: usize) -> Arc<RunContext> {
        Arc::new(RunContext::new(
            cases(n),
            BaselineProvider::empty(n, RankDirection::Minimize),
            executor,
            RunSettings { workers, repetitions },
            LiveDisplay::hidden(),
        ))
    }

    /// Sleeps per task and tracks how many tasks overlap.
    #[derive(Default)]
    struct SlowExecutor {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        calls: std::sync::Mutex<Vec<TestId>>,
    }

    #[async_trait]
    impl Executor for SlowExecutor {
        async fn execute(&self, case: &TestCase) -> ExecutionOutcome {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(15)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let mut calls = self.calls.lock().unwrap();
            calls.push(case.id);
            // later repetitions score lower
            let attempt = calls.iter().filter(|&&id| id == case.id).count() as Score;
            ExecutionOutcome::scored(case.id, 100 - attempt, Duration::ZERO)
        }
    }

    #[test]
    fn test_task_list() {
        let tasks = WorkerPool::tasks(&[4, 7], 2);
        assert_eq!(tasks.len(), 4);
        assert_eq!(tasks[0], Task { test_id: 4, repetition: 0 });
        assert_eq!(tasks[3], Task { test_id: 7, repetition: 1 });
        assert_eq!(WorkerPool::tasks(&[1], 0).len(), 1);
    }

    #[tokio::test]
    async fn test_every_task_runs_once() {
        let mut mock = MockExecutor::new();
        mock.expect_execute()
            .times(6)
            .returning(|case| ExecutionOutcome::scored(case.id, (case.id as Score + 1) * 10, Duration::ZERO));
        let ctx = context(3, Arc::new(mock), 2, 2);

        let report = WorkerPool::new(Arc::clone(&ctx)).run(&[0, 1, 2]).await;
        assert_eq!(report, PoolReport { completed: 6, cancelled: 0 });

        let state = ctx.lock_state();
        assert_eq!(state.aggregator.ok_count(), 6);
        assert_eq!(state.aggregator.final_scores(), vec![10, 20, 30]);
        assert_eq!(state.progress.completed, 6);
        assert!(state.executing.iter().all(Option::is_none));
    }

    #[tokio::test]
    async fn test_concurrency_bounded_by_workers() {
        let executor = Arc::new(SlowExecutor::default());
        let ctx = context(8, executor.clone(), 3, 2);

        let report = WorkerPool::new(ctx.clone()).run(&(0..8).collect::<Vec<_>>()).await;
        assert_eq!(report.completed, 16);
        assert!(executor.peak.load(Ordering::SeqCst) <= 3);

        let calls = executor.calls.lock().unwrap();
        for id in 0..8 {
            assert_eq!(calls.iter().filter(|&&c| c == id).count(), 2);
        }
        // the second attempt scores 98 and is retained when minimizing
        assert_eq!(ctx.lock_state().aggregator.best(5), Some(98));
    }

    #[tokio::test]
    async fn test_failed_task_does_not_stop_pool() {
        let mut mock = MockExecutor::new();
        mock.expect_execute().times(4).returning(|case| {
            if case.id == 1 {
                ExecutionOutcome::failed(case.id, ExecError::EmptyCommand, Duration::ZERO)
            } else {
                ExecutionOutcome::scored(case.id, 50, Duration::ZERO)
            }
        });
        let ctx = context(4, Arc::new(mock), 2, 1);

        let report = WorkerPool::new(ctx.clone()).run(&[0, 1, 2, 3]).await;
        assert_eq!(report.completed, 4);
        let state = ctx.lock_state();
        assert_eq!(state.aggregator.ok_count(), 3);
        assert_eq!(state.aggregator.ng_count(), 1);
        assert_eq!(state.aggregator.failed(), &[1]);
    }

    #[tokio::test]
    async fn test_unknown_case_is_recorded_as_failure() {
        let mut mock = MockExecutor::new();
        mock.expect_execute().never();
        let ctx = context(2, Arc::new(mock), 1, 1);

        let report = WorkerPool::new(ctx.clone()).run(&[9]).await;
        assert_eq!(report.completed, 1);
        assert_eq!(ctx.lock_state().aggregator.ng_count(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_skips_remaining_tasks() {
        let mut mock = MockExecutor::new();
        mock.expect_execute().never();
        let ctx = context(5, Arc::new(mock), 2, 1);
        ctx.request_shutdown();

        let report = WorkerPool::new(ctx.clone()).run(&[0, 1, 2, 3, 4]).await;
        assert_eq!(report, PoolReport { completed: 0, cancelled: 5 });
    }

    #[tokio::test]
    async fn test_empty_run() {
        let mock = MockExecutor::new();
        let ctx = context(0, Arc::new(mock), 4, 1);
        let report = WorkerPool::new(ctx).run(&[]).await;
        assert_eq!(report, PoolReport::default());
    }
}
