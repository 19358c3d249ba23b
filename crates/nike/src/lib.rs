//! Nike - concurrent execution and scoring engine.
//!
//! A run fans test cases out to a fixed pool of workers. Each worker executes
//! one case at a time through an [`Executor`], and every finished task is folded
//! into the shared [`ScoreAggregator`] under a single lock that also guards the
//! throttled [`LiveDisplay`].

pub mod aggregator;
pub mod context;
pub mod display;
pub mod executor;
pub mod pool;
pub mod score;

pub use aggregator::{DeltaHistogram, ScoreAggregator, TopDeltas};
pub use context::{Progress, RunContext, RunSettings, RunState};
pub use display::{Frame, LiveDisplay};
pub use executor::{ExecError, ExecutionMode, ExecutionOutcome, Executor, ExecutorSettings, ProcessExecutor};
pub use pool::{PoolReport, Task, WorkerPool};
pub use score::{ScoreParseError, ScoreParser};

/// Environment variable carrying the current input path to child processes.
pub const INPUT_FILE_ENV: &str = "INPUT_FILE";
