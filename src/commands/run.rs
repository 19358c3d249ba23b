//! `agon run`: execute a test set and record the result.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use agon_common::{HistoryEntry, RunSummary, Score, TestCase, TestId, format_test_id, is_valid_score};
use anyhow::{Context, Result, bail};
use mnemosyne::{BaselineProvider, HistoryLog, LogLayout, StandingsLog, now_timestamp, run_log};
use nike::executor::split_command;
use nike::{
    Executor, ExecutorSettings, LiveDisplay, PoolReport, ProcessExecutor, RunContext, RunSettings,
    WorkerPool,
};
use owo_colors::OwoColorize;
use tracing::{info, warn};

use crate::catalog::TestCatalog;
use crate::config::{ConfigError, ContestConfig, TestSet};
use crate::filter::Filter;

/// Options of one `agon run` invocation
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub set: Option<String>,
    pub quiet: bool,
    pub filter: Option<String>,
    pub repetitions: usize,
    pub target: Option<TestId>,
    pub comment: String,
    pub json: bool,
}

impl RunOptions {
    fn repetitions(&self) -> usize {
        self.repetitions.max(1)
    }

    /// Run, history and standings logs are only written for plain full runs.
    pub fn logging_enabled(&self) -> bool {
        self.filter.is_none() && self.repetitions() == 1
    }
}

/// What a full run produced
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub summary: RunSummary,
    /// Retained score per executed test id
    pub scores: Vec<(TestId, Score)>,
    /// Tests without a valid retained score, in id order
    pub failed: Vec<TestId>,
    pub report: PoolReport,
    /// Sequence number of the history entry written, if any
    pub sequence: Option<u64>,
    pub logged: bool,
}

/// Everything resolved from configuration before the first task starts.
struct Prepared {
    set: TestSet,
    layout: LogLayout,
    catalog: TestCatalog,
    filter: Option<Filter>,
    baselines: BaselineProvider,
    executor: ProcessExecutor,
}

fn prepare(config: &ContestConfig, opts: &RunOptions) -> Result<Prepared> {
    let set = config.test_set(opts.set.as_deref())?;
    let fields = config.input_fields();
    let filter = opts
        .filter
        .as_deref()
        .map(Filter::parse)
        .transpose()
        .context("Invalid filter expression")?;
    if let Some(filter) = &filter {
        filter.check_fields(&fields).context("Invalid filter expression")?;
    }

    let layout = LogLayout::new(&config.common.base_dir, &set.name);
    layout.ensure()?;
    let catalog = TestCatalog::load(&set, fields)
        .with_context(|| format!("Failed to load test set {}", set.name))?;

    if config.standings.enable {
        StandingsLog::ensure_header(
            &layout.results(),
            config.direction(),
            config.standings.rel_eval,
            &config.standings.visualizer_url,
        )?;
        catalog.write_inputs_csv(&layout.inputs())?;
    }

    let baselines = BaselineProvider::load(&layout, set.count, config.direction(), set.system_test)?;

    let scratch_dir = layout.dir().join("out");
    std::fs::create_dir_all(&scratch_dir)
        .with_context(|| format!("Failed to create {}", scratch_dir.display()))?;
    let executor = ProcessExecutor::new(ExecutorSettings {
        mode: config.mode(),
        target: split_command(&config.common.target_program),
        judge: split_command(&config.common.judge_program),
        score_marker: config.common.score_line.clone(),
        scratch_dir,
        working_dir: Some(config.common.base_dir.clone()),
        env: config.env_pairs(),
        timeout: config.timeout(),
    });

    Ok(Prepared {
        set,
        layout,
        catalog,
        filter,
        baselines,
        executor,
    })
}

/// Run `BuildCmd` through the shell, failing the run if it fails.
pub async fn build(config: &ContestConfig) -> Result<()> {
    let cmd = config.common.build_cmd.trim();
    if cmd.is_empty() {
        return Ok(());
    }
    info!("Building: {}", cmd);
    let status = tokio::process::Command::new("sh")
        .arg("-c")
        .arg(cmd)
        .current_dir(&config.common.base_dir)
        .status()
        .await
        .with_context(|| format!("Failed to start build command `{}`", cmd))?;
    if !status.success() {
        bail!("Build command `{}` failed with {}", cmd, status);
    }
    Ok(())
}

/// Execute the selected cases of a test set through the worker pool and persist the summary.
pub async fn run_all(config: &ContestConfig, opts: &RunOptions, display: LiveDisplay) -> Result<RunOutcome> {
    let Prepared {
        set,
        layout,
        catalog,
        filter,
        baselines,
        executor,
    } = prepare(config, opts)?;

    let ids = catalog.select(filter.as_ref());
    if ids.is_empty() {
        bail!("No test cases selected in set {}", set.name);
    }
    info!(set = %set.name, cases = ids.len(), repetitions = opts.repetitions(), "Starting run");

    let ctx = Arc::new(RunContext::new(
        catalog.cases().to_vec(),
        baselines,
        Arc::new(executor),
        RunSettings {
            workers: config.common.workers,
            repetitions: opts.repetitions(),
        },
        display,
    ));

    let shutdown = ctx.shutdown_handle();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, waiting for running tasks");
            shutdown.store(true, Ordering::SeqCst);
        }
    });
    let report = WorkerPool::new(Arc::clone(&ctx)).run(&ids).await;
    interrupt.abort();

    let aggregator = ctx.lock_state().aggregator.clone();
    let scores: Vec<(TestId, Score)> = ids
        .iter()
        .map(|&id| (id, aggregator.best(id).unwrap_or(0)))
        .collect();
    let comment = sanitize_comment(&opts.comment);
    let active: Vec<Score> = scores.iter().map(|&(_, s)| s).collect();
    let summary = RunSummary::from_scores(now_timestamp(), comment.clone(), &active);
    // a test fails only when no repetition produced a score
    let failed = scores
        .iter()
        .filter(|&&(_, score)| !is_valid_score(score))
        .map(|&(id, _)| id)
        .collect();

    let mut outcome = RunOutcome {
        summary,
        scores,
        failed,
        report,
        sequence: None,
        logged: false,
    };

    if report.cancelled > 0 {
        warn!("Run was interrupted; nothing is written to the logs");
        return Ok(outcome);
    }
    if !opts.logging_enabled() {
        return Ok(outcome);
    }

    run_log::append(&layout.run_log(), &outcome.summary)?;
    outcome.logged = true;

    if !comment.is_empty() {
        let history_path = layout.history_log();
        let sequence = HistoryLog::next_sequence(&history_path)?;
        let entry = HistoryEntry {
            timestamp: outcome.summary.timestamp.clone(),
            sequence,
            comment: comment.clone(),
            scores: aggregator.final_scores(),
        };
        HistoryLog::append(&history_path, &entry)?;
        if config.standings.enable {
            StandingsLog::insert(&layout.results(), sequence, &comment, &entry.scores)?;
        }
        info!(sequence, "Recorded history entry");
        outcome.sequence = Some(sequence);
    }

    Ok(outcome)
}

/// Result of a single-case run
#[derive(Debug, Clone)]
pub struct SingleOutcome {
    pub case: TestCase,
    pub score: Score,
    pub best: Option<Score>,
    pub rank: usize,
    pub field_size: usize,
    pub fields: Vec<String>,
}

impl SingleOutcome {
    pub fn render(&self) -> String {
        let best = self.best.map_or_else(|| "-".to_string(), |b| b.to_string());
        let params: Vec<String> = self
            .fields
            .iter()
            .zip(&self.case.params)
            .map(|(name, value)| format!("{}={}", name, value))
            .collect();
        format!(
            "No={} Score={} Best={} Rank={}/{}\nParameter: {}\nSeed: {}\n",
            self.case.label(),
            self.score,
            best,
            self.rank,
            self.field_size,
            if params.is_empty() { self.case.params.join(" ") } else { params.join(" ") },
            self.case.seed.as_deref().unwrap_or("-")
        )
    }
}

/// Execute one case and rank it against history.
pub async fn run_single(config: &ContestConfig, opts: &RunOptions, target: TestId) -> Result<SingleOutcome> {
    let prepared = prepare(config, opts)?;
    let case = prepared.catalog.case(target).cloned().ok_or_else(|| {
        ConfigError::InvalidValue(format!(
            "target {} is outside 0..{}",
            target,
            prepared.set.count
        ))
    })?;

    let outcome = prepared.executor.execute(&case).await;
    if let Some(e) = &outcome.error {
        warn!(test = %case.label(), "Execution failed: {}", e);
    }
    let baselines = &prepared.baselines;
    Ok(SingleOutcome {
        score: outcome.score,
        best: baselines.best(target),
        rank: baselines.rank(outcome.score, target),
        field_size: baselines.field_size(),
        fields: prepared.catalog.fields().to_vec(),
        case,
    })
}

/// Entry point of the `run` subcommand.
pub async fn execute(config: &ContestConfig, opts: &RunOptions) -> Result<()> {
    build(config).await?;

    if let Some(target) = opts.target {
        let single = run_single(config, opts, target).await?;
        print!("{}", single.render());
        return Ok(());
    }

    let display = if opts.quiet {
        LiveDisplay::hidden()
    } else {
        LiveDisplay::to_stderr()
    };
    let outcome = run_all(config, opts, display).await?;

    if opts.json {
        println!("{}", serde_json::to_string_pretty(&outcome.summary)?);
    } else if opts.quiet {
        let s = &outcome.summary;
        println!("{} {} {} {}", s.geometric_mean, s.arithmetic_mean, s.ok_count + s.ng_count, s.ng_count);
    } else {
        print!("{}", render_summary(&outcome));
    }
    Ok(())
}

pub fn render_summary(outcome: &RunOutcome) -> String {
    let s = &outcome.summary;
    let mut out = format!(
        "{}\n{:<16}{:<12}{:<12}{:<12}{}\n",
        "Summary".bold(),
        "Date",
        "GM",
        "AM",
        "Cases",
        "Errors"
    );
    out.push_str(&format!(
        "{:<16}{:<12}{:<12}{:<12}{}\n",
        s.timestamp,
        s.geometric_mean,
        s.arithmetic_mean,
        s.ok_count + s.ng_count,
        s.ng_count
    ));
    if !outcome.failed.is_empty() {
        let ids: Vec<String> = outcome.failed.iter().copied().map(format_test_id).collect();
        out.push_str(&format!("{} {}\n", "Failed:".red(), ids.join(" ")));
    }
    if let Some(sequence) = outcome.sequence {
        out.push_str(&format!("Logged as No.{:04}\n", sequence));
    }
    out
}

/// Commas would break the CSV logs.
fn sanitize_comment(comment: &str) -> String {
    comment.replace(',', " ").trim().to_string()
}
