//! Throttled terminal view of a running pool.

use std::fmt;
use std::time::{Duration, Instant};

use agon_common::{DeltaRecord, TestId, format_test_id};
use console::Term;
use owo_colors::OwoColorize;
use tracing::debug;

use crate::aggregator::{BUCKET_LABELS, Comparison, ScoreAggregator, TOP_DELTAS};
use crate::context::Progress;

/// Minimum time between two redraws.
pub const REFRESH_INTERVAL: Duration = Duration::from_millis(1000);

/// Failed ids shown in a frame.
pub const SHOWN_FAILURES: usize = 5;

/// Running ids shown before eliding the rest.
pub const SHOWN_RUNNING: usize = 9;

const BAR_WIDTH: usize = 30;
const TABLE_WIDTH: usize = 34;

/// One snapshot of the aggregate, rendered through `Display`.
pub struct Frame<'a> {
    pub aggregator: &'a ScoreAggregator,
    pub progress: &'a Progress,
    pub executing: &'a [Option<TestId>],
}

impl fmt::Display for Frame<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Progress { completed, total, .. } = *self.progress;
        let filled = if total == 0 { 0 } else { completed * BAR_WIDTH / total };
        writeln!(
            f,
            "{:<9}[{}{}] {}/{} {}",
            "Progress".bold(),
            "#".repeat(filled),
            "-".repeat(BAR_WIDTH - filled),
            completed,
            total,
            format_elapsed(self.progress.elapsed())
        )?;

        let agg = self.aggregator;
        writeln!(
            f,
            "{:<9}GM(AM) {}({})",
            "Mean".bold(),
            agg.geometric_mean(),
            agg.arithmetic_mean()
        )?;

        let failures = agg.recent_failures(SHOWN_FAILURES);
        writeln!(f, "{:<9}{}", "Failed".red(), id_list(&failures, failures.len()))?;

        let running: Vec<TestId> = self.executing.iter().flatten().copied().collect();
        writeln!(f, "{:<9}{}", "Running".cyan(), id_list(&running, SHOWN_RUNNING))?;
        writeln!(f)?;

        write!(f, "{:<9}", "Delta%")?;
        for label in BUCKET_LABELS {
            write!(f, "{:>6}", label)?;
        }
        writeln!(f)?;
        histogram_row(f, "Last", agg.vs_last())?;
        histogram_row(f, "Best", agg.vs_best())?;
        writeln!(f)?;

        let last = agg.vs_last();
        let best = agg.vs_best();
        delta_tables(f, ("Decrease(Last)", last.decreases.items()), ("Decrease(Best)", best.decreases.items()))?;
        delta_tables(f, ("Increase(Last)", last.increases.items()), ("Increase(Best)", best.increases.items()))
    }
}

fn id_list(ids: &[TestId], limit: usize) -> String {
    if ids.is_empty() {
        return "-".to_string();
    }
    let mut parts: Vec<String> = ids.iter().take(limit).map(|&id| format_test_id(id)).collect();
    if ids.len() > limit {
        parts.push("...".to_string());
    }
    parts.join(" ")
}

fn histogram_row(f: &mut fmt::Formatter<'_>, label: &str, comparison: &Comparison) -> fmt::Result {
    write!(f, "{:<9}", label)?;
    for count in comparison.histogram.counts() {
        write!(f, "{:>6}", count)?;
    }
    writeln!(f)
}

fn delta_tables(
    f: &mut fmt::Formatter<'_>,
    left: (&str, &[DeltaRecord]),
    right: (&str, &[DeltaRecord]),
) -> fmt::Result {
    writeln!(f, "{:<width$}{}", left.0.bold(), right.0.bold(), width = TABLE_WIDTH)?;
    for row in 0..TOP_DELTAS {
        let cell = |records: &[DeltaRecord]| records.get(row).map(|d| d.to_string()).unwrap_or_default();
        writeln!(f, "{:<width$}{}", cell(left.1), cell(right.1), width = TABLE_WIDTH)?;
    }
    Ok(())
}

/// `1h 02m 03s`, `2m 05s` or `7.3s`
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    if secs >= 3600 {
        format!("{}h {:02}m {:02}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    } else if secs >= 60 {
        format!("{}m {:02}s", secs / 60, secs % 60)
    } else {
        format!("{:.1}s", elapsed.as_secs_f64())
    }
}

/// Redraws frames in place on a terminal, at most once per interval.
pub struct LiveDisplay {
    term: Option<Term>,
    interval: Duration,
    last_refresh: Option<Instant>,
    drawn_lines: usize,
    frames: usize,
}

impl LiveDisplay {
    /// Draw on stderr.
    pub fn to_stderr() -> Self {
        Self::with_term(Some(Term::stderr()))
    }

    /// Keep the throttle clock but never draw.
    pub fn hidden() -> Self {
        Self::with_term(None)
    }

    fn with_term(term: Option<Term>) -> Self {
        Self {
            term,
            interval: REFRESH_INTERVAL,
            last_refresh: None,
            drawn_lines: 0,
            frames: 0,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Whether a redraw may happen at `now`; claims the slot if so.
    pub fn due(&mut self, now: Instant, force: bool) -> bool {
        let ready = force
            || self
                .last_refresh
                .is_none_or(|last| now.saturating_duration_since(last) >= self.interval);
        if ready {
            self.last_refresh = Some(now);
        }
        ready
    }

    /// Redraw if the throttle allows it. Returns whether a frame was produced.
    pub fn refresh(&mut self, frame: &Frame<'_>, force: bool) -> bool {
        if !self.due(Instant::now(), force) {
            return false;
        }
        self.frames += 1;
        if let Some(term) = &self.term {
            let text = frame.to_string();
            match redraw(term, self.drawn_lines, &text) {
                Ok(lines) => self.drawn_lines = lines,
                Err(e) => debug!(error = %e, "Display redraw failed"),
            }
        }
        true
    }

    /// Whether frames reach a terminal.
    pub fn is_drawing(&self) -> bool {
        self.term.is_some()
    }

    /// Frames produced so far, drawn or not.
    pub fn frames(&self) -> usize {
        self.frames
    }
}

fn redraw(term: &Term, previous_lines: usize, text: &str) -> std::io::Result<usize> {
    if previous_lines > 0 {
        term.clear_last_lines(previous_lines)?;
    }
    term.write_str(text)?;
    Ok(text.lines().count())
}
