//! `agon log`: inspect and maintain the score history of a test set.

use std::path::PathBuf;

use agon_common::{DeltaRecord, Score, ScoreStats, TestId, format_test_id, is_valid_score};
use anyhow::{Context, Result, anyhow, bail};
use clap::ValueEnum;
use mnemosyne::{BaselineProvider, LogLayout};
use owo_colors::OwoColorize;

use crate::catalog::TestCatalog;
use crate::config::ContestConfig;
use crate::constants::{BEST_ALIAS, HISTORY_LIST_SIZE};
use crate::filter::Filter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogOrder {
    Asc,
    Desc,
}

/// Selection shared by the log views
#[derive(Debug, Clone, Default)]
pub struct LogQuery {
    pub set: Option<String>,
    pub order: Option<LogOrder>,
    pub filter: Option<String>,
    pub count: Option<usize>,
}

struct History {
    layout: LogLayout,
    baselines: BaselineProvider,
    ids: Vec<TestId>,
}

fn open(config: &ContestConfig, query: &LogQuery) -> Result<History> {
    let set = config.test_set(query.set.as_deref())?;
    let layout = LogLayout::new(&config.common.base_dir, &set.name);
    let baselines = BaselineProvider::load(&layout, set.count, config.direction(), set.system_test)?;

    let ids = match query.filter.as_deref() {
        Some(expr) => {
            let filter = Filter::parse(expr).context("Invalid filter expression")?;
            let fields = config.input_fields();
            filter.check_fields(&fields).context("Invalid filter expression")?;
            TestCatalog::load(&set, fields)?.select(Some(&filter))
        }
        None => (0..set.count).collect(),
    };

    Ok(History {
        layout,
        baselines,
        ids,
    })
}

fn limit<T>(mut rows: Vec<T>, count: Option<usize>) -> Vec<T> {
    if let Some(count) = count {
        rows.truncate(count);
    }
    rows
}

/// Most recent history entries with their means and error counts.
pub fn list(config: &ContestConfig, query: &LogQuery) -> Result<String> {
    let history = open(config, query)?;
    let log = history.baselines.history();
    let mut out = format!(
        "{}\n",
        format!("{:<6}{:<16}{:>10}{:>10}{:>7}  {}", "No", "Date", "GM", "AM", "Error", "Comment").bold()
    );

    let start = log.len().saturating_sub(query.count.unwrap_or(HISTORY_LIST_SIZE));
    for (index, info) in log.entries().iter().enumerate().skip(start) {
        let row = log.scores(index).unwrap_or_default();
        let scores: Vec<Score> = history.ids.iter().filter_map(|&id| row.get(id).copied()).collect();
        let stats = ScoreStats::from_scores(&scores);
        out.push_str(&format!(
            "{:<6}{:<16}{:>10}{:>10}{:>7}  {}\n",
            format!("{:04}", info.sequence),
            info.timestamp,
            stats.geometric_mean(),
            stats.arithmetic_mean(),
            stats.ng_count,
            info.comment
        ));
    }
    Ok(out)
}

/// Per-test scores of one entry, or of the best-known vector, with their ranks.
pub fn show(config: &ContestConfig, query: &LogQuery, which: &str) -> Result<String> {
    let history = open(config, query)?;
    let baselines = &history.baselines;

    let scores: Vec<Score> = if which == BEST_ALIAS {
        baselines
            .reference()
            .best_scores()
            .iter()
            .map(|s| s.unwrap_or(0))
            .collect()
    } else {
        let sequence: u64 = which
            .parse()
            .map_err(|_| anyhow!("Expected a history number or `{}`, got `{}`", BEST_ALIAS, which))?;
        let index = baselines
            .history()
            .position(sequence)
            .ok_or_else(|| anyhow!("No history entry {:04}", sequence))?;
        baselines.history().scores(index).unwrap_or_default().to_vec()
    };

    let mut rows: Vec<(TestId, Score, Option<usize>)> = history
        .ids
        .iter()
        .map(|&id| {
            let score = scores.get(id).copied().unwrap_or(0);
            let rank = is_valid_score(score).then(|| baselines.rank(score, id));
            (id, score, rank)
        })
        .collect();
    if let Some(order) = query.order {
        // unranked rows last in either order
        rows.sort_by_key(|&(id, _, rank)| match (order, rank) {
            (_, None) => (1, 0, id),
            (LogOrder::Asc, Some(r)) => (0, r as i64, id),
            (LogOrder::Desc, Some(r)) => (0, -(r as i64), id),
        });
    }

    let field = baselines.reference().len();
    let mut out = format!("{}\n", format!("{:<6}{:>12}{:>12}", "No", "Score", "Rank").bold());
    let valid: Vec<Score> = rows.iter().map(|&(_, s, _)| s).collect();
    for (id, score, rank) in limit(rows, query.count) {
        let rank = rank.map_or_else(|| "-".to_string(), |r| format!("{}/{}", r, field));
        out.push_str(&format!("{:<6}{:>12}{:>12}\n", format_test_id(id), score, rank));
    }
    let stats = ScoreStats::from_scores(&valid);
    out.push_str(&format!(
        "GM(AM) {}({})  Error {}\n",
        stats.geometric_mean(),
        stats.arithmetic_mean(),
        stats.ng_count
    ));
    Ok(out)
}

/// Compare two history entries test by test. Defaults to the last two entries.
pub fn diff(config: &ContestConfig, query: &LogQuery, from: Option<u64>, to: Option<u64>) -> Result<String> {
    let history = open(config, query)?;
    let log = history.baselines.history();
    let direction = history.baselines.direction();
    if log.len() < 2 && (from.is_none() || to.is_none()) {
        bail!("Need at least two history entries to compare");
    }

    let resolve = |sequence: Option<u64>, fallback: usize| -> Result<usize> {
        match sequence {
            Some(seq) => log.position(seq).ok_or_else(|| anyhow!("No history entry {:04}", seq)),
            None => Ok(fallback),
        }
    };
    let a = resolve(from, log.len().saturating_sub(2))?;
    let b = resolve(to, log.len().saturating_sub(1))?;
    let old = log.scores(a).unwrap_or_default();
    let new = log.scores(b).unwrap_or_default();

    let mut rows: Vec<(TestId, Score, Score, Option<DeltaRecord>)> = history
        .ids
        .iter()
        .map(|&id| {
            let o = old.get(id).copied().unwrap_or(0);
            let n = new.get(id).copied().unwrap_or(0);
            let delta = (is_valid_score(o) && is_valid_score(n)).then(|| DeltaRecord::new(id, o, n));
            (id, o, n, delta)
        })
        .collect();
    if let Some(order) = query.order {
        rows.sort_by(|x, y| {
            let key = |r: &(TestId, Score, Score, Option<DeltaRecord>)| r.3.map(|d| d.ratio_percent);
            match (key(x), key(y)) {
                (Some(p), Some(q)) => match order {
                    LogOrder::Asc => p.total_cmp(&q),
                    LogOrder::Desc => q.total_cmp(&p),
                },
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => x.0.cmp(&y.0),
            }
        });
    }

    let (mut better, mut worse, mut same) = (0, 0, 0);
    for (_, o, n, delta) in &rows {
        if delta.is_none() {
            continue;
        }
        if direction.is_better(*n, *o) {
            better += 1;
        } else if direction.is_better(*o, *n) {
            worse += 1;
        } else {
            same += 1;
        }
    }

    let entries = log.entries();
    let mut out = format!(
        "{:04} {} -> {:04} {}\n",
        entries[a].sequence, entries[a].comment, entries[b].sequence, entries[b].comment
    );
    out.push_str(&format!(
        "{}\n",
        format!("{:<6}{:>12}{:>12}{:>10}", "No", "Old", "New", "Ratio").bold()
    ));
    for (id, o, n, delta) in limit(rows, query.count) {
        let ratio = delta.map_or_else(|| "-".to_string(), |d| format!("{:+.1}%", d.ratio_percent));
        out.push_str(&format!("{:<6}{:>12}{:>12}{:>10}\n", format_test_id(id), o, n, ratio));
    }
    out.push_str(&format!("Better {}  Worse {}  Same {}\n", better, worse, same));
    Ok(out)
}

/// Rotate the run and history logs out of the way.
pub fn clear(config: &ContestConfig, set: Option<&str>) -> Result<Vec<PathBuf>> {
    let set = config.test_set(set)?;
    let layout = LogLayout::new(&config.common.base_dir, &set.name);
    Ok(layout.rotate()?)
}
