//! Running one test case through the target and judge programs.

use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Instant;

use agon_common::{Score, ScoreRecord, TestCase, TestId};
use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tokio::time::{Duration, timeout};
use tracing::debug;

use crate::INPUT_FILE_ENV;
use crate::score::{ScoreParseError, ScoreParser};

/// How target and judge are wired together.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// `judge target...` with the input on stdin; score read from the judge's stderr
    Interactive,
    /// target writes a scratch output, then `judge input output` prints the score
    Batch,
}

impl ExecutionMode {
    pub fn from_interactive(interactive: bool) -> Self {
        if interactive {
            ExecutionMode::Interactive
        } else {
            ExecutionMode::Batch
        }
    }
}

#[derive(Error, Debug)]
pub enum ExecError {
    #[error("input file not found: {0}")]
    InputMissing(PathBuf),

    #[error("empty command line")]
    EmptyCommand,

    #[error("failed to run `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Parse(#[from] ScoreParseError),

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// Result of one task.
#[derive(Debug)]
pub struct ExecutionOutcome {
    pub test_id: TestId,
    pub score: Score,
    pub elapsed: Duration,
    pub error: Option<ExecError>,
}

impl ExecutionOutcome {
    pub fn scored(test_id: TestId, score: Score, elapsed: Duration) -> Self {
        Self {
            test_id,
            score,
            elapsed,
            error: None,
        }
    }

    pub fn failed(test_id: TestId, error: ExecError, elapsed: Duration) -> Self {
        Self {
            test_id,
            score: 0,
            elapsed,
            error: Some(error),
        }
    }

    pub fn success(&self) -> bool {
        self.error.is_none()
    }

    pub fn record(&self) -> ScoreRecord {
        ScoreRecord::new(self.test_id, self.score)
    }
}

/// Executes a single test case. Failures are reported in the outcome, never raised.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, case: &TestCase) -> ExecutionOutcome;
}

/// Settings for [`ProcessExecutor`]
#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    pub mode: ExecutionMode,
    /// Target program argv
    pub target: Vec<String>,
    /// Judge program argv
    pub judge: Vec<String>,
    pub score_marker: String,
    /// Where batch mode writes target output
    pub scratch_dir: PathBuf,
    /// Working directory for every child
    pub working_dir: Option<PathBuf>,
    /// Extra environment for every child
    pub env: Vec<(String, String)>,
    /// Kill a task's process after this long; `None` waits forever
    pub timeout: Option<Duration>,
}

/// Split a configured command line on whitespace.
pub fn split_command(command: &str) -> Vec<String> {
    command.split_whitespace().map(str::to_string).collect()
}

/// Runs target and judge as child processes.
pub struct ProcessExecutor {
    settings: ExecutorSettings,
    parser: ScoreParser,
}

impl ProcessExecutor {
    pub fn new(settings: ExecutorSettings) -> Self {
        let parser = ScoreParser::new(settings.score_marker.clone());
        Self { settings, parser }
    }

    pub fn settings(&self) -> &ExecutorSettings {
        &self.settings
    }

    async fn run_case(&self, case: &TestCase) -> Result<Score, ExecError> {
        if !tokio::fs::try_exists(&case.input_path).await.unwrap_or(false) {
            return Err(ExecError::InputMissing(case.input_path.clone()));
        }
        match self.settings.mode {
            ExecutionMode::Interactive => self.run_interactive(case).await,
            ExecutionMode::Batch => self.run_batch(case).await,
        }
    }

    async fn run_interactive(&self, case: &TestCase) -> Result<Score, ExecError> {
        let argv: Vec<String> = self
            .settings
            .judge
            .iter()
            .chain(&self.settings.target)
            .cloned()
            .collect();

        let mut cmd = self.command(&argv, case)?;
        cmd.stdin(open_input(&case.input_path)?)
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        let output = self.run(&mut cmd, &argv).await?;
        log_exit(case, "judge", &output);

        Ok(self.parser.parse(&String::from_utf8_lossy(&output.stderr))?)
    }

    async fn run_batch(&self, case: &TestCase) -> Result<Score, ExecError> {
        // each task writes its own file; repetitions of one case may overlap
        let dir = &self.settings.scratch_dir;
        let scratch = tempfile::Builder::new()
            .prefix(&format!("{}_", case.label()))
            .suffix(".tmp")
            .tempfile_in(dir)
            .map_err(|source| ExecError::Io {
                path: dir.clone(),
                source,
            })?;
        let sink = scratch.reopen().map_err(|source| ExecError::Io {
            path: scratch.path().to_path_buf(),
            source,
        })?;

        let mut cmd = self.command(&self.settings.target, case)?;
        cmd.stdin(open_input(&case.input_path)?)
            .stdout(Stdio::from(sink))
            .stderr(Stdio::null());
        let output = self.run(&mut cmd, &self.settings.target).await?;
        log_exit(case, "target", &output);

        let mut cmd = self.command(&self.settings.judge, case)?;
        cmd.arg(&case.input_path)
            .arg(scratch.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());
        let output = self.run(&mut cmd, &self.settings.judge).await?;
        log_exit(case, "judge", &output);
        let score = self.parser.parse(&String::from_utf8_lossy(&output.stdout))?;

        // keep the latest output under its stable name for visualizers
        let kept = self.output_path(case);
        if let Err(e) = scratch.persist(&kept) {
            debug!(test = %case.label(), error = %e.error, "Could not keep target output");
        }
        Ok(score)
    }

    /// Where the output of the latest batch execution of `case` is kept.
    pub fn output_path(&self, case: &TestCase) -> PathBuf {
        self.settings
            .scratch_dir
            .join(format!("{}_o.txt", case.label()))
    }

    fn command(&self, argv: &[String], case: &TestCase) -> Result<Command, ExecError> {
        let (program, args) = argv.split_first().ok_or(ExecError::EmptyCommand)?;
        let mut cmd = Command::new(program);
        cmd.args(args)
            .env(INPUT_FILE_ENV, &case.input_path)
            .envs(self.settings.env.iter().map(|(k, v)| (k, v)))
            .kill_on_drop(true);
        if let Some(dir) = &self.settings.working_dir {
            cmd.current_dir(dir);
        }
        Ok(cmd)
    }

    async fn run(&self, cmd: &mut Command, argv: &[String]) -> Result<Output, ExecError> {
        let spawn_error = |source: std::io::Error| ExecError::Spawn {
            program: argv.join(" "),
            source,
        };
        let child = cmd.spawn().map_err(spawn_error)?;
        let output = match self.settings.timeout {
            Some(limit) => timeout(limit, child.wait_with_output())
                .await
                .map_err(|_| ExecError::Timeout(limit))?,
            None => child.wait_with_output().await,
        };
        output.map_err(spawn_error)
    }
}

#[async_trait]
impl Executor for ProcessExecutor {
    async fn execute(&self, case: &TestCase) -> ExecutionOutcome {
        let start = Instant::now();
        match self.run_case(case).await {
            Ok(score) => {
                debug!(test = %case.label(), score, "Task scored");
                ExecutionOutcome::scored(case.id, score, start.elapsed())
            }
            Err(e) => {
                debug!(test = %case.label(), error = %e, "Task failed");
                ExecutionOutcome::failed(case.id, e, start.elapsed())
            }
        }
    }
}

fn open_input(path: &Path) -> Result<Stdio, ExecError> {
    std::fs::File::open(path)
        .map(Stdio::from)
        .map_err(|source| ExecError::Io {
            path: path.to_path_buf(),
            source,
        })
}

fn log_exit(case: &TestCase, role: &str, output: &Output) {
    if !output.status.success() {
        debug!(test = %case.label(), role, status = %output.status, "Non-zero exit");
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn script(dir: &Path, name: &str, body: &str) -> String {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    fn case(dir: &Path, id: TestId, content: &str) -> TestCase {
        let input_path = dir.join(format!("{:04}.txt", id));
        std::fs::write(&input_path, content).unwrap();
        TestCase {
            id,
            input_path,
            seed: None,
            params: vec![],
        }
    }

    fn settings(dir: &Path, mode: ExecutionMode, target: String, judge: String) -> ExecutorSettings {
        ExecutorSettings {
            mode,
            target: split_command(&target),
            judge: split_command(&judge),
            score_marker: "Score =".into(),
            scratch_dir: dir.to_path_buf(),
            working_dir: None,
            env: vec![],
            timeout: None,
        }
    }

    #[test]
    fn test_split_command() {
        assert_eq!(split_command("  python3  main.py "), vec!["python3", "main.py"]);
        assert!(split_command("").is_empty());
    }

    #[tokio::test]
    async fn test_batch_mode_scores_through_judge() {
        let tmp = TempDir::new().unwrap();
        // target echoes its input doubled, judge reports the first number of the output
        let target = script(tmp.path(), "target.sh", "read n; echo $((n * 2))");
        let judge = script(tmp.path(), "judge.sh", "read v < \"$2\"; echo \"Score = $v\"");
        let exec = ProcessExecutor::new(settings(tmp.path(), ExecutionMode::Batch, target, judge));

        let outcome = exec.execute(&case(tmp.path(), 3, "21\n")).await;
        assert!(outcome.success(), "{:?}", outcome.error);
        assert_eq!(outcome.score, 42);
        assert_eq!(std::fs::read_to_string(tmp.path().join("0003_o.txt")).unwrap(), "42\n");
    }

    #[tokio::test]
    async fn test_overlapping_batch_runs_keep_separate_outputs() {
        let tmp = TempDir::new().unwrap();
        // eight tagged lines written slowly; the judge wants eight lines from a single process
        let target = script(
            tmp.path(),
            "target.sh",
            "for i in 1 2 3 4 5 6 7 8; do echo \"run$$ line$i\"; sleep 0.05; done",
        );
        let judge = script(
            tmp.path(),
            "judge.sh",
            "n=$(cut -d' ' -f1 \"$2\" | sort -u | wc -l); l=$(wc -l < \"$2\"); \
             if [ \"$n\" -eq 1 ]; then echo \"Score = $l\"; else echo 'Score = 1'; fi",
        );
        let exec = Arc::new(ProcessExecutor::new(settings(tmp.path(), ExecutionMode::Batch, target, judge)));
        let case = case(tmp.path(), 0, "1\n");

        let first = {
            let exec = Arc::clone(&exec);
            let case = case.clone();
            tokio::spawn(async move { exec.execute(&case).await })
        };
        tokio::time::sleep(Duration::from_millis(170)).await;
        let second = exec.execute(&case).await;
        let first = first.await.unwrap();

        assert_eq!((first.score, second.score), (8, 8));
        let kept = std::fs::read_to_string(exec.output_path(&case)).unwrap();
        assert_eq!(kept.lines().count(), 8);
    }

    #[tokio::test]
    async fn test_interactive_mode_reads_judge_stderr() {
        let tmp = TempDir::new().unwrap();
        // judge runs the target it was given and reports on stderr
        let judge = script(
            tmp.path(),
            "judge.sh",
            "out=$(\"$@\"); echo \"Score = $out\" >&2; exit 1",
        );
        let target = script(tmp.path(), "target.sh", "read n; echo $((n + 1))");
        let exec = ProcessExecutor::new(settings(tmp.path(), ExecutionMode::Interactive, target, judge));

        let outcome = exec.execute(&case(tmp.path(), 0, "9\n")).await;
        assert!(outcome.success(), "{:?}", outcome.error);
        assert_eq!(outcome.score, 10);
    }

    #[tokio::test]
    async fn test_input_file_env_is_set() {
        let tmp = TempDir::new().unwrap();
        let judge = script(tmp.path(), "judge.sh", "echo \"Score = ${#INPUT_FILE}\" >&2");
        let target = script(tmp.path(), "target.sh", "true");
        let exec = ProcessExecutor::new(settings(tmp.path(), ExecutionMode::Interactive, target, judge));

        let case = case(tmp.path(), 1, "x\n");
        let outcome = exec.execute(&case).await;
        assert_eq!(outcome.score as usize, case.input_path.to_string_lossy().len());
    }

    #[tokio::test]
    async fn test_missing_input_runs_nothing() {
        let tmp = TempDir::new().unwrap();
        let marker = tmp.path().join("ran");
        let target = script(tmp.path(), "target.sh", &format!("touch {}", marker.display()));
        let judge = script(tmp.path(), "judge.sh", "echo 'Score = 1'");
        let exec = ProcessExecutor::new(settings(tmp.path(), ExecutionMode::Batch, target, judge));

        let case = TestCase {
            id: 5,
            input_path: tmp.path().join("0005.txt"),
            seed: None,
            params: vec![],
        };
        let outcome = exec.execute(&case).await;
        assert!(matches!(outcome.error, Some(ExecError::InputMissing(_))));
        assert_eq!(outcome.score, 0);
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn test_missing_score_line_fails_task() {
        let tmp = TempDir::new().unwrap();
        let target = script(tmp.path(), "target.sh", "cat");
        let judge = script(tmp.path(), "judge.sh", "echo 'WA'");
        let exec = ProcessExecutor::new(settings(tmp.path(), ExecutionMode::Batch, target, judge));

        let outcome = exec.execute(&case(tmp.path(), 2, "1\n")).await;
        assert!(matches!(
            outcome.error,
            Some(ExecError::Parse(ScoreParseError::MissingLine(_)))
        ));
        assert!(!outcome.record().is_valid());
    }

    #[tokio::test]
    async fn test_timeout_kills_task() {
        let tmp = TempDir::new().unwrap();
        let target = script(tmp.path(), "target.sh", "sleep 5");
        let judge = script(tmp.path(), "judge.sh", "echo 'Score = 1'");
        let mut settings = settings(tmp.path(), ExecutionMode::Batch, target, judge);
        settings.timeout = Some(Duration::from_millis(100));
        let exec = ProcessExecutor::new(settings);

        let outcome = exec.execute(&case(tmp.path(), 4, "1\n")).await;
        assert!(matches!(outcome.error, Some(ExecError::Timeout(_))));
        assert!(outcome.elapsed < Duration::from_secs(5));
    }
}
