//! Contest configuration
//!
//! Loaded from `contest.toml` (or the file named by `CONTEST_CONFIG_FILE`).
//! Keys keep the PascalCase names used by existing contest files:
//!
//! ```toml
//! [Common]
//! TargetProgram = "./a.out"
//! JudgeProgram = "./tools/vis"
//! ScoreLine = "Score ="
//! Workers = 4
//! DefaultSet = "main"
//! IsRankMin = true
//!
//! [main]
//! TestDataPath = "tools/in"
//! TestDataNum = 100
//! ```
//!
//! Every table other than `Common`, `Standings`, `Env` and `Cloud` is a test set.

use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use agon_common::{AgonError, RankDirection};
use nike::ExecutionMode;
use serde::Deserialize;
use thiserror::Error;

use crate::constants::{CONFIG_FILE_ENV, DEFAULT_CONFIG_FILE, DEFAULT_WORKERS, WORKERS_ENV};

/// Configuration error
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Missing configuration: {0}")]
    Missing(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    #[error("Unknown test set: {0}")]
    UnknownTestSet(String),
}

impl From<ConfigError> for AgonError {
    fn from(err: ConfigError) -> Self {
        AgonError::Config(err.to_string())
    }
}

/// Whole contest configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContestConfig {
    pub common: CommonConfig,
    #[serde(default)]
    pub standings: StandingsConfig,
    #[serde(default)]
    pub env: EnvConfig,
    /// Cloud submission settings; not used by the local harness
    #[serde(default)]
    pub cloud: Option<toml::Table>,
    #[serde(flatten)]
    pub sets: BTreeMap<String, TestSetConfig>,
}

/// `[Common]`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CommonConfig {
    #[serde(default)]
    pub contest_name: String,
    /// Command line of the solution under test
    pub target_program: String,
    /// Command line of the judge / visualizer
    pub judge_program: String,
    /// Directory every program runs in and logs live under
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,
    /// Shell command run before every `agon run`
    #[serde(default)]
    pub build_cmd: String,
    /// Names of the tokens on the first line of an input file
    #[serde(default)]
    pub input_fields: String,
    #[serde(default)]
    pub is_interactive: bool,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default)]
    pub default_set: String,
    #[serde(default = "default_rank_min")]
    pub is_rank_min: bool,
    /// Prefix of the line carrying the score
    pub score_line: String,
    /// Per-task timeout; unset waits forever
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

/// `[Standings]`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StandingsConfig {
    #[serde(default)]
    pub enable: bool,
    #[serde(default, rename = "VisualizerURL")]
    pub visualizer_url: String,
    #[serde(default)]
    pub rel_eval: bool,
}

/// `[Env]`: variables exported to every child process
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EnvConfig {
    #[serde(default)]
    pub keys: Vec<String>,
    #[serde(default)]
    pub values: Vec<String>,
}

/// One test set table
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TestSetConfig {
    pub test_data_path: PathBuf,
    pub test_data_num: usize,
    #[serde(default)]
    pub is_system_test: bool,
}

/// A test set resolved against the base directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestSet {
    pub name: String,
    pub data_dir: PathBuf,
    pub count: usize,
    pub system_test: bool,
}

fn default_base_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_workers() -> usize {
    DEFAULT_WORKERS
}

fn default_rank_min() -> bool {
    true
}

impl ContestConfig {
    /// Configuration file path, honouring `CONTEST_CONFIG_FILE`.
    pub fn path_from_env() -> PathBuf {
        env::var(CONFIG_FILE_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE))
    }

    /// Load `.env`, then the configuration file, then environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let mut config = Self::from_file(&Self::path_from_env())?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let mut config: Self = toml::from_str(content)?;
        // children run inside BaseDir, so every path handed to them must be absolute
        config.common.base_dir = std::path::absolute(&config.common.base_dir)
            .map_err(|e| ConfigError::InvalidValue(format!("BaseDir: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(value) = env::var(WORKERS_ENV) {
            self.common.workers = value
                .parse()
                .map_err(|_| ConfigError::InvalidValue(WORKERS_ENV.to_string()))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.common.workers == 0 {
            return Err(ConfigError::InvalidValue("Workers must be at least 1".to_string()));
        }
        if self.common.score_line.is_empty() {
            return Err(ConfigError::Missing("ScoreLine".to_string()));
        }
        if self.common.target_program.trim().is_empty() {
            return Err(ConfigError::Missing("TargetProgram".to_string()));
        }
        if self.common.judge_program.trim().is_empty() {
            return Err(ConfigError::Missing("JudgeProgram".to_string()));
        }
        if self.env.keys.len() != self.env.values.len() {
            return Err(ConfigError::InvalidValue(
                "Env.Keys and Env.Values differ in length".to_string(),
            ));
        }
        for (name, set) in &self.sets {
            if set.test_data_num == 0 {
                return Err(ConfigError::InvalidValue(format!("{}.TestDataNum must be at least 1", name)));
            }
        }
        Ok(())
    }

    /// Resolve a test set by name, falling back to `DefaultSet`.
    pub fn test_set(&self, name: Option<&str>) -> Result<TestSet, ConfigError> {
        let name = match name {
            Some(name) => name,
            None if !self.common.default_set.is_empty() => self.common.default_set.as_str(),
            None => return Err(ConfigError::Missing("DefaultSet".to_string())),
        };
        let set = self
            .sets
            .get(name)
            .ok_or_else(|| ConfigError::UnknownTestSet(name.to_string()))?;
        Ok(TestSet {
            name: name.to_string(),
            data_dir: self.common.base_dir.join(&set.test_data_path),
            count: set.test_data_num,
            system_test: set.is_system_test,
        })
    }

    pub fn direction(&self) -> RankDirection {
        RankDirection::from_rank_min(self.common.is_rank_min)
    }

    pub fn mode(&self) -> ExecutionMode {
        ExecutionMode::from_interactive(self.common.is_interactive)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.common.timeout_ms.map(Duration::from_millis)
    }

    pub fn input_fields(&self) -> Vec<String> {
        self.common
            .input_fields
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn env_pairs(&self) -> Vec<(String, String)> {
        self.env
            .keys
            .iter()
            .cloned()
            .zip(self.env.values.iter().cloned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[Common]
ContestName = "ahc999"
TargetProgram = "./target/release/solver"
JudgeProgram = "./tools/vis"
BaseDir = "/work"
InputFields = "N, M K"
IsInteractive = true
Workers = 6
DefaultSet = "main"
IsRankMin = false
ScoreLine = "Score ="
TimeoutMs = 2500

[Standings]
Enable = true
VisualizerURL = "https://example.com/vis"
RelEval = true

[Env]
Keys = ["RUST_BACKTRACE"]
Values = ["1"]

[Cloud]
Bucket = "ignored"

[main]
TestDataPath = "tools/in"
TestDataNum = 100

[system]
TestDataPath = "/data/system"
TestDataNum = 3000
IsSystemTest = true
"#;

    #[test]
    fn test_parse_full_config() {
        let config = ContestConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.common.contest_name, "ahc999");
        assert_eq!(config.common.workers, 6);
        assert_eq!(config.mode(), ExecutionMode::Interactive);
        assert_eq!(config.direction(), RankDirection::Maximize);
        assert_eq!(config.timeout(), Some(Duration::from_millis(2500)));
        assert_eq!(config.input_fields(), vec!["N", "M", "K"]);
        assert_eq!(config.env_pairs(), vec![("RUST_BACKTRACE".to_string(), "1".to_string())]);
        assert!(config.standings.enable);
        assert_eq!(config.standings.visualizer_url, "https://example.com/vis");
        assert_eq!(config.sets.len(), 2);
    }

    #[test]
    fn test_resolve_test_sets() {
        let config = ContestConfig::from_toml_str(SAMPLE).unwrap();

        let main = config.test_set(None).unwrap();
        assert_eq!(main.name, "main");
        assert_eq!(main.data_dir, PathBuf::from("/work/tools/in"));
        assert!(!main.system_test);

        let system = config.test_set(Some("system")).unwrap();
        assert_eq!(system.data_dir, PathBuf::from("/data/system"));
        assert_eq!(system.count, 3000);
        assert!(system.system_test);

        assert!(matches!(
            config.test_set(Some("nope")),
            Err(ConfigError::UnknownTestSet(_))
        ));
    }

    #[test]
    fn test_defaults() {
        let config = ContestConfig::from_toml_str(
            r#"
[Common]
TargetProgram = "./a.out"
JudgeProgram = "./judge"
ScoreLine = "Score"
"#,
        )
        .unwrap();
        assert_eq!(config.common.workers, DEFAULT_WORKERS);
        assert_eq!(config.direction(), RankDirection::Minimize);
        assert_eq!(config.mode(), ExecutionMode::Batch);
        assert_eq!(config.timeout(), None);
        assert!(!config.standings.enable);
        assert!(matches!(config.test_set(None), Err(ConfigError::Missing(_))));
    }

    #[test]
    fn test_validation_errors() {
        let zero_workers = SAMPLE.replace("Workers = 6", "Workers = 0");
        assert!(matches!(
            ContestConfig::from_toml_str(&zero_workers),
            Err(ConfigError::InvalidValue(_))
        ));

        let no_marker = SAMPLE.replace("ScoreLine = \"Score =\"", "ScoreLine = \"\"");
        assert!(matches!(
            ContestConfig::from_toml_str(&no_marker),
            Err(ConfigError::Missing(_))
        ));

        let bad_env = SAMPLE.replace("Values = [\"1\"]", "Values = []");
        assert!(ContestConfig::from_toml_str(&bad_env).is_err());

        assert!(matches!(
            ContestConfig::from_toml_str("[Common]\nWorkers = 1\n"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_relative_base_dir_is_made_absolute() {
        let relative = SAMPLE.replace("BaseDir = \"/work\"", "BaseDir = \"contest/work\"");
        let config = ContestConfig::from_toml_str(&relative).unwrap();
        let expected = env::current_dir().unwrap().join("contest/work");
        assert_eq!(config.common.base_dir, expected);
        assert_eq!(config.test_set(None).unwrap().data_dir, expected.join("tools/in"));
    }

    #[test]
    fn test_missing_file() {
        let err = ContestConfig::from_file(Path::new("/nonexistent/contest.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Unreadable { .. }));
    }
}
