//! Location of the log files of one test set.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{HistoryError, HistoryResult};

pub const RUN_LOG_FILE: &str = "run.csv";
pub const HISTORY_LOG_FILE: &str = "history.csv";
pub const RESULTS_FILE: &str = "result.csv";
pub const INPUTS_FILE: &str = "input.csv";

/// `<base>/logs/<set>/`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLayout {
    dir: PathBuf,
}

impl LogLayout {
    pub fn new(base_dir: impl AsRef<Path>, set_name: &str) -> Self {
        Self {
            dir: base_dir.as_ref().join("logs").join(set_name),
        }
    }

    pub fn ensure(&self) -> HistoryResult<()> {
        fs::create_dir_all(&self.dir).map_err(|e| HistoryError::io(&self.dir, e))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn run_log(&self) -> PathBuf {
        self.dir.join(RUN_LOG_FILE)
    }

    pub fn history_log(&self) -> PathBuf {
        self.dir.join(HISTORY_LOG_FILE)
    }

    pub fn results(&self) -> PathBuf {
        self.dir.join(RESULTS_FILE)
    }

    pub fn inputs(&self) -> PathBuf {
        self.dir.join(INPUTS_FILE)
    }

    /// Move the run and history logs aside to `*.1`, replacing older backups.
    pub fn rotate(&self) -> HistoryResult<Vec<PathBuf>> {
        let mut rotated = Vec::new();
        for path in [self.run_log(), self.history_log()] {
            if !path.exists() {
                continue;
            }
            let mut backup = path.clone().into_os_string();
            backup.push(".1");
            let backup = PathBuf::from(backup);
            fs::rename(&path, &backup).map_err(|e| HistoryError::io(&path, e))?;
            info!(from = %path.display(), to = %backup.display(), "Rotated log");
            rotated.push(backup);
        }
        Ok(rotated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_paths() {
        let layout = LogLayout::new("/work", "main");
        assert_eq!(layout.dir(), Path::new("/work/logs/main"));
        assert_eq!(layout.history_log(), PathBuf::from("/work/logs/main/history.csv"));
        assert_eq!(layout.results(), PathBuf::from("/work/logs/main/result.csv"));
    }

    #[test]
    fn test_rotate() {
        let tmp = TempDir::new().unwrap();
        let layout = LogLayout::new(tmp.path(), "main");
        layout.ensure().unwrap();
        fs::write(layout.run_log(), "new").unwrap();
        fs::write(layout.dir().join("run.csv.1"), "old").unwrap();

        let rotated = layout.rotate().unwrap();
        assert_eq!(rotated, vec![layout.dir().join("run.csv.1")]);
        assert!(!layout.run_log().exists());
        assert_eq!(fs::read_to_string(layout.dir().join("run.csv.1")).unwrap(), "new");
    }
}
