//! Test catalog: the input files of one test set.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use agon_common::{TestCase, TestId, format_test_id};
use tracing::{debug, warn};

use crate::config::TestSet;
use crate::constants::{INPUT_EXTENSION, SEEDS_FILE};
use crate::filter::Filter;

/// Every case of a test set, indexed by id.
#[derive(Debug, Clone)]
pub struct TestCatalog {
    set_name: String,
    fields: Vec<String>,
    cases: Vec<TestCase>,
}

impl TestCatalog {
    /// Read seeds and first-line parameters of `0000.txt`..`NNNN.txt`.
    ///
    /// Missing input files are kept in the catalog; they fail when executed.
    pub fn load(set: &TestSet, fields: Vec<String>) -> std::io::Result<Self> {
        let seeds = read_seeds(&set.data_dir.join(SEEDS_FILE))?;
        let cases = (0..set.count)
            .map(|id| {
                let input_path = input_path(&set.data_dir, id);
                let params = read_params(&input_path);
                TestCase {
                    id,
                    input_path,
                    seed: seeds.get(id).cloned(),
                    params,
                }
            })
            .collect::<Vec<_>>();

        let missing = cases.iter().filter(|c| !c.input_path.exists()).count();
        if missing > 0 {
            warn!(set = %set.name, missing, "Some input files are missing");
        }
        debug!(set = %set.name, cases = cases.len(), "Loaded test catalog");

        Ok(Self {
            set_name: set.name.clone(),
            fields,
            cases,
        })
    }

    pub fn set_name(&self) -> &str {
        &self.set_name
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn cases(&self) -> &[TestCase] {
        &self.cases
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    pub fn case(&self, id: TestId) -> Option<&TestCase> {
        self.cases.get(id)
    }

    /// Numeric parameters of a case keyed by field name.
    pub fn params(&self, case: &TestCase) -> HashMap<&str, f64> {
        self.fields
            .iter()
            .zip(&case.params)
            .filter_map(|(name, value)| value.parse().ok().map(|v| (name.as_str(), v)))
            .collect()
    }

    /// Ids of the cases accepted by `filter`, all ids when there is none.
    pub fn select(&self, filter: Option<&Filter>) -> Vec<TestId> {
        self.cases
            .iter()
            .filter(|case| filter.is_none_or(|f| f.matches(&self.params(case))))
            .map(|case| case.id)
            .collect()
    }

    /// Write `input.csv` (`file,seed,<fields>`) unless it already exists.
    pub fn write_inputs_csv(&self, path: &Path) -> std::io::Result<bool> {
        if path.exists() {
            return Ok(false);
        }
        let mut out = std::io::BufWriter::new(File::create(path)?);
        let mut header = vec!["file".to_string(), "seed".to_string()];
        header.extend(self.fields.iter().cloned());
        writeln!(out, "{}", header.join(","))?;
        for case in &self.cases {
            let mut row = vec![
                format!("{}.{}", case.label(), INPUT_EXTENSION),
                case.seed.clone().unwrap_or_default(),
            ];
            row.extend(case.params.iter().take(self.fields.len()).cloned());
            writeln!(out, "{}", row.join(","))?;
        }
        out.flush()?;
        Ok(true)
    }
}

pub fn input_path(dir: &Path, id: TestId) -> PathBuf {
    dir.join(format!("{}.{}", format_test_id(id), INPUT_EXTENSION))
}

fn read_seeds(path: &Path) -> std::io::Result<Vec<String>> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(content
            .lines()
            .map(|line| line.trim().to_string())
            .collect()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e),
    }
}

fn read_params(path: &Path) -> Vec<String> {
    let Ok(file) = File::open(path) else {
        return Vec::new();
    };
    let mut first = String::new();
    if BufReader::new(file).read_line(&mut first).is_err() {
        return Vec::new();
    }
    first.split_whitespace().map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_set(dir: &Path, count: usize) -> TestSet {
        TestSet {
            name: "main".into(),
            data_dir: dir.to_path_buf(),
            count,
            system_test: false,
        }
    }

    fn write_inputs(dir: &Path) {
        std::fs::write(dir.join("0000.txt"), "10 3\n1 2 3\n").unwrap();
        std::fs::write(dir.join("0001.txt"), "50 7\n").unwrap();
        std::fs::write(dir.join("0002.txt"), "90 1\n").unwrap();
        std::fs::write(dir.join("seeds.txt"), "111\n222\n").unwrap();
    }

    #[test]
    fn test_load_catalog() {
        let tmp = TempDir::new().unwrap();
        write_inputs(tmp.path());
        let catalog = TestCatalog::load(&test_set(tmp.path(), 4), vec!["N".into(), "M".into()]).unwrap();

        assert_eq!(catalog.len(), 4);
        let first = catalog.case(0).unwrap();
        assert_eq!(first.params, vec!["10", "3"]);
        assert_eq!(first.seed.as_deref(), Some("111"));
        assert_eq!(first.input_path, tmp.path().join("0000.txt"));
        assert_eq!(catalog.case(2).unwrap().seed, None);
        // missing input still yields a case
        assert!(catalog.case(3).unwrap().params.is_empty());
    }

    #[test]
    fn test_select_with_filter() {
        let tmp = TempDir::new().unwrap();
        write_inputs(tmp.path());
        let catalog = TestCatalog::load(&test_set(tmp.path(), 4), vec!["N".into(), "M".into()]).unwrap();

        assert_eq!(catalog.select(None), vec![0, 1, 2, 3]);
        let filter = Filter::parse("N >= 50 && M > 1").unwrap();
        assert_eq!(catalog.select(Some(&filter)), vec![1]);
    }

    #[test]
    fn test_inputs_csv() {
        let tmp = TempDir::new().unwrap();
        write_inputs(tmp.path());
        let catalog = TestCatalog::load(&test_set(tmp.path(), 2), vec!["N".into(), "M".into()]).unwrap();

        let path = tmp.path().join("input.csv");
        assert!(catalog.write_inputs_csv(&path).unwrap());
        assert!(!catalog.write_inputs_csv(&path).unwrap());
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "file,seed,N,M\n0000.txt,111,10,3\n0001.txt,222,50,7\n"
        );
    }
}
