//! Run results

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::compare::ComparisonReport;
use crate::config::Mode;
use crate::error::HarnessResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    /// Baseline recorded from this run
    Bootstrapped,
    /// Matched the baseline
    Passed,
    Failed,
    /// Not executed (conversion failed under the skip policy)
    Skipped,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Bootstrapped => "bootstrapped",
            DocumentStatus::Passed => "passed",
            DocumentStatus::Failed => "failed",
            DocumentStatus::Skipped => "skipped",
        }
    }
}

/// Result of running a single document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentResult {
    pub name: String,
    pub path: PathBuf,
    pub status: DocumentStatus,
    pub duration_ms: u64,

    /// Images archived or compared
    pub images: Vec<String>,

    pub comparison: Option<ComparisonReport>,
    pub error: Option<String>,
}

/// Result of running all documents
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteResult {
    pub mode: Mode,
    pub started_at: DateTime<Utc>,
    pub total: usize,
    pub passed: usize,
    pub bootstrapped: usize,
    pub failed: usize,
    pub skipped: usize,
    pub duration_ms: u64,
    pub results: Vec<DocumentResult>,

    /// Why the run stopped early, if it did
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aborted: Option<String>,
}

impl SuiteResult {
    pub fn new(mode: Mode, started_at: DateTime<Utc>) -> Self {
        Self {
            mode,
            started_at,
            total: 0,
            passed: 0,
            bootstrapped: 0,
            failed: 0,
            skipped: 0,
            duration_ms: 0,
            results: Vec::new(),
            aborted: None,
        }
    }

    pub fn push(&mut self, result: DocumentResult) {
        self.total += 1;
        match result.status {
            DocumentStatus::Bootstrapped => self.bootstrapped += 1,
            DocumentStatus::Passed => self.passed += 1,
            DocumentStatus::Failed => self.failed += 1,
            DocumentStatus::Skipped => self.skipped += 1,
        }
        self.results.push(result);
    }

    pub fn success(&self) -> bool {
        self.failed == 0 && self.aborted.is_none()
    }

    /// Write results as pretty JSON
    pub fn write(&self, path: &Path) -> HarnessResult<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;

        info!("Results written to: {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_frozen_at;

    fn result(name: &str, status: DocumentStatus) -> DocumentResult {
        DocumentResult {
            name: name.to_string(),
            path: PathBuf::from(format!("../{}.ipynb", name)),
            status,
            duration_ms: 0,
            images: vec![],
            comparison: None,
            error: None,
        }
    }

    #[test]
    fn test_totals() {
        let mut suite = SuiteResult::new(Mode::Full, default_frozen_at());
        suite.push(result("a", DocumentStatus::Bootstrapped));
        suite.push(result("b", DocumentStatus::Passed));
        suite.push(result("c", DocumentStatus::Skipped));
        assert!(suite.success());

        suite.push(result("d", DocumentStatus::Failed));
        assert_eq!(
            (suite.total, suite.bootstrapped, suite.passed, suite.skipped, suite.failed),
            (4, 1, 1, 1, 1)
        );
        assert!(!suite.success());
    }

    #[test]
    fn test_write_is_reproducible_under_frozen_start() {
        let dir = tempfile::tempdir().unwrap();
        let mut suite = SuiteResult::new(Mode::Thumbnail, default_frozen_at());
        suite.push(result("a", DocumentStatus::Passed));

        let first = dir.path().join("first.json");
        let second = dir.path().join("nested").join("second.json");
        suite.write(&first).unwrap();
        suite.write(&second).unwrap();

        let text = std::fs::read_to_string(&first).unwrap();
        assert_eq!(text, std::fs::read_to_string(&second).unwrap());
        assert!(text.contains("\"mode\": \"thumbnail\""));
        assert!(text.contains("2025-01-01T00:00:00Z"));
    }

    #[test]
    fn test_aborted_suite_is_not_a_success() {
        let mut suite = SuiteResult::new(Mode::Full, default_frozen_at());
        suite.push(result("a", DocumentStatus::Passed));
        let clean = serde_json::to_string(&suite).unwrap();
        assert!(!clean.contains("aborted"));

        suite.aborted = Some("Script b.py exited with status 4".to_string());
        assert!(!suite.success());
        let text = serde_json::to_string(&suite).unwrap();
        assert!(text.contains("\"aborted\":\"Script b.py exited with status 4\""));
    }
}
