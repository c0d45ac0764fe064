//! Error types for the harness

use std::path::PathBuf;
use thiserror::Error;

use crate::compare::ComparisonReport;

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("Notebook conversion failed for {document}: {reason}")]
    Conversion { document: String, reason: String },

    #[error("{0}")]
    Usage(String),

    #[error("Script {} exited with {}", script.display(), describe_exit(*code))]
    ExecutionFailure { script: PathBuf, code: Option<i32> },

    #[error(
        "Image mismatch for '{document}' against {}: {}",
        expected_dir.display(),
        failures.join("; ")
    )]
    ComparisonMismatch {
        document: String,
        expected_dir: PathBuf,
        failures: Vec<String>,
        report: Box<ComparisonReport>,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML encode error: {0}")]
    TomlEncode(#[from] toml::ser::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Invalid glob pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("Glob error: {0}")]
    Glob(#[from] glob::GlobError),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),
}

impl HarnessError {
    /// Exit code a driver process should report for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            HarnessError::ExecutionFailure { code: Some(code), .. } if *code != 0 => *code,
            HarnessError::Usage(_) => 2,
            _ => 1,
        }
    }
}

fn describe_exit(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("status {}", code),
        None => "no exit status (terminated by signal)".to_string(),
    }
}

pub type HarnessResult<T> = Result<T, HarnessError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_failure_exit_code_mirrors_child() {
        let err = HarnessError::ExecutionFailure {
            script: PathBuf::from("doc.py"),
            code: Some(3),
        };
        assert_eq!(err.exit_code(), 3);
        assert!(err.to_string().contains("status 3"));

        let killed = HarnessError::ExecutionFailure {
            script: PathBuf::from("doc.py"),
            code: None,
        };
        assert_eq!(killed.exit_code(), 1);
    }

    #[test]
    fn test_mismatch_names_document_and_baseline() {
        let err = HarnessError::ComparisonMismatch {
            document: "doc_a".to_string(),
            expected_dir: PathBuf::from("expected/doc_a"),
            failures: vec!["a.png differs".to_string()],
            report: Box::default(),
        };
        let message = err.to_string();
        assert!(message.contains("doc_a"));
        assert!(message.contains("expected/doc_a"));
        assert!(message.contains("a.png differs"));
    }
}
