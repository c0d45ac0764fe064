//! Main test driver that walks the notebooks through conversion, execution
//! and baseline handling

use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::baseline::{BaselineManager, BaselineOutcome};
use crate::clock::{Clock, SystemClock};
use crate::compare::{ImageComparator, PixelComparator};
use crate::config::{ConversionFailurePolicy, HarnessConfig, Mode, ScratchMode};
use crate::convert::{exporter_from_config, DocumentConverter, ScriptExporter};
use crate::document::Document;
use crate::error::{HarnessError, HarnessResult};
use crate::report::{DocumentResult, DocumentStatus, SuiteResult};
use crate::sandbox::{ExecutionSandbox, RunnerCommand, Workspace};

/// Drives every notebook through the pipeline, one at a time
pub struct Harness {
    /// Directory the harness runs from; relative config paths hang off it
    root: PathBuf,

    config: HarnessConfig,

    mode: Mode,

    converter: DocumentConverter,

    sandbox: ExecutionSandbox,

    baseline: BaselineManager,

    clock: Box<dyn Clock>,
}

impl Harness {
    /// Create a harness with the components named in `config`
    pub fn new(root: impl Into<PathBuf>, config: HarnessConfig, mode: Mode) -> HarnessResult<Self> {
        config.validate()?;
        let root = root.into();

        let converter = Self::converter(&config, mode, exporter_from_config(&config.exporter)?);
        let sandbox = ExecutionSandbox::new(RunnerCommand::from_config(&config.runner, &config.clock));
        let comparator = PixelComparator::new(config.image_extension.clone())
            .with_diff_dir(config.diff_root(&root, mode));
        let baseline = BaselineManager::new(
            config.baseline_root(&root, mode),
            config.tolerance,
            Box::new(comparator),
        );

        Ok(Self {
            root,
            config,
            mode,
            converter,
            sandbox,
            baseline,
            clock: Box::new(SystemClock),
        })
    }

    fn converter(config: &HarnessConfig, mode: Mode, exporter: Box<dyn ScriptExporter>) -> DocumentConverter {
        let converter = DocumentConverter::new(exporter, config.script_extension.clone());
        match mode {
            Mode::Thumbnail => converter.with_resolution(config.thumbnail.resolution),
            Mode::Full => converter,
        }
    }

    pub fn with_runner(mut self, runner: RunnerCommand) -> Self {
        self.sandbox = ExecutionSandbox::new(runner);
        self
    }

    pub fn with_exporter(mut self, exporter: Box<dyn ScriptExporter>) -> Self {
        self.converter = Self::converter(&self.config, self.mode, exporter);
        self
    }

    pub fn with_comparator(mut self, comparator: Box<dyn ImageComparator>) -> Self {
        self.baseline = BaselineManager::new(
            self.config.baseline_root(&self.root, self.mode),
            self.config.tolerance,
            comparator,
        );
        self
    }

    pub fn with_clock(mut self, clock: Box<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn baseline_root(&self) -> &Path {
        self.baseline.root()
    }

    pub fn exporter_name(&self) -> &'static str {
        self.converter.exporter_name()
    }

    pub fn runner(&self) -> &RunnerCommand {
        self.sandbox.runner()
    }

    /// Notebooks matching the configured pattern, in sorted order
    pub fn discover(&self) -> HarnessResult<Vec<Document>> {
        let pattern = if Path::new(&self.config.notebooks).is_absolute() {
            self.config.notebooks.clone()
        } else {
            format!(
                "{}/{}",
                glob::Pattern::escape(&self.root.to_string_lossy()),
                self.config.notebooks
            )
        };
        Document::discover(&pattern)
    }

    /// An empty suite stamped with the harness clock
    pub fn start_suite(&self) -> SuiteResult {
        SuiteResult::new(self.mode, self.clock.now())
    }

    /// Run every discovered notebook and return the finished suite
    pub async fn run_all(&self) -> HarnessResult<SuiteResult> {
        let mut suite = self.start_suite();
        self.run_into(&mut suite).await?;
        Ok(suite)
    }

    /// Run every discovered notebook, recording each result into `suite`.
    ///
    /// Conversion failures are recorded and the run moves on. A comparison
    /// mismatch aborts unless `fail_fast` is off, in which case it is
    /// recorded as a failed document. A script that exits non-zero always
    /// aborts. On abort `suite` keeps the documents that finished, the
    /// failing one, and the reason.
    pub async fn run_into(&self, suite: &mut SuiteResult) -> HarnessResult<()> {
        let documents = self.discover()?;
        let start = Instant::now();

        info!(
            "Running {} notebook(s) in {} mode against {}",
            documents.len(),
            self.mode,
            self.baseline.root().display()
        );

        for document in &documents {
            let doc_start = Instant::now();
            match self.run_document(document).await {
                Ok(result) => {
                    match result.status {
                        DocumentStatus::Passed | DocumentStatus::Bootstrapped => {
                            info!("✓ {} {} ({} ms)", result.name, result.status.as_str(), result.duration_ms)
                        }
                        DocumentStatus::Skipped | DocumentStatus::Failed => warn!(
                            "✗ {} {} - {}",
                            result.name,
                            result.status.as_str(),
                            result.error.as_deref().unwrap_or("unknown error")
                        ),
                    }
                    suite.push(result);
                }
                Err(e) => {
                    error!("✗ {} - {}", document.stem, e);
                    suite.push(failed_result(document, doc_start, &e));

                    let recoverable = matches!(e, HarnessError::ComparisonMismatch { .. }) && !self.config.fail_fast;
                    if !recoverable {
                        suite.duration_ms = start.elapsed().as_millis() as u64;
                        suite.aborted = Some(e.to_string());
                        return Err(e);
                    }
                }
            }
        }

        suite.duration_ms = start.elapsed().as_millis() as u64;

        info!(
            "Results: {} passed, {} bootstrapped, {} failed, {} skipped ({} ms)",
            suite.passed, suite.bootstrapped, suite.failed, suite.skipped, suite.duration_ms
        );

        Ok(())
    }

    /// Convert, execute and settle one notebook
    pub async fn run_document(&self, document: &Document) -> HarnessResult<DocumentResult> {
        let start = Instant::now();
        info!("Testing notebook: {}", document.stem);

        // Decided before anything runs so this run's output cannot influence it
        let state = self.baseline.state_for(&document.stem);
        debug!(
            "{}: {:?} against {}",
            document.stem,
            state,
            self.baseline.expected_dir(&document.stem).display()
        );

        let workspace = match self.config.scratch {
            ScratchMode::Shared => Workspace::shared(&self.root, self.config.image_extension.clone()),
            ScratchMode::Isolated => {
                Workspace::isolated(&self.root, &document.stem, self.config.image_extension.clone())?
            }
        };

        let script = match self.converter.convert(document, workspace.dir()) {
            Ok(script) => script,
            Err(HarnessError::Conversion { reason, .. }) => {
                warn!("Notebook conversion failed for {}: {}", document.stem, reason);
                let status = match self.config.conversion_failure {
                    ConversionFailurePolicy::Skip => DocumentStatus::Skipped,
                    ConversionFailurePolicy::Fail => DocumentStatus::Failed,
                };
                return Ok(DocumentResult {
                    name: document.stem.clone(),
                    path: document.path.clone(),
                    status,
                    duration_ms: start.elapsed().as_millis() as u64,
                    images: Vec::new(),
                    comparison: None,
                    error: Some(reason),
                });
            }
            Err(e) => return Err(e),
        };

        self.sandbox.execute(&script.path, &workspace).await?;

        let outcome = self.baseline.settle(&document.stem, state, &workspace)?;

        let (status, images, comparison) = match outcome {
            BaselineOutcome::Bootstrapped { images } => (DocumentStatus::Bootstrapped, images, None),
            BaselineOutcome::Verified { report } => {
                let images = report.images.iter().map(|i| i.name.clone()).collect();
                (DocumentStatus::Passed, images, Some(report))
            }
        };

        Ok(DocumentResult {
            name: document.stem.clone(),
            path: document.path.clone(),
            status,
            duration_ms: start.elapsed().as_millis() as u64,
            images,
            comparison,
            error: None,
        })
    }

    /// Report location, resolved against the harness root
    pub fn report_path(&self) -> PathBuf {
        self.root.join(&self.config.report)
    }

    /// Write the run report to the configured path
    pub fn write_report(&self, suite: &SuiteResult) -> HarnessResult<PathBuf> {
        let path = self.report_path();
        suite.write(&path)?;
        Ok(path)
    }
}

/// Result for a document whose run ended in an error
fn failed_result(document: &Document, start: Instant, error: &HarnessError) -> DocumentResult {
    let comparison = match error {
        HarnessError::ComparisonMismatch { report, .. } => Some(report.as_ref().clone()),
        _ => None,
    };
    let images = comparison
        .as_ref()
        .map(|report| report.images.iter().map(|i| i.name.clone()).collect())
        .unwrap_or_default();

    DocumentResult {
        name: document.stem.clone(),
        path: document.path.clone(),
        status: DocumentStatus::Failed,
        duration_ms: start.elapsed().as_millis() as u64,
        images,
        comparison,
        error: Some(error.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_selects_single_baseline_root() {
        let root = tempfile::tempdir().unwrap();
        let full = Harness::new(root.path(), HarnessConfig::default(), Mode::Full).unwrap();
        let thumbs = Harness::new(root.path(), HarnessConfig::default(), Mode::Thumbnail).unwrap();

        assert_eq!(full.baseline_root(), root.path().join("expected"));
        assert_eq!(thumbs.baseline_root(), root.path().join("expected_thumbs"));
    }

    #[test]
    fn test_discover_relative_to_root() {
        let parent = tempfile::tempdir().unwrap();
        let root = parent.path().join("tests");
        std::fs::create_dir(&root).unwrap();
        std::fs::write(parent.path().join("Zeta.ipynb"), "{}").unwrap();
        std::fs::write(parent.path().join("Alpha.ipynb"), "{}").unwrap();

        let harness = Harness::new(&root, HarnessConfig::default(), Mode::Full).unwrap();
        let stems: Vec<_> = harness.discover().unwrap().into_iter().map(|d| d.stem).collect();
        assert_eq!(stems, vec!["Alpha", "Zeta"]);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = HarnessConfig::default();
        config.tolerance = f64::NAN;
        assert!(Harness::new(".", config, Mode::Full).is_err());
    }
}
