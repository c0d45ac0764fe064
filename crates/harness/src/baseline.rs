//! Baseline bootstrapping and verification

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::compare::{ComparisonReport, ImageComparator};
use crate::error::{HarnessError, HarnessResult};
use crate::sandbox::Workspace;

/// Whether a document already has a baseline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaselineState {
    /// No baseline yet; this run's images become it
    Bootstrap,
    /// Compare this run's images with the baseline
    Verify,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BaselineOutcome {
    Bootstrapped { images: Vec<String> },
    Verified { report: ComparisonReport },
}

/// Owns one baseline root (full or thumbnail) for the whole run
pub struct BaselineManager {
    root: PathBuf,
    tolerance: f64,
    comparator: Box<dyn ImageComparator>,
}

impl BaselineManager {
    pub fn new(root: impl Into<PathBuf>, tolerance: f64, comparator: Box<dyn ImageComparator>) -> Self {
        Self {
            root: root.into(),
            tolerance,
            comparator,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    pub fn expected_dir(&self, stem: &str) -> PathBuf {
        self.root.join(stem)
    }

    /// Decide the state before the document executes
    pub fn state_for(&self, stem: &str) -> BaselineState {
        if self.expected_dir(stem).is_dir() {
            BaselineState::Verify
        } else {
            BaselineState::Bootstrap
        }
    }

    /// Archive or verify the images rendered into `workspace`
    pub fn settle(
        &self,
        stem: &str,
        state: BaselineState,
        workspace: &Workspace,
    ) -> HarnessResult<BaselineOutcome> {
        match state {
            BaselineState::Bootstrap => self.bootstrap(stem, workspace),
            BaselineState::Verify => self.verify(stem, workspace),
        }
    }

    fn bootstrap(&self, stem: &str, workspace: &Workspace) -> HarnessResult<BaselineOutcome> {
        let expected_dir = self.expected_dir(stem);
        std::fs::create_dir_all(&expected_dir)?;

        let rendered = workspace.rendered_images()?;
        if rendered.is_empty() {
            warn!("{} rendered no images; recording an empty baseline", stem);
        } else {
            info!(
                "Using {} image(s) from the initial run as the baseline in {}",
                rendered.len(),
                expected_dir.display()
            );
        }

        let mut images = Vec::with_capacity(rendered.len());
        for path in rendered {
            let Some(name) = path.file_name() else { continue };
            move_file(&path, &expected_dir.join(name))?;
            images.push(name.to_string_lossy().to_string());
        }

        Ok(BaselineOutcome::Bootstrapped { images })
    }

    fn verify(&self, stem: &str, workspace: &Workspace) -> HarnessResult<BaselineOutcome> {
        let expected_dir = self.expected_dir(stem);
        let report = self
            .comparator
            .compare(workspace.dir(), &expected_dir, self.tolerance)?;

        if !report.passed() {
            return Err(HarnessError::ComparisonMismatch {
                document: stem.to_string(),
                expected_dir,
                failures: report.failures(),
                report: Box::new(report),
            });
        }

        info!("{} matches {} ({} image(s))", stem, expected_dir.display(), report.images.len());
        Ok(BaselineOutcome::Verified { report })
    }
}

/// Rename, falling back to copy and remove across filesystems
fn move_file(from: &Path, to: &Path) -> HarnessResult<()> {
    if std::fs::rename(from, to).is_err() {
        std::fs::copy(from, to)?;
        std::fs::remove_file(from)?;
    }
    Ok(())
}
