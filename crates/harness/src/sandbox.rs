//! Script execution - working directories and the child process

use std::path::{Path, PathBuf};
use std::process::Stdio;
use tempfile::TempDir;
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::{ClockConfig, RunnerConfig};
use crate::error::{HarnessError, HarnessResult};

/// Directory a document's script runs in and renders into
#[derive(Debug)]
pub struct Workspace {
    dir: PathBuf,
    image_extension: String,

    /// Held so the scratch directory lives as long as the workspace
    _scratch: Option<TempDir>,
}

impl Workspace {
    /// Run in `dir` itself, shared by every document
    pub fn shared(dir: impl Into<PathBuf>, image_extension: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            image_extension: image_extension.into(),
            _scratch: None,
        }
    }

    /// Run in a fresh directory under `parent`, removed when dropped
    pub fn isolated(parent: &Path, stem: &str, image_extension: impl Into<String>) -> HarnessResult<Self> {
        let scratch = tempfile::Builder::new()
            .prefix(&format!(".nbvisual-{}-", stem))
            .tempdir_in(parent)?;
        debug!("Scratch directory for {}: {}", stem, scratch.path().display());

        Ok(Self {
            dir: scratch.path().to_path_buf(),
            image_extension: image_extension.into(),
            _scratch: Some(scratch),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn is_isolated(&self) -> bool {
        self._scratch.is_some()
    }

    fn image_pattern(&self) -> String {
        let dir = glob::Pattern::escape(&self.dir.to_string_lossy());
        format!("{}/*.{}", dir, self.image_extension)
    }

    /// Rendered images currently in the workspace, sorted by name
    pub fn rendered_images(&self) -> HarnessResult<Vec<PathBuf>> {
        let mut images = Vec::new();
        for entry in glob::glob(&self.image_pattern())? {
            let path = entry?;
            if path.is_file() {
                images.push(path);
            }
        }
        images.sort();
        Ok(images)
    }

    /// Delete images left over from an earlier, possibly partial, run
    pub fn purge_images(&self) -> HarnessResult<usize> {
        let stale = self.rendered_images()?;
        for image in &stale {
            std::fs::remove_file(image)?;
        }
        if !stale.is_empty() {
            info!("Removed {} stale image(s) from {}", stale.len(), self.dir.display());
        }
        Ok(stale.len())
    }
}

/// Program and leading arguments used to run a script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl RunnerCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// The configured runner, or the `clock-freezer` shipped next to the
    /// current executable with the clock settings passed as flags
    pub fn from_config(runner: &RunnerConfig, clock: &ClockConfig) -> Self {
        if let Some(program) = &runner.program {
            return Self {
                program: program.clone(),
                args: runner.args.clone(),
            };
        }

        let mut cmd = Self::new(default_freezer_path())
            .arg("--frozen-at")
            .arg(clock.frozen_at.to_rfc3339())
            .arg("--interpreter")
            .arg(clock.interpreter.clone())
            .arg("--render-library")
            .arg(clock.render_library.clone());
        if !clock.test_mode {
            cmd = cmd.arg("--no-test-mode");
        }
        cmd.args.extend(runner.args.iter().cloned());
        cmd
    }
}

fn default_freezer_path() -> PathBuf {
    let name = format!("clock-freezer{}", std::env::consts::EXE_SUFFIX);
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(&name)))
        .filter(|path| path.exists())
        .unwrap_or_else(|| PathBuf::from(name))
}

/// Runs generated scripts as child processes
#[derive(Debug, Clone)]
pub struct ExecutionSandbox {
    runner: RunnerCommand,
}

impl ExecutionSandbox {
    pub fn new(runner: RunnerCommand) -> Self {
        Self { runner }
    }

    pub fn runner(&self) -> &RunnerCommand {
        &self.runner
    }

    /// Run `script` inside `workspace` and wait for it.
    ///
    /// The child inherits the environment and standard streams. A non-zero
    /// exit is an [`HarnessError::ExecutionFailure`].
    pub async fn execute(&self, script: &Path, workspace: &Workspace) -> HarnessResult<()> {
        workspace.purge_images()?;

        debug!(
            "Executing {} {} {} in {}",
            self.runner.program.display(),
            self.runner.args.join(" "),
            script.display(),
            workspace.dir().display()
        );

        let status = Command::new(&self.runner.program)
            .args(&self.runner.args)
            .arg(script)
            .current_dir(workspace.dir())
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await?;

        if !status.success() {
            return Err(HarnessError::ExecutionFailure {
                script: script.to_path_buf(),
                code: status.code(),
            });
        }

        Ok(())
    }
}
