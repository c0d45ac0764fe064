//! Frozen-clock script execution
//!
//! The freezer runs a generated script through the configured interpreter
//! with a small bootstrap that pins every time read to one instant and puts
//! the rendering library into test mode before the script body executes.
//! The override is scoped with a context manager, so it is released whether
//! the script finishes or raises.

use chrono::{DateTime, SecondsFormat, Utc};
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use tokio::process::Command;
use tracing::{debug, info};

use crate::clock::FrozenClock;
use crate::config::ClockConfig;
use crate::error::{HarnessError, HarnessResult};

/// Message printed when the script argument is missing
pub const USAGE_MESSAGE: &str = "Requires script to run as first argument";

/// Settings handed to the rendering library before the script runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderSettings {
    /// Module exposing a `settings` mapping
    pub library: String,

    /// Headless, deterministic rendering
    pub test_mode: bool,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            library: "lavavu".to_string(),
            test_mode: true,
        }
    }
}

/// Runs scripts with the clock pinned to one instant
#[derive(Debug, Clone)]
pub struct ClockFreezer {
    interpreter: String,
    clock: FrozenClock,
    render: RenderSettings,
}

impl ClockFreezer {
    pub fn new(interpreter: impl Into<String>, frozen_at: DateTime<Utc>, render: RenderSettings) -> Self {
        Self {
            interpreter: interpreter.into(),
            clock: FrozenClock::new(frozen_at),
            render,
        }
    }

    pub fn from_config(config: &ClockConfig) -> Self {
        Self::new(
            config.interpreter.clone(),
            config.frozen_at,
            RenderSettings {
                library: config.render_library.clone(),
                test_mode: config.test_mode,
            },
        )
    }

    pub fn frozen_at(&self) -> DateTime<Utc> {
        self.clock.instant()
    }

    /// Interpreter source that freezes time and then executes `sys.argv[1]`
    pub fn bootstrap(&self) -> String {
        let mut source = String::from("import sys\nfrom freezegun import freeze_time\n");

        if !self.render.library.is_empty() {
            source.push_str(&format!(
                "import {lib}\n{lib}.settings['test_mode'] = {flag}\n",
                lib = self.render.library,
                flag = if self.render.test_mode { "True" } else { "False" },
            ));
        }

        source.push_str(&format!(
            r#"sys.argv = sys.argv[1:]
__script = sys.argv[0]
with freeze_time("{instant}"):
    with open(__script) as __fh:
        __code = compile(__fh.read(), __script, "exec")
    exec(__code, {{"__name__": "__main__", "__file__": __script}})
"#,
            instant = self.frozen_at().to_rfc3339_opts(SecondsFormat::Secs, true),
        ));

        source
    }

    /// Build the interpreter command for `script`
    pub fn command(&self, script: &Path) -> Command {
        let mut cmd = Command::new(&self.interpreter);
        cmd.arg("-c")
            .arg(self.bootstrap())
            .arg(script)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        cmd
    }

    /// Execute `script` and wait for it
    pub async fn run(&self, script: &Path) -> HarnessResult<ExitStatus> {
        info!(
            "Running {} with clock frozen at {}",
            script.display(),
            self.frozen_at()
        );
        debug!("Interpreter: {}", self.interpreter);

        let status = self.command(script).status().await?;

        debug!("{} exited with {}", script.display(), status);
        Ok(status)
    }
}

/// Validate the runner's single positional argument
pub fn require_script(arg: Option<PathBuf>) -> HarnessResult<PathBuf> {
    match arg {
        Some(path) if !path.as_os_str().is_empty() => Ok(path),
        _ => Err(HarnessError::Usage(USAGE_MESSAGE.to_string())),
    }
}
