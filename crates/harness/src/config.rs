//! Harness configuration

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{HarnessError, HarnessResult};

/// Which baseline set a run compares against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Full-resolution renders against `expected/`
    Full,
    /// Reduced-resolution renders against `expected_thumbs/`
    Thumbnail,
}

impl Mode {
    /// Parse the driver's positional argument. Only `thumbs` selects
    /// thumbnail mode; anything else, or nothing, is full mode.
    pub fn from_arg(arg: Option<&str>) -> Self {
        match arg {
            Some("thumbs") => Mode::Thumbnail,
            _ => Mode::Full,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Full => "full",
            Mode::Thumbnail => "thumbs",
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a conversion failure means for the suite
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionFailurePolicy {
    /// Log and mark the document skipped
    #[default]
    Skip,
    /// Mark the document failed; the run continues
    Fail,
}

/// Where each document's script runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScratchMode {
    /// The harness root, purged of images before each document
    #[default]
    Shared,
    /// A fresh temporary directory per document, removed afterwards
    Isolated,
}

/// Harness configuration, usually loaded from `nbvisual.toml`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Glob pattern for notebooks, relative to the harness root
    pub notebooks: String,

    /// Extension of rendered images
    pub image_extension: String,

    /// Extension of generated scripts
    pub script_extension: String,

    /// Normalised per-image difference allowed before a mismatch
    pub tolerance: f64,

    /// Stop at the first comparison mismatch; `false` records it and moves on
    pub fail_fast: bool,

    pub conversion_failure: ConversionFailurePolicy,

    pub scratch: ScratchMode,

    /// Run report path
    pub report: PathBuf,

    /// Root for mismatch diff images
    pub diff_dir: PathBuf,

    pub baseline: BaselineConfig,

    pub thumbnail: ThumbnailConfig,

    pub clock: ClockConfig,

    pub runner: RunnerConfig,

    pub exporter: ExporterConfig,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            notebooks: "../*.ipynb".to_string(),
            image_extension: "png".to_string(),
            script_extension: "py".to_string(),
            tolerance: 1e-4,
            fail_fast: true,
            conversion_failure: ConversionFailurePolicy::default(),
            scratch: ScratchMode::default(),
            report: PathBuf::from("results.json"),
            diff_dir: PathBuf::from("diffs"),
            baseline: BaselineConfig::default(),
            thumbnail: ThumbnailConfig::default(),
            clock: ClockConfig::default(),
            runner: RunnerConfig::default(),
            exporter: ExporterConfig::default(),
        }
    }
}

/// Baseline directory names
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BaselineConfig {
    pub full_dir: PathBuf,
    pub thumbs_dir: PathBuf,
}

impl Default for BaselineConfig {
    fn default() -> Self {
        Self {
            full_dir: PathBuf::from("expected"),
            thumbs_dir: PathBuf::from("expected_thumbs"),
        }
    }
}

impl BaselineConfig {
    /// The single baseline root active in `mode`
    pub fn dir_for(&self, mode: Mode) -> &Path {
        match mode {
            Mode::Full => &self.full_dir,
            Mode::Thumbnail => &self.thumbs_dir,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThumbnailConfig {
    /// Square resolution requested in thumbnail mode
    pub resolution: u32,
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self { resolution: 320 }
    }
}

/// Frozen-clock execution settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
    /// Instant every time read observes during script execution
    pub frozen_at: DateTime<Utc>,

    /// Interpreter used to run generated scripts
    pub interpreter: String,

    /// Force the rendering library into headless test mode
    pub test_mode: bool,

    /// Module whose `settings` carry the test mode flag
    pub render_library: String,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            frozen_at: default_frozen_at(),
            interpreter: "python".to_string(),
            test_mode: true,
            render_library: "lavavu".to_string(),
        }
    }
}

/// 2025-01-01 00:00 UTC
pub fn default_frozen_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// Command the sandbox invokes with the script path appended
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Program to run (None = the `clock-freezer` next to the driver)
    pub program: Option<PathBuf>,

    /// Arguments placed before the script path
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExporterKind {
    #[default]
    Native,
    Nbconvert,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExporterConfig {
    pub kind: ExporterKind,

    /// Program for the `nbconvert` exporter
    pub command: String,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            kind: ExporterKind::default(),
            command: "jupyter".to_string(),
        }
    }
}

impl HarnessConfig {
    /// Load configuration from file
    pub fn load(path: &Path) -> HarnessResult<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> HarnessResult<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject settings that cannot describe a meaningful run
    pub fn validate(&self) -> HarnessResult<()> {
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(HarnessError::Config(format!(
                "tolerance must be a non-negative number, got {}",
                self.tolerance
            )));
        }
        if self.thumbnail.resolution == 0 {
            return Err(HarnessError::Config(
                "thumbnail resolution must be at least 1".to_string(),
            ));
        }
        if self.image_extension.is_empty() || self.script_extension.is_empty() {
            return Err(HarnessError::Config(
                "image and script extensions must not be empty".to_string(),
            ));
        }
        if self.baseline.full_dir == self.baseline.thumbs_dir {
            return Err(HarnessError::Config(format!(
                "full and thumbnail baselines share {}",
                self.baseline.full_dir.display()
            )));
        }
        Ok(())
    }

    /// Baseline root for `mode`, resolved against the harness root
    pub fn baseline_root(&self, root: &Path, mode: Mode) -> PathBuf {
        root.join(self.baseline.dir_for(mode))
    }

    /// Diff image root for `mode`, resolved against the harness root
    pub fn diff_root(&self, root: &Path, mode: Mode) -> PathBuf {
        root.join(&self.diff_dir).join(mode.as_str())
    }
}
