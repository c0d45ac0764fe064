//! nbvisual harness
//!
//! Visual regression testing for notebook-driven rendering examples:
//! - Converts each notebook into a standalone script so renders land on disk
//! - Runs scripts as child processes with the clock frozen at a fixed instant
//! - Records the first run's images as the baseline, then compares later runs
//!   against it within a tolerance
//! - Keeps a separate reduced-resolution ("thumbs") baseline set
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Harness (driver)                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  discover() -> [Document]            (sorted glob)           │
//! │  run_document(doc)                                           │
//! │    ├── BaselineManager::state_for()  Bootstrap | Verify      │
//! │    ├── DocumentConverter::convert()  + ResolutionRewriter    │
//! │    ├── ExecutionSandbox::execute()   purge, clock-freezer    │
//! │    └── BaselineManager::settle()     move | ImageComparator  │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod baseline;
pub mod clock;
pub mod compare;
pub mod config;
pub mod convert;
pub mod document;
pub mod driver;
pub mod error;
pub mod freezer;
pub mod report;
pub mod rewrite;
pub mod sandbox;

pub use baseline::{BaselineManager, BaselineOutcome, BaselineState};
pub use clock::{Clock, FrozenClock, SystemClock};
pub use compare::{ComparisonReport, ImageComparator, PixelComparator};
pub use config::{HarnessConfig, Mode};
pub use convert::{DocumentConverter, GeneratedScript, NativeExporter, NbconvertExporter, ScriptExporter};
pub use document::Document;
pub use driver::Harness;
pub use error::{HarnessError, HarnessResult};
pub use freezer::{ClockFreezer, RenderSettings};
pub use report::{DocumentResult, DocumentStatus, SuiteResult};
pub use rewrite::ResolutionRewriter;
pub use sandbox::{ExecutionSandbox, RunnerCommand, Workspace};

/// Harness version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
