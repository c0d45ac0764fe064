//! Notebook to script conversion
//!
//! Notebooks rendered inline never write their images to disk, so every
//! document is flattened into a plain script first and executed headless.

use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, info, warn};

use crate::config::{ExporterConfig, ExporterKind};
use crate::document::{CellType, Document};
use crate::error::{HarnessError, HarnessResult};
use crate::rewrite::{line_end_outside_strings, ResolutionRewriter};

/// Turns a notebook into executable script text
pub trait ScriptExporter: Send + Sync {
    fn name(&self) -> &'static str;

    fn export(&self, document: &Document) -> HarnessResult<String>;
}

/// Build the exporter selected in configuration
pub fn exporter_from_config(config: &ExporterConfig) -> HarnessResult<Box<dyn ScriptExporter>> {
    Ok(match config.kind {
        ExporterKind::Native => Box::new(NativeExporter::new()?),
        ExporterKind::Nbconvert => Box::new(NbconvertExporter::new(config.command.clone())),
    })
}

/// In-process exporter for nbformat 4 notebooks
pub struct NativeExporter {
    magic: Regex,
}

impl NativeExporter {
    pub fn new() -> HarnessResult<Self> {
        Ok(Self {
            magic: Regex::new(r"^(\s*)(%%?|!)")?,
        })
    }

    /// Copy a code cell, commenting out magics and shell escapes that
    /// start a line. Lines inside a multi-line string are copied as-is.
    fn push_code(&self, script: &mut String, source: &str) {
        let mut pos = 0;
        while pos < source.len() {
            let line_end = source[pos..].find('\n').map_or(source.len(), |n| pos + n + 1);
            let line = source[pos..line_end].trim_end_matches('\n');

            if self.magic.is_match(line) {
                let indent = line.len() - line.trim_start().len();
                script.push_str(&line[..indent]);
                script.push_str("# ");
                script.push_str(line.trim_start());
                script.push('\n');
                pos = line_end;
            } else {
                let end = line_end_outside_strings(source, pos);
                script.push_str(&source[pos..end]);
                pos = end;
            }
        }
        if !script.ends_with('\n') {
            script.push('\n');
        }
    }
}

impl ScriptExporter for NativeExporter {
    fn name(&self) -> &'static str {
        "native"
    }

    fn export(&self, document: &Document) -> HarnessResult<String> {
        let notebook = document.load()?;
        if notebook.nbformat < 4 {
            return Err(HarnessError::Conversion {
                document: document.stem.clone(),
                reason: format!("unsupported nbformat {}", notebook.nbformat),
            });
        }

        let mut script = String::from("#!/usr/bin/env python\n# coding: utf-8\n");

        for cell in &notebook.cells {
            let source = cell.source.text();
            match cell.cell_type {
                CellType::Markdown => {
                    script.push('\n');
                    for line in source.lines() {
                        script.push_str("# ");
                        script.push_str(line);
                        script.push('\n');
                    }
                }
                CellType::Code => {
                    let count = cell
                        .execution_count
                        .map(|n| n.to_string())
                        .unwrap_or_else(|| " ".to_string());
                    script.push_str(&format!("\n# In[{}]:\n\n\n", count));
                    self.push_code(&mut script, &source);
                    script.push('\n');
                }
                CellType::Raw => {}
            }
        }

        Ok(script)
    }
}

/// Delegates to `jupyter nbconvert --to script`
pub struct NbconvertExporter {
    command: String,
}

impl NbconvertExporter {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl ScriptExporter for NbconvertExporter {
    fn name(&self) -> &'static str {
        "nbconvert"
    }

    fn export(&self, document: &Document) -> HarnessResult<String> {
        debug!("{} nbconvert --to script --stdout {}", self.command, document.path.display());

        let output = Command::new(&self.command)
            .args(["nbconvert", "--to", "script", "--stdout"])
            .arg(&document.path)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| HarnessError::Conversion {
                document: document.stem.clone(),
                reason: format!("failed to run {}: {}", self.command, e),
            })?;

        if !output.status.success() {
            return Err(HarnessError::Conversion {
                document: document.stem.clone(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

/// A script written for one document
#[derive(Debug, Clone)]
pub struct GeneratedScript {
    pub source: String,
    pub path: PathBuf,
}

/// Exports documents and, in thumbnail mode, shrinks their resolutions
pub struct DocumentConverter {
    exporter: Box<dyn ScriptExporter>,
    rewriter: Option<ResolutionRewriter>,
    extension: String,
}

impl DocumentConverter {
    pub fn new(exporter: Box<dyn ScriptExporter>, extension: impl Into<String>) -> Self {
        Self {
            exporter,
            rewriter: None,
            extension: extension.into(),
        }
    }

    /// Request `size x size` renders from every converted script
    pub fn with_resolution(mut self, size: u32) -> Self {
        self.rewriter = Some(ResolutionRewriter::new(size));
        self
    }

    pub fn exporter_name(&self) -> &'static str {
        self.exporter.name()
    }

    /// Convert `document` and write the script into `out_dir`.
    ///
    /// Every export problem comes back as [`HarnessError::Conversion`] and
    /// no file is written for it.
    pub fn convert(&self, document: &Document, out_dir: &Path) -> HarnessResult<GeneratedScript> {
        let mut source = self.exporter.export(document).map_err(|e| match e {
            HarnessError::Conversion { .. } => e,
            other => HarnessError::Conversion {
                document: document.stem.clone(),
                reason: other.to_string(),
            },
        })?;

        if let Some(rewriter) = &self.rewriter {
            let found = rewriter.matches(&source);
            if found == 0 {
                warn!("No resolution requests found in {}", document.stem);
            } else {
                debug!("Rewriting {} resolution request(s) to {}", found, rewriter.size());
                source = rewriter.rewrite(&source);
            }
        }

        let path = out_dir.join(document.script_name(&self.extension));
        std::fs::write(&path, &source)?;
        info!("Converted {} -> {}", document.path.display(), path.display());

        Ok(GeneratedScript { source, path })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_notebook(dir: &Path, name: &str, json: &str) -> Document {
        let path = dir.join(name);
        std::fs::write(&path, json).unwrap();
        Document::from_path(path).unwrap()
    }

    const NOTEBOOK: &str = r##"{
 "nbformat": 4,
 "nbformat_minor": 2,
 "metadata": {},
 "cells": [
  {"cell_type": "markdown", "metadata": {}, "source": ["# Globe\n", "\n", "Renders the earth"]},
  {"cell_type": "code", "execution_count": 1, "metadata": {}, "outputs": [], "source": ["%matplotlib inline\n", "import lavavu\n", "lv = lavavu.Viewer()"]},
  {"cell_type": "raw", "metadata": {}, "source": "not code"},
  {"cell_type": "code", "execution_count": null, "metadata": {}, "outputs": [], "source": "lv.display()\n!ls"}
 ]
}"##;

    #[test]
    fn test_native_export_layout() {
        let dir = tempfile::tempdir().unwrap();
        let doc = write_notebook(dir.path(), "globe.ipynb", NOTEBOOK);
        let script = NativeExporter::new().unwrap().export(&doc).unwrap();

        assert!(script.starts_with("#!/usr/bin/env python\n# coding: utf-8\n"));
        assert!(script.contains("# # Globe\n# \n# Renders the earth\n"));
        assert!(script.contains("# In[1]:\n\n\n# %matplotlib inline\nimport lavavu\nlv = lavavu.Viewer()\n"));
        assert!(script.contains("# In[ ]:\n\n\nlv.display()\n# !ls\n"));
        assert!(!script.contains("not code"));
    }

    #[test]
    fn test_magics_inside_strings_are_kept() {
        let dir = tempfile::tempdir().unwrap();
        let doc = write_notebook(
            dir.path(),
            "fmt.ipynb",
            r#"{"nbformat": 4, "nbformat_minor": 2, "metadata": {}, "cells": [
              {"cell_type": "code", "execution_count": 1, "metadata": {}, "outputs": [],
               "source": "fmt = \"\"\"\n%d frames\n!done\n\"\"\"\n%time run()\n  !ls"}
            ]}"#,
        );
        let script = NativeExporter::new().unwrap().export(&doc).unwrap();

        assert!(script.contains("fmt = \"\"\"\n%d frames\n!done\n\"\"\"\n# %time run()\n  # !ls\n"));
    }

    #[test]
    fn test_old_nbformat_is_conversion_error() {
        let dir = tempfile::tempdir().unwrap();
        let doc = write_notebook(dir.path(), "old.ipynb", r#"{"nbformat": 3, "worksheets": []}"#);
        let err = NativeExporter::new().unwrap().export(&doc).unwrap_err();
        assert!(matches!(err, HarnessError::Conversion { .. }));
    }

    #[test]
    fn test_converter_writes_script_and_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let doc = write_notebook(dir.path(), "globe.ipynb", NOTEBOOK);
        let out = dir.path().join("work");
        std::fs::create_dir(&out).unwrap();
        std::fs::write(out.join("globe.py"), "stale").unwrap();

        let converter = DocumentConverter::new(Box::new(NativeExporter::new().unwrap()), "py");
        let script = converter.convert(&doc, &out).unwrap();

        assert_eq!(script.path, out.join("globe.py"));
        assert_eq!(std::fs::read_to_string(&script.path).unwrap(), script.source);
        assert!(script.source.contains("lv.display()"));
    }

    #[test]
    fn test_converter_applies_thumbnail_resolution() {
        let dir = tempfile::tempdir().unwrap();
        let doc = write_notebook(dir.path(), "globe.ipynb", NOTEBOOK);

        let converter =
            DocumentConverter::new(Box::new(NativeExporter::new().unwrap()), "py").with_resolution(320);
        let script = converter.convert(&doc, dir.path()).unwrap();
        assert!(script.source.contains("lv.display(resolution=(320, 320))"));
    }

    #[test]
    fn test_unparseable_notebook_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let doc = write_notebook(dir.path(), "broken.ipynb", "{ not json");
        let converter = DocumentConverter::new(Box::new(NativeExporter::new().unwrap()), "py");

        let err = converter.convert(&doc, dir.path()).unwrap_err();
        match err {
            HarnessError::Conversion { document, .. } => assert_eq!(document, "broken"),
            other => panic!("unexpected error: {other}"),
        }
        assert!(!dir.path().join("broken.py").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_nbconvert_failure_is_conversion_error() {
        let dir = tempfile::tempdir().unwrap();
        let doc = write_notebook(dir.path(), "globe.ipynb", NOTEBOOK);
        let err = NbconvertExporter::new("false").export(&doc).unwrap_err();
        assert!(matches!(err, HarnessError::Conversion { .. }));
    }
}
