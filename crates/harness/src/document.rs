//! Notebook documents and their on-disk model

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{HarnessError, HarnessResult};

/// A notebook discovered on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Full path to the notebook
    pub path: PathBuf,

    /// File name without extension; keys the baseline directory
    pub stem: String,

    /// Directory containing the notebook
    pub folder: PathBuf,
}

impl Document {
    pub fn from_path(path: impl Into<PathBuf>) -> HarnessResult<Self> {
        let path = path.into();
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                HarnessError::Config(format!("Document path has no file name: {}", path.display()))
            })?;
        let folder = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        Ok(Self { path, stem, folder })
    }

    /// Generated script file name, e.g. `doc_a.py`
    pub fn script_name(&self, extension: &str) -> String {
        format!("{}.{}", self.stem, extension)
    }

    /// Read and parse the notebook
    pub fn load(&self) -> HarnessResult<Notebook> {
        let content = std::fs::read_to_string(&self.path)?;
        Notebook::from_json(&content)
    }

    /// All documents matching `pattern`, sorted by path
    pub fn discover(pattern: &str) -> HarnessResult<Vec<Self>> {
        let mut paths = Vec::new();
        for entry in glob::glob(pattern)? {
            let path = entry?;
            if path.is_file() {
                paths.push(path);
            }
        }
        paths.sort();

        debug!("Pattern {} matched {} document(s)", pattern, paths.len());
        paths.into_iter().map(Self::from_path).collect()
    }
}

/// An nbformat notebook
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notebook {
    pub nbformat: u32,

    #[serde(default)]
    pub nbformat_minor: u32,

    #[serde(default)]
    pub metadata: serde_json::Value,

    #[serde(default)]
    pub cells: Vec<Cell>,
}

impl Notebook {
    pub fn from_json(content: &str) -> HarnessResult<Self> {
        serde_json::from_str(content).map_err(HarnessError::from)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cell {
    pub cell_type: CellType,

    #[serde(default)]
    pub source: Source,

    #[serde(default)]
    pub execution_count: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CellType {
    Code,
    Markdown,
    Raw,
}

/// Cell source: a single string or a list of lines
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Source {
    Text(String),
    Lines(Vec<String>),
}

impl Default for Source {
    fn default() -> Self {
        Source::Text(String::new())
    }
}

impl Source {
    pub fn text(&self) -> String {
        match self {
            Source::Text(text) => text.clone(),
            Source::Lines(lines) => lines.concat(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_from_path() {
        let doc = Document::from_path("/notebooks/Earth.ipynb").unwrap();
        assert_eq!(doc.stem, "Earth");
        assert_eq!(doc.folder, PathBuf::from("/notebooks"));
        assert_eq!(doc.script_name("py"), "Earth.py");
    }

    #[test]
    fn test_parse_notebook_sources() {
        let json = r##"{
  "nbformat": 4,
  "nbformat_minor": 5,
  "metadata": {},
  "cells": [
    {"cell_type": "markdown", "metadata": {}, "source": ["# Title\n", "text"]},
    {"cell_type": "code", "execution_count": 2, "metadata": {}, "outputs": [], "source": "import lavavu"},
    {"cell_type": "raw", "metadata": {}, "source": []}
  ]
}"##;
        let nb = Notebook::from_json(json).unwrap();
        assert_eq!(nb.nbformat, 4);
        assert_eq!(nb.cells.len(), 3);
        assert_eq!(nb.cells[0].source.text(), "# Title\ntext");
        assert_eq!(nb.cells[1].cell_type, CellType::Code);
        assert_eq!(nb.cells[1].execution_count, Some(2));
        assert_eq!(nb.cells[2].source.text(), "");
    }

    #[test]
    fn test_discover_is_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.ipynb", "a.ipynb", "c.txt"] {
            std::fs::write(dir.path().join(name), "{}").unwrap();
        }
        std::fs::create_dir(dir.path().join("d.ipynb")).unwrap();

        let pattern = format!("{}/*.ipynb", dir.path().display());
        let docs = Document::discover(&pattern).unwrap();
        let stems: Vec<_> = docs.iter().map(|d| d.stem.as_str()).collect();
        assert_eq!(stems, vec!["a", "b"]);
    }
}
