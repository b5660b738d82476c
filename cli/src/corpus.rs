//! Corpus file loading.

use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use tracing::info;

/// Accepted JSON layouts: `{"docs": [...]}` or a bare array.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CorpusFile {
    Wrapped { docs: Vec<String> },
    Bare(Vec<String>),
}

/// Read the ordered documents from `path`.
///
/// `.json` files are parsed as [`CorpusFile`]; anything else is read as one
/// document per non-blank line.
pub fn load_corpus(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read corpus {}", path.display()))?;

    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    let docs = if is_json {
        let file: CorpusFile = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse corpus {}", path.display()))?;
        match file {
            CorpusFile::Wrapped { docs } | CorpusFile::Bare(docs) => docs,
        }
    } else {
        content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect()
    };

    if docs.is_empty() {
        bail!("no documents found in {}", path.display());
    }

    info!("Loaded {} documents from {}", docs.len(), path.display());
    Ok(docs)
}
