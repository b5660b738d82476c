//! JSON export of one query and its matches.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use simdex_retrieval::ResultRecord;

/// A query together with the results it produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryReport {
    /// Query text, trimmed.
    pub query: String,

    /// Number of results requested.
    pub top_k: usize,

    /// When the query ran.
    pub generated_at: DateTime<Utc>,

    /// Ranked matches.
    pub results: Vec<ResultRecord>,
}

impl QueryReport {
    /// Create a report stamped with the current time.
    pub fn new(query: &str, top_k: usize, results: Vec<ResultRecord>) -> Self {
        Self {
            query: query.trim().to_string(),
            top_k,
            generated_at: Utc::now(),
            results,
        }
    }

    /// `user_query_matches_<YYYYmmdd_HHMMSS>_<first 8 hex of sha256(query)>.json`
    pub fn file_name(&self) -> String {
        let digest = format!("{:x}", Sha256::digest(self.query.as_bytes()));
        format!(
            "user_query_matches_{}_{}.json",
            self.generated_at.format("%Y%m%d_%H%M%S"),
            &digest[..8]
        )
    }

    /// Write the report as pretty JSON into `dir`, creating it if needed.
    pub fn write_to_dir(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;

        let path = dir.join(self.file_name());
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(path)
    }
}
