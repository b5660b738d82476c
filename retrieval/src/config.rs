//! Configuration for the retrieval engine.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use simdex_embeddings::{
    DEFAULT_DIMENSION, DistanceMetric, Embedder, OpenAIEmbedder, TrigramEmbedder,
};

use crate::error::{Result, RetrievalError};

/// Configuration for the retrieval engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Directory holding the persisted index artifacts.
    pub index_dir: PathBuf,

    /// Embedding provider configuration.
    pub embedding: EmbeddingConfig,

    /// Query processing configuration.
    pub query: QueryConfig,
}

impl RetrievalConfig {
    /// Create a new configuration with default values.
    pub fn new(index_dir: impl Into<PathBuf>) -> Self {
        Self {
            index_dir: index_dir.into(),
            embedding: EmbeddingConfig::default(),
            query: QueryConfig::default(),
        }
    }

    /// Parse a TOML configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;

        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load `path` if given, else the per-user config file if it exists, else defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }

        match Self::default_path() {
            Some(path) if path.exists() => Self::load(path),
            _ => {
                debug!("No configuration file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Location of the per-user configuration file.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("simdex").join("config.toml"))
    }

    /// Reject values that cannot produce a working engine.
    pub fn validate(&self) -> Result<()> {
        if self.query.top_k == 0 {
            return Err(RetrievalError::Config("query.top_k must be positive".to_string()));
        }
        if self.embedding.dimension == 0 {
            return Err(RetrievalError::Config(
                "embedding.dimension must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Set the index directory.
    pub fn with_index_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.index_dir = dir.into();
        self
    }

    /// Set the embedding configuration.
    pub fn with_embedding(mut self, config: EmbeddingConfig) -> Self {
        self.embedding = config;
        self
    }

    /// Set the query configuration.
    pub fn with_query(mut self, config: QueryConfig) -> Self {
        self.query = config;
        self
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self::new(
            dirs::data_dir()
                .unwrap_or_default()
                .join("simdex")
                .join("index"),
        )
    }
}

/// Configuration for the embedding provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Which provider to use.
    pub provider: EmbeddingProviderType,

    /// Model to request (OpenAI only).
    pub model: Option<String>,

    /// Output dimensionality (trigram buckets or requested OpenAI dimensions).
    pub dimension: usize,

    /// Scale trigram vectors to unit length.
    pub normalize: bool,

    /// API base URL (OpenAI only).
    pub base_url: Option<String>,

    /// Environment variable holding the API key.
    pub api_key_env: String,
}

impl EmbeddingConfig {
    /// Construct the configured embedder.
    pub fn embedder(&self) -> Result<Box<dyn Embedder>> {
        match self.provider {
            EmbeddingProviderType::Trigram => {
                let mut embedder = TrigramEmbedder::new(self.dimension);
                if !self.normalize {
                    embedder = embedder.without_normalization();
                }
                Ok(Box::new(embedder))
            }
            EmbeddingProviderType::OpenAI => {
                let key = std::env::var(&self.api_key_env).map_err(|_| {
                    RetrievalError::Config(format!(
                        "environment variable {} is not set",
                        self.api_key_env
                    ))
                })?;

                let mut embedder = OpenAIEmbedder::new()
                    .with_api_key(key)
                    .with_dimensions(self.dimension);
                if let Some(model) = &self.model {
                    embedder = embedder.with_model(model);
                }
                if let Some(url) = &self.base_url {
                    embedder = embedder.with_base_url(url);
                }
                Ok(Box::new(embedder))
            }
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderType::Trigram,
            model: None,
            dimension: DEFAULT_DIMENSION,
            normalize: true,
            base_url: None,
            api_key_env: "OPENAI_API_KEY".to_string(),
        }
    }
}

/// Type of embedding provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingProviderType {
    /// Built-in hashed character trigrams.
    Trigram,
    /// OpenAI-compatible embeddings API.
    #[serde(rename = "openai")]
    OpenAI,
}

/// Configuration for query processing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Number of results when the caller does not ask for a specific count.
    pub top_k: usize,

    /// Distance used when building a new index.
    pub metric: DistanceMetric,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            metric: DistanceMetric::default(),
        }
    }
}
