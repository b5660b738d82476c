//! Error types for the retrieval engine.

use thiserror::Error;

/// Result type alias for retrieval operations.
pub type Result<T> = std::result::Result<T, RetrievalError>;

/// Errors that can occur in the retrieval engine.
#[derive(Error, Debug)]
pub enum RetrievalError {
    /// Embedding, store or index error.
    #[error("embedding error: {0}")]
    Embedding(#[from] simdex_embeddings::EmbeddingError),

    /// A persisted artifact failed validation.
    #[error("corrupt artifact: {0}")]
    CorruptArtifact(String),

    /// The saved index was embedded by a differently configured embedder.
    #[error("index was built with embedder {stored} but {configured} is configured")]
    EmbedderMismatch { stored: String, configured: String },

    /// The query text was empty or whitespace.
    #[error("query text is empty")]
    EmptyQuery,

    /// A store and index of different sizes were paired.
    #[error("store holds {store} documents but index holds {index} vectors")]
    StoreIndexMismatch { store: usize, index: usize },

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Configuration file could not be parsed.
    #[error("configuration parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
