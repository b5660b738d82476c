//! Error types for the embeddings system.

use thiserror::Error;

/// Result type alias for embedding operations.
pub type Result<T> = std::result::Result<T, EmbeddingError>;

/// Errors that can occur in the embeddings system.
#[derive(Error, Debug)]
pub enum EmbeddingError {
    /// A store or index was built from zero documents or vectors.
    #[error("cannot build from an empty corpus")]
    EmptyCorpus,

    /// Dimension mismatch.
    ///
    /// Raised both for a vector whose length differs from the index
    /// dimensionality and for an embedder that returns a different number of
    /// vectors than it was given texts.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The first vector of a batch had no components.
    #[error("vectors must have at least one component")]
    ZeroDimension,

    /// A search asked for zero neighbors.
    #[error("k must be positive, got {0}")]
    InvalidK(usize),

    /// A position lookup fell outside the store.
    #[error("position {position} out of range for store of {len} documents")]
    OutOfRange { position: usize, len: usize },

    /// Provider not configured.
    #[error("embedding provider not configured")]
    ProviderNotConfigured,

    /// API request failed.
    #[error("API request failed: {0}")]
    ApiRequest(String),

    /// Invalid response from provider.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Rate limit exceeded.
    #[error("rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// HTTP error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}
