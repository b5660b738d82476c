//! # Retrieval Engine
//!
//! Turns a query vector (or query text) into ranked documents, and keeps the
//! built index on disk between sessions.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Retrieval Engine                         │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  ┌──────────────┐        ┌──────────────┐      ┌─────────────┐  │
//! │  │  IndexStore  │──load─►│  Retriever   │◄─────│  Embedder   │  │
//! │  │ vectors.bin  │        │ Arc snapshot │      │ (query text)│  │
//! │  │documents.json│◄─save──│ store+index  │      └─────────────┘  │
//! │  └──────────────┘        └──────────────┘                       │
//! │                                 │                               │
//! │                                 ▼                               │
//! │                         Vec<ResultRecord>                       │
//! │                      rank · similarity · text                   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use simdex_embeddings::{DistanceMetric, TrigramEmbedder};
//! use simdex_retrieval::{IndexStore, Retriever};
//!
//! let retriever = Retriever::build(
//!     Box::new(TrigramEmbedder::default()),
//!     documents,
//!     DistanceMetric::default(),
//! )?;
//! let results = retriever.query_text("a cat sat down", 3)?;
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod persistence;

pub use config::{EmbeddingConfig, EmbeddingProviderType, QueryConfig, RetrievalConfig};
pub use engine::{
    CorpusSnapshot, EngineStats, ResultRecord, Retriever, query, similarity_from_distance,
};
pub use error::{Result, RetrievalError};
pub use persistence::IndexStore;

// Re-export from dependencies for convenience
pub use simdex_embeddings::{
    DistanceMetric, Embedder, EmbeddingStore, FnEmbedder, TrigramEmbedder, VectorIndex,
};
