//! # Embeddings
//!
//! Dense-vector side of simdex: turning documents into embeddings, keeping
//! them positionally aligned with their texts, and answering exact k-nearest
//! neighbor queries by L2 distance.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       Embeddings System                         │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  documents ──► Embedder ──► EmbeddingStore ──► VectorIndex      │
//! │                   │              │                  │           │
//! │                   ▼              ▼                  ▼           │
//! │          Trigram/OpenAI    texts + vectors    search(q, k)      │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The index never sees document text. Callers resolve the positions it
//! returns through [`EmbeddingStore::document_at`].

pub mod error;
pub mod index;
pub mod provider;
pub mod similarity;
pub mod store;

pub use error::{EmbeddingError, Result};
pub use index::{DistanceMetric, Neighbor, VectorIndex};
pub use provider::{Embedder, FnEmbedder, OpenAIEmbedder, TrigramEmbedder};
pub use similarity::{euclidean_distance, normalize, squared_euclidean_distance};
pub use store::EmbeddingStore;

/// A dense vector embedding.
pub type Embedding = Vec<f32>;

/// Dimension of the built-in trigram embedder, matching the MiniLM family of
/// sentence encoders.
pub const DEFAULT_DIMENSION: usize = 384;
