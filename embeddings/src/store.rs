//! Positionally aligned documents and their embeddings.

use tracing::{info, warn};

use crate::Embedding;
use crate::error::{EmbeddingError, Result};
use crate::index::{DistanceMetric, VectorIndex};
use crate::provider::Embedder;

/// The ordered corpus and its vectors.
///
/// `vectors[i]` is always the embedding of `documents[i]`; position is the
/// only key shared with [`VectorIndex`]. A store is immutable once built.
/// Growing the corpus produces a new store via [`EmbeddingStore::append`].
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingStore {
    documents: Vec<String>,
    vectors: Vec<Embedding>,
}

impl EmbeddingStore {
    /// Embed `documents` in one batch and keep both sides aligned.
    pub fn build<E>(documents: Vec<String>, embedder: &E) -> Result<Self>
    where
        E: Embedder + ?Sized,
    {
        if documents.is_empty() {
            return Err(EmbeddingError::EmptyCorpus);
        }

        let blank = documents.iter().filter(|d| d.trim().is_empty()).count();
        if blank > 0 {
            warn!("Corpus contains {blank} blank documents");
        }

        let vectors = embedder.embed(&documents)?;
        let store = Self::from_parts(documents, vectors)?;

        info!(
            "Embedded {} documents with {} (dimension {})",
            store.size(),
            embedder.name(),
            store.dimension()
        );
        Ok(store)
    }

    /// Assemble a store from already computed vectors.
    pub fn from_parts(documents: Vec<String>, vectors: Vec<Embedding>) -> Result<Self> {
        if documents.is_empty() {
            return Err(EmbeddingError::EmptyCorpus);
        }
        if vectors.len() != documents.len() {
            return Err(EmbeddingError::DimensionMismatch {
                expected: documents.len(),
                actual: vectors.len(),
            });
        }

        let dimension = vectors[0].len();
        if dimension == 0 {
            return Err(EmbeddingError::ZeroDimension);
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != dimension) {
            return Err(EmbeddingError::DimensionMismatch {
                expected: dimension,
                actual: bad.len(),
            });
        }

        Ok(Self { documents, vectors })
    }

    /// Return a new store holding this corpus followed by `documents`.
    ///
    /// Only the new documents are embedded. `self` is left untouched.
    pub fn append<E>(&self, documents: Vec<String>, embedder: &E) -> Result<Self>
    where
        E: Embedder + ?Sized,
    {
        if documents.is_empty() {
            return Err(EmbeddingError::EmptyCorpus);
        }

        let added = embedder.embed(&documents)?;
        if added.len() != documents.len() {
            return Err(EmbeddingError::DimensionMismatch {
                expected: documents.len(),
                actual: added.len(),
            });
        }

        let mut all_documents = self.documents.clone();
        all_documents.extend(documents);
        let mut all_vectors = self.vectors.clone();
        all_vectors.extend(added);

        Self::from_parts(all_documents, all_vectors)
    }

    /// Build a [`VectorIndex`] over this store's vectors.
    pub fn build_index(&self, metric: DistanceMetric) -> Result<VectorIndex> {
        VectorIndex::build_with_metric(self.vectors.clone(), metric)
    }

    /// Text of the document at `position`.
    pub fn document_at(&self, position: usize) -> Result<&str> {
        self.documents
            .get(position)
            .map(String::as_str)
            .ok_or(EmbeddingError::OutOfRange {
                position,
                len: self.documents.len(),
            })
    }

    /// Vector of the document at `position`.
    pub fn vector_at(&self, position: usize) -> Result<&[f32]> {
        self.vectors
            .get(position)
            .map(Vec::as_slice)
            .ok_or(EmbeddingError::OutOfRange {
                position,
                len: self.vectors.len(),
            })
    }

    /// Number of documents.
    pub fn size(&self) -> usize {
        self.documents.len()
    }

    /// Length of every stored vector.
    pub fn dimension(&self) -> usize {
        self.vectors.first().map_or(0, Vec::len)
    }

    /// All documents in order.
    pub fn documents(&self) -> &[String] {
        &self.documents
    }

    /// All vectors in order.
    pub fn vectors(&self) -> &[Embedding] {
        &self.vectors
    }
}
