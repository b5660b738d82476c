//! Retrieval engine implementation.

use std::sync::{Arc, Mutex, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use simdex_embeddings::{DistanceMetric, Embedder, EmbeddingStore, VectorIndex};

use crate::error::{Result, RetrievalError};

/// One ranked hit returned to a caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    /// 1-based rank, nearest first.
    pub rank: usize,

    /// `1 - distance`. Monotonic in distance but not bounded to `[0, 1]`
    /// unless the embeddings are unit length.
    pub similarity: f32,

    /// Text of the matched document.
    pub text: String,
}

/// Convert an index distance into the reported similarity score.
pub fn similarity_from_distance(distance: f32) -> f32 {
    1.0 - distance
}

/// Rank the documents of `store` nearest to `query_vector`.
///
/// Results keep the index order (ascending distance, ties by position);
/// identical texts are not merged.
pub fn query(
    index: &VectorIndex,
    store: &EmbeddingStore,
    query_vector: &[f32],
    k: usize,
) -> Result<Vec<ResultRecord>> {
    let neighbors = index.search(query_vector, k)?;

    neighbors
        .into_iter()
        .enumerate()
        .map(|(i, neighbor)| {
            Ok(ResultRecord {
                rank: i + 1,
                similarity: similarity_from_distance(neighbor.distance),
                text: store.document_at(neighbor.position)?.to_string(),
            })
        })
        .collect()
}

/// An immutable store/index pair queried together.
#[derive(Debug)]
pub struct CorpusSnapshot {
    /// Documents and their vectors.
    pub store: EmbeddingStore,

    /// Index over the store's vectors.
    pub index: VectorIndex,

    /// Incremented every time a new snapshot replaces the previous one.
    pub generation: u64,
}

/// Statistics about the retrieval engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineStats {
    /// Number of indexed documents.
    pub documents: usize,

    /// Vector dimensionality.
    pub dimension: usize,

    /// Distance metric of the index.
    pub metric: DistanceMetric,

    /// Snapshot generation.
    pub generation: u64,

    /// Name of the embedding provider.
    pub embedder: String,
}

/// Text-in, ranked-results-out retrieval over a swappable corpus snapshot.
///
/// Queries clone the current `Arc<CorpusSnapshot>` and run without holding
/// the lock. Rebuilds construct the next snapshot first and only take the
/// write lock to swap the pointer, so in-flight queries finish against the
/// snapshot they started with. Rebuilds and appends run one at a time, each
/// starting from the snapshot the previous one swapped in.
pub struct Retriever {
    /// Embedding provider for queries and rebuilds.
    embedder: Box<dyn Embedder>,

    /// Current snapshot.
    corpus: RwLock<Arc<CorpusSnapshot>>,

    /// Held by `rebuild` and `append` from reading the snapshot to the swap.
    writer: Mutex<()>,
}

impl Retriever {
    /// Wrap an existing store and index.
    pub fn new(
        embedder: Box<dyn Embedder>,
        store: EmbeddingStore,
        index: VectorIndex,
    ) -> Result<Self> {
        if store.size() != index.len() {
            return Err(RetrievalError::StoreIndexMismatch {
                store: store.size(),
                index: index.len(),
            });
        }

        info!(
            "Retriever ready: {} documents, embedder {}",
            store.size(),
            embedder.name()
        );

        Ok(Self {
            embedder,
            corpus: RwLock::new(Arc::new(CorpusSnapshot {
                store,
                index,
                generation: 0,
            })),
            writer: Mutex::new(()),
        })
    }

    /// Embed `documents` and index them.
    pub fn build(
        embedder: Box<dyn Embedder>,
        documents: Vec<String>,
        metric: DistanceMetric,
    ) -> Result<Self> {
        let store = EmbeddingStore::build(documents, &embedder)?;
        let index = store.build_index(metric)?;
        Self::new(embedder, store, index)
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> Arc<CorpusSnapshot> {
        self.corpus
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Embed `text` and return its `k` nearest documents.
    pub fn query_text(&self, text: &str, k: usize) -> Result<Vec<ResultRecord>> {
        if text.trim().is_empty() {
            return Err(RetrievalError::EmptyQuery);
        }

        let vector = self.embedder.embed_one(text)?;
        debug!("Embedded query ({} chars)", text.len());
        self.query_vector(&vector, k)
    }

    /// Return the `k` nearest documents to an already embedded query.
    pub fn query_vector(&self, vector: &[f32], k: usize) -> Result<Vec<ResultRecord>> {
        let snapshot = self.snapshot();
        query(&snapshot.index, &snapshot.store, vector, k)
    }

    /// Replace the corpus with `documents`.
    ///
    /// On error the current snapshot stays in place.
    pub fn rebuild(&self, documents: Vec<String>) -> Result<u64> {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let metric = self.snapshot().index.metric();
        let store = EmbeddingStore::build(documents, &self.embedder)?;
        let index = store.build_index(metric)?;
        Ok(self.swap(store, index))
    }

    /// Add `documents` after the current corpus, embedding only the new ones.
    pub fn append(&self, documents: Vec<String>) -> Result<u64> {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let current = self.snapshot();
        let store = current.store.append(documents, &self.embedder)?;
        let index = store.build_index(current.index.metric())?;
        Ok(self.swap(store, index))
    }

    fn swap(&self, store: EmbeddingStore, index: VectorIndex) -> u64 {
        let mut guard = self.corpus.write().unwrap_or_else(PoisonError::into_inner);
        let generation = guard.generation + 1;
        info!(
            "Swapping in corpus generation {generation} ({} documents)",
            store.size()
        );
        *guard = Arc::new(CorpusSnapshot {
            store,
            index,
            generation,
        });
        generation
    }

    /// Get engine statistics.
    pub fn stats(&self) -> EngineStats {
        let snapshot = self.snapshot();
        EngineStats {
            documents: snapshot.store.size(),
            dimension: snapshot.index.dimension(),
            metric: snapshot.index.metric(),
            generation: snapshot.generation,
            embedder: self.embedder.name().to_string(),
        }
    }
}
