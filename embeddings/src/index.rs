//! Exact nearest-neighbor index over fixed-dimension vectors.

use tracing::{debug, info};

use crate::Embedding;
use crate::error::{EmbeddingError, Result};
use crate::similarity::find_top_k;

pub use crate::similarity::{DistanceMetric, Neighbor};

/// A flat vector index answering k-nearest-neighbor queries by L2 distance.
///
/// Vectors are addressed by insertion position only; the index knows nothing
/// about the documents they came from. Search is a linear scan, so results
/// are exact and ties resolve by ascending position.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorIndex {
    /// Stored vectors, in insertion order.
    vectors: Vec<Embedding>,

    /// Length every stored vector shares.
    dimension: usize,

    /// Distance reported by searches.
    metric: DistanceMetric,
}

impl VectorIndex {
    /// Build an index using the default metric.
    pub fn build(vectors: Vec<Embedding>) -> Result<Self> {
        Self::build_with_metric(vectors, DistanceMetric::default())
    }

    /// Build an index, fixing the dimensionality from the first vector.
    pub fn build_with_metric(vectors: Vec<Embedding>, metric: DistanceMetric) -> Result<Self> {
        let dimension = vectors.first().ok_or(EmbeddingError::EmptyCorpus)?.len();
        if dimension == 0 {
            return Err(EmbeddingError::ZeroDimension);
        }

        if let Some(bad) = vectors.iter().find(|v| v.len() != dimension) {
            return Err(EmbeddingError::DimensionMismatch {
                expected: dimension,
                actual: bad.len(),
            });
        }

        info!(
            "Built vector index: {} vectors, dimension {dimension}, metric {metric:?}",
            vectors.len()
        );

        Ok(Self {
            vectors,
            dimension,
            metric,
        })
    }

    /// Return the `k` stored vectors nearest to `query`, nearest first.
    ///
    /// Asking for more neighbors than are stored returns all of them.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        self.check_query(query, k)?;

        let neighbors = find_top_k(query, &self.vectors, k, self.metric);
        debug!("Search k={k} returned {} neighbors", neighbors.len());
        Ok(neighbors)
    }

    /// Run [`VectorIndex::search`] for several queries.
    ///
    /// Every query is validated before any search runs.
    pub fn search_batch(&self, queries: &[Embedding], k: usize) -> Result<Vec<Vec<Neighbor>>> {
        for query in queries {
            self.check_query(query, k)?;
        }

        Ok(queries
            .iter()
            .map(|query| find_top_k(query, &self.vectors, k, self.metric))
            .collect())
    }

    fn check_query(&self, query: &[f32], k: usize) -> Result<()> {
        if query.len() != self.dimension {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }
        if k == 0 {
            return Err(EmbeddingError::InvalidK(k));
        }
        Ok(())
    }

    /// Get the vector stored at a position.
    pub fn vector(&self, position: usize) -> Option<&[f32]> {
        self.vectors.get(position).map(Vec::as_slice)
    }

    /// All stored vectors, in insertion order.
    pub fn vectors(&self) -> &[Embedding] {
        &self.vectors
    }

    /// Get the number of stored vectors.
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    /// Always false for a built index; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Dimensionality fixed at build time.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Metric used by searches.
    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }
}
