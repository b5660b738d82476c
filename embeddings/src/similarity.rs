//! Distance computation for embeddings.

use std::collections::BinaryHeap;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::Embedding;
use crate::error::{EmbeddingError, Result};

/// How the index measures the gap between two vectors.
///
/// Both variants produce the same neighbor ordering; they differ only in the
/// distance value reported back to the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// Sum of squared per-component differences (what a flat L2 index reports).
    #[default]
    SquaredEuclidean,
    /// Square root of [`DistanceMetric::SquaredEuclidean`].
    Euclidean,
}

impl DistanceMetric {
    /// Stable on-disk tag for this metric.
    pub fn tag(self) -> u8 {
        match self {
            DistanceMetric::SquaredEuclidean => 0,
            DistanceMetric::Euclidean => 1,
        }
    }

    /// Inverse of [`DistanceMetric::tag`].
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(DistanceMetric::SquaredEuclidean),
            1 => Some(DistanceMetric::Euclidean),
            _ => None,
        }
    }

    /// Distance between two vectors already known to share a length.
    pub(crate) fn distance_unchecked(self, a: &[f32], b: &[f32]) -> f32 {
        let squared = squared_l2(a, b);
        match self {
            DistanceMetric::SquaredEuclidean => squared,
            DistanceMetric::Euclidean => squared.sqrt(),
        }
    }
}

/// One hit from a nearest-neighbor search.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    /// Insertion position of the matched vector.
    pub position: usize,

    /// Distance from the query under the index metric.
    pub distance: f32,
}

impl Neighbor {
    /// Create a new neighbor.
    pub fn new(position: usize, distance: f32) -> Self {
        Self { position, distance }
    }
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Compute the squared euclidean distance between two embeddings.
pub fn squared_euclidean_distance(a: &[f32], b: &[f32]) -> Result<f32> {
    if a.len() != b.len() {
        return Err(EmbeddingError::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }

    Ok(squared_l2(a, b))
}

/// Compute the euclidean distance between two embeddings.
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> Result<f32> {
    Ok(squared_euclidean_distance(a, b)?.sqrt())
}

/// Find the `k` candidates closest to `query`, nearest first.
///
/// Equal distances are broken by ascending candidate position. The caller
/// must have checked that every candidate shares the query's length.
pub(crate) fn find_top_k(
    query: &[f32],
    candidates: &[Embedding],
    k: usize,
    metric: DistanceMetric,
) -> Vec<Neighbor> {
    let capacity = k.min(candidates.len());
    if capacity == 0 {
        return Vec::new();
    }

    // Max-heap on (distance, position): the root is the worst kept hit.
    let mut heap: BinaryHeap<(OrderedFloat<f32>, usize)> = BinaryHeap::with_capacity(capacity);

    for (position, candidate) in candidates.iter().enumerate() {
        let key = (
            OrderedFloat(metric.distance_unchecked(query, candidate)),
            position,
        );

        if heap.len() < capacity {
            heap.push(key);
        } else if heap.peek().is_some_and(|worst| key < *worst) {
            heap.pop();
            heap.push(key);
        }
    }

    heap.into_sorted_vec()
        .into_iter()
        .map(|(distance, position)| Neighbor::new(position, distance.0))
        .collect()
}

/// Normalize an embedding to unit length.
///
/// Scaling every vector this way makes L2 ordering agree with cosine
/// similarity and keeps squared distances inside `[0, 4]`.
pub fn normalize(embedding: &mut [f32]) {
    let magnitude: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
    if magnitude > 0.0 {
        for x in embedding.iter_mut() {
            *x /= magnitude;
        }
    }
}
