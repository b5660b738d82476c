//! End-to-end tests for build, search, ranking and persistence.

use pretty_assertions::assert_eq;
use tempfile::TempDir;

use simdex_embeddings::{EmbeddingError, Neighbor};
use simdex_retrieval::{
    DistanceMetric, Embedder, EmbeddingStore, IndexStore, Retriever, RetrievalError,
    TrigramEmbedder, VectorIndex, query,
};

fn docs(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

/// Small deterministic generator so the property checks are reproducible.
struct Lcg(u64);

impl Lcg {
    fn next_f32(&mut self) -> f32 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        ((self.0 >> 40) as f32 / (1u64 << 24) as f32) * 2.0 - 1.0
    }

    fn vectors(&mut self, n: usize, d: usize) -> Vec<Vec<f32>> {
        (0..n)
            .map(|_| (0..d).map(|_| self.next_f32()).collect())
            .collect()
    }
}

#[test]
fn test_scenario_ranks_by_embedding_proximity() {
    let corpus = docs(&["the cat sat", "dogs bark loudly", "feline rested on mat"]);
    let retriever = Retriever::build(
        Box::new(TrigramEmbedder::default()),
        corpus,
        DistanceMetric::default(),
    )
    .unwrap();

    let results = retriever.query_text("a cat sat down", 3).unwrap();
    let texts: Vec<&str> = results.iter().map(|r| r.text.as_str()).collect();
    assert_eq!(
        texts,
        vec!["the cat sat", "feline rested on mat", "dogs bark loudly"]
    );
    let ranks: Vec<usize> = results.iter().map(|r| r.rank).collect();
    assert_eq!(ranks, vec![1, 2, 3]);
}

#[test]
fn test_search_returns_min_k_n_sorted() {
    let mut rng = Lcg(7);
    for (n, d) in [(1, 3), (5, 2), (40, 8), (100, 16)] {
        let index = VectorIndex::build(rng.vectors(n, d)).unwrap();
        let query = rng.vectors(1, d).remove(0);

        for k in [1, 3, n, n + 5] {
            let results = index.search(&query, k).unwrap();
            assert_eq!(results.len(), k.min(n));
            assert!(results.windows(2).all(|w| w[0].distance <= w[1].distance));
        }
    }
}

#[test]
fn test_stored_vector_is_its_own_nearest_neighbor() {
    let mut rng = Lcg(42);
    let vectors = rng.vectors(30, 6);
    for metric in [DistanceMetric::SquaredEuclidean, DistanceMetric::Euclidean] {
        let index = VectorIndex::build_with_metric(vectors.clone(), metric).unwrap();
        for (p, v) in vectors.iter().enumerate() {
            assert_eq!(index.search(v, 1).unwrap(), vec![Neighbor::new(p, 0.0)]);
        }
    }
}

#[test]
fn test_equal_distances_break_by_position() {
    // Four points on the unit circle and one far away.
    let index = VectorIndex::build(vec![
        vec![5.0, 5.0],
        vec![0.0, 1.0],
        vec![1.0, 0.0],
        vec![0.0, -1.0],
        vec![-1.0, 0.0],
    ])
    .unwrap();

    let results = index.search(&[0.0, 0.0], 5).unwrap();
    let positions: Vec<usize> = results.iter().map(|n| n.position).collect();
    assert_eq!(positions, vec![1, 2, 3, 4, 0]);

    let results = index.search(&[0.0, 0.0], 2).unwrap();
    let positions: Vec<usize> = results.iter().map(|n| n.position).collect();
    assert_eq!(positions, vec![1, 2]);
}

#[test]
fn test_similarity_is_monotonic_in_rank() {
    let mut rng = Lcg(99);
    let vectors = rng.vectors(50, 4);
    let documents: Vec<String> = (0..50).map(|i| format!("doc {i}")).collect();
    let store = EmbeddingStore::from_parts(documents, vectors).unwrap();
    let index = store.build_index(DistanceMetric::Euclidean).unwrap();

    for _ in 0..10 {
        let q = rng.vectors(1, 4).remove(0);
        let results = query(&index, &store, &q, 20).unwrap();
        assert!(
            results
                .windows(2)
                .all(|w| w[0].rank < w[1].rank && w[0].similarity >= w[1].similarity)
        );
    }
}

#[test]
fn test_k_beyond_corpus_returns_everything() {
    let store = EmbeddingStore::build(docs(&["a", "b", "c"]), &TrigramEmbedder::new(8)).unwrap();
    let index = store.build_index(DistanceMetric::default()).unwrap();
    let q = store.vector_at(0).unwrap().to_vec();

    let results = query(&index, &store, &q, 50).unwrap();
    assert_eq!(results.len(), 3);
}

#[test]
fn test_error_scenarios() {
    let embedder = TrigramEmbedder::new(12);
    assert!(matches!(
        EmbeddingStore::build(Vec::new(), &embedder),
        Err(EmbeddingError::EmptyCorpus)
    ));

    let store = EmbeddingStore::build(docs(&["x", "y"]), &embedder).unwrap();
    let index = store.build_index(DistanceMetric::default()).unwrap();
    let too_long = vec![0.0; index.dimension() + 1];
    assert!(matches!(
        query(&index, &store, &too_long, 1),
        Err(RetrievalError::Embedding(EmbeddingError::DimensionMismatch {
            expected: 12,
            actual: 13
        }))
    ));
    assert!(matches!(
        query(&index, &store, &[0.0; 12], 0),
        Err(RetrievalError::Embedding(EmbeddingError::InvalidK(0)))
    ));
}

#[test]
fn test_persisted_index_answers_like_the_original() {
    let temp_dir = TempDir::new().unwrap();
    let storage = IndexStore::new(temp_dir.path());

    let corpus = docs(&["the cat sat", "dogs bark loudly", "feline rested on mat"]);
    let embedder = TrigramEmbedder::default();
    let store = EmbeddingStore::build(corpus, &embedder).unwrap();
    let index = store.build_index(DistanceMetric::default()).unwrap();
    storage.save(&store, &index).unwrap();

    let (loaded_store, loaded_index) = storage.load().unwrap();
    assert_eq!(loaded_store.documents(), store.documents());
    assert_eq!(loaded_index, index);

    let q = embedder.embed_one("a cat sat down").unwrap();
    assert_eq!(
        query(&loaded_index, &loaded_store, &q, 3).unwrap(),
        query(&index, &store, &q, 3).unwrap()
    );

    let retriever = Retriever::new(Box::new(embedder), loaded_store, loaded_index).unwrap();
    assert_eq!(retriever.query_text("a cat sat down", 1).unwrap()[0].text, "the cat sat");
}
