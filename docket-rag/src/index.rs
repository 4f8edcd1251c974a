//! Exact nearest-neighbour index over chunk embeddings.
//!
//! [`VectorIndex`] stores vectors contiguously (row-major) next to a parallel
//! list of [`ChunkRecord`]s; position `i` in both refers to the same chunk.
//! Search is exhaustive squared-L2 with a bounded max-heap, which is exact and
//! fast enough for a law office's corpus (tens of thousands of passages).
//! The index is built all at once and never mutated afterwards.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::document::{ChunkRecord, RetrievedChunk, SearchHit};
use crate::error::{RagError, Result};

/// Squared Euclidean distance between two equal-length vectors.
pub fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// A read-only vector index with parallel chunk metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorIndex {
    embedding_model: String,
    dimensions: usize,
    vectors: Vec<f32>,
    records: Vec<ChunkRecord>,
}

impl VectorIndex {
    /// Build an index from embeddings and their chunk records.
    ///
    /// # Errors
    ///
    /// - [`RagError::InvalidInput`] if there are no embeddings.
    /// - [`RagError::Consistency`] if the two collections differ in length,
    ///   a vector is empty, or vectors differ in dimension.
    pub fn build(
        embedding_model: impl Into<String>,
        embeddings: Vec<Vec<f32>>,
        records: Vec<ChunkRecord>,
    ) -> Result<Self> {
        if embeddings.len() != records.len() {
            return Err(RagError::Consistency(format!(
                "{} embeddings but {} metadata records",
                embeddings.len(),
                records.len()
            )));
        }
        let Some(first) = embeddings.first() else {
            return Err(RagError::InvalidInput("cannot build an index from zero chunks".into()));
        };
        let dimensions = first.len();
        if dimensions == 0 {
            return Err(RagError::Consistency("embeddings have zero dimensions".into()));
        }

        let mut vectors = Vec::with_capacity(dimensions * embeddings.len());
        for (position, embedding) in embeddings.into_iter().enumerate() {
            if embedding.len() != dimensions {
                return Err(RagError::Consistency(format!(
                    "embedding {position} has {} dimensions, expected {dimensions}",
                    embedding.len()
                )));
            }
            vectors.extend(embedding);
        }

        Ok(Self { embedding_model: embedding_model.into(), dimensions, vectors, records })
    }

    /// Reassemble an index from persisted parts. Callers have already
    /// validated that `vectors.len() == dimensions * records.len()`.
    pub(crate) fn from_parts(
        embedding_model: String,
        dimensions: usize,
        vectors: Vec<f32>,
        records: Vec<ChunkRecord>,
    ) -> Self {
        debug_assert_eq!(vectors.len(), dimensions * records.len());
        Self { embedding_model, dimensions, vectors, records }
    }

    /// The embedding model the vectors were produced with.
    pub fn embedding_model(&self) -> &str {
        &self.embedding_model
    }

    /// Vector dimensionality.
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Number of indexed chunks.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the index holds no chunks. Always false for a built index.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The raw row-major vector block.
    pub(crate) fn raw_vectors(&self) -> &[f32] {
        &self.vectors
    }

    /// The vector at `position`.
    pub fn vector(&self, position: usize) -> Option<&[f32]> {
        let start = position.checked_mul(self.dimensions)?;
        self.vectors.get(start..start + self.dimensions)
    }

    /// The chunk metadata at `position`.
    pub fn record(&self, position: usize) -> Option<&ChunkRecord> {
        self.records.get(position)
    }

    /// All chunk records in position order.
    pub fn records(&self) -> &[ChunkRecord] {
        &self.records
    }

    /// Find the `k` vectors closest to `query`.
    ///
    /// Results are ordered by ascending squared L2 distance, ties by lower
    /// position. `k` is clamped to the index size; `k == 0` yields nothing.
    ///
    /// # Errors
    ///
    /// - [`RagError::IndexNotReady`] if the index holds no vectors.
    /// - [`RagError::Consistency`] if `query` has the wrong dimension.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        if self.is_empty() {
            return Err(RagError::IndexNotReady("index is empty".into()));
        }
        if query.len() != self.dimensions {
            return Err(RagError::Consistency(format!(
                "query has {} dimensions, index has {}",
                query.len(),
                self.dimensions
            )));
        }
        let k = k.min(self.len());
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut heap: BinaryHeap<Candidate> = BinaryHeap::with_capacity(k + 1);
        for (position, vector) in self.vectors.chunks_exact(self.dimensions).enumerate() {
            let candidate = Candidate { distance: squared_l2(vector, query), position };
            if heap.len() < k {
                heap.push(candidate);
            } else if heap.peek().is_some_and(|worst| candidate < *worst) {
                heap.pop();
                heap.push(candidate);
            }
        }

        Ok(heap
            .into_sorted_vec()
            .into_iter()
            .map(|c| SearchHit { position: c.position, distance: c.distance })
            .collect())
    }

    /// Search and resolve every hit to its chunk record.
    pub fn search_records(&self, query: &[f32], k: usize) -> Result<Vec<RetrievedChunk>> {
        self.search(query, k)?
            .into_iter()
            .map(|hit| {
                let record = self.record(hit.position).cloned().ok_or_else(|| {
                    RagError::Consistency(format!("no metadata at position {}", hit.position))
                })?;
                Ok(RetrievedChunk { position: hit.position, distance: hit.distance, record })
            })
            .collect()
    }
}

/// Heap entry ordered by distance, then position. The heap's max is the
/// current worst of the best `k`.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    distance: f32,
    position: usize,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance.total_cmp(&other.distance).then(self.position.cmp(&other.position))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(i: usize) -> ChunkRecord {
        ChunkRecord { source: format!("doc{i}.pdf"), page: Some(1), text: format!("chunk {i}") }
    }

    fn small_index() -> VectorIndex {
        let embeddings = vec![
            vec![1.0, 0.0, 0.0],
            vec![0.0, 1.0, 0.0],
            vec![0.0, 0.0, 1.0],
            vec![0.5, 0.5, 0.0],
        ];
        let records = (0..4).map(record).collect();
        VectorIndex::build("test-model", embeddings, records).unwrap()
    }

    #[test]
    fn exact_match_is_top_hit_with_zero_distance() {
        let index = small_index();
        let hits = index.search(&[0.0, 1.0, 0.0], 2).unwrap();
        assert_eq!(hits[0].position, 1);
        assert_eq!(hits[0].distance, 0.0);
        assert_eq!(hits[1].position, 3);
        assert!((hits[1].distance - 0.5).abs() < 1e-6);
    }

    #[test]
    fn k_is_clamped_and_zero_k_is_empty() {
        let index = small_index();
        assert_eq!(index.search(&[0.0, 0.0, 0.0], 50).unwrap().len(), 4);
        assert!(index.search(&[0.0, 0.0, 0.0], 0).unwrap().is_empty());
    }

    #[test]
    fn ties_break_by_position() {
        let index = small_index();
        // Equidistant from positions 0, 1 and 2.
        let hits = index.search(&[0.0, 0.0, 0.0], 3).unwrap();
        let positions: Vec<_> = hits.iter().map(|h| h.position).collect();
        assert_eq!(positions, vec![3, 0, 1]);
    }

    #[test]
    fn build_rejects_empty_and_misaligned_input() {
        let err = VectorIndex::build("m", vec![], vec![]).unwrap_err();
        assert!(matches!(err, RagError::InvalidInput(_)));

        let err = VectorIndex::build("m", vec![vec![1.0]], vec![record(0), record(1)]).unwrap_err();
        assert!(matches!(err, RagError::Consistency(_)));

        let err = VectorIndex::build("m", vec![vec![1.0, 2.0], vec![1.0]], vec![record(0), record(1)])
            .unwrap_err();
        assert!(matches!(err, RagError::Consistency(_)));
    }

    #[test]
    fn wrong_query_dimension_is_rejected() {
        let err = small_index().search(&[1.0, 0.0], 1).unwrap_err();
        assert!(matches!(err, RagError::Consistency(_)));
    }

    #[test]
    fn search_records_maps_positions_to_metadata() {
        let index = small_index();
        let matches = index.search_records(&[0.0, 0.0, 1.0], 1).unwrap();
        assert_eq!(matches[0].record, record(2));
        assert_eq!(index.vector(2), Some(&[0.0, 0.0, 1.0][..]));
        assert_eq!(index.vector(4), None);
    }
}
