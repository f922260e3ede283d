//! Exact nearest-neighbour index over f16 embeddings

use half::f16;
use std::cmp::Ordering;

use super::{ChunkRecord, DistanceMetric, IndexError, ModelIdentity, Neighbor};

/// Flat vector index with chunk metadata kept in lockstep.
///
/// Searches scan every vector, so results are exact and deterministic: ties in
/// distance are broken by insertion position.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    model: ModelIdentity,
    metric: DistanceMetric,
    vectors: Vec<Vec<f16>>,
    chunks: Vec<ChunkRecord>,
}

impl VectorIndex {
    /// Create an empty index for vectors produced by `model`.
    pub fn new(model: ModelIdentity, metric: DistanceMetric) -> Self {
        Self {
            model,
            metric,
            vectors: Vec::new(),
            chunks: Vec::new(),
        }
    }

    /// Append vectors and their chunk records.
    ///
    /// The batch is checked as a whole before anything is stored, so on error
    /// the index is left exactly as it was.
    pub fn add(&mut self, vectors: Vec<Vec<f16>>, chunks: Vec<ChunkRecord>) -> Result<(), IndexError> {
        if vectors.len() != chunks.len() {
            return Err(IndexError::LengthMismatch {
                vectors: vectors.len(),
                chunks: chunks.len(),
            });
        }

        let expected = self.model.dimension;
        if let Some((position, vector)) = vectors
            .iter()
            .enumerate()
            .find(|(_, vector)| vector.len() != expected)
        {
            return Err(IndexError::DimensionMismatch {
                position,
                expected,
                actual: vector.len(),
            });
        }

        self.vectors.extend(vectors);
        self.chunks.extend(chunks);
        Ok(())
    }

    /// The `k` stored vectors closest to `query`, closest first.
    ///
    /// Returns fewer than `k` neighbours when the index is smaller, and none when
    /// it is empty or `k` is zero.
    pub fn nearest(&self, query: &[f16], k: usize) -> Result<Vec<Neighbor>, IndexError> {
        if query.len() != self.model.dimension {
            return Err(IndexError::QueryDimensionMismatch {
                expected: self.model.dimension,
                actual: query.len(),
            });
        }
        if k == 0 || self.vectors.is_empty() {
            return Ok(Vec::new());
        }

        let query: Vec<f32> = query.iter().map(|x| x.to_f32()).collect();
        let mut scored: Vec<Neighbor> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(position, vector)| Neighbor {
                position,
                distance: self.metric.distance(vector, &query),
            })
            .collect();

        if scored.len() > k {
            scored.select_nth_unstable_by(k, closest_first);
            scored.truncate(k);
        }
        scored.sort_by(closest_first);
        Ok(scored)
    }

    /// Chunk record stored at `position`.
    pub fn chunk(&self, position: usize) -> Option<&ChunkRecord> {
        self.chunks.get(position)
    }

    /// Vector stored at `position`.
    pub fn vector(&self, position: usize) -> Option<&[f16]> {
        self.vectors.get(position).map(Vec::as_slice)
    }

    /// Iterate over `(vector, chunk)` pairs in position order.
    pub fn entries(&self) -> impl Iterator<Item = (&[f16], &ChunkRecord)> {
        self.vectors.iter().map(Vec::as_slice).zip(self.chunks.iter())
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.model.dimension
    }

    pub fn model(&self) -> &ModelIdentity {
        &self.model
    }

    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }
}

fn closest_first(a: &Neighbor, b: &Neighbor) -> Ordering {
    a.distance
        .total_cmp(&b.distance)
        .then_with(|| a.position.cmp(&b.position))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(dimension: usize) -> ModelIdentity {
        ModelIdentity::new("test", "unit", dimension, true)
    }

    fn v(values: &[f32]) -> Vec<f16> {
        values.iter().copied().map(f16::from_f32).collect()
    }

    fn record(source: &str, sequence: usize) -> ChunkRecord {
        ChunkRecord {
            source: source.to_string(),
            sequence,
            text: format!("{source} chunk {sequence}"),
        }
    }

    fn sample_index() -> VectorIndex {
        let mut index = VectorIndex::new(model(2), DistanceMetric::SquaredEuclidean);
        index
            .add(
                vec![v(&[1.0, 0.0]), v(&[0.0, 1.0]), v(&[0.6, 0.8]), v(&[-1.0, 0.0])],
                vec![
                    record("savings.pdf", 0),
                    record("savings.pdf", 1),
                    record("budget.txt", 0),
                    record("fraud.md", 0),
                ],
            )
            .unwrap();
        index
    }

    #[test]
    fn test_nearest_orders_by_ascending_distance() {
        let index = sample_index();
        let neighbors = index.nearest(&v(&[1.0, 0.0]), 4).unwrap();

        let positions: Vec<usize> = neighbors.iter().map(|n| n.position).collect();
        assert_eq!(positions, vec![0, 2, 1, 3]);
        assert!(neighbors.windows(2).all(|w| w[0].distance <= w[1].distance));
        assert_eq!(neighbors[0].distance, 0.0);
        assert_eq!(neighbors[3].distance, 4.0);
    }

    #[test]
    fn test_nearest_truncates_to_k() {
        let index = sample_index();
        let neighbors = index.nearest(&v(&[0.0, 1.0]), 2).unwrap();
        assert_eq!(neighbors.len(), 2);
        assert_eq!(neighbors[0].position, 1);
        assert_eq!(neighbors[1].position, 2);

        assert_eq!(index.nearest(&v(&[0.0, 1.0]), 10).unwrap().len(), 4);
        assert!(index.nearest(&v(&[0.0, 1.0]), 0).unwrap().is_empty());
    }

    #[test]
    fn test_ties_break_by_position() {
        let mut index = VectorIndex::new(model(2), DistanceMetric::SquaredEuclidean);
        index
            .add(
                vec![v(&[0.0, 1.0]), v(&[0.0, -1.0]), v(&[0.0, 1.0])],
                vec![record("a", 0), record("b", 0), record("c", 0)],
            )
            .unwrap();

        let neighbors = index.nearest(&v(&[1.0, 0.0]), 2).unwrap();
        let positions: Vec<usize> = neighbors.iter().map(|n| n.position).collect();
        assert_eq!(positions, vec![0, 1]);
    }

    #[test]
    fn test_empty_index_returns_nothing() {
        let index = VectorIndex::new(model(3), DistanceMetric::Cosine);
        assert!(index.is_empty());
        assert!(index.nearest(&v(&[1.0, 0.0, 0.0]), 5).unwrap().is_empty());
    }

    #[test]
    fn test_chunks_stay_aligned_with_vectors() {
        let index = sample_index();
        assert_eq!(index.len(), 4);
        assert_eq!(index.entries().count(), 4);

        let nearest = index.nearest(&v(&[-1.0, 0.0]), 1).unwrap();
        let chunk = index.chunk(nearest[0].position).unwrap();
        assert_eq!(chunk.source, "fraud.md");
        assert_eq!(index.vector(nearest[0].position).unwrap(), v(&[-1.0, 0.0]).as_slice());
        assert!(index.chunk(4).is_none());
    }

    #[test]
    fn test_rejected_add_leaves_index_unchanged() {
        let mut index = sample_index();

        let err = index
            .add(vec![v(&[1.0, 0.0])], vec![record("x", 0), record("y", 0)])
            .unwrap_err();
        assert_eq!(err, IndexError::LengthMismatch { vectors: 1, chunks: 2 });

        let err = index
            .add(
                vec![v(&[1.0, 0.0]), v(&[1.0, 0.0, 0.0])],
                vec![record("x", 0), record("y", 0)],
            )
            .unwrap_err();
        assert_eq!(
            err,
            IndexError::DimensionMismatch {
                position: 1,
                expected: 2,
                actual: 3
            }
        );

        assert_eq!(index.len(), 4);
    }

    #[test]
    fn test_query_dimension_checked() {
        let index = sample_index();
        let err = index.nearest(&v(&[1.0, 0.0, 0.0]), 1).unwrap_err();
        assert!(matches!(err, IndexError::QueryDimensionMismatch { expected: 2, actual: 3 }));
    }

    #[test]
    fn test_cosine_ranking_ignores_magnitude() {
        let mut index = VectorIndex::new(model(2), DistanceMetric::Cosine);
        index
            .add(
                vec![v(&[10.0, 0.0]), v(&[0.5, 0.5])],
                vec![record("far-but-aligned", 0), record("diagonal", 0)],
            )
            .unwrap();

        let neighbors = index.nearest(&v(&[1.0, 0.0]), 2).unwrap();
        assert_eq!(neighbors[0].position, 0);
        assert!(neighbors[0].distance.abs() < 1e-6);
    }
}
