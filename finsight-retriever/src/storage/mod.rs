//! In-memory vector index and its on-disk snapshot.
//!
//! The live index is a pair of parallel vectors: embeddings and the chunk records
//! they were computed from. Position `i` in one always describes position `i` in
//! the other, and every operation that touches one touches the other the same way.
//!
//! ## Key Components
//!
//! - **VectorIndex**: exact nearest-neighbour search over f16 embeddings
//! - **DistanceMetric**: how distances are computed and compared to thresholds
//! - **Snapshot**: SQLite persistence with atomic replace and load-time validation
//!
//! ## Architecture
//!
//! ```text
//! Retriever ── VectorIndex (memory, read by searches)
//!                  │ save / load
//!                  ▼
//!              Snapshot ── knowledge_index.db (header + documents + chunks)
//! ```

use half::f16;
use serde::{Deserialize, Serialize};

pub mod snapshot;
pub mod vector_index;

pub use snapshot::{Snapshot, SnapshotHeader, SnapshotKey};
pub use vector_index::VectorIndex;

/// Distance between a stored vector and a query.
///
/// Both variants are distances: **lower means closer**, and a score threshold is
/// always an upper bound. Keeping a single direction means switching metric never
/// flips the meaning of a configured threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// Squared L2 distance, as computed by a flat L2 index. For unit vectors this
    /// is `2 - 2·cos`, ranging over `[0, 4]`.
    #[default]
    SquaredEuclidean,
    /// Cosine distance `1 - cos`, ranging over `[0, 2]`.
    Cosine,
}

impl DistanceMetric {
    /// Distance between a stored vector and a query already converted to f32.
    pub fn distance(&self, stored: &[f16], query: &[f32]) -> f32 {
        match self {
            DistanceMetric::SquaredEuclidean => stored
                .iter()
                .zip(query)
                .map(|(a, b)| {
                    let d = a.to_f32() - b;
                    d * d
                })
                .sum(),
            DistanceMetric::Cosine => {
                let mut dot = 0.0f32;
                let mut norm_a = 0.0f32;
                let mut norm_b = 0.0f32;
                for (a, b) in stored.iter().zip(query) {
                    let a = a.to_f32();
                    dot += a * b;
                    norm_a += a * a;
                    norm_b += b * b;
                }
                if norm_a == 0.0 || norm_b == 0.0 {
                    1.0
                } else {
                    1.0 - dot / (norm_a.sqrt() * norm_b.sqrt())
                }
            }
        }
    }

    /// Whether a hit at `distance` is close enough to survive `threshold`.
    pub fn passes(&self, distance: f32, threshold: f32) -> bool {
        distance <= threshold
    }

    /// Coarse confidence label for a distance.
    pub fn relevance(&self, distance: f32) -> Relevance {
        // Cosine distance is half the squared L2 distance on unit vectors.
        let (high, medium) = match self {
            DistanceMetric::SquaredEuclidean => (0.8, 1.2),
            DistanceMetric::Cosine => (0.4, 0.6),
        };
        if distance < high {
            Relevance::High
        } else if distance < medium {
            Relevance::Medium
        } else {
            Relevance::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DistanceMetric::SquaredEuclidean => "squared_euclidean",
            DistanceMetric::Cosine => "cosine",
        }
    }
}

impl std::fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Confidence label attached to search hits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Relevance {
    High,
    Medium,
    Low,
}

/// Metadata stored alongside each vector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkRecord {
    /// Identifier of the source document (its file name)
    pub source: String,
    /// Position of the chunk within its document
    pub sequence: usize,
    /// Chunk text
    pub text: String,
}

/// One nearest-neighbour match: a position in the index and its distance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub position: usize,
    pub distance: f32,
}

/// Identity of the embedding model an index was built with.
///
/// Vectors from different models live in unrelated spaces, so an index only
/// accepts queries and snapshots carrying the same identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelIdentity {
    /// Provider of the embedding model (e.g., "fastembed")
    pub provider: String,
    /// Name of the embedding model (e.g., "all-MiniLM-L6-v2")
    pub model_name: String,
    /// Dimension of the embedding vectors
    pub dimension: usize,
    /// Whether embeddings are L2-normalized
    pub normalized: bool,
}

impl ModelIdentity {
    pub fn new(
        provider: impl Into<String>,
        model_name: impl Into<String>,
        dimension: usize,
        normalized: bool,
    ) -> Self {
        Self {
            provider: provider.into(),
            model_name: model_name.into(),
            dimension,
            normalized,
        }
    }

    /// Describe the model behind an embedding provider.
    pub fn of(provider: &dyn finsight_embed::EmbeddingProvider) -> Self {
        Self::new(
            provider.provider_name(),
            provider.model_name(),
            provider.embedding_dimension(),
            provider.is_normalized(),
        )
    }

    /// Compact identifier, e.g. `fastembed:all-MiniLM-L6-v2:384:norm`
    pub fn model_id(&self) -> String {
        let normalized_part = if self.normalized { "norm" } else { "raw" };
        format!(
            "{}:{}:{}:{}",
            self.provider, self.model_name, self.dimension, normalized_part
        )
    }
}

/// Violations of the index's structural invariants.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum IndexError {
    #[error("cannot pair {vectors} vectors with {chunks} chunk records")]
    LengthMismatch { vectors: usize, chunks: usize },

    #[error("vector {position} has dimension {actual}, index expects {expected}")]
    DimensionMismatch {
        position: usize,
        expected: usize,
        actual: usize,
    },

    #[error("query has dimension {actual}, index expects {expected}")]
    QueryDimensionMismatch { expected: usize, actual: usize },
}
