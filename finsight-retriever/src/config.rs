//! Settings consumed by the retriever.
//!
//! Every field has a default, so a TOML file only needs the values it changes:
//!
//! ```toml
//! corpus_dir = "data/ncfe_books"
//! chunk_size = 400
//! score_threshold = 1.2
//!
//! [embedding]
//! model_name = "bge-small-en-v1.5"
//! ```

use finsight_context::WindowConfig;
use finsight_context::words::{DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
use finsight_embed::EmbedConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, RetrieverError};
use crate::storage::DistanceMetric;

/// File name used for the snapshot when no explicit path is configured.
pub const DEFAULT_SNAPSHOT_FILE: &str = "knowledge_index.db";

/// Maximum squared L2 distance for a hit to count as relevant.
///
/// Tuned for normalized all-MiniLM-L6-v2 vectors, where it corresponds to a
/// cosine similarity of 0.25. Recalibrate when switching model or metric.
pub const DEFAULT_SCORE_THRESHOLD: f32 = 1.5;

/// Number of passages returned when the caller does not ask for a specific count.
pub const DEFAULT_TOP_K: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrieverConfig {
    /// Directory holding the documents to index (scanned non-recursively)
    pub corpus_dir: PathBuf,
    /// Snapshot location; defaults to `knowledge_index.db` next to the corpus directory
    pub snapshot_path: Option<PathBuf>,
    /// File extensions (without the dot) the loader picks up
    pub extensions: Vec<String>,
    /// Words per chunk
    pub chunk_size: usize,
    /// Words shared by consecutive chunks
    pub chunk_overlap: usize,
    /// Chunks with fewer characters are not indexed; 0 keeps every chunk
    pub min_chunk_chars: usize,
    /// Default number of results for `search_with_defaults`
    pub top_k_results: usize,
    /// Default relevance cut-off for `search_with_defaults`
    pub score_threshold: f32,
    /// Distance used for ranking and thresholding
    pub metric: DistanceMetric,
    /// Embedding model settings
    pub embedding: EmbedConfig,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            corpus_dir: PathBuf::from("data").join("corpus"),
            snapshot_path: None,
            extensions: vec!["pdf".to_string(), "txt".to_string(), "md".to_string()],
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            min_chunk_chars: 0,
            top_k_results: DEFAULT_TOP_K,
            score_threshold: DEFAULT_SCORE_THRESHOLD,
            metric: DistanceMetric::default(),
            embedding: EmbedConfig::default(),
        }
    }
}

impl RetrieverConfig {
    /// Create a configuration for a corpus directory with default settings.
    pub fn new(corpus_dir: impl Into<PathBuf>) -> Self {
        Self {
            corpus_dir: corpus_dir.into(),
            ..Self::default()
        }
    }

    /// Parse a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents)
            .map_err(|e| RetrieverError::configuration(format!("invalid config: {e}")))
    }

    /// Read and parse a TOML config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            RetrieverError::configuration(format!(
                "cannot read config file {}: {e}",
                path.display()
            ))
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn with_snapshot_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.snapshot_path = Some(path.into());
        self
    }

    pub fn with_chunking(mut self, chunk_size: usize, chunk_overlap: usize) -> Self {
        self.chunk_size = chunk_size;
        self.chunk_overlap = chunk_overlap;
        self
    }

    pub fn with_min_chunk_chars(mut self, min_chunk_chars: usize) -> Self {
        self.min_chunk_chars = min_chunk_chars;
        self
    }

    pub fn with_score_threshold(mut self, threshold: f32) -> Self {
        self.score_threshold = threshold;
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k_results = top_k;
        self
    }

    pub fn with_metric(mut self, metric: DistanceMetric) -> Self {
        self.metric = metric;
        self
    }

    pub fn with_embedding(mut self, embedding: EmbedConfig) -> Self {
        self.embedding = embedding;
        self
    }

    /// Where the snapshot lives, resolving the default next to the corpus.
    pub fn snapshot_path(&self) -> PathBuf {
        match &self.snapshot_path {
            Some(path) => path.clone(),
            None => self
                .corpus_dir
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .join(DEFAULT_SNAPSHOT_FILE),
        }
    }

    /// Validated chunk window.
    pub fn window(&self) -> Result<WindowConfig> {
        Ok(WindowConfig::new(self.chunk_size, self.chunk_overlap)?)
    }

    /// Whether `path` has one of the configured extensions (case-insensitive).
    pub fn is_supported(&self, path: &Path) -> bool {
        has_extension(path, &self.extensions)
    }

    /// Reject values the retriever cannot work with.
    pub fn validate(&self) -> Result<()> {
        self.window()?;

        if self.top_k_results == 0 {
            return Err(RetrieverError::configuration(
                "top_k_results must be at least 1",
            ));
        }
        if !self.score_threshold.is_finite() || self.score_threshold < 0.0 {
            return Err(RetrieverError::configuration(format!(
                "score_threshold must be a non-negative number, got {}",
                self.score_threshold
            )));
        }
        if self.extensions.is_empty() {
            return Err(RetrieverError::configuration(
                "at least one document extension must be configured",
            ));
        }
        self.embedding
            .validate()
            .map_err(|e| RetrieverError::configuration(e.to_string()))?;

        Ok(())
    }
}

/// Case-insensitive match of `path`'s extension against `extensions`.
pub(crate) fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
}
