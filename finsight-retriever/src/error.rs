//! Error types for indexing and retrieval

use finsight_context::ChunkingError;
use finsight_embed::EmbedError;
use std::path::PathBuf;

use crate::storage::IndexError;

/// Result type for retriever operations.
pub type Result<T> = std::result::Result<T, RetrieverError>;

/// Everything that can go wrong between reading the corpus and answering a query.
///
/// Only [`RetrieverError::DocumentRead`] and [`RetrieverError::CorruptIndex`] are
/// recovered inside the crate: unreadable documents are skipped by the loader and
/// a corrupt snapshot makes `initialize` rebuild. Every other variant reaches
/// the caller untouched, and nothing is retried automatically.
#[derive(Debug, thiserror::Error)]
pub enum RetrieverError {
    /// Missing corpus directory, invalid chunking values, unreadable config file
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// A single document could not be read or its text could not be extracted
    #[error("Failed to read document {document}: {source}")]
    DocumentRead {
        document: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The embedding backend failed
    #[error("Embedding failed: {0}")]
    Embedding(#[from] EmbedError),

    /// A snapshot failed structural validation on load
    #[error("Corrupt index snapshot {}: {message}", path.display())]
    CorruptIndex { path: PathBuf, message: String },

    /// `search` was called before an index was built or restored
    #[error("Retriever is not initialized; call initialize() first")]
    NotInitialized,

    /// Query arguments outside their domain, e.g. `top_k == 0`
    #[error("Invalid query: {message}")]
    InvalidQuery { message: String },

    /// The in-memory index rejected an update
    #[error(transparent)]
    Index(#[from] IndexError),

    /// Filesystem errors outside a single document
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot database errors while writing
    #[error("Snapshot storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

impl RetrieverError {
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn document_read<E>(document: impl Into<String>, source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::DocumentRead {
            document: document.into(),
            source: source.into(),
        }
    }

    pub fn corrupt_index(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::CorruptIndex {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl From<ChunkingError> for RetrieverError {
    fn from(err: ChunkingError) -> Self {
        Self::configuration(err.to_string())
    }
}
