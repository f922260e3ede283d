//! Configuration for embedding models

use crate::error::{EmbedError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Built-in fastembed models this crate knows how to load, with their output
/// dimension.
pub const SUPPORTED_MODELS: &[(&str, usize)] = &[
    ("all-MiniLM-L6-v2", 384),
    ("all-MiniLM-L12-v2", 384),
    ("bge-small-en-v1.5", 384),
    ("bge-base-en-v1.5", 768),
    ("nomic-embed-text-v1.5", 768),
    ("snowflake-arctic-embed-xs", 384),
];

/// Model used when nothing else is configured.
pub const DEFAULT_MODEL: &str = "all-MiniLM-L6-v2";

/// Normalize a user-supplied model name to its catalogue spelling.
///
/// Accepts HuggingFace-style prefixes such as `sentence-transformers/` and
/// ignores ASCII case.
pub fn canonical_model_name(name: &str) -> Option<&'static str> {
    let bare = name.rsplit('/').next().unwrap_or(name);
    SUPPORTED_MODELS
        .iter()
        .find(|(known, _)| known.eq_ignore_ascii_case(bare))
        .map(|(known, _)| *known)
}

/// Configuration for embedding models.
///
/// The whole struct is serialized to build the process-wide model cache key,
/// so two configs that differ in any field load separate model instances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbedConfig {
    /// Name of the embedding model to use
    pub model_name: String,
    /// Where fastembed keeps downloaded ONNX files; `$HOME/.finsight/models` if unset
    pub cache_dir: Option<PathBuf>,
    /// Maximum batch size for embedding generation
    pub batch_size: usize,
    /// Whether to L2-normalize embeddings
    pub normalize: bool,
    /// Show a progress bar while fastembed downloads model files
    pub show_download_progress: bool,
}

impl EmbedConfig {
    /// Create a configuration for the named model with default settings
    pub fn new(model_name: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            ..Self::default()
        }
    }

    /// Set the batch size for embedding generation (builder style)
    pub fn with_batch_size(self, batch_size: usize) -> Self {
        Self { batch_size, ..self }
    }

    /// Set whether to normalize embeddings (builder style)
    pub fn with_normalize(self, normalize: bool) -> Self {
        Self { normalize, ..self }
    }

    /// Set the model cache directory (builder style)
    pub fn with_cache_dir(self, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: Some(cache_dir.into()),
            ..self
        }
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Resolve the directory fastembed should download models into
    pub fn cache_dir(&self) -> PathBuf {
        if let Some(dir) = &self.cache_dir {
            return dir.clone();
        }
        match std::env::var_os("HOME") {
            Some(home) => PathBuf::from(home).join(".finsight").join("models"),
            None => PathBuf::from(".fastembed_cache"),
        }
    }

    /// Output dimension of the configured model, if it is in the catalogue
    pub fn expected_dimension(&self) -> Option<usize> {
        let name = canonical_model_name(&self.model_name)?;
        SUPPORTED_MODELS
            .iter()
            .find(|(known, _)| *known == name)
            .map(|(_, dim)| *dim)
    }

    /// Check that the model is known and the batch size is usable
    pub fn validate(&self) -> Result<()> {
        if canonical_model_name(&self.model_name).is_none() {
            let known: Vec<&str> = SUPPORTED_MODELS.iter().map(|(name, _)| *name).collect();
            return Err(EmbedError::invalid_config(format!(
                "unsupported embedding model '{}', expected one of: {}",
                self.model_name,
                known.join(", ")
            )));
        }
        if self.batch_size == 0 {
            return Err(EmbedError::invalid_config("batch_size must be positive"));
        }
        tracing::debug!("Embedding configuration valid for: {}", self.model_name);
        Ok(())
    }
}

impl Default for EmbedConfig {
    fn default() -> Self {
        Self {
            model_name: DEFAULT_MODEL.to_string(),
            cache_dir: None,
            batch_size: 32,
            normalize: true,
            show_download_progress: false,
        }
    }
}
