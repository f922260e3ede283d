//! # finsight-embed
//!
//! Text embeddings for the finsight retriever, computed locally with ONNX models
//! through FastEmbed. Nothing leaves the machine: model files are downloaded once
//! into a cache directory and inference runs on blocking worker threads.
//!
//! ## Quick Start
//!
//! ```no_run
//! use finsight_embed::{EmbedConfig, EmbeddingProvider, FastEmbedProvider};
//!
//! # async fn example() -> finsight_embed::Result<()> {
//! let provider = FastEmbedProvider::create(EmbedConfig::default()).await?;
//!
//! let texts = vec![
//!     "What is compound interest?".to_string(),
//!     "How does SEBI regulate brokers?".to_string(),
//! ];
//! let result = provider.embed_texts(&texts).await?;
//!
//! println!("Generated {} embeddings of dimension {}",
//!          result.len(), result.dimension);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: model selection, batch size, normalization, cache directory
//! - [`provider`]: the [`EmbeddingProvider`] trait and [`FastEmbedProvider`]
//! - [`error`]: [`EmbedError`] and the crate [`Result`] alias
//!
//! Embeddings are returned as half-precision (f16) vectors, L2-normalized by
//! default. Loaded models are cached per process, keyed by their configuration,
//! so creating several providers for the same model loads it once.

pub mod config;
pub mod error;
pub mod provider;

// Re-export main types for easy access
pub use config::{DEFAULT_MODEL, EmbedConfig, SUPPORTED_MODELS};
pub use error::{EmbedError, Result};
pub use provider::{EmbeddingProvider, EmbeddingResult, FastEmbedProvider, normalize_f16};
