//! Embedding provider implementations

use crate::config::{EmbedConfig, canonical_model_name};
use crate::error::{EmbedError, Result};
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use fnv::FnvHasher;
use half::f16;
use std::collections::HashMap;
use std::hash::Hasher;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

/// Result of embedding generation
#[derive(Debug, Clone)]
pub struct EmbeddingResult {
    /// The generated embeddings, one per input text
    pub embeddings: Vec<Vec<f16>>,
    /// The dimension of each embedding vector
    pub dimension: usize,
}

impl EmbeddingResult {
    /// Create a new embedding result. The dimension is taken from the first
    /// vector and is 0 for an empty result.
    pub fn new(embeddings: Vec<Vec<f16>>) -> Self {
        let dimension = embeddings.first().map(|e| e.len()).unwrap_or(0);
        Self {
            embeddings,
            dimension,
        }
    }

    pub fn len(&self) -> usize {
        self.embeddings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.embeddings.is_empty()
    }
}

/// Type alias for cached model entries (model, dimension)
type ModelCacheEntry = (Arc<Mutex<TextEmbedding>>, usize);

/// Global cache for initialized embedding models to avoid reloading
static MODEL_CACHE: OnceLock<Mutex<HashMap<String, ModelCacheEntry>>> = OnceLock::new();

/// Get the global model cache
fn get_model_cache() -> &'static Mutex<HashMap<String, ModelCacheEntry>> {
    MODEL_CACHE.get_or_init(|| Mutex::new(HashMap::new()))
}

fn lock_cache() -> MutexGuard<'static, HashMap<String, ModelCacheEntry>> {
    // The map stays consistent even if a holder panicked mid-insert.
    get_model_cache()
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn lock_model(model: &Mutex<TextEmbedding>) -> Result<MutexGuard<'_, TextEmbedding>> {
    model
        .lock()
        .map_err(|_| EmbedError::embedding_gen("embedding model lock poisoned"))
}

/// Trait for embedding providers that can generate embeddings from text
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate embeddings for a single text
    async fn embed_text(&self, text: &str) -> Result<Vec<f16>>;

    /// Generate embeddings for multiple texts, one vector per text in input order
    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult>;

    /// Get the dimension of embeddings produced by this provider
    fn embedding_dimension(&self) -> usize;

    /// Get the name/identifier of this provider
    fn provider_name(&self) -> &str;

    /// Get the name of the model behind this provider
    fn model_name(&self) -> &str;

    /// Whether returned vectors are L2-normalized
    fn is_normalized(&self) -> bool {
        true
    }
}

/// Map a catalogue name onto fastembed's built-in model enum
fn builtin_model(name: &str) -> Result<EmbeddingModel> {
    let model = match canonical_model_name(name) {
        Some("all-MiniLM-L6-v2") => EmbeddingModel::AllMiniLML6V2,
        Some("all-MiniLM-L12-v2") => EmbeddingModel::AllMiniLML12V2,
        Some("bge-small-en-v1.5") => EmbeddingModel::BGESmallENV15,
        Some("bge-base-en-v1.5") => EmbeddingModel::BGEBaseENV15,
        Some("nomic-embed-text-v1.5") => EmbeddingModel::NomicEmbedTextV15,
        Some("snowflake-arctic-embed-xs") => EmbeddingModel::SnowflakeArcticEmbedXS,
        _ => {
            return Err(EmbedError::invalid_config(format!(
                "unsupported embedding model '{name}'"
            )));
        }
    };
    Ok(model)
}

/// L2-normalize in place. Zero vectors are left untouched.
pub fn normalize_f16(embedding: &mut [f16]) {
    let norm: f32 = embedding
        .iter()
        .map(|x| x.to_f32() * x.to_f32())
        .sum::<f32>()
        .sqrt();
    if norm > 0.0 {
        for value in embedding.iter_mut() {
            *value = f16::from_f32(value.to_f32() / norm);
        }
    }
}

/// FastEmbed-based embedding provider running local ONNX models
#[derive(Clone)]
pub struct FastEmbedProvider {
    config: EmbedConfig,
    model: Option<Arc<Mutex<TextEmbedding>>>,
    dimension: usize,
}

impl std::fmt::Debug for FastEmbedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastEmbedProvider")
            .field("config", &self.config)
            .field("model", &self.model.is_some())
            .field("dimension", &self.dimension)
            .finish()
    }
}

impl FastEmbedProvider {
    /// Creates a new uninitialized provider. Call [`initialize`](Self::initialize)
    /// before embedding anything.
    pub fn new(config: EmbedConfig) -> Self {
        let dimension = config.expected_dimension().unwrap_or(0);
        Self {
            config,
            model: None,
            dimension,
        }
    }

    /// Loads the embedding model, reusing a cached instance when one exists
    /// for an identical configuration.
    pub async fn initialize(&mut self) -> Result<()> {
        self.config.validate()?;
        tracing::info!(
            "Initializing FastEmbed provider for model: {}",
            self.config.model_name()
        );

        let cache_key = self.create_cache_key()?;

        let cached_data = {
            let cache = lock_cache();
            cache
                .get(&cache_key)
                .map(|(model, dim)| (Arc::clone(model), *dim))
        };

        if let Some((cached_model, cached_dimension)) = cached_data {
            tracing::info!("Using cached model for: {}", self.config.model_name());
            self.model = Some(cached_model);
            self.dimension = cached_dimension;
            return self.validate_model().await;
        }

        let builtin = builtin_model(self.config.model_name())?;
        let cache_dir = self.config.cache_dir();
        tokio::fs::create_dir_all(&cache_dir).await?;

        let config = self.config.clone();
        let (model, dimension) =
            tokio::task::spawn_blocking(move || -> Result<(TextEmbedding, usize)> {
                tracing::info!(
                    "Loading embedding model {} from {}",
                    config.model_name(),
                    cache_dir.display()
                );

                let init_options = InitOptions::new(builtin)
                    .with_cache_dir(cache_dir)
                    .with_show_download_progress(config.show_download_progress);

                let mut model = TextEmbedding::try_new(init_options).map_err(EmbedError::model_init)?;

                // Probe the output dimension instead of trusting the catalogue
                let probe = model
                    .embed(vec!["dimension probe".to_string()], None)
                    .map_err(EmbedError::model_init)?;
                let dimension = probe.first().map(|emb| emb.len()).unwrap_or(0);

                tracing::info!("Model loaded successfully. Dimension: {}", dimension);
                Ok((model, dimension))
            })
            .await??;

        let model_arc = Arc::new(Mutex::new(model));
        lock_cache().insert(cache_key, (Arc::clone(&model_arc), dimension));

        self.model = Some(model_arc);
        self.dimension = dimension;

        self.validate_model().await
    }

    /// Creates and initializes a provider in one step.
    pub async fn create(config: EmbedConfig) -> Result<Self> {
        let mut provider = Self::new(config);
        provider.initialize().await?;
        Ok(provider)
    }

    /// Create a cache key based on the model configuration
    fn create_cache_key(&self) -> Result<String> {
        let config_json = serde_json::to_string(&self.config)
            .map_err(|e| EmbedError::External { source: e.into() })?;

        let mut hasher = FnvHasher::default();
        hasher.write(b"v1:");
        hasher.write(config_json.as_bytes());

        Ok(format!("v1:{:x}", hasher.finish()))
    }

    /// Run one embedding through the model and check its shape and values
    async fn validate_model(&self) -> Result<()> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| EmbedError::invalid_config("Model not initialized"))?;

        let model_clone = Arc::clone(model);
        let validation_result = tokio::task::spawn_blocking(move || -> Result<Vec<Vec<f32>>> {
            let mut model_guard = lock_model(&model_clone)?;
            model_guard
                .embed(vec!["validation test".to_string()], None)
                .map_err(EmbedError::embedding_gen)
        })
        .await??;

        let embedding = validation_result.first().ok_or_else(|| {
            EmbedError::invalid_config("Model validation failed: no embeddings generated")
        })?;

        if embedding.is_empty() {
            return Err(EmbedError::invalid_config(
                "Model validation failed: empty embedding",
            ));
        }

        if embedding.len() != self.dimension {
            return Err(EmbedError::invalid_config(format!(
                "Model validation failed: expected dimension {}, got {}",
                self.dimension,
                embedding.len()
            )));
        }

        if embedding.iter().any(|value| !value.is_finite()) {
            return Err(EmbedError::invalid_config(
                "Model validation failed: non-finite values in embedding",
            ));
        }

        tracing::debug!("Model validation passed for: {}", self.config.model_name());
        Ok(())
    }

    /// Clears the global model cache.
    pub fn clear_cache() {
        lock_cache().clear();
        tracing::info!("Model cache cleared");
    }

    /// Returns the number of cached models.
    pub fn cache_size() -> usize {
        lock_cache().len()
    }

    fn convert_to_f16(&self, embeddings: Vec<Vec<f32>>) -> Vec<Vec<f16>> {
        embeddings
            .into_iter()
            .map(|embedding| {
                let mut f16_embedding: Vec<f16> =
                    embedding.into_iter().map(f16::from_f32).collect();
                if self.config.normalize {
                    normalize_f16(&mut f16_embedding);
                }
                f16_embedding
            })
            .collect()
    }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    async fn embed_text(&self, text: &str) -> Result<Vec<f16>> {
        let texts = vec![text.to_string()];
        let result = self.embed_texts(&texts).await?;
        result
            .embeddings
            .into_iter()
            .next()
            .ok_or(EmbedError::CountMismatch {
                expected: 1,
                actual: 0,
            })
    }

    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult> {
        if texts.is_empty() {
            return Ok(EmbeddingResult::new(vec![]));
        }

        let model = self.model.as_ref().ok_or_else(|| {
            EmbedError::invalid_config("Model not initialized. Call initialize() first.")
        })?;

        tracing::debug!("Generating embeddings for {} texts", texts.len());

        let mut all_embeddings = Vec::with_capacity(texts.len());

        // Batches run one after another so the output keeps the input order
        for batch in texts.chunks(self.config.batch_size.max(1)) {
            let batch = batch.to_vec();
            let expected = batch.len();
            let model_clone = Arc::clone(model);

            let batch_embeddings = tokio::task::spawn_blocking(move || -> Result<Vec<Vec<f32>>> {
                tracing::debug!("Processing batch of {} texts", batch.len());
                let mut model_guard = lock_model(&model_clone)?;
                model_guard
                    .embed(batch, None)
                    .map_err(EmbedError::embedding_gen)
            })
            .await??;

            if batch_embeddings.len() != expected {
                return Err(EmbedError::CountMismatch {
                    expected,
                    actual: batch_embeddings.len(),
                });
            }

            all_embeddings.extend(self.convert_to_f16(batch_embeddings));
        }

        tracing::debug!("Generated {} embeddings", all_embeddings.len());
        Ok(EmbeddingResult::new(all_embeddings))
    }

    fn embedding_dimension(&self) -> usize {
        self.dimension
    }

    fn provider_name(&self) -> &str {
        "fastembed"
    }

    fn model_name(&self) -> &str {
        self.config.model_name()
    }

    fn is_normalized(&self) -> bool {
        self.config.normalize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_result() {
        let embeddings = vec![
            vec![f16::from_f32(0.1), f16::from_f32(0.2), f16::from_f32(0.3)],
            vec![f16::from_f32(0.4), f16::from_f32(0.5), f16::from_f32(0.6)],
        ];
        let result = EmbeddingResult::new(embeddings);

        assert_eq!(result.len(), 2);
        assert_eq!(result.dimension, 3);
        assert!(!result.is_empty());
        assert_eq!(EmbeddingResult::new(vec![]).dimension, 0);
    }

    #[test]
    fn test_fastembed_provider_creation() {
        let provider = FastEmbedProvider::new(EmbedConfig::default());

        assert_eq!(provider.provider_name(), "fastembed");
        assert_eq!(provider.model_name(), "all-MiniLM-L6-v2");
        assert_eq!(provider.embedding_dimension(), 384);
    }

    #[test]
    fn test_builtin_model_mapping() {
        assert!(matches!(
            builtin_model("all-MiniLM-L6-v2"),
            Ok(EmbeddingModel::AllMiniLML6V2)
        ));
        assert!(matches!(
            builtin_model("sentence-transformers/all-MiniLM-L6-v2"),
            Ok(EmbeddingModel::AllMiniLML6V2)
        ));
        assert!(builtin_model("unknown-model").is_err());
    }

    #[test]
    fn test_normalize_f16() {
        let mut v = vec![f16::from_f32(3.0), f16::from_f32(4.0)];
        normalize_f16(&mut v);
        assert!((v[0].to_f32() - 0.6).abs() < 1e-3);
        assert!((v[1].to_f32() - 0.8).abs() < 1e-3);

        let mut zero = vec![f16::ZERO; 4];
        normalize_f16(&mut zero);
        assert!(zero.iter().all(|x| *x == f16::ZERO));
    }

    #[tokio::test]
    async fn test_embed_before_initialize_fails() {
        let provider = FastEmbedProvider::new(EmbedConfig::default());
        let err = provider
            .embed_texts(&["hello".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, EmbedError::InvalidConfig { .. }));

        // Empty input never touches the model
        let empty = provider.embed_texts(&[]).await.unwrap();
        assert!(empty.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_model_rejected_on_initialize() {
        let mut provider = FastEmbedProvider::new(EmbedConfig::new("ModernBERT-large"));
        let err = provider.initialize().await.unwrap_err();
        assert!(matches!(err, EmbedError::InvalidConfig { .. }));
    }

    #[test]
    fn test_cache_key_generation() {
        let key1 = FastEmbedProvider::new(EmbedConfig::default())
            .create_cache_key()
            .unwrap();
        let key2 = FastEmbedProvider::new(EmbedConfig::default())
            .create_cache_key()
            .unwrap();

        assert_eq!(key1, key2, "Same config should produce same cache key");
        assert!(key1.starts_with("v1:"));

        let key3 = FastEmbedProvider::new(EmbedConfig::new("bge-small-en-v1.5"))
            .create_cache_key()
            .unwrap();
        assert_ne!(
            key1, key3,
            "Different model name should produce different cache key"
        );
    }

    #[tokio::test]
    #[ignore] // Downloads all-MiniLM-L6-v2 - run with: cargo test -p finsight-embed -- --ignored
    async fn test_minilm_download_and_embedding() -> Result<()> {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .try_init()
            .ok();

        let temp_dir = tempfile::tempdir()?;
        let config = EmbedConfig::default().with_cache_dir(temp_dir.path());
        let provider = FastEmbedProvider::create(config.clone()).await?;
        assert_eq!(provider.embedding_dimension(), 384);

        let texts = vec![
            "Compound interest is interest earned on previously accrued interest.".to_string(),
            "Interest that compounds grows savings faster over time.".to_string(),
            "The stadium hosted a football match on Saturday.".to_string(),
        ];
        let result = provider.embed_texts(&texts).await?;
        assert_eq!(result.len(), 3);
        assert_eq!(result.dimension, 384);

        let cosine = |a: &[f16], b: &[f16]| -> f32 {
            a.iter().zip(b).map(|(x, y)| x.to_f32() * y.to_f32()).sum()
        };
        let related = cosine(&result.embeddings[0], &result.embeddings[1]);
        let unrelated = cosine(&result.embeddings[0], &result.embeddings[2]);
        assert!(
            related > unrelated,
            "related={related} unrelated={unrelated}"
        );

        // Same text twice gives the same vector
        let again = provider.embed_text(&texts[0]).await?;
        assert_eq!(again, result.embeddings[0]);

        // Second provider reuses the cached model
        let before = FastEmbedProvider::cache_size();
        let _second = FastEmbedProvider::create(config).await?;
        assert_eq!(FastEmbedProvider::cache_size(), before);

        Ok(())
    }
}
