//! The retriever: builds or restores the index and answers similarity queries.
//!
//! ## Lifecycle
//!
//! ```text
//! Uninitialized ──initialize──▶ Restoring ──snapshot fresh──▶ Ready
//!                                   │
//!                                   └──stale / corrupt / missing──▶ Building ──▶ Ready
//! Ready ──rebuild──▶ Building ──▶ Ready
//! ```
//!
//! A build constructs a complete new index off to the side and swaps it in with
//! a single pointer replacement, so concurrent searches see either the old index
//! or the new one and never a mix. Builds themselves are serialized.
//!
//! ## Freshness
//!
//! A snapshot is reused only when its corpus signature, chunking parameters and
//! embedding model all match the current state. A model mismatch or any
//! structural problem in the file is treated as a corrupt snapshot: it is logged
//! and the index is rebuilt.

use finsight_context::{WindowConfig, WordChunker};
use finsight_embed::{EmbedError, EmbeddingProvider, FastEmbedProvider};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::loader::{CorpusFile, DocumentLoader};
use super::signature::{CorpusEntry, CorpusSignature};
use crate::config::RetrieverConfig;
use crate::error::{Result, RetrieverError};
use crate::storage::{
    ChunkRecord, ModelIdentity, Relevance, Snapshot, SnapshotHeader, SnapshotKey, VectorIndex,
};

/// Where the retriever is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrieverState {
    Uninitialized,
    Restoring,
    Building,
    Ready,
}

/// How `initialize` obtained its index.
#[derive(Debug, Clone, PartialEq)]
pub enum InitOutcome {
    /// A fresh snapshot was loaded; nothing was embedded
    Restored { chunks: usize },
    /// The index was built from the corpus
    Built(BuildReport),
}

/// Summary of one index build.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuildReport {
    pub documents_found: usize,
    /// Documents contributing at least one chunk
    pub documents_indexed: usize,
    /// Unreadable, empty, or fully filtered documents
    pub documents_skipped: usize,
    pub chunks_indexed: usize,
    /// Chunks shorter than `min_chunk_chars`
    pub chunks_filtered: usize,
    /// Whether the snapshot was written; a failed write leaves the index usable
    pub persisted: bool,
    #[serde(with = "duration_millis")]
    pub elapsed: Duration,
}

mod duration_millis {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u128(duration.as_millis())
    }
}

/// One passage returned by a search.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub text: String,
    /// Document the passage came from
    pub source: String,
    /// Chunk number within that document
    pub sequence: usize,
    /// Distance to the query; lower is more similar
    pub score: f32,
    pub relevance: Relevance,
}

/// Hits for a query, closest first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResults {
    pub query: String,
    pub hits: Vec<SearchHit>,
}

impl SearchResults {
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SearchHit> {
        self.hits.iter()
    }
}

/// How the serving index came to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexOrigin {
    Restored,
    Built,
}

/// Point-in-time view of the retriever for status reporting.
#[derive(Debug, Clone, Serialize)]
pub struct RetrieverStats {
    pub state: RetrieverState,
    pub corpus_dir: PathBuf,
    pub snapshot_path: PathBuf,
    pub model_id: String,
    pub metric: String,
    /// Header of the index currently serving searches, if any
    pub index: Option<SnapshotHeader>,
    pub origin: Option<IndexOrigin>,
}

impl RetrieverStats {
    pub fn chunk_count(&self) -> usize {
        self.index.as_ref().map_or(0, |header| header.chunk_count)
    }

    pub fn document_count(&self) -> usize {
        self.index.as_ref().map_or(0, |header| header.document_count)
    }
}

/// The index that searches read, together with how it was built.
#[derive(Debug)]
struct LiveIndex {
    header: SnapshotHeader,
    origin: IndexOrigin,
    index: VectorIndex,
}

/// Builds, persists and queries the knowledge index.
///
/// `Retriever` is `Send + Sync`; share it behind an `Arc` to search from many
/// tasks while a rebuild runs.
pub struct Retriever {
    config: RetrieverConfig,
    window: WindowConfig,
    loader: DocumentLoader,
    embedder: Arc<dyn EmbeddingProvider>,
    model: ModelIdentity,
    state: RwLock<RetrieverState>,
    live: RwLock<Option<Arc<LiveIndex>>>,
    build_lock: Mutex<()>,
}

impl std::fmt::Debug for Retriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retriever")
            .field("config", &self.config)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl Retriever {
    /// Create a retriever over an already constructed embedding provider.
    ///
    /// No I/O happens here; call [`initialize`](Self::initialize) before searching.
    ///
    /// # Errors
    /// [`RetrieverError::Configuration`] for invalid chunking values or a provider
    /// that reports a zero embedding dimension.
    pub fn new(config: RetrieverConfig, embedder: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        let window = config.window()?;
        let model = ModelIdentity::of(embedder.as_ref());
        if model.dimension == 0 {
            return Err(RetrieverError::configuration(format!(
                "embedding provider {} reports a zero dimension",
                model.model_id()
            )));
        }

        Ok(Self {
            loader: DocumentLoader::new(&config),
            config,
            window,
            embedder,
            model,
            state: RwLock::new(RetrieverState::Uninitialized),
            live: RwLock::new(None),
            build_lock: Mutex::new(()),
        })
    }

    /// Create a retriever backed by the fastembed model named in the config.
    ///
    /// Loads (and on first use downloads) the ONNX model.
    pub async fn with_fastembed(config: RetrieverConfig) -> Result<Self> {
        config.validate()?;
        let provider = FastEmbedProvider::create(config.embedding.clone()).await?;
        info!(
            "Using embedding model {} ({} dimensions)",
            provider.model_name(),
            provider.embedding_dimension()
        );
        Self::new(config, Arc::new(provider))
    }

    pub fn config(&self) -> &RetrieverConfig {
        &self.config
    }

    pub fn model(&self) -> &ModelIdentity {
        &self.model
    }

    pub async fn state(&self) -> RetrieverState {
        *self.state.read().await
    }

    /// Make the retriever ready, reusing the snapshot when it is still fresh.
    ///
    /// # Returns
    /// [`InitOutcome::Restored`] when the snapshot was loaded without embedding
    /// anything, [`InitOutcome::Built`] when the corpus had to be indexed.
    ///
    /// # Errors
    /// - [`RetrieverError::Configuration`] when the corpus directory is missing
    /// - [`RetrieverError::Embedding`] when the model fails during a build; no
    ///   snapshot is written in that case
    pub async fn initialize(&self) -> Result<InitOutcome> {
        let _build = self.build_lock.lock().await;

        let files = match self.loader.scan().await {
            Ok(files) => files,
            Err(e) => {
                self.settle_state().await;
                return Err(e);
            }
        };
        let key = self.current_key(&files);
        let snapshot_path = self.config.snapshot_path();

        if tokio::fs::try_exists(&snapshot_path).await.unwrap_or(false) {
            self.set_state(RetrieverState::Restoring).await;
            match self.try_restore(&key).await {
                Ok(Some(chunks)) => return Ok(InitOutcome::Restored { chunks }),
                Ok(None) => info!(
                    "Snapshot {} is out of date, rebuilding",
                    snapshot_path.display()
                ),
                Err(e) => warn!("{}; rebuilding", e),
            }
        } else {
            info!(
                "No snapshot at {}, building index",
                snapshot_path.display()
            );
        }

        let report = self.build(files, key).await?;
        Ok(InitOutcome::Built(report))
    }

    /// Rebuild the index from the corpus regardless of any snapshot.
    ///
    /// Searches keep using the previous index until the new one is complete.
    pub async fn rebuild(&self) -> Result<BuildReport> {
        let _build = self.build_lock.lock().await;
        info!("Rebuilding index from {}", self.config.corpus_dir.display());

        let files = match self.loader.scan().await {
            Ok(files) => files,
            Err(e) => {
                self.settle_state().await;
                return Err(e);
            }
        };
        let key = self.current_key(&files);
        self.build(files, key).await
    }

    /// Up to `top_k` passages whose distance to `query` is at most `score_threshold`.
    ///
    /// # Errors
    /// - [`RetrieverError::NotInitialized`] before an index is available
    /// - [`RetrieverError::InvalidQuery`] when `top_k` is zero or the threshold is
    ///   not a finite number
    /// - [`RetrieverError::Embedding`] when the query cannot be embedded
    pub async fn search(
        &self,
        query: &str,
        top_k: usize,
        score_threshold: f32,
    ) -> Result<SearchResults> {
        if top_k == 0 {
            return Err(RetrieverError::InvalidQuery {
                message: "top_k must be at least 1".to_string(),
            });
        }
        if !score_threshold.is_finite() {
            return Err(RetrieverError::InvalidQuery {
                message: format!("score_threshold must be finite, got {score_threshold}"),
            });
        }

        let live = self
            .live
            .read()
            .await
            .clone()
            .ok_or(RetrieverError::NotInitialized)?;

        if live.index.is_empty() {
            debug!("Index is empty, no results for: {}", query);
            return Ok(SearchResults {
                query: query.to_string(),
                hits: Vec::new(),
            });
        }

        let query_vector = self.embedder.embed_text(query).await?;
        let neighbors = live.index.nearest(&query_vector, top_k)?;
        let metric = live.index.metric();

        let hits: Vec<SearchHit> = neighbors
            .into_iter()
            .filter(|neighbor| metric.passes(neighbor.distance, score_threshold))
            .filter_map(|neighbor| {
                live.index.chunk(neighbor.position).map(|chunk| SearchHit {
                    text: chunk.text.clone(),
                    source: chunk.source.clone(),
                    sequence: chunk.sequence,
                    score: neighbor.distance,
                    relevance: metric.relevance(neighbor.distance),
                })
            })
            .collect();

        info!("Found {} results for query: {}", hits.len(), query);
        Ok(SearchResults {
            query: query.to_string(),
            hits,
        })
    }

    /// [`search`](Self::search) with the configured `top_k_results` and `score_threshold`.
    pub async fn search_with_defaults(&self, query: &str) -> Result<SearchResults> {
        self.search(query, self.config.top_k_results, self.config.score_threshold)
            .await
    }

    pub async fn stats(&self) -> RetrieverStats {
        let live = self.live.read().await.clone();

        RetrieverStats {
            state: self.state().await,
            corpus_dir: self.config.corpus_dir.clone(),
            snapshot_path: self.config.snapshot_path(),
            model_id: self.model.model_id(),
            metric: self.config.metric.to_string(),
            index: live.as_ref().map(|live| live.header.clone()),
            origin: live.as_ref().map(|live| live.origin),
        }
    }

    fn current_key(&self, files: &[CorpusFile]) -> SnapshotKey {
        let entries: Vec<CorpusEntry> = files.iter().map(|f| f.entry.clone()).collect();
        SnapshotKey {
            model: self.model.clone(),
            corpus_signature: CorpusSignature::compute(&entries),
            chunk_size: self.window.chunk_size(),
            chunk_overlap: self.window.chunk_overlap(),
            min_chunk_chars: self.config.min_chunk_chars,
        }
    }

    /// Load the snapshot and install it if it matches `key`.
    ///
    /// `Ok(None)` means the snapshot is valid but stale.
    async fn try_restore(&self, key: &SnapshotKey) -> Result<Option<usize>> {
        let path = self.config.snapshot_path();
        let snapshot = Snapshot::load(&path, self.config.metric).await?;
        if !snapshot.header.key.check(key, &path)? {
            return Ok(None);
        }

        let chunks = snapshot.index.len();
        info!(
            "Restored index with {} chunks from {} documents ({})",
            chunks,
            snapshot.header.document_count,
            path.display()
        );
        self.install(snapshot.header, IndexOrigin::Restored, snapshot.index)
            .await;
        Ok(Some(chunks))
    }

    async fn build(&self, files: Vec<CorpusFile>, key: SnapshotKey) -> Result<BuildReport> {
        self.set_state(RetrieverState::Building).await;

        match self.build_snapshot(&files, key).await {
            Ok((snapshot, mut report)) => {
                let path = self.config.snapshot_path();
                match snapshot.save(&path).await {
                    Ok(()) => {
                        report.persisted = true;
                        info!("Saved index snapshot to {}", path.display());
                    }
                    Err(e) => warn!(
                        "Failed to save index snapshot to {}: {}; the index will be rebuilt next start",
                        path.display(),
                        e
                    ),
                }
                self.install(snapshot.header, IndexOrigin::Built, snapshot.index)
                    .await;
                info!(
                    "Indexed {} chunks from {} documents in {:.2?}",
                    report.chunks_indexed, report.documents_indexed, report.elapsed
                );
                Ok(report)
            }
            Err(e) => {
                self.settle_state().await;
                Err(e)
            }
        }
    }

    async fn build_snapshot(
        &self,
        files: &[CorpusFile],
        key: SnapshotKey,
    ) -> Result<(Snapshot, BuildReport)> {
        let started = Instant::now();
        let documents = self.loader.load_all(files).await;
        let chunker = WordChunker::new(self.window);

        let mut records: Vec<ChunkRecord> = Vec::new();
        let mut chunks_filtered = 0;
        let mut documents_indexed = 0;
        for document in &documents {
            if document.text.trim().is_empty() {
                warn!("No text extracted from {}", document.id);
                continue;
            }

            let before = records.len();
            for chunk in chunker.chunks(document.id.clone(), &document.text) {
                if chunk.chunk_text.trim().chars().count() < self.config.min_chunk_chars {
                    chunks_filtered += 1;
                    continue;
                }
                records.push(ChunkRecord {
                    source: chunk.source,
                    sequence: chunk.sequence,
                    text: chunk.chunk_text,
                });
            }
            let created = records.len() - before;
            if created > 0 {
                documents_indexed += 1;
            }
            info!("Created {} chunks from {}", created, document.id);
        }

        let vectors = if records.is_empty() {
            Vec::new()
        } else {
            let texts: Vec<String> = records.iter().map(|r| r.text.clone()).collect();
            info!("Embedding {} chunks", texts.len());
            let result = self.embedder.embed_texts(&texts).await?;
            if result.len() != texts.len() {
                return Err(EmbedError::CountMismatch {
                    expected: texts.len(),
                    actual: result.len(),
                }
                .into());
            }
            result.embeddings
        };

        let mut index = VectorIndex::new(self.model.clone(), self.config.metric);
        index.add(vectors, records)?;

        let entries: Vec<CorpusEntry> = files.iter().map(|f| f.entry.clone()).collect();
        let header = SnapshotHeader::new(key, entries.len(), index.len());
        let report = BuildReport {
            documents_found: files.len(),
            documents_indexed,
            documents_skipped: files.len() - documents_indexed,
            chunks_indexed: index.len(),
            chunks_filtered,
            persisted: false,
            elapsed: started.elapsed(),
        };

        Ok((
            Snapshot {
                header,
                documents: entries,
                index,
            },
            report,
        ))
    }

    async fn install(&self, header: SnapshotHeader, origin: IndexOrigin, index: VectorIndex) {
        let live = Arc::new(LiveIndex {
            header,
            origin,
            index,
        });
        *self.live.write().await = Some(live);
        self.set_state(RetrieverState::Ready).await;
    }

    async fn set_state(&self, state: RetrieverState) {
        *self.state.write().await = state;
    }

    /// After a failed operation: Ready if an older index still serves, else Uninitialized.
    async fn settle_state(&self) {
        let state = if self.live.read().await.is_some() {
            RetrieverState::Ready
        } else {
            RetrieverState::Uninitialized
        };
        self.set_state(state).await;
    }
}
