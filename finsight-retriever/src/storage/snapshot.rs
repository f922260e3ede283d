//! SQLite snapshot of a built index.
//!
//! ## Database Schema
//!
//! ```sql
//! -- Exactly one row describing how the index was built
//! CREATE TABLE snapshot_header (
//!     id INTEGER PRIMARY KEY CHECK (id = 1),
//!     format_version INTEGER NOT NULL,
//!     provider TEXT NOT NULL,
//!     model_name TEXT NOT NULL,
//!     dimension INTEGER NOT NULL,
//!     normalized INTEGER NOT NULL,
//!     corpus_signature TEXT NOT NULL,
//!     chunk_size INTEGER NOT NULL,
//!     chunk_overlap INTEGER NOT NULL,
//!     min_chunk_chars INTEGER NOT NULL,
//!     document_count INTEGER NOT NULL,
//!     chunk_count INTEGER NOT NULL,
//!     created_at INTEGER NOT NULL,
//!     retriever_version TEXT NOT NULL
//! );
//!
//! -- Corpus listing the signature was computed from
//! CREATE TABLE documents (name TEXT PRIMARY KEY, size INTEGER NOT NULL, modified_at INTEGER NOT NULL);
//!
//! -- One row per index position
//! CREATE TABLE chunks (
//!     position INTEGER PRIMARY KEY,
//!     source TEXT NOT NULL,
//!     sequence INTEGER NOT NULL,
//!     content TEXT NOT NULL,
//!     embedding BLOB NOT NULL          -- f16 vector, native byte order
//! );
//! ```
//!
//! Snapshots are written to a temporary file in the destination directory and
//! renamed over the target once complete, so readers only ever see a missing
//! file, the previous snapshot, or the new one.

use chrono::Utc;
use half::f16;
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::path::{Path, PathBuf};

use super::{ChunkRecord, DistanceMetric, ModelIdentity, VectorIndex};
use crate::error::{Result, RetrieverError};
use crate::retrieval::signature::{CorpusEntry, CorpusSignature};

/// Layout version written to every snapshot; older or newer files are rebuilt.
pub const SNAPSHOT_FORMAT_VERSION: i64 = 2;

/// Everything that must match for a snapshot to be reused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotKey {
    pub model: ModelIdentity,
    pub corpus_signature: CorpusSignature,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// Chunks shorter than this many characters were left out of the index
    pub min_chunk_chars: usize,
}

impl SnapshotKey {
    /// Compare a stored key with the one derived from the current state.
    ///
    /// Returns `Ok(true)` when the snapshot can be reused and `Ok(false)` when the
    /// corpus, chunking or short-chunk filter changed. An embedding model mismatch means the stored
    /// vectors are unusable and is reported as [`RetrieverError::CorruptIndex`].
    pub fn check(&self, current: &SnapshotKey, path: &Path) -> Result<bool> {
        if self.model != current.model {
            return Err(RetrieverError::corrupt_index(
                path,
                format!(
                    "built with embedding model {}, current model is {}",
                    self.model.model_id(),
                    current.model.model_id()
                ),
            ));
        }
        if self.chunk_size != current.chunk_size || self.chunk_overlap != current.chunk_overlap {
            tracing::info!(
                "Chunking changed from {}/{} to {}/{} words",
                self.chunk_size,
                self.chunk_overlap,
                current.chunk_size,
                current.chunk_overlap
            );
            return Ok(false);
        }
        if self.min_chunk_chars != current.min_chunk_chars {
            tracing::info!(
                "Short-chunk filter changed from {} to {} characters",
                self.min_chunk_chars,
                current.min_chunk_chars
            );
            return Ok(false);
        }
        if self.corpus_signature != current.corpus_signature {
            tracing::info!("Corpus changed since snapshot was written");
            return Ok(false);
        }
        Ok(true)
    }
}

/// Metadata describing a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotHeader {
    pub format_version: i64,
    pub key: SnapshotKey,
    pub document_count: usize,
    pub chunk_count: usize,
    /// Unix seconds
    pub created_at: i64,
    /// Crate version that wrote the snapshot
    pub retriever_version: String,
}

impl SnapshotHeader {
    /// Header for an index built now.
    pub fn new(key: SnapshotKey, document_count: usize, chunk_count: usize) -> Self {
        Self {
            format_version: SNAPSHOT_FORMAT_VERSION,
            key,
            document_count,
            chunk_count,
            created_at: Utc::now().timestamp(),
            retriever_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// A complete index together with the corpus listing it was built from.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub header: SnapshotHeader,
    pub documents: Vec<CorpusEntry>,
    pub index: VectorIndex,
}

impl Snapshot {
    /// Write the snapshot to `path`, replacing any previous file atomically.
    ///
    /// On failure the previous snapshot (if any) is untouched and no partial
    /// file is left behind.
    pub async fn save(&self, path: &Path) -> Result<()> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        tokio::fs::create_dir_all(&dir).await?;

        let temp = tempfile::Builder::new()
            .prefix(".finsight-snapshot-")
            .suffix(".tmp")
            .tempfile_in(&dir)?;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(
                SqliteConnectOptions::new()
                    .filename(temp.path())
                    .create_if_missing(true)
                    .journal_mode(SqliteJournalMode::Delete)
                    .synchronous(SqliteSynchronous::Full),
            )
            .await?;

        let written = self.write_tables(&pool).await;
        // The file must be closed before it is renamed into place
        pool.close().await;
        written?;

        temp.persist(path).map_err(|e| RetrieverError::Io(e.error))?;
        tracing::debug!(
            "Saved snapshot with {} chunks to {}",
            self.header.chunk_count,
            path.display()
        );
        Ok(())
    }

    async fn write_tables(&self, pool: &SqlitePool) -> Result<()> {
        let mut tx = pool.begin().await?;

        sqlx::query(
            r#"
            CREATE TABLE snapshot_header (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                format_version INTEGER NOT NULL,
                provider TEXT NOT NULL,
                model_name TEXT NOT NULL,
                dimension INTEGER NOT NULL,
                normalized INTEGER NOT NULL,
                corpus_signature TEXT NOT NULL,
                chunk_size INTEGER NOT NULL,
                chunk_overlap INTEGER NOT NULL,
                min_chunk_chars INTEGER NOT NULL,
                document_count INTEGER NOT NULL,
                chunk_count INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                retriever_version TEXT NOT NULL
            )
            "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE documents (
                name TEXT PRIMARY KEY,
                size INTEGER NOT NULL,
                modified_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE chunks (
                position INTEGER PRIMARY KEY,
                source TEXT NOT NULL,
                sequence INTEGER NOT NULL,
                content TEXT NOT NULL,
                embedding BLOB NOT NULL
            )
            "#,
        )
        .execute(&mut *tx)
        .await?;

        let header = &self.header;
        sqlx::query(
            r#"
            INSERT INTO snapshot_header (
                id, format_version, provider, model_name, dimension, normalized,
                corpus_signature, chunk_size, chunk_overlap, min_chunk_chars,
                document_count, chunk_count, created_at, retriever_version
            )
            VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
        )
        .bind(header.format_version)
        .bind(&header.key.model.provider)
        .bind(&header.key.model.model_name)
        .bind(header.key.model.dimension as i64)
        .bind(header.key.model.normalized)
        .bind(header.key.corpus_signature.as_str())
        .bind(header.key.chunk_size as i64)
        .bind(header.key.chunk_overlap as i64)
        .bind(header.key.min_chunk_chars as i64)
        .bind(header.document_count as i64)
        .bind(header.chunk_count as i64)
        .bind(header.created_at)
        .bind(&header.retriever_version)
        .execute(&mut *tx)
        .await?;

        for document in &self.documents {
            sqlx::query("INSERT INTO documents (name, size, modified_at) VALUES (?1, ?2, ?3)")
                .bind(&document.name)
                .bind(document.size as i64)
                .bind(document.modified_at)
                .execute(&mut *tx)
                .await?;
        }

        for (position, (vector, chunk)) in self.index.entries().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO chunks (position, source, sequence, content, embedding)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
            )
            .bind(position as i64)
            .bind(&chunk.source)
            .bind(chunk.sequence as i64)
            .bind(&chunk.text)
            .bind(bytemuck::cast_slice::<f16, u8>(vector))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Read only the header, without loading any vectors.
    pub async fn load_header(path: &Path) -> Result<SnapshotHeader> {
        let pool = open_read_only(path).await?;
        let header = read_header(&pool).await;
        pool.close().await;
        header.map_err(|e| RetrieverError::corrupt_index(path, e.to_string()))
    }

    /// Load and validate a snapshot.
    ///
    /// Every failure, including an unreadable file, is reported as
    /// [`RetrieverError::CorruptIndex`] so callers can fall back to rebuilding.
    pub async fn load(path: &Path, metric: DistanceMetric) -> Result<Snapshot> {
        let pool = open_read_only(path).await?;
        let loaded = read_snapshot(&pool, metric).await;
        pool.close().await;
        loaded.map_err(|e| RetrieverError::corrupt_index(path, e.to_string()))
    }
}

async fn open_read_only(path: &Path) -> Result<SqlitePool> {
    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        return Err(RetrieverError::corrupt_index(path, "file does not exist"));
    }
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(
            SqliteConnectOptions::new()
                .filename(path)
                .read_only(true)
                .create_if_missing(false),
        )
        .await
        .map_err(|e| RetrieverError::corrupt_index(path, e.to_string()))
}

/// Validation failures while reading; converted to `CorruptIndex` by the caller.
#[derive(Debug, thiserror::Error)]
enum ReadError {
    #[error("{0}")]
    Sql(#[from] sqlx::Error),
    #[error("{0}")]
    Invalid(String),
}

fn invalid(message: impl Into<String>) -> ReadError {
    ReadError::Invalid(message.into())
}

fn to_usize(value: i64, column: &str) -> std::result::Result<usize, ReadError> {
    usize::try_from(value).map_err(|_| invalid(format!("negative value {value} in {column}")))
}

async fn read_header(pool: &SqlitePool) -> std::result::Result<SnapshotHeader, ReadError> {
    let rows = sqlx::query(
        r#"
        SELECT format_version, provider, model_name, dimension, normalized,
               corpus_signature, chunk_size, chunk_overlap, min_chunk_chars,
               document_count, chunk_count, created_at, retriever_version
        FROM snapshot_header
        "#,
    )
    .fetch_all(pool)
    .await?;

    let row = match rows.as_slice() {
        [row] => row,
        [] => return Err(invalid("snapshot header is missing")),
        _ => return Err(invalid("snapshot has more than one header row")),
    };

    let format_version: i64 = row.try_get("format_version")?;
    if format_version != SNAPSHOT_FORMAT_VERSION {
        return Err(invalid(format!(
            "unsupported format version {format_version}, expected {SNAPSHOT_FORMAT_VERSION}"
        )));
    }

    let dimension = to_usize(row.try_get("dimension")?, "dimension")?;
    if dimension == 0 {
        return Err(invalid("embedding dimension is zero"));
    }

    Ok(SnapshotHeader {
        format_version,
        key: SnapshotKey {
            model: ModelIdentity::new(
                row.try_get::<String, _>("provider")?,
                row.try_get::<String, _>("model_name")?,
                dimension,
                row.try_get::<bool, _>("normalized")?,
            ),
            corpus_signature: CorpusSignature::from_stored(
                row.try_get::<String, _>("corpus_signature")?,
            ),
            chunk_size: to_usize(row.try_get("chunk_size")?, "chunk_size")?,
            chunk_overlap: to_usize(row.try_get("chunk_overlap")?, "chunk_overlap")?,
            min_chunk_chars: to_usize(row.try_get("min_chunk_chars")?, "min_chunk_chars")?,
        },
        document_count: to_usize(row.try_get("document_count")?, "document_count")?,
        chunk_count: to_usize(row.try_get("chunk_count")?, "chunk_count")?,
        created_at: row.try_get("created_at")?,
        retriever_version: row.try_get("retriever_version")?,
    })
}

async fn read_snapshot(
    pool: &SqlitePool,
    metric: DistanceMetric,
) -> std::result::Result<Snapshot, ReadError> {
    let header = read_header(pool).await?;
    let dimension = header.key.model.dimension;

    let document_rows = sqlx::query("SELECT name, size, modified_at FROM documents ORDER BY name")
        .fetch_all(pool)
        .await?;
    if document_rows.len() != header.document_count {
        return Err(invalid(format!(
            "header lists {} documents, found {}",
            header.document_count,
            document_rows.len()
        )));
    }
    let mut documents = Vec::with_capacity(document_rows.len());
    for row in &document_rows {
        let size: i64 = row.try_get("size")?;
        documents.push(CorpusEntry {
            name: row.try_get("name")?,
            size: u64::try_from(size).map_err(|_| invalid(format!("negative document size {size}")))?,
            modified_at: row.try_get("modified_at")?,
        });
    }

    let chunk_rows = sqlx::query(
        "SELECT position, source, sequence, content, embedding FROM chunks ORDER BY position",
    )
    .fetch_all(pool)
    .await?;
    if chunk_rows.len() != header.chunk_count {
        return Err(invalid(format!(
            "header lists {} chunks, found {}",
            header.chunk_count,
            chunk_rows.len()
        )));
    }

    let mut vectors = Vec::with_capacity(chunk_rows.len());
    let mut chunks = Vec::with_capacity(chunk_rows.len());
    for (expected_position, row) in chunk_rows.iter().enumerate() {
        let position = to_usize(row.try_get("position")?, "position")?;
        if position != expected_position {
            return Err(invalid(format!(
                "chunk positions are not contiguous: expected {expected_position}, found {position}"
            )));
        }

        let bytes: Vec<u8> = row.try_get("embedding")?;
        if bytes.len() != dimension * std::mem::size_of::<f16>() {
            return Err(invalid(format!(
                "embedding at position {position} has {} bytes, expected {}",
                bytes.len(),
                dimension * std::mem::size_of::<f16>()
            )));
        }
        vectors.push(decode_vector(&bytes));
        chunks.push(ChunkRecord {
            source: row.try_get("source")?,
            sequence: to_usize(row.try_get("sequence")?, "sequence")?,
            text: row.try_get("content")?,
        });
    }

    let mut index = VectorIndex::new(header.key.model.clone(), metric);
    index
        .add(vectors, chunks)
        .map_err(|e| invalid(e.to_string()))?;

    Ok(Snapshot {
        header,
        documents,
        index,
    })
}

fn decode_vector(bytes: &[u8]) -> Vec<f16> {
    match bytemuck::try_cast_slice::<u8, f16>(bytes) {
        Ok(values) => values.to_vec(),
        // Blob buffers carry no alignment guarantee
        Err(_) => bytes
            .chunks_exact(2)
            .map(|pair| f16::from_ne_bytes([pair[0], pair[1]]))
            .collect(),
    }
}
