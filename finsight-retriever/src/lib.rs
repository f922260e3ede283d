//! finsight-retriever: semantic retrieval over a financial-literacy document library
//!
//! This crate indexes a directory of PDF, text and Markdown documents into an
//! in-memory vector index and answers natural-language queries with the most
//! similar passages. The built index is persisted as a SQLite snapshot next to
//! the corpus and reused on later starts as long as the corpus, chunking and
//! embedding model are unchanged.
//!
//! ## Key Modules
//!
//! - **[`retrieval`]**: Document loading, corpus signatures and the [`Retriever`]
//! - **[`storage`]**: Vector index, distance metrics and snapshot persistence
//! - **[`answer`]**: Rendering search results as context for a language model
//! - **[`config`]**: TOML-backed settings with defaults for every field
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use finsight_retriever::{Retriever, RetrieverConfig};
//!
//! # async fn example() -> finsight_retriever::Result<()> {
//! let config = RetrieverConfig::new("data/ncfe_books");
//! let retriever = Retriever::with_fastembed(config).await?;
//! retriever.initialize().await?;
//!
//! let results = retriever.search("What is compound interest?", 3, 1.5).await?;
//! for hit in results.iter() {
//!     println!("{} ({:.3}): {}", hit.source, hit.score, hit.text);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! corpus dir → DocumentLoader → WordChunker → EmbeddingProvider → VectorIndex
//!                    │                                               │  ▲
//!             CorpusSignature ──────────────▶ Snapshot (SQLite) ◀────┘  │
//!                                                                 search()
//! ```

pub mod answer;
pub mod config;
pub mod error;
pub mod retrieval;
pub mod storage;

pub use config::RetrieverConfig;
pub use error::{Result, RetrieverError};
pub use retrieval::{InitOutcome, Retriever, RetrieverState, SearchHit, SearchResults};
pub use storage::{DistanceMetric, Relevance};
