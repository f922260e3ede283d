//! Corpus loading, change detection and the retriever itself.

pub mod loader;
pub mod retriever;
pub mod signature;

pub use loader::{CorpusFile, Document, DocumentLoader};
pub use retriever::{
    BuildReport, IndexOrigin, InitOutcome, Retriever, RetrieverState, RetrieverStats, SearchHit,
    SearchResults,
};
pub use signature::{CorpusEntry, CorpusSignature};
