pub mod words;

// Re-export the chunking types for external use
pub use words::{ChunkingError, TextChunk, WindowConfig, WordChunker, WordChunks};
