//! Word-window chunking for document text.
//!
//! Documents are cut into fixed-size windows of whitespace-separated words.
//! Consecutive windows share `chunk_overlap` words so that a passage sitting on a
//! boundary still lands whole in at least one chunk.
//!
//! The window starts at word 0 and advances by `chunk_size - chunk_overlap`
//! words until the start reaches or passes the end of the word sequence. That
//! gives a few properties the retriever leans on:
//!
//! *   **Determinism**: the same text and configuration always produce the same
//!     chunks, which keeps cached indexes comparable across runs.
//! *   **Short documents**: text with fewer words than `chunk_size` yields
//!     exactly one chunk; empty text yields none.
//! *   **Coverage**: concatenating every chunk's [`TextChunk::unique_span`]
//!     reproduces the document's word sequence.
//!
//! ```
//! use finsight_context::words::{WindowConfig, WordChunker};
//!
//! let chunker = WordChunker::new(WindowConfig::new(4, 1).unwrap());
//! let chunks: Vec<_> = chunker
//!     .chunks("rates.pdf", "interest accrues daily and compounds monthly on savings")
//!     .collect();
//!
//! assert_eq!(chunks.len(), 3);
//! assert_eq!(chunks[0].chunk_text, "interest accrues daily and");
//! assert_eq!(chunks[1].chunk_text, "and compounds monthly on");
//! assert_eq!(chunks[2].chunk_text, "on savings");
//! assert!(chunks.iter().all(|c| c.source == "rates.pdf"));
//! ```

use serde::Serialize;

/// Default window length in words.
pub const DEFAULT_CHUNK_SIZE: usize = 500;

/// Default number of words shared by consecutive windows.
pub const DEFAULT_CHUNK_OVERLAP: usize = 50;

/// Rejected window parameters.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChunkingError {
    #[error("chunk_size must be greater than zero")]
    ZeroChunkSize,

    #[error("chunk_overlap ({overlap}) must be smaller than chunk_size ({chunk_size})")]
    OverlapTooLarge { chunk_size: usize, overlap: usize },
}

/// Validated window parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WindowConfig {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl WindowConfig {
    /// Validate and create a window configuration.
    ///
    /// `chunk_overlap` has to be strictly smaller than `chunk_size`, otherwise the
    /// window would never advance.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, ChunkingError> {
        if chunk_size == 0 {
            return Err(ChunkingError::ZeroChunkSize);
        }
        if chunk_overlap >= chunk_size {
            return Err(ChunkingError::OverlapTooLarge {
                chunk_size,
                overlap: chunk_overlap,
            });
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Number of words the window advances between chunks.
    pub fn stride(&self) -> usize {
        self.chunk_size - self.chunk_overlap
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

/// A contiguous window of words taken from one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextChunk {
    /// Identifier of the document this chunk came from.
    pub source: String,
    /// Position of this chunk within its document (0-indexed).
    pub sequence: usize,
    /// Index of the first word of the chunk in the document's word sequence.
    pub word_offset: usize,
    /// Number of words in the chunk.
    pub word_count: usize,
    /// The chunk's words joined by single spaces.
    pub chunk_text: String,
    /// Leading words of this chunk that the next chunk does not repeat.
    #[serde(skip)]
    unique_words: usize,
}

impl TextChunk {
    /// The leading words of this chunk that are not repeated by the following
    /// chunk. For the last chunk of a document this is the whole chunk.
    pub fn unique_span(&self) -> &str {
        if self.unique_words >= self.word_count {
            return &self.chunk_text;
        }
        // Words are joined by single spaces, so the span ends right before the
        // `unique_words`-th separator.
        let end = self
            .chunk_text
            .match_indices(' ')
            .nth(self.unique_words - 1)
            .map(|(idx, _)| idx)
            .unwrap_or(self.chunk_text.len());
        &self.chunk_text[..end]
    }
}

/// Splits text into overlapping word windows.
#[derive(Debug, Clone, Default)]
pub struct WordChunker {
    config: WindowConfig,
}

impl WordChunker {
    pub fn new(config: WindowConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> WindowConfig {
        self.config
    }

    /// Lazily chunk `text`, tagging every chunk with `source`.
    pub fn chunks<'a>(&self, source: impl Into<String>, text: &'a str) -> WordChunks<'a> {
        WordChunks {
            source: source.into(),
            words: text.split_whitespace().collect(),
            config: self.config,
            start: 0,
            sequence: 0,
        }
    }
}

/// Iterator returned by [`WordChunker::chunks`].
#[derive(Debug, Clone)]
pub struct WordChunks<'a> {
    source: String,
    words: Vec<&'a str>,
    config: WindowConfig,
    start: usize,
    sequence: usize,
}

impl Iterator for WordChunks<'_> {
    type Item = TextChunk;

    fn next(&mut self) -> Option<Self::Item> {
        if self.start >= self.words.len() {
            return None;
        }

        let remaining = self.words.len() - self.start;
        let end = self.start + remaining.min(self.config.chunk_size());
        let window = &self.words[self.start..end];

        let chunk = TextChunk {
            source: self.source.clone(),
            sequence: self.sequence,
            word_offset: self.start,
            word_count: window.len(),
            chunk_text: window.join(" "),
            unique_words: remaining.min(self.config.stride()),
        };

        self.start += self.config.stride();
        self.sequence += 1;
        Some(chunk)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.words.len().saturating_sub(self.start);
        let n = remaining.div_ceil(self.config.stride());
        (n, Some(n))
    }
}

impl ExactSizeIterator for WordChunks<'_> {}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered_words(n: usize) -> String {
        (0..n).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn test_window_config_validation() {
        assert_eq!(WindowConfig::new(0, 0), Err(ChunkingError::ZeroChunkSize));
        assert_eq!(
            WindowConfig::new(10, 10),
            Err(ChunkingError::OverlapTooLarge {
                chunk_size: 10,
                overlap: 10
            })
        );
        assert!(WindowConfig::new(10, 12).is_err());

        let config = WindowConfig::new(10, 3).unwrap();
        assert_eq!(config.stride(), 7);
        assert_eq!(WindowConfig::default().chunk_size(), 500);
        assert_eq!(WindowConfig::default().chunk_overlap(), 50);
    }

    #[test]
    fn test_empty_text_has_no_chunks() {
        let chunker = WordChunker::default();
        assert_eq!(chunker.chunks("empty.txt", "").count(), 0);
        assert_eq!(chunker.chunks("blank.txt", "  \n\t  ").count(), 0);
    }

    #[test]
    fn test_short_document_is_single_chunk() {
        let text = numbered_words(50);
        let chunker = WordChunker::new(WindowConfig::new(500, 50).unwrap());
        let chunks: Vec<_> = chunker.chunks("short.pdf", &text).collect();

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].word_count, 50);
        assert_eq!(chunks[0].chunk_text, text);
        assert_eq!(chunks[0].unique_span(), text);
    }

    #[test]
    fn test_windows_overlap_and_advance() {
        let text = numbered_words(25);
        let chunker = WordChunker::new(WindowConfig::new(10, 3).unwrap());
        let chunks: Vec<_> = chunker.chunks("doc", &text).collect();

        let offsets: Vec<_> = chunks.iter().map(|c| c.word_offset).collect();
        assert_eq!(offsets, vec![0, 7, 14, 21]);
        let sequences: Vec<_> = chunks.iter().map(|c| c.sequence).collect();
        assert_eq!(sequences, vec![0, 1, 2, 3]);

        assert!(chunks.iter().all(|c| c.word_count <= 10));
        assert_eq!(chunks.last().unwrap().word_count, 4);

        // Consecutive chunks share exactly `overlap` words.
        for pair in chunks.windows(2) {
            let tail: Vec<_> = pair[0].chunk_text.split(' ').rev().take(3).collect();
            let head: Vec<_> = pair[1].chunk_text.split(' ').take(3).collect();
            let tail: Vec<_> = tail.into_iter().rev().collect();
            assert_eq!(tail, head);
        }
    }

    #[test]
    fn test_trailing_window_inside_previous_chunk_is_still_emitted() {
        // 10 words, stride 8: second window starts at 8 and holds 2 words that
        // the first chunk already contains.
        let text = numbered_words(10);
        let chunker = WordChunker::new(WindowConfig::new(10, 2).unwrap());
        let chunks: Vec<_> = chunker.chunks("doc", &text).collect();

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].chunk_text, "w8 w9");
        assert_eq!(chunks[0].unique_span(), "w0 w1 w2 w3 w4 w5 w6 w7");
        assert_eq!(chunks[1].unique_span(), "w8 w9");
    }

    #[test]
    fn test_unique_spans_reconstruct_words() {
        let text = "Compound interest\n is interest   on interest, earned when\tpreviously \
                    accrued interest is added back to the principal balance every period.";
        let expected: Vec<_> = text.split_whitespace().collect();

        for (size, overlap) in [(1, 0), (3, 1), (4, 3), (7, 2), (50, 10)] {
            let chunker = WordChunker::new(WindowConfig::new(size, overlap).unwrap());
            let rebuilt: Vec<String> = chunker
                .chunks("doc", text)
                .map(|c| c.unique_span().to_string())
                .collect();
            let rebuilt = rebuilt.join(" ");
            let rebuilt: Vec<_> = rebuilt.split_whitespace().collect();
            assert_eq!(rebuilt, expected, "size={size} overlap={overlap}");
        }
    }

    #[test]
    fn test_chunking_is_deterministic() {
        let text = numbered_words(1234);
        let chunker = WordChunker::default();
        let first: Vec<_> = chunker.chunks("doc", &text).collect();
        let second: Vec<_> = chunker.chunks("doc", &text).collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), chunker.chunks("doc", &text).len());
    }
}
