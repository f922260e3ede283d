//! Fingerprint of the corpus directory used to decide whether a snapshot is stale.
//!
//! Only file metadata goes into the signature (name, size, modification time), so
//! checking freshness never reads document contents. An edit that keeps both
//! size and mtime identical goes unnoticed; `rebuild` covers that case.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Metadata for one document in the corpus listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusEntry {
    /// File name inside the corpus directory; also the document identifier
    pub name: String,
    /// Size in bytes
    pub size: u64,
    /// Last modification time (Unix seconds)
    pub modified_at: i64,
}

/// Hex-encoded blake3 digest of the sorted corpus listing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorpusSignature(String);

impl CorpusSignature {
    /// Compute the signature of a listing. Input order does not matter.
    pub fn compute(entries: &[CorpusEntry]) -> Self {
        let mut sorted: Vec<&CorpusEntry> = entries.iter().collect();
        sorted.sort_by(|a, b| a.name.cmp(&b.name));

        let mut hasher = blake3::Hasher::new();
        hasher.update(b"finsight-corpus-v1");
        hasher.update(&(sorted.len() as u64).to_le_bytes());
        for entry in sorted {
            // Length prefix keeps ("ab", "c") and ("a", "bc") apart
            hasher.update(&(entry.name.len() as u64).to_le_bytes());
            hasher.update(entry.name.as_bytes());
            hasher.update(&entry.size.to_le_bytes());
            hasher.update(&entry.modified_at.to_le_bytes());
        }
        Self(hex::encode(hasher.finalize().as_bytes()))
    }

    /// Wrap a signature read back from a snapshot.
    pub fn from_stored(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorpusSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
