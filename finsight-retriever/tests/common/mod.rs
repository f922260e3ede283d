//! Shared fixtures for the retriever integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use finsight_embed::{EmbedError, EmbeddingProvider, EmbeddingResult, normalize_f16};
use finsight_retriever::RetrieverConfig;
use half::f16;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tempfile::TempDir;

pub const COMPOUND_INTEREST: &str = "Compound interest is interest earned on interest. \
When you save money the bank pays interest on your deposit. With compound interest that \
interest is added to the balance, so the next period earns interest on a larger balance. \
Over many years compound interest makes savings grow much faster than simple interest.";

pub const FRAUD_AWARENESS: &str = "Scammers send phishing emails pretending to be your bank. \
Never share your PIN or password with anyone. Report suspicious messages to your bank and \
check statements for unfamiliar payments.";

pub const BUDGETING: &str = "A budget lists income and spending each month. Track needs and \
wants, cut unnecessary costs, and set aside savings for emergencies before spending on treats.";

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "how", "i", "in", "is", "it",
    "of", "on", "or", "that", "the", "this", "to", "was", "what", "when", "where", "which", "who",
    "why", "with", "you", "your", "does", "do", "can",
];

/// Deterministic bag-of-words embedder.
///
/// Each non-stopword token is hashed into one of `dimension` buckets and the
/// counts are L2-normalized, so texts sharing content words are close and texts
/// sharing none sit at squared distance 2.
pub struct BagOfWordsEmbedder {
    model_name: String,
    dimension: usize,
    chunks_embedded: AtomicUsize,
    queries_embedded: AtomicUsize,
    failing: AtomicBool,
}

impl BagOfWordsEmbedder {
    pub fn new() -> Self {
        Self::with_model_name("bag-of-words")
    }

    pub fn with_model_name(name: &str) -> Self {
        Self {
            model_name: name.to_string(),
            dimension: 1024,
            chunks_embedded: AtomicUsize::new(0),
            queries_embedded: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
        }
    }

    /// Texts embedded through `embed_texts` (index builds)
    pub fn chunks_embedded(&self) -> usize {
        self.chunks_embedded.load(Ordering::SeqCst)
    }

    /// Texts embedded through `embed_text` (queries)
    pub fn queries_embedded(&self) -> usize {
        self.queries_embedded.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn embed(&self, text: &str) -> Vec<f16> {
        let lowered = text.to_lowercase();
        let mut tokens: Vec<&str> = lowered
            .split(|c: char| !c.is_ascii_alphanumeric())
            .filter(|token| !token.is_empty() && !STOPWORDS.contains(token))
            .collect();
        if tokens.is_empty() {
            tokens.push("<empty>");
        }

        let mut counts = vec![0.0f32; self.dimension];
        for token in tokens {
            counts[(fnv1a(token) % self.dimension as u64) as usize] += 1.0;
        }
        let mut vector: Vec<f16> = counts.into_iter().map(f16::from_f32).collect();
        normalize_f16(&mut vector);
        vector
    }

    fn check_available(&self) -> finsight_embed::Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(EmbedError::embedding_gen("embedding backend unavailable"));
        }
        Ok(())
    }
}

fn fnv1a(token: &str) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in token.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

#[async_trait]
impl EmbeddingProvider for BagOfWordsEmbedder {
    async fn embed_text(&self, text: &str) -> finsight_embed::Result<Vec<f16>> {
        self.check_available()?;
        self.queries_embedded.fetch_add(1, Ordering::SeqCst);
        Ok(self.embed(text))
    }

    async fn embed_texts(&self, texts: &[String]) -> finsight_embed::Result<EmbeddingResult> {
        self.check_available()?;
        self.chunks_embedded.fetch_add(texts.len(), Ordering::SeqCst);
        Ok(EmbeddingResult::new(
            texts.iter().map(|text| self.embed(text)).collect(),
        ))
    }

    fn embedding_dimension(&self) -> usize {
        self.dimension
    }

    fn provider_name(&self) -> &str {
        "test"
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

/// A temporary workspace holding `corpus/` and the snapshot next to it.
pub struct Library {
    pub root: TempDir,
}

impl Library {
    pub fn new() -> Self {
        let root = TempDir::new().unwrap();
        std::fs::create_dir(root.path().join("corpus")).unwrap();
        Self { root }
    }

    /// Library with the three standard finance documents.
    pub fn with_standard_documents() -> Self {
        let library = Self::new();
        library.add("compound_interest.txt", COMPOUND_INTEREST);
        library.add("fraud_awareness.txt", FRAUD_AWARENESS);
        library.add("budgeting.md", BUDGETING);
        library
    }

    pub fn corpus_dir(&self) -> PathBuf {
        self.root.path().join("corpus")
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.root.path().join("knowledge_index.db")
    }

    pub fn add(&self, name: &str, contents: &str) {
        std::fs::write(self.corpus_dir().join(name), contents).unwrap();
    }

    pub fn remove(&self, name: &str) {
        std::fs::remove_file(self.corpus_dir().join(name)).unwrap();
    }

    pub fn config(&self) -> RetrieverConfig {
        RetrieverConfig::new(self.corpus_dir())
    }
}

/// Files in `dir` whose names end in `.tmp`.
pub fn temp_files(dir: &Path) -> Vec<String> {
    std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| name.ends_with(".tmp"))
        .collect()
}
