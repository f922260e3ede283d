//! Reads the corpus directory into plain-text documents.
//!
//! The directory is scanned non-recursively. Hidden files and files without a
//! configured extension are ignored. PDF text is extracted with `pdf-extract` on
//! the blocking thread pool; plain-text formats are decoded as UTF-8 with
//! invalid sequences replaced.
//!
//! A document that cannot be read is logged and skipped; it never aborts the
//! whole load.

use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::{debug, info, warn};

use super::signature::CorpusEntry;
use crate::config::{RetrieverConfig, has_extension};
use crate::error::{Result, RetrieverError};

/// A document's identifier and extracted text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// File name inside the corpus directory
    pub id: String,
    pub text: String,
}

/// A file found while scanning the corpus directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorpusFile {
    pub path: PathBuf,
    pub entry: CorpusEntry,
}

#[derive(Debug, Clone)]
pub struct DocumentLoader {
    corpus_dir: PathBuf,
    extensions: Vec<String>,
}

impl DocumentLoader {
    pub fn new(config: &RetrieverConfig) -> Self {
        Self {
            corpus_dir: config.corpus_dir.clone(),
            extensions: config.extensions.clone(),
        }
    }

    pub fn corpus_dir(&self) -> &Path {
        &self.corpus_dir
    }

    /// List supported files in the corpus directory, sorted by name.
    ///
    /// Fails with [`RetrieverError::Configuration`] when the directory does not
    /// exist or is not a directory. An empty directory is not an error.
    pub async fn scan(&self) -> Result<Vec<CorpusFile>> {
        let metadata = tokio::fs::metadata(&self.corpus_dir).await.map_err(|e| {
            RetrieverError::configuration(format!(
                "corpus directory {} is not accessible: {e}",
                self.corpus_dir.display()
            ))
        })?;
        if !metadata.is_dir() {
            return Err(RetrieverError::configuration(format!(
                "corpus path {} is not a directory",
                self.corpus_dir.display()
            )));
        }

        let mut files = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.corpus_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let name = match entry.file_name().into_string() {
                Ok(name) => name,
                Err(raw) => {
                    warn!("Skipping {}: file name is not valid UTF-8", raw.to_string_lossy());
                    continue;
                }
            };

            if name.starts_with('.') || !has_extension(&path, &self.extensions) {
                continue;
            }

            let metadata = match tokio::fs::metadata(&path).await {
                Ok(metadata) => metadata,
                Err(e) => {
                    warn!("Skipping {}: cannot read metadata: {}", name, e);
                    continue;
                }
            };
            if !metadata.is_file() {
                continue;
            }

            let modified_at = metadata
                .modified()
                .ok()
                .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
                .map(|duration| duration.as_secs() as i64)
                .unwrap_or(0);

            files.push(CorpusFile {
                path,
                entry: CorpusEntry {
                    name,
                    size: metadata.len(),
                    modified_at,
                },
            });
        }

        files.sort_by(|a, b| a.entry.name.cmp(&b.entry.name));

        if files.is_empty() {
            warn!(
                "No supported documents found in {}",
                self.corpus_dir.display()
            );
        } else {
            debug!(
                "Found {} documents in {}",
                files.len(),
                self.corpus_dir.display()
            );
        }
        Ok(files)
    }

    /// Extract the text of one file.
    pub async fn load(&self, file: &CorpusFile) -> Result<Document> {
        let name = file.entry.name.clone();
        let bytes = tokio::fs::read(&file.path)
            .await
            .map_err(|e| RetrieverError::document_read(&name, e))?;

        let is_pdf = file
            .path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

        let text = if is_pdf {
            extract_pdf_text(&name, bytes).await?
        } else {
            String::from_utf8_lossy(&bytes).into_owned()
        };

        Ok(Document { id: name, text })
    }

    /// Load every file, skipping the ones that fail.
    pub async fn load_all(&self, files: &[CorpusFile]) -> Vec<Document> {
        let mut documents = Vec::with_capacity(files.len());
        for file in files {
            match self.load(file).await {
                Ok(document) => {
                    debug!(
                        "Loaded {} ({} characters)",
                        document.id,
                        document.text.len()
                    );
                    documents.push(document);
                }
                Err(e) => warn!("Skipping document: {}", e),
            }
        }
        info!(
            "Loaded {} of {} documents from {}",
            documents.len(),
            files.len(),
            self.corpus_dir.display()
        );
        documents
    }
}

async fn extract_pdf_text(name: &str, bytes: Vec<u8>) -> Result<String> {
    // pdf-extract can panic on malformed input; the panic surfaces as a JoinError
    let extracted = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
        .await
        .map_err(|e| RetrieverError::document_read(name, e))?;
    extracted.map_err(|e| RetrieverError::document_read(name, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tracing_test::traced_test;

    fn loader_for(dir: &Path) -> DocumentLoader {
        DocumentLoader::new(&RetrieverConfig::new(dir))
    }

    #[tokio::test]
    async fn test_scan_filters_and_sorts() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("savings.txt"), "Save early.").unwrap();
        std::fs::write(dir.path().join("budget.md"), "# Budget").unwrap();
        std::fs::write(dir.path().join("photo.png"), [0u8, 1, 2]).unwrap();
        std::fs::write(dir.path().join(".hidden.txt"), "secret").unwrap();
        std::fs::create_dir(dir.path().join("nested.txt")).unwrap();
        std::fs::create_dir(dir.path().join("archive")).unwrap();
        std::fs::write(dir.path().join("archive").join("old.txt"), "old").unwrap();

        let files = loader_for(dir.path()).scan().await.unwrap();
        let names: Vec<&str> = files.iter().map(|f| f.entry.name.as_str()).collect();
        assert_eq!(names, vec!["budget.md", "savings.txt"]);
        assert_eq!(files[1].entry.size, 11);
    }

    #[tokio::test]
    async fn test_missing_directory_is_configuration_error() {
        let dir = TempDir::new().unwrap();
        let loader = loader_for(&dir.path().join("does-not-exist"));
        assert!(matches!(
            loader.scan().await,
            Err(RetrieverError::Configuration { .. })
        ));

        let file = dir.path().join("file.txt");
        std::fs::write(&file, "not a directory").unwrap();
        assert!(matches!(
            loader_for(&file).scan().await,
            Err(RetrieverError::Configuration { .. })
        ));
    }

    #[tokio::test]
    async fn test_text_is_decoded_lossily() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"interest \xff rate").unwrap();

        let loader = loader_for(dir.path());
        let files = loader.scan().await.unwrap();
        let document = loader.load(&files[0]).await.unwrap();
        assert_eq!(document.id, "notes.txt");
        assert_eq!(document.text, "interest \u{fffd} rate");
    }

    #[tokio::test]
    #[traced_test]
    async fn test_unreadable_pdf_is_skipped() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("broken.pdf"), b"%PDF-1.4 definitely not a pdf").unwrap();
        std::fs::write(dir.path().join("fraud.txt"), "Never share your PIN.").unwrap();

        let loader = loader_for(dir.path());
        let files = loader.scan().await.unwrap();
        assert_eq!(files.len(), 2);

        let documents = loader.load_all(&files).await;
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].id, "fraud.txt");
        assert!(logs_contain("broken.pdf"));
    }

    #[cfg(unix)]
    #[tokio::test]
    #[traced_test]
    async fn test_non_utf8_file_names_are_skipped() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = TempDir::new().unwrap();
        // Both names decode lossily to "rates\u{FFFD}.txt"
        std::fs::write(dir.path().join(OsStr::from_bytes(b"rates\xff.txt")), "Fixed rates.").unwrap();
        std::fs::write(dir.path().join(OsStr::from_bytes(b"rates\xfe.txt")), "Variable rates.")
            .unwrap();
        std::fs::write(dir.path().join("savings.txt"), "Save early.").unwrap();

        let files = loader_for(dir.path()).scan().await.unwrap();
        let names: Vec<&str> = files.iter().map(|f| f.entry.name.as_str()).collect();
        assert_eq!(names, vec!["savings.txt"]);
        assert!(logs_contain("file name is not valid UTF-8"));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_empty_directory_warns() {
        let dir = TempDir::new().unwrap();
        let files = loader_for(dir.path()).scan().await.unwrap();
        assert!(files.is_empty());
        assert!(logs_contain("No supported documents found"));
    }
}
