//! Source document corpus
//!
//! Holds the raw source files the assistant retrieves against. The storage
//! technology itself is an external collaborator; this module only defines the
//! shape the core requires ([`DocumentStore`]) plus an in-memory implementation
//! used by the CLI and the tests.

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;
use walkdir::WalkDir;

/// Programming language of a source document.
///
/// Only the variants the segmenter understands get function-level chunking;
/// everything else degrades to whole-file chunks.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Java,
    Python,
    Other(String),
}

impl Language {
    /// Map a file extension to a language tag.
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "java" => Self::Java,
            "py" => Self::Python,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Java => "java",
            Self::Python => "python",
            Self::Other(tag) => tag.as_str(),
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A raw source file as supplied by the document store.
///
/// Immutable once ingested; a refresh replaces documents wholesale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDocument {
    pub id: Uuid,
    pub content: String,
    pub language: Language,
    pub file_name: String,
    pub file_path: String,
    /// Name of the top-level class, when the file declares one.
    pub class_name: Option<String>,
}

impl SourceDocument {
    pub fn new(content: String, language: Language, file_path: String) -> Self {
        let file_name = Path::new(&file_path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| file_path.clone());
        let class_name = extract_class_name(&content);

        Self {
            id: Uuid::new_v4(),
            content,
            language,
            file_name,
            file_path,
            class_name,
        }
    }
}

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Document store unavailable: {0}")]
    Unavailable(String),
}

/// The shape of the upstream document store collaborator.
///
/// The core requires only this: an iterable of raw documents filtered by
/// language, plus upserts keyed by file path.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Load every document whose language is in `languages`.
    async fn load(&self, languages: &[Language]) -> Result<Vec<SourceDocument>, StoreError>;

    /// Insert or replace the document with the same file path.
    async fn upsert(&self, document: SourceDocument) -> Result<(), StoreError>;
}

/// In-memory document store keyed by file path.
#[derive(Default)]
pub struct MemoryStore {
    documents: RwLock<HashMap<String, SourceDocument>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn load(&self, languages: &[Language]) -> Result<Vec<SourceDocument>, StoreError> {
        let documents = self.documents.read().await;
        let mut selected: Vec<SourceDocument> = documents
            .values()
            .filter(|doc| languages.contains(&doc.language))
            .cloned()
            .collect();
        // Stable order so index generations are reproducible across refreshes
        selected.sort_by(|a, b| a.file_path.cmp(&b.file_path));
        Ok(selected)
    }

    async fn upsert(&self, document: SourceDocument) -> Result<(), StoreError> {
        self.documents
            .write()
            .await
            .insert(document.file_path.clone(), document);
        Ok(())
    }
}

/// Walk a project directory and upsert every Java/Python source file.
///
/// Returns the number of files ingested. Unreadable files are skipped with a
/// warning rather than aborting the walk.
pub async fn ingest_directory(
    store: &dyn DocumentStore,
    root: &Path,
) -> Result<usize, StoreError> {
    let mut ingested = 0usize;

    for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(ext) = entry.path().extension().and_then(|e| e.to_str()) else {
            continue;
        };
        let language = Language::from_extension(ext);
        if matches!(language, Language::Other(_)) {
            continue;
        }

        let content = match std::fs::read_to_string(entry.path()) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!(path = %entry.path().display(), error = %e, "skipping unreadable file");
                continue;
            }
        };

        let relative = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .to_string_lossy()
            .into_owned();

        store
            .upsert(SourceDocument::new(content, language, relative))
            .await?;
        ingested += 1;
    }

    Ok(ingested)
}

/// Pull the first class declaration out of a source file, if any.
///
/// Matches both `class Name:` / `class Name(Base):` (Python) and
/// `class Name {` / `class Name extends Base {` (Java).
fn extract_class_name(content: &str) -> Option<String> {
    static CLASS_RE: OnceLock<Regex> = OnceLock::new();
    let re = CLASS_RE.get_or_init(|| {
        Regex::new(r"(?m)^[ \t]*(?:public\s+|final\s+|abstract\s+)*class\s+(\w+)")
            .expect("class pattern compiles")
    });
    re.captures(content).map(|caps| caps[1].to_string())
}
