//! Assistant service - the glue between store, index and router
//!
//! Owns the document store, the embedding index and the query router, and
//! exposes the three operations the outside world needs: refresh the index
//! from the store, answer a question, and show which code a question would
//! retrieve.

use crate::corpus::{DocumentStore, Language, StoreError};
use crate::index::{EmbeddingIndex, IndexError, QueryOutcome, ScoredChunk};
use crate::llm::TextModel;
use crate::router::{QueryRouter, RoutedReply, RouterError, RETRIEVAL_TOP_K};
use crate::segmenter;
use std::sync::Arc;
use thiserror::Error;

/// Service errors
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Router error: {0}")]
    Router(#[from] RouterError),

    #[error("No code documents loaded. Please upload code first.")]
    NoIndex,
}

/// What a refresh accomplished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// A new generation is installed and serving queries.
    Rebuilt { generation: u64, chunk_count: usize },
    /// The store held no matching documents; the index is now empty.
    EmptyCorpus,
}

/// The rubber-duck assistant.
pub struct Assistant {
    store: Arc<dyn DocumentStore>,
    index: Arc<EmbeddingIndex>,
    router: QueryRouter,
    languages: Vec<Language>,
}

impl Assistant {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        index: Arc<EmbeddingIndex>,
        model: Arc<dyn TextModel>,
    ) -> Self {
        let router = QueryRouter::new(model, Arc::clone(&index));
        Self {
            store,
            index,
            router,
            languages: vec![Language::Java, Language::Python],
        }
    }

    /// Rebuild the index from the store's current contents.
    ///
    /// An empty corpus clears any previous generation rather than leaving
    /// stale chunks serving queries.
    pub async fn refresh(&self) -> Result<RefreshOutcome, ServiceError> {
        let documents = self.store.load(&self.languages).await?;
        let chunks: Vec<_> = documents.iter().flat_map(segmenter::chunk_document).collect();

        if chunks.is_empty() {
            tracing::warn!("no documents found, index not initialized");
            self.index.clear().await;
            return Ok(RefreshOutcome::EmptyCorpus);
        }

        tracing::info!(
            documents = documents.len(),
            chunks = chunks.len(),
            "refreshing index"
        );
        let report = self.index.build(chunks).await?;
        Ok(RefreshOutcome::Rebuilt {
            generation: report.generation,
            chunk_count: report.chunk_count,
        })
    }

    /// Answer one user turn.
    pub async fn answer(&self, question: &str) -> Result<RoutedReply, ServiceError> {
        Ok(self.router.respond(question).await?)
    }

    /// The chunks a question would retrieve, without generating any reply.
    ///
    /// Errors with [`ServiceError::NoIndex`] when nothing has been indexed,
    /// so callers can distinguish "no index" from "nothing similar".
    pub async fn retrieved_context(
        &self,
        question: &str,
    ) -> Result<Vec<ScoredChunk>, ServiceError> {
        match self.index.query(question, RETRIEVAL_TOP_K).await? {
            QueryOutcome::NoData => Err(ServiceError::NoIndex),
            QueryOutcome::Ranked(chunks) => Ok(chunks),
        }
    }

    pub fn index(&self) -> &Arc<EmbeddingIndex> {
        &self.index
    }
}
