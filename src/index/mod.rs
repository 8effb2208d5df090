//! In-memory embedding index over code chunks
//!
//! Holds unit-norm chunk embeddings alongside their chunks and answers
//! nearest-neighbor queries by brute-force cosine similarity. The index is
//! rebuilt from scratch on every refresh; a build produces a complete new
//! generation and swaps it in atomically, so readers always see either the
//! old snapshot or the new one, never a half-built state.

use crate::encoder::{dot, DualEncoder, EncoderError};
use crate::segmenter::CodeChunk;
use ordered_float::OrderedFloat;
use std::cmp::Reverse;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};

/// Index errors
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("Cannot build an index from zero chunks")]
    NoChunks,

    #[error("Encoder error: {0}")]
    Encoder(#[from] EncoderError),

    #[error("Embedding task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// A chunk plus its similarity to the query, higher is closer.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Arc<CodeChunk>,
    pub score: f32,
}

/// Result of a query against the index.
#[derive(Debug, Clone)]
pub enum QueryOutcome {
    /// No snapshot is installed; distinct from a query matching nothing.
    NoData,
    /// Chunks in descending similarity order.
    Ranked(Vec<ScoredChunk>),
}

/// What a completed build produced.
#[derive(Debug, Clone, Copy)]
pub struct BuildReport {
    pub generation: u64,
    pub chunk_count: usize,
}

/// One immutable snapshot of the index.
struct IndexGeneration {
    generation: u64,
    chunks: Vec<Arc<CodeChunk>>,
    embeddings: Vec<Vec<f32>>,
}

/// Brute-force cosine index with atomic generation swap.
pub struct EmbeddingIndex {
    encoder: Arc<DualEncoder>,
    current: RwLock<Option<Arc<IndexGeneration>>>,
    // Serializes builds; queries never take this
    build_lock: Mutex<()>,
    next_generation: AtomicU64,
}

impl EmbeddingIndex {
    pub fn new(encoder: Arc<DualEncoder>) -> Self {
        Self {
            encoder,
            current: RwLock::new(None),
            build_lock: Mutex::new(()),
            next_generation: AtomicU64::new(1),
        }
    }

    /// Embed `chunks` and install the result as the new current generation.
    ///
    /// The swap happens only after every chunk embedded successfully; on any
    /// error the previous generation stays installed untouched.
    pub async fn build(&self, chunks: Vec<CodeChunk>) -> Result<BuildReport, IndexError> {
        if chunks.is_empty() {
            return Err(IndexError::NoChunks);
        }

        let _guard = self.build_lock.lock().await;
        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        let encoder = Arc::clone(&self.encoder);

        let snapshot = tokio::task::spawn_blocking(move || {
            let texts: Vec<&str> = chunks.iter().map(|c| c.content.as_str()).collect();
            let embeddings = encoder.embed(&texts)?;
            Ok::<_, EncoderError>(IndexGeneration {
                generation,
                chunks: chunks.into_iter().map(Arc::new).collect(),
                embeddings,
            })
        })
        .await??;

        let chunk_count = snapshot.chunks.len();
        tracing::info!(generation, chunk_count, "index generation installed");
        *self.current.write().await = Some(Arc::new(snapshot));

        Ok(BuildReport {
            generation,
            chunk_count,
        })
    }

    /// Drop the current generation, returning the index to its empty state.
    pub async fn clear(&self) {
        let _guard = self.build_lock.lock().await;
        if self.current.write().await.take().is_some() {
            tracing::info!("index cleared");
        }
    }

    /// Rank all indexed chunks against `text` and return the top `k`.
    ///
    /// Equal scores keep their insertion order. `k` of zero yields an empty
    /// ranking; `k` beyond the chunk count yields everything.
    pub async fn query(&self, text: &str, k: usize) -> Result<QueryOutcome, IndexError> {
        let snapshot = match self.current.read().await.as_ref() {
            Some(current) => Arc::clone(current),
            None => return Ok(QueryOutcome::NoData),
        };
        if k == 0 {
            return Ok(QueryOutcome::Ranked(Vec::new()));
        }

        let encoder = Arc::clone(&self.encoder);
        let query_text = text.to_string();
        let query =
            tokio::task::spawn_blocking(move || encoder.embed_one(&query_text)).await??;

        let mut scored: Vec<ScoredChunk> = snapshot
            .embeddings
            .iter()
            .zip(snapshot.chunks.iter())
            .map(|(embedding, chunk)| ScoredChunk {
                chunk: Arc::clone(chunk),
                score: dot(&query, embedding),
            })
            .collect();
        scored.sort_by_key(|s| Reverse(OrderedFloat(s.score)));
        scored.truncate(k);

        Ok(QueryOutcome::Ranked(scored))
    }

    /// Generation number of the current snapshot, if one is installed.
    pub async fn generation(&self) -> Option<u64> {
        self.current.read().await.as_ref().map(|s| s.generation)
    }

    /// Number of chunks in the current snapshot.
    pub async fn len(&self) -> usize {
        self.current
            .read()
            .await
            .as_ref()
            .map_or(0, |s| s.chunks.len())
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::Language;
    use crate::encoder::stub::{HashTokenizer, StubTokenEncoder};
    use crate::encoder::{ProjectionHead, MAX_TOKENS};
    use candle_core::{DType, Device};
    use candle_nn::{VarBuilder, VarMap};
    use uuid::Uuid;

    fn stub_index() -> EmbeddingIndex {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let token_encoder = StubTokenEncoder::new(64, 16, &device).unwrap();
        let head = ProjectionHead::new(16, 0.0, vb.pp("head")).unwrap();
        let encoder = DualEncoder::new(
            Arc::new(HashTokenizer::new(64)),
            Arc::new(token_encoder),
            head,
            device,
            MAX_TOKENS,
        );
        EmbeddingIndex::new(Arc::new(encoder))
    }

    fn chunk(content: &str) -> CodeChunk {
        CodeChunk {
            source_document_id: Uuid::new_v4(),
            function_name: None,
            content: content.to_string(),
            language: Language::Python,
        }
    }

    #[tokio::test]
    async fn test_query_before_build_reports_no_data() {
        let index = stub_index();
        let outcome = index.query("anything", 5).await.unwrap();
        assert!(matches!(outcome, QueryOutcome::NoData));
        assert_eq!(index.generation().await, None);
    }

    #[tokio::test]
    async fn test_build_rejects_empty_input() {
        let index = stub_index();
        let err = index.build(Vec::new()).await.unwrap_err();
        assert!(matches!(err, IndexError::NoChunks));
    }

    #[tokio::test]
    async fn test_exact_text_ranks_first() {
        let index = stub_index();
        index
            .build(vec![
                chunk("def parse_header(data): return data[0]"),
                chunk("def close_socket(sock): sock.close()"),
                chunk("def format_output(rows): return join(rows)"),
            ])
            .await
            .unwrap();

        let outcome = index
            .query("def close_socket(sock): sock.close()", 3)
            .await
            .unwrap();
        let ranked = match outcome {
            QueryOutcome::Ranked(r) => r,
            QueryOutcome::NoData => panic!("index was built"),
        };
        assert_eq!(ranked.len(), 3);
        assert!(ranked[0].chunk.content.contains("close_socket"));
        // Descending order throughout
        for pair in ranked.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[tokio::test]
    async fn test_k_edge_cases() {
        let index = stub_index();
        index
            .build(vec![chunk("def a(): pass"), chunk("def b(): pass")])
            .await
            .unwrap();

        let zero = index.query("a", 0).await.unwrap();
        assert!(matches!(zero, QueryOutcome::Ranked(ref r) if r.is_empty()));

        let oversized = index.query("a", 50).await.unwrap();
        assert!(matches!(oversized, QueryOutcome::Ranked(ref r) if r.len() == 2));
    }

    #[tokio::test]
    async fn test_rebuild_replaces_generation_and_clear_empties() {
        let index = stub_index();
        let first = index.build(vec![chunk("def a(): pass")]).await.unwrap();
        let second = index
            .build(vec![chunk("def b(): pass"), chunk("def c(): pass")])
            .await
            .unwrap();

        assert!(second.generation > first.generation);
        assert_eq!(index.len().await, 2);

        index.clear().await;
        assert!(index.is_empty().await);
        assert!(matches!(
            index.query("a", 5).await.unwrap(),
            QueryOutcome::NoData
        ));
    }

    #[tokio::test]
    async fn test_tied_scores_keep_insertion_order() {
        let index = stub_index();
        // Identical content embeds identically, so scores tie exactly
        let mut same = chunk("def dup(): pass");
        same.function_name = Some("first".to_string());
        let mut other = chunk("def dup(): pass");
        other.function_name = Some("second".to_string());

        index.build(vec![same, other]).await.unwrap();
        let outcome = index.query("def dup(): pass", 2).await.unwrap();
        let ranked = match outcome {
            QueryOutcome::Ranked(r) => r,
            QueryOutcome::NoData => panic!("index was built"),
        };
        assert_eq!(ranked[0].chunk.function_name.as_deref(), Some("first"));
        assert_eq!(ranked[1].chunk.function_name.as_deref(), Some("second"));
    }
}
