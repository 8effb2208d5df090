//! Query router - classify, retrieve, respond
//!
//! Every user turn goes through the same pipeline: the resolution filter
//! decides whether the user already solved their bug, the unsolved path
//! retrieves the closest code chunks and asks one guiding question over
//! them, and the solved path congratulates. Classification is deliberately
//! strict: only the exact output `"0"` counts as unsolved, any other model
//! output lands on the solved path.

use crate::index::{EmbeddingIndex, IndexError, QueryOutcome, ScoredChunk};
use crate::llm::{ModelError, TextModel};
use crate::prompts;
use std::sync::Arc;
use thiserror::Error;

/// Model output that marks the question as still unsolved.
pub const UNSOLVED_TOKEN: &str = "0";

/// How many chunks back the guiding question.
pub const RETRIEVAL_TOP_K: usize = 5;

/// Router errors
#[derive(Debug, Error)]
pub enum RouterError {
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),
}

/// Verdict of the resolution filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionLabel {
    Unsolved,
    Solved,
}

impl ResolutionLabel {
    /// Parse the raw filter output. Exact match only: no trimming, no case
    /// folding. A model that answers " 0" or "0." routes to the solved path.
    pub fn parse(output: &str) -> Self {
        if output == UNSOLVED_TOKEN {
            Self::Unsolved
        } else {
            Self::Solved
        }
    }
}

/// Which branch produced the reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponsePath {
    /// Unsolved: a guiding question grounded in retrieved code.
    Guided,
    /// Solved: a congratulation message.
    Congratulated,
}

/// A complete routed reply.
#[derive(Debug, Clone)]
pub struct RoutedReply {
    pub path: ResponsePath,
    pub answer: String,
    /// Chunks behind the guiding question, empty on the solved path.
    pub retrieved: Vec<ScoredChunk>,
}

/// Routes each question through classification and the matching reply path.
pub struct QueryRouter {
    model: Arc<dyn TextModel>,
    index: Arc<EmbeddingIndex>,
}

impl QueryRouter {
    pub fn new(model: Arc<dyn TextModel>, index: Arc<EmbeddingIndex>) -> Self {
        Self { model, index }
    }

    /// Run the resolution filter over `question`.
    pub async fn classify(&self, question: &str) -> Result<ResolutionLabel, RouterError> {
        let output = self.model.generate(&prompts::resolution_filter(question)).await?;
        let label = ResolutionLabel::parse(&output);
        tracing::debug!(?label, raw = %output, "resolution filter verdict");
        Ok(label)
    }

    /// Classify and answer in one step.
    pub async fn respond(&self, question: &str) -> Result<RoutedReply, RouterError> {
        let label = self.classify(question).await?;
        self.route(question, label).await
    }

    /// Dispatch a question down the path for an already-known label.
    pub async fn route(
        &self,
        question: &str,
        label: ResolutionLabel,
    ) -> Result<RoutedReply, RouterError> {
        match label {
            ResolutionLabel::Unsolved => self.guided_reply(question).await,
            ResolutionLabel::Solved => self.congratulate(question).await,
        }
    }

    /// Unsolved path: retrieve, render context, ask one guiding question.
    async fn guided_reply(&self, question: &str) -> Result<RoutedReply, RouterError> {
        let retrieved = self.retrieve(question).await?;
        let context = prompts::render_context(&retrieved);
        let answer = self
            .model
            .generate(&prompts::guiding_question(&context, question))
            .await?;

        Ok(RoutedReply {
            path: ResponsePath::Guided,
            answer,
            retrieved,
        })
    }

    /// Solved path: congratulate. Never touches the index.
    async fn congratulate(&self, question: &str) -> Result<RoutedReply, RouterError> {
        let answer = self
            .model
            .generate(&prompts::congratulations(question))
            .await?;

        Ok(RoutedReply {
            path: ResponsePath::Congratulated,
            answer,
            retrieved: Vec::new(),
        })
    }

    /// Top chunks for `question`, empty when nothing is indexed.
    pub async fn retrieve(&self, question: &str) -> Result<Vec<ScoredChunk>, RouterError> {
        match self.index.query(question, RETRIEVAL_TOP_K).await? {
            QueryOutcome::NoData => Ok(Vec::new()),
            QueryOutcome::Ranked(chunks) => Ok(chunks),
        }
    }
}
