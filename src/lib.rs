//! Rubberduck - rubber-duck debugging assistant
//!
//! A retrieval-augmented chat assistant for debugging. Users describe a bug
//! in natural language; the assistant retrieves the closest chunks of their
//! own code with a contrastively fine-tuned dual encoder and asks one
//! guiding question over them, never revealing the fix. Once the user
//! reports the bug solved, it congratulates them instead.
//!
//! # Pipeline
//!
//! - [`corpus`] - Source documents and the store they live in
//! - [`segmenter`] - Function-level chunking of Java and Python sources
//! - [`encoder`] - Dual encoder mapping queries and code into one space
//! - [`training`] - Offline contrastive fine-tuning of the encoder
//! - [`index`] - In-memory embedding index with atomic rebuilds
//! - [`router`] - Per-turn classification and reply generation
//! - [`service`] - The assistant tying store, index and router together
//!
//! # Example
//!
//! ```rust,no_run
//! use rubberduck::config::AppConfig;
//! use rubberduck::corpus::MemoryStore;
//! use rubberduck::encoder::bert;
//! use rubberduck::index::EmbeddingIndex;
//! use rubberduck::llm;
//! use rubberduck::service::Assistant;
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = AppConfig::load(None)?;
//! let (encoder, _varmap, _layers) =
//!     bert::load_pretrained(
//!         &config.encoder.model_dir,
//!         config.encoder.max_tokens,
//!         &candle_core::Device::Cpu,
//!     )?;
//! let model: Arc<dyn llm::TextModel> = llm::create_model(config.model)?.into();
//!
//! let store = Arc::new(MemoryStore::new());
//! let index = Arc::new(EmbeddingIndex::new(Arc::new(encoder)));
//! let assistant = Assistant::new(store, index, model);
//!
//! assistant.refresh().await?;
//! let reply = assistant.answer("my binary search loops forever").await?;
//! println!("{}", reply.answer);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod corpus;
pub mod encoder;
pub mod index;
pub mod llm;
pub mod logging;
pub mod prompts;
pub mod router;
pub mod segmenter;
pub mod service;
pub mod training;

pub use corpus::{DocumentStore, Language, MemoryStore, SourceDocument};
pub use encoder::DualEncoder;
pub use index::{EmbeddingIndex, QueryOutcome, ScoredChunk};
pub use router::{QueryRouter, ResolutionLabel, ResponsePath, RoutedReply};
pub use segmenter::CodeChunk;
pub use service::{Assistant, RefreshOutcome};
pub use training::{ContrastiveTrainer, PairCorpus, TrainerConfig};
