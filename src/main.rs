//! Rubberduck - rubber-duck debugging assistant CLI
//!
//! Retrieval-augmented debugging chat: index a codebase, then talk through
//! a bug with a model that asks guiding questions over the closest chunks
//! of your own code.

use candle_core::Device;
use clap::Parser;
use rubberduck::config::AppConfig;
use rubberduck::corpus::{ingest_directory, MemoryStore};
use rubberduck::encoder::bert;
use rubberduck::index::EmbeddingIndex;
use rubberduck::llm;
use rubberduck::service::{Assistant, RefreshOutcome};
use rubberduck::training::{ContrastiveTrainer, PairCorpus};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Fine-tune the dual encoder on (description, code) pairs
    Train {
        /// JSONL file of training pairs
        #[arg(long)]
        train_file: PathBuf,
        /// JSONL file of validation pairs
        #[arg(long)]
        validation_file: PathBuf,
        /// Override the configured checkpoint directory
        #[arg(long)]
        checkpoint_dir: Option<PathBuf>,
        /// Override the configured epoch count
        #[arg(long)]
        epochs: Option<usize>,
    },
    /// Index a source directory and report what the index would hold
    Index {
        /// Directory of source files to index
        path: PathBuf,
    },
    /// Index a source directory and answer one question
    Ask {
        /// The question to answer
        question: String,
        /// Directory of source files to index
        #[arg(long)]
        path: Option<PathBuf>,
    },
    /// Index a source directory and show which chunks a query retrieves
    Search {
        /// Query text
        query: String,
        /// Directory of source files to index
        #[arg(long)]
        path: Option<PathBuf>,
        /// Number of chunks to retrieve
        #[arg(long, default_value_t = 5)]
        top_k: usize,
    },
}

#[derive(Parser, Debug)]
#[command(name = "rubberduck")]
#[command(version = "0.1.0")]
#[command(about = "Rubber-duck debugging assistant", long_about = None)]
struct Args {
    /// Configuration file path (overrides defaults)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = AppConfig::load(args.config.as_deref())?;
    rubberduck::logging::init(args.verbose, config.debug);

    match args.command {
        Command::Train {
            train_file,
            validation_file,
            checkpoint_dir,
            epochs,
        } => run_train(config, &train_file, &validation_file, checkpoint_dir, epochs).await,
        Command::Index { path } => {
            let assistant = build_assistant(&config, Some(path)).await?;
            let generation = assistant.index().generation().await.unwrap_or(0);
            println!(
                "indexed {} chunks (generation {})",
                assistant.index().len().await,
                generation
            );
            Ok(())
        }
        Command::Ask { question, path } => {
            let assistant = build_assistant(&config, path).await?;
            let reply = assistant.answer(&question).await?;
            println!("{}", reply.answer);
            Ok(())
        }
        Command::Search {
            query,
            path,
            top_k,
        } => {
            let assistant = build_assistant(&config, path).await?;
            let chunks = match assistant.index().query(&query, top_k).await? {
                rubberduck::index::QueryOutcome::Ranked(chunks) => chunks,
                rubberduck::index::QueryOutcome::NoData => Vec::new(),
            };
            for scored in &chunks {
                let name = scored.chunk.function_name.as_deref().unwrap_or("<file>");
                println!("- {} (score: {:.3})", name, scored.score);
                println!("{}", scored.chunk.content);
                println!();
            }
            Ok(())
        }
    }
}

/// Training is CPU bound end to end, so it runs on a blocking thread.
async fn run_train(
    config: AppConfig,
    train_file: &std::path::Path,
    validation_file: &std::path::Path,
    checkpoint_dir: Option<PathBuf>,
    epochs: Option<usize>,
) -> anyhow::Result<()> {
    let corpus = PairCorpus::from_jsonl(train_file, validation_file)?;
    tracing::info!(
        train = corpus.train.len(),
        validation = corpus.validation.len(),
        "loaded training pairs"
    );

    let mut trainer_config = config.trainer.clone();
    if let Some(epochs) = epochs {
        trainer_config.epochs = epochs;
    }
    let checkpoint_dir = checkpoint_dir.unwrap_or_else(|| config.checkpoint_dir.clone());

    let device = Device::Cpu;
    let (encoder, varmap, num_layers) =
        bert::load_pretrained(&config.encoder.model_dir, config.encoder.max_tokens, &device)?;
    let trainable = bert::trainable_vars(&varmap, config.encoder.unfreeze_layers, num_layers);
    tracing::info!(
        trainable = trainable.len(),
        unfreeze_layers = config.encoder.unfreeze_layers,
        "encoder loaded"
    );

    let summary = tokio::task::spawn_blocking(move || {
        let mut trainer =
            ContrastiveTrainer::new(encoder, varmap, trainable, trainer_config, checkpoint_dir);
        trainer.train(&corpus)
    })
    .await??;

    for report in &summary.epochs {
        println!(
            "epoch {}: train loss {:.4}, validation loss {:.4}",
            report.epoch, report.train_loss, report.validation_loss
        );
    }
    println!(
        "final checkpoint: {}",
        summary.final_checkpoint.weights_path.display()
    );
    Ok(())
}

/// Load the encoder, ingest the source directory and build the index.
async fn build_assistant(config: &AppConfig, path: Option<PathBuf>) -> anyhow::Result<Assistant> {
    let source_root = path
        .or_else(|| config.source_root.clone())
        .ok_or_else(|| anyhow::anyhow!("no source directory: pass --path or set source_root"))?;

    let device = Device::Cpu;
    let (encoder, _varmap, _num_layers) =
        bert::load_pretrained(&config.encoder.model_dir, config.encoder.max_tokens, &device)?;
    let model: Arc<dyn llm::TextModel> = llm::create_model(config.model.clone())?.into();

    let store = Arc::new(MemoryStore::new());
    let ingested = ingest_directory(store.as_ref(), &source_root).await?;
    tracing::info!(ingested, path = ?source_root, "ingested source files");

    let index = Arc::new(EmbeddingIndex::new(Arc::new(encoder)));
    let assistant = Assistant::new(store, index, model);

    match assistant.refresh().await? {
        RefreshOutcome::Rebuilt {
            generation,
            chunk_count,
        } => {
            tracing::info!(generation, chunk_count, "index ready");
        }
        RefreshOutcome::EmptyCorpus => {
            anyhow::bail!("no Java or Python documents found under {:?}", source_root);
        }
    }

    Ok(assistant)
}
