//! RagForge Ingestion
//!
//! Offline pipeline that builds the corpus the gateway answers from:
//! 1. Downloads the paragraphs dataset
//! 2. Reports dataset statistics
//! 3. Deduplicates and normalises the texts
//! 4. Embeds and writes them into the vector index
//!
//! `ask` queries the finished index from the console.

mod ask;
mod cleaner;
mod dataset;
mod errors;
mod processor;

use anyhow::Context;
use clap::{Parser, Subcommand};
use processor::{IndexingProcessor, IndexingSettings};
use ragforge_common::{
    config::{AppConfig, ObservabilityConfig},
    context::{CompletionClient, OrchestratorSettings},
    embeddings::create_embedder,
    index::create_index,
    RetrievalOrchestrator, VERSION,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ingestion")]
#[command(about = "Fetch, analyze, clean and index the RagForge corpus", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to the layered config/ directory)
    #[arg(long, short = 'c', global = true, value_name = "FILE")]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Download the dataset
    Fetch {
        #[arg(long, value_name = "URL")]
        url: Option<String>,

        #[arg(long, short = 'o', value_name = "PATH")]
        output: Option<PathBuf>,
    },

    /// Print dataset statistics
    Analyze {
        #[arg(long, short = 'i', value_name = "PATH")]
        input: Option<PathBuf>,

        /// Also write a Markdown report
        #[arg(long, value_name = "PATH")]
        report: Option<PathBuf>,
    },

    /// Deduplicate and normalise the dataset
    Clean {
        #[arg(long, short = 'i', value_name = "PATH")]
        input: Option<PathBuf>,

        #[arg(long, short = 'o', value_name = "PATH")]
        output: Option<PathBuf>,

        #[arg(long, value_name = "CHARS")]
        min_length: Option<usize>,
    },

    /// Embed a cleaned dataset into the vector index
    Index {
        #[arg(long, short = 'i', value_name = "PATH")]
        input: Option<PathBuf>,

        /// Drop the collection first if it exists
        #[arg(long)]
        recreate: bool,
    },

    /// Clean then index, using configured paths
    Run {
        #[arg(long)]
        recreate: bool,
    },

    /// Answer questions from the index, printing chunks, prompt and answer.
    /// Reads questions from stdin when none is given.
    Ask {
        question: Option<String>,

        #[arg(long, short = 'k', value_name = "N")]
        top_k: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Load configuration
    let config = match &cli.config {
        Some(path) => AppConfig::from_file(path),
        None => AppConfig::load(),
    }
    .context("failed to load configuration")?;
    init_tracing(&config.observability);
    config.validate()?;

    info!("Starting RagForge Ingestion v{}", VERSION);

    let ingestion = &config.ingestion;
    match cli.command {
        Command::Fetch { url, output } => {
            let url = url.unwrap_or_else(|| ingestion.dataset_url.clone());
            let output = output.unwrap_or_else(|| PathBuf::from(&ingestion.raw_path));
            info!(url = %url, output = %output.display(), "Fetching dataset");
            dataset::fetch_dataset(&url, &output).await?;
        }
        Command::Analyze { input, report } => {
            let input = input.unwrap_or_else(|| PathBuf::from(&ingestion.raw_path));
            analyze(&input, report.as_deref()).await?;
        }
        Command::Clean {
            input,
            output,
            min_length,
        } => {
            let input = input.unwrap_or_else(|| PathBuf::from(&ingestion.raw_path));
            let output = output.unwrap_or_else(|| PathBuf::from(&ingestion.processed_path));
            clean(&input, &output, min_length.unwrap_or(ingestion.min_length)).await?;
        }
        Command::Index { input, recreate } => {
            let input = input.unwrap_or_else(|| PathBuf::from(&ingestion.processed_path));
            index(&config, &input, recreate).await?;
        }
        Command::Run { recreate } => {
            let raw = PathBuf::from(&ingestion.raw_path);
            let processed = PathBuf::from(&ingestion.processed_path);
            clean(&raw, &processed, ingestion.min_length).await?;
            index(&config, &processed, recreate).await?;
        }
        Command::Ask { question, top_k } => {
            ask(&config, question.as_deref(), top_k).await?;
        }
    }

    info!("Done");
    Ok(())
}

fn init_tracing(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    if config.json_logging {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn analyze(input: &Path, report: Option<&Path>) -> anyhow::Result<()> {
    let raw = dataset::load_raw(input).await?;
    let stats = dataset::DatasetStats::analyze(&raw);
    stats.log();

    if let Some(path) = report {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, stats.to_markdown(chrono::Utc::now())).await?;
        info!(report = %path.display(), "Analysis report written");
    }
    Ok(())
}

async fn clean(input: &Path, output: &Path, min_length: usize) -> anyhow::Result<()> {
    let records = dataset::load_records(input).await?;
    info!(input = %input.display(), records = records.len(), "Dataset loaded");

    let (cleaned, report) = cleaner::clean_records(records, min_length);
    dataset::write_json(output, &cleaned).await?;

    info!(
        output = %output.display(),
        initial = report.initial_count,
        remaining = report.final_count,
        removed = report.removed(),
        "Cleaned dataset saved"
    );
    Ok(())
}

async fn index(config: &AppConfig, input: &Path, recreate: bool) -> anyhow::Result<()> {
    let records = dataset::load_records(input).await?;
    info!(input = %input.display(), records = records.len(), "Cleaned dataset loaded");

    let embedder = create_embedder(&config.embedding)?;
    let vector_index = create_index(config).await?;
    info!(
        backend = vector_index.backend_name(),
        model = embedder.model_name(),
        "Indexing started"
    );

    let processor = IndexingProcessor::new(embedder, vector_index, IndexingSettings::from(config));
    processor.prepare_collection(recreate).await?;
    let report = processor.index_records(&records).await?;

    info!(
        indexed = report.indexed,
        batches = report.batches,
        collection = %config.vector_index.collection,
        "Indexing complete"
    );
    Ok(())
}

async fn ask(config: &AppConfig, question: Option<&str>, top_k: Option<usize>) -> anyhow::Result<()> {
    let orchestrator = RetrievalOrchestrator::new(
        create_embedder(&config.embedding)?,
        create_index(config).await?,
        Arc::new(CompletionClient::new(&config.completion)?),
        OrchestratorSettings::from(config),
    );
    info!(
        collection = orchestrator.collection(),
        top_k = top_k.unwrap_or(orchestrator.default_top_k()),
        "Question console ready"
    );

    let mut stdout = tokio::io::stdout();
    match question {
        Some(question) => ask::ask_once(&orchestrator, question, top_k, &mut stdout).await?,
        None => {
            let stdin = tokio::io::BufReader::new(tokio::io::stdin());
            let answered = ask::run_session(&orchestrator, top_k, stdin, &mut stdout).await?;
            info!(answered, "Question console closed");
        }
    }
    Ok(())
}
