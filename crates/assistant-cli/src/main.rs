//! Assistant CLI - Command-line interface
//!
//! Usage:
//!   assistant create-db [DOCS_DIR]
//!   assistant query <question>
//!   assistant inspect <question> --output rows.json

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use assistant_core::{config::parse_model_name, AppConfig, LlmClient, SearchType};
use assistant_parser::{Chunker, DirectoryLoader};
use assistant_rag::{
    create_llm_client, write_json, CachedEmbedding, EmbeddingCache, IndexOptions, Indexer,
    InspectionExporter, OnMatch, RagPipeline,
};
use assistant_vector::{create_embedding_client, EmbeddingClient, LocalVectorStore, VectorStore};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "assistant")]
#[command(about = "Question answering over a local document collection")]
#[command(version)]
struct Cli {
    /// TOML configuration file (environment variables still override it)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index documents into the vector store
    CreateDb {
        /// Directory with documents to index
        #[arg(default_value = "./data/docs")]
        docs_dir: PathBuf,

        /// Embeddings model, optionally prefixed with its provider
        /// (e.g. `openai:text-embedding-3-small`)
        #[arg(long)]
        embeddings: Option<String>,

        /// Do not fail if the collection already exists
        #[arg(long)]
        exist_ok: bool,

        /// Action for documents that are indexed already: fail, ignore or replace
        #[arg(long, default_value_t = OnMatch::Fail)]
        on_match: OnMatch,

        #[arg(long)]
        chunk_size: Option<usize>,

        #[arg(long)]
        chunk_overlap: Option<usize>,
    },
    /// Answer a question from the indexed documents
    Query {
        question: String,

        /// Number of chunks to retrieve
        #[arg(short)]
        k: Option<usize>,

        /// similarity, similarity_score_threshold (or threshold), mmr
        #[arg(long)]
        search_type: Option<SearchType>,

        /// Minimum relevance score in [0, 1] for threshold search
        #[arg(long)]
        score_threshold: Option<f32>,

        /// Print the full response as JSON
        #[arg(long)]
        json: bool,
    },
    /// Answer a question and export every embedding for visualisation
    Inspect {
        question: String,

        #[arg(short)]
        k: Option<usize>,

        /// Where to write the inspection rows
        #[arg(long, default_value = "inspection.json")]
        output: PathBuf,
    },
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<AppConfig> {
    let config = match path {
        Some(path) => AppConfig::from_file(path)?.with_env_override()?,
        None => AppConfig::from_env()?,
    };
    Ok(config)
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if config.logging.json_format {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn open_store(config: &AppConfig) -> anyhow::Result<Arc<dyn VectorStore>> {
    let store = LocalVectorStore::open(
        &config.storage.db_directory,
        config.storage.collection.clone(),
        config.storage.distance,
    )
    .await?;
    Ok(Arc::new(store))
}

type Embedder = CachedEmbedding<Box<dyn EmbeddingClient>>;

fn build_embedder(config: &AppConfig) -> anyhow::Result<Arc<Embedder>> {
    let client = create_embedding_client(&config.llm)?;
    Ok(Arc::new(CachedEmbedding::new(client)))
}

fn log_cache_stats(cache: &EmbeddingCache) {
    let stats = cache.stats();
    tracing::debug!(
        hits = stats.hits(),
        misses = stats.misses(),
        writes = stats.writes(),
        hit_rate = stats.hit_rate(),
        entries = cache.entry_count(),
        "Embedding cache"
    );
}

fn build_pipeline(
    config: &AppConfig,
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingClient>,
) -> anyhow::Result<RagPipeline> {
    let llm: Arc<dyn LlmClient> = Arc::from(create_llm_client(&config.llm)?);
    Ok(RagPipeline::from_config(config, store, embedder, llm)?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_ref())?;
    init_tracing(&config);
    tracing::debug!(
        db_directory = %config.storage.db_directory.display(),
        collection = %config.storage.collection,
        provider = %config.llm.provider(),
        "Configuration loaded"
    );

    match cli.command {
        Commands::CreateDb {
            docs_dir,
            embeddings,
            exist_ok,
            on_match,
            chunk_size,
            chunk_overlap,
        } => {
            if let Some(name) = embeddings {
                let (model, provider) = parse_model_name(&name)?;
                config.llm.embedding_model = Some(model);
                if provider.is_some() {
                    config.llm.provider = provider;
                }
            }
            let chunker = Chunker::new(
                chunk_size.unwrap_or(config.chunking.chunk_size),
                chunk_overlap.unwrap_or(config.chunking.chunk_overlap),
            )?;

            let documents = DirectoryLoader::new(&docs_dir)
                .with_extensions(&config.chunking.extensions)
                .load()
                .with_context(|| format!("loading documents from {}", docs_dir.display()))?;

            let store = open_store(&config).await?;
            let embedder = build_embedder(&config)?;
            let indexer = Indexer::new(store, embedder.clone(), chunker);
            let report = indexer
                .index(documents, IndexOptions { exist_ok, on_match })
                .await?;
            log_cache_stats(embedder.cache());

            println!(
                "Indexed {} chunks from {} documents ({} skipped, {} replaced)",
                report.chunks,
                report.documents - report.skipped,
                report.skipped,
                report.replaced
            );
        }
        Commands::Query {
            question,
            k,
            search_type,
            score_threshold,
            json,
        } => {
            if let Some(search_type) = search_type {
                config.retrieval.search_type = search_type;
            }
            if score_threshold.is_some() {
                config.retrieval.score_threshold = score_threshold;
            }
            let k = k.unwrap_or(config.retrieval.k);

            let store = open_store(&config).await?;
            let embedder = build_embedder(&config)?;
            let pipeline = build_pipeline(&config, store, embedder.clone())?;
            let response = pipeline.ask(&question, k).await?;
            log_cache_stats(embedder.cache());

            if json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                println!("{}", response.answer.text);
                if !response.answer.sources.is_empty() {
                    println!("\nSources:");
                    for source in &response.answer.sources {
                        println!("  - {source}");
                    }
                }
            }
        }
        Commands::Inspect {
            question,
            k,
            output,
        } => {
            let k = k.unwrap_or(config.retrieval.k);
            let store = open_store(&config).await?;
            let embedder = build_embedder(&config)?;

            let pipeline = build_pipeline(&config, store.clone(), embedder.clone())?;
            let response = pipeline.ask(&question, k).await?;

            // The question embedding is served from the cache
            let rows = InspectionExporter::new(store.as_ref(), embedder.as_ref())
                .export(&question, &response.answer)
                .await?;
            write_json(&rows, &output).await?;
            log_cache_stats(embedder.cache());

            println!("{}", response.answer.text);
            println!("\nWrote {} rows to {}", rows.len(), output.display());
        }
    }

    Ok(())
}
