use askdoc_core::{
    CharacterNgramEmbedder, Embedder, IngestError, IngestionReport, LocalObjectStore,
    OllamaEmbedder, OllamaGenerator, RagCoordinator, RagOptions, SearchError,
    DEFAULT_EMBEDDING_DIMENSIONS,
};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "askdoc", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Directory used as the index artifact bucket
    #[arg(long, env = "ASKDOC_STORE_DIR", default_value = "./askdoc-store")]
    store_dir: PathBuf,

    /// Folder of the artifacts inside the bucket; `idx` is read as `idx/`
    #[arg(long, env = "ASKDOC_KEY_PREFIX", default_value = "")]
    key_prefix: String,

    /// Embedding backend; must be the same for ingest and query
    #[arg(long, value_enum, env = "ASKDOC_EMBEDDER", default_value = "ngram")]
    embedder: EmbedderKind,

    /// Ollama base URL for embeddings and generation
    #[arg(long, env = "OLLAMA_URL", default_value = "http://localhost:11434")]
    ollama_url: String,

    /// Embedding model served by Ollama
    #[arg(long, env = "ASKDOC_EMBEDDING_MODEL", default_value = "nomic-embed-text")]
    embedding_model: String,

    /// Dimension of the embedding model
    #[arg(
        long,
        env = "ASKDOC_EMBEDDING_DIMENSIONS",
        default_value_t = DEFAULT_EMBEDDING_DIMENSIONS
    )]
    embedding_dimensions: usize,

    /// Generative model served by Ollama
    #[arg(long, env = "ASKDOC_GENERATION_MODEL", default_value = "llama3.1")]
    generation_model: String,

    /// Maximum tokens generated per answer
    #[arg(long, default_value_t = 512)]
    max_tokens: u32,

    /// Chunk size in characters
    #[arg(long, default_value_t = 1000)]
    chunk_size: usize,

    /// Overlap between consecutive chunks in characters
    #[arg(long, default_value_t = 200)]
    chunk_overlap: usize,

    /// Number of chunks retrieved per question
    #[arg(long, default_value_t = 5)]
    top_k: usize,
}

#[derive(Clone, Copy, ValueEnum)]
enum EmbedderKind {
    /// Offline hashed character trigrams
    Ngram,
    /// Ollama /api/embed
    Ollama,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest documents into one new index artifact.
    Ingest {
        /// Folder searched recursively for pdf, txt and md files.
        #[arg(long, conflicts_with = "files")]
        folder: Option<PathBuf>,
        /// Individual files to ingest.
        files: Vec<PathBuf>,
    },
    /// Retrieve the most relevant chunks without generating an answer.
    Search {
        /// Search query
        #[arg(long)]
        query: String,
    },
    /// Answer a question grounded in the retrieved chunks.
    Ask {
        /// Question to answer
        #[arg(long)]
        question: String,
        /// Print the retrieved chunks after the answer.
        #[arg(long, default_value_t = false)]
        show_sources: bool,
    },
}

fn build_embedder(cli: &Cli) -> Arc<dyn Embedder> {
    match cli.embedder {
        EmbedderKind::Ngram => Arc::new(CharacterNgramEmbedder {
            dimensions: cli.embedding_dimensions,
        }),
        EmbedderKind::Ollama => Arc::new(OllamaEmbedder::new(
            &cli.ollama_url,
            &cli.embedding_model,
            cli.embedding_dimensions,
        )),
    }
}

fn print_ingestion(report: &IngestionReport) {
    for skipped in &report.skipped {
        warn!(document = %skipped.name, reason = %skipped.reason, "skipped document");
    }
    for document in &report.documents {
        println!(
            "document {} request_id={} pages={}",
            document.title, document.document_id, document.page_count
        );
    }
    for (position, chunk) in report.preview.iter().enumerate() {
        println!("chunk[{position}] page={}:\n{}", chunk.page_number, chunk.text);
    }
    println!(
        "{} chunks from {} documents stored as artifact {} at {}",
        report.artifact.chunk_count,
        report.documents.len(),
        report.artifact.handle.identifier(),
        Utc::now().to_rfc3339()
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();

    let options = RagOptions {
        chunk_size: cli.chunk_size,
        chunk_overlap: cli.chunk_overlap,
        top_k: cli.top_k,
        key_prefix: cli.key_prefix.clone(),
    };
    let coordinator = RagCoordinator::new(
        LocalObjectStore::new(&cli.store_dir),
        build_embedder(&cli),
        OllamaGenerator::new(&cli.ollama_url, &cli.generation_model, cli.max_tokens),
        options,
    )?;

    info!(
        version = app_version,
        store = %cli.store_dir.display(),
        started_at = %Utc::now().to_rfc3339(),
        "askdoc boot"
    );

    match cli.command {
        Command::Ingest { folder, files } => {
            let result = match folder {
                Some(folder) => coordinator.ingest_folder(&folder).await,
                None if files.is_empty() => {
                    anyhow::bail!("pass --folder or at least one file to ingest")
                }
                None => coordinator.ingest_paths(&files).await,
            };

            match result {
                Ok(report) => print_ingestion(&report),
                Err(IngestError::EmptyBatch) => {
                    println!("no extractable text found; no artifact written");
                }
                Err(error) => return Err(error.into()),
            }
        }
        Command::Search { query } => {
            let session = match coordinator.open_session().await {
                Ok(session) => session,
                Err(SearchError::NoIndexFound) => {
                    println!("nothing to search yet: ingest documents first");
                    return Ok(());
                }
                Err(error) => return Err(error.into()),
            };
            for corrupt in session.index().corrupt_artifacts() {
                warn!(key = %corrupt.key, details = %corrupt.details, "excluded artifact");
            }

            let result = session.search(&query).await?;
            println!("query: {}", result.query);
            for hit in &result.hits {
                println!(
                    "score={:.4} artifact={} document_id={} page={}",
                    hit.score, hit.artifact_id, hit.chunk.document_id, hit.chunk.page_number
                );
                println!("  chunk_text:\n{}", hit.chunk.text);
            }
        }
        Command::Ask {
            question,
            show_sources,
        } => {
            let session = match coordinator.open_session().await {
                Ok(session) => session,
                Err(SearchError::NoIndexFound) => {
                    println!("nothing to search yet: ingest documents first");
                    return Ok(());
                }
                Err(error) => return Err(error.into()),
            };
            for corrupt in session.index().corrupt_artifacts() {
                warn!(key = %corrupt.key, details = %corrupt.details, "excluded artifact");
            }

            let answered = session.ask(&question).await?;
            println!("{}", answered.answer);

            if show_sources {
                for hit in &answered.sources.hits {
                    println!(
                        "[source score={:.4} page={}] {}",
                        hit.score, hit.chunk.page_number, hit.chunk.text
                    );
                }
            }
        }
    }

    Ok(())
}
