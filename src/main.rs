use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::watch;

use sema_embed::{AnyEmbedder, HttpEmbedder};
use sema_index::chunker::{ChunkParams, TokenChunker};
use sema_index::extractor::Extractor;
use sema_index::pipeline::{IngestConfig, Ingestor};
use sema_index::retriever::Retriever;
use sema_index::store::{QdrantStore, VectorStore};
use sema_index::traversal::TraversalConfig;
use sema_jobs::worker::{JobRequest, WorkerPool, job_channel};
use sema_jobs::{JobStatus, JobStore};

mod config;
use config::Config;

#[derive(Parser)]
#[command(name = "sema", version, about = "Repository ingestion and semantic code search")]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, default_value = "config/default.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest a materialized repository checkout into the vector index.
    Ingest {
        /// Checkout directory to index.
        path: PathBuf,
        /// Repository name; defaults to the directory name.
        #[arg(long)]
        repo: Option<String>,
        #[arg(long)]
        branch: Option<String>,
        #[arg(long, default_value_t = 0)]
        user: i64,
        /// Remove the checkout when the job finishes.
        #[arg(long)]
        cleanup: bool,
    },
    /// Search an indexed repository.
    Search {
        query: String,
        #[arg(long)]
        repo: String,
        #[arg(long)]
        branch: Option<String>,
        #[arg(long, default_value_t = 0)]
        user: i64,
        #[arg(long, default_value_t = 8)]
        limit: u64,
    },
    /// Show the state of an ingestion job.
    Status { job_id: i64 },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;

    match cli.command {
        Command::Ingest {
            path,
            repo,
            branch,
            user,
            cleanup,
        } => ingest(&config, path, repo, branch, user, cleanup).await,
        Command::Search {
            query,
            repo,
            branch,
            user,
            limit,
        } => search(&config, &query, &repo, branch.as_deref(), user, limit).await,
        Command::Status { job_id } => status(&config, job_id).await,
    }
}

/// Collection name derived from the job key, lowercased and slugged.
fn collection_name(user: i64, repo: &str, branch: Option<&str>) -> String {
    let raw = format!("{repo}_{}_{user}", branch.unwrap_or("default"));
    let slug: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("sema_{slug}")
}

async fn open_job_store(config: &Config) -> anyhow::Result<JobStore> {
    let options = sqlx::sqlite::SqliteConnectOptions::new()
        .filename(&config.jobs.sqlite_path)
        .create_if_missing(true);
    let pool = sqlx::SqlitePool::connect_with(options)
        .await
        .context("failed to open job database")?;
    let store = JobStore::new(pool);
    store.init().await?;
    Ok(store)
}

fn build_embedder(config: &Config) -> AnyEmbedder {
    let mut embedder = HttpEmbedder::new(&config.embedding.base_url, &config.embedding.model)
        .with_tasks(&config.embedding.document_task, &config.embedding.query_task);
    if let Some(ref key) = config.embedding.api_key {
        embedder = embedder.with_api_key(key.clone());
    }
    AnyEmbedder::Http(embedder)
}

fn build_ingestor(
    config: &Config,
    store: Arc<dyn VectorStore>,
) -> anyhow::Result<Ingestor<AnyEmbedder>> {
    let chunker = TokenChunker::from_file(Path::new(&config.embedding.tokenizer_path))
        .context("failed to load tokenizer")?;
    Ok(Ingestor::new(
        Arc::new(Extractor::new()),
        Arc::new(chunker),
        Arc::new(build_embedder(config)),
        store,
        IngestConfig {
            chunking: ChunkParams {
                max_tokens: config.ingest.max_tokens,
                overlap: config.ingest.overlap,
            },
            vector_size: config.embedding.vector_size,
            batch_size: config.ingest.batch_size,
            traversal: TraversalConfig::default(),
        },
    ))
}

async fn ingest(
    config: &Config,
    path: PathBuf,
    repo: Option<String>,
    branch: Option<String>,
    user: i64,
    cleanup: bool,
) -> anyhow::Result<()> {
    anyhow::ensure!(
        path.is_dir(),
        "checkout path {} is not a directory",
        path.display()
    );
    let repo_name = repo.unwrap_or_else(|| {
        path.file_name()
            .map_or_else(|| "repo".to_owned(), |n| n.to_string_lossy().to_string())
    });

    let store = open_job_store(config).await?;
    let collection = collection_name(user, &repo_name, branch.as_deref());
    let job = store
        .create_or_get(user, &repo_name, branch.as_deref(), &collection)
        .await?;
    tracing::info!(job_id = job.id, repo = %repo_name, %collection, "job queued");

    let vector_store: Arc<dyn VectorStore> = Arc::new(QdrantStore::new(&config.qdrant.url)?);
    let ingestor = Arc::new(build_ingestor(config, vector_store)?);

    let (queue, rx) = job_channel(config.jobs.queue_capacity);
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let pool = WorkerPool::spawn(
        config.jobs.workers,
        rx,
        store.clone(),
        ingestor,
        None,
        shutdown_rx,
    );

    let (_cancel_tx, cancel_rx) = watch::channel(false);
    let submitted = queue
        .submit(JobRequest {
            job_id: job.id,
            root: path,
            repo: repo_name,
            cleanup,
            cancel: cancel_rx,
        })
        .await;
    anyhow::ensure!(submitted, "job queue closed before the job could start");
    drop(queue);

    pool.join().await;
    let job = store.get(job.id).await?;
    match job.status {
        JobStatus::Done => {
            tracing::info!(
                job_id = job.id,
                vectors = job.vectors_upserted,
                "ingestion finished"
            );
            println!(
                "job {}: done, {} vectors upserted",
                job.id, job.vectors_upserted
            );
            Ok(())
        }
        status => {
            let detail = job.last_error.unwrap_or_default();
            tracing::error!(job_id = job.id, %status, error = %detail, "ingestion did not complete");
            anyhow::bail!("job {} ended {status}: {detail}", job.id)
        }
    }
}

async fn search(
    config: &Config,
    query: &str,
    repo: &str,
    branch: Option<&str>,
    user: i64,
    limit: u64,
) -> anyhow::Result<()> {
    let vector_store: Arc<dyn VectorStore> = Arc::new(QdrantStore::new(&config.qdrant.url)?);
    let collection = collection_name(user, repo, branch);
    let retriever = Retriever::new(vector_store, Arc::new(build_embedder(config)), collection);

    let hits = retriever.search(query, limit).await?;
    if hits.is_empty() {
        println!("no results");
        return Ok(());
    }
    for hit in hits {
        let entity = match (&hit.kind, &hit.name) {
            (Some(kind), Some(name)) => format!(" {kind} {name}"),
            _ => String::new(),
        };
        println!(
            "{:.3}  {}#{}{entity}",
            hit.score, hit.file_path, hit.chunk_index
        );
        let preview: String = hit.body.chars().take(200).collect();
        println!("       {}", preview.replace('\n', " "));
    }
    Ok(())
}

async fn status(config: &Config, job_id: i64) -> anyhow::Result<()> {
    let store = open_job_store(config).await?;
    let job = store.get(job_id).await?;
    println!("job {}: {}", job.id, job.status);
    println!("  repository:  {}", job.repository);
    println!("  branch:      {}", job.branch.as_deref().unwrap_or("-"));
    println!("  collection:  {}", job.collection);
    println!("  vectors:     {}", job.vectors_upserted);
    println!("  indexed at:  {}", job.indexed_at.as_deref().unwrap_or("-"));
    if let Some(error) = job.last_error {
        println!("  last error:  {error}");
    }
    Ok(())
}
