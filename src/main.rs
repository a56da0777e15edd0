use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::info;

use quarry::config::Config;
use quarry::content::RobotsCache;
use quarry::crawler::Crawler;
use quarry::db::{self, PageRepository, WebsiteRepository};
use quarry::jobs::task::SweepTargets;
use quarry::jobs::{Client, Handlers, TaskQueue, TaskState, Worker, WorkerConfig};
use quarry::rag::{RagService, StreamEvent};
use quarry::storage::{ObjectStore, StorageConfig};
use quarry::vectorizer::{Embedder, Service as VectorizerService};
use quarry::{chroma, ollama};

#[derive(Parser)]
#[command(author, version, about = "Website ingestion and RAG worker", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the queue-consuming worker process
    Worker,

    /// Register a website and enqueue its first crawl
    Add(AddArgs),

    /// Enqueue a full re-ingest of a website
    Recrawl(RecrawlArgs),

    /// Ask a question about a website's content
    Query(QueryArgs),

    /// Enqueue a maintenance sweep of old page artifacts
    Sweep(SweepArgs),

    /// Inspect or control the task queues
    Queues(QueuesArgs),
}

#[derive(Args)]
struct AddArgs {
    /// Start URL of the website
    url: String,

    /// Owner handle to record on the website
    #[arg(long)]
    user: Option<String>,
}

#[derive(Args)]
struct RecrawlArgs {
    /// Website id
    website_id: i64,
}

#[derive(Args)]
struct QueryArgs {
    /// Website id
    website_id: i64,

    /// The question to answer
    question: String,

    /// Stream tokens as they arrive instead of waiting for the full answer
    #[arg(long)]
    stream: bool,
}

#[derive(Args)]
struct SweepArgs {
    /// Only sweep pages crawled more than this many days ago
    #[arg(long, default_value = "30")]
    older_than_days: i64,

    /// Restrict the sweep to one website
    #[arg(long)]
    website_id: Option<i64>,

    /// Delete stored page bodies
    #[arg(long)]
    storage: bool,

    /// Delete page vectors
    #[arg(long)]
    vectors: bool,
}

#[derive(Args)]
struct QueuesArgs {
    #[command(subcommand)]
    command: QueuesCommand,
}

#[derive(Subcommand)]
enum QueuesCommand {
    /// Show per-queue task counts
    List,

    /// Stop handing out tasks from a queue
    Pause { queue: String },

    /// Resume a paused queue
    Resume { queue: String },

    /// List tasks in one state of a queue
    Tasks {
        queue: String,
        /// pending | active | scheduled | retry | archived
        state: String,
        #[arg(long, default_value = "50")]
        limit: i64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    quarry::telemetry::init_tracing_subscriber();
    let cli = Cli::parse();
    let config = Config::from_env();

    match cli.command {
        Commands::Worker => run_worker(config).await,
        Commands::Add(args) => add_website(config, args).await,
        Commands::Recrawl(args) => recrawl_website(config, args).await,
        Commands::Query(args) => run_query(config, args).await,
        Commands::Sweep(args) => enqueue_sweep(config, args).await,
        Commands::Queues(args) => manage_queues(config, args).await,
    }
}

/// Wire up the worker process and run it until SIGINT/SIGTERM.
async fn run_worker(config: Config) -> anyhow::Result<()> {
    info!("starting worker");

    let pool = db::connect(&config)
        .await
        .context("failed to connect to database")?;

    let websites = WebsiteRepository::new(pool.clone());
    let pages = PageRepository::new(pool.clone());
    let queue = TaskQueue::new(pool.clone());
    let job_client = Client::new(queue.clone(), websites.clone());

    let storage = ObjectStore::new(storage_config(&config));
    let robots = RobotsCache::new(config.crawler.user_agent.clone());
    let vectorizer = build_vectorizer(&config);

    let crawler = Crawler::new(
        websites.clone(),
        pages.clone(),
        storage.clone(),
        robots,
        Arc::new(job_client),
        config.crawler.clone(),
        config.content.clone(),
    );

    let handlers = Arc::new(Handlers::new(
        crawler,
        vectorizer,
        websites,
        pages,
        storage,
    ));

    let worker_config = WorkerConfig {
        concurrency: config.queue.concurrency,
        weights: config.queue.weights.clone(),
        ..WorkerConfig::default()
    };
    let worker = Worker::new(queue, handlers, worker_config);

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        info!("shutdown signal received");
        signal_token.cancel();
    });

    worker.run(shutdown).await;
    info!("worker exited");
    Ok(())
}

async fn add_website(config: Config, args: AddArgs) -> anyhow::Result<()> {
    let pool = db::connect(&config).await?;
    let websites = WebsiteRepository::new(pool.clone());
    let client = Client::new(TaskQueue::new(pool), websites.clone());

    let website = websites.create(&args.url, args.user.as_deref()).await?;
    let task_id = client.enqueue_crawl(website.id, &website.url).await?;

    println!("website {} registered, crawl task {}", website.id, task_id);
    Ok(())
}

async fn recrawl_website(config: Config, args: RecrawlArgs) -> anyhow::Result<()> {
    let pool = db::connect(&config).await?;
    let websites = WebsiteRepository::new(pool.clone());

    let website = websites
        .get(args.website_id)
        .await?
        .with_context(|| format!("website {} not found", args.website_id))?;
    if website.phase == "crawling" {
        anyhow::bail!("website {} is already being crawled", website.id);
    }

    let client = Client::new(TaskQueue::new(pool), websites);
    let task_id = client.enqueue_recrawl(website.id).await?;

    println!("recrawl task {} enqueued for {}", task_id, website.url);
    Ok(())
}

async fn run_query(config: Config, args: QueryArgs) -> anyhow::Result<()> {
    let rag = build_rag(&config);

    if args.stream {
        rag.query_stream(args.website_id, &args.question, |event| {
            match event {
                StreamEvent::Chunk { text } => {
                    print!("{text}");
                    use std::io::Write as _;
                    let _ = std::io::stdout().flush();
                }
                StreamEvent::Metadata {
                    sources,
                    retrieved_chunks,
                } => {
                    println!("\n\n--- {retrieved_chunks} chunks retrieved");
                    for source in sources {
                        println!("  [{}] {}", source.chunk_index, source.page_url);
                    }
                }
                StreamEvent::Error { message } => eprintln!("\nerror: {message}"),
                StreamEvent::Start { .. } | StreamEvent::Done => {}
            }
            Ok(())
        })
        .await?;
    } else {
        let response = rag.query(args.website_id, &args.question).await?;
        println!("{}", response.answer);
        if !response.sources.is_empty() {
            println!("\nSources:");
            for source in &response.sources {
                println!(
                    "  {} (chunk {}, similarity {:.2})",
                    source.page_url, source.chunk_index, source.similarity
                );
            }
        }
    }

    Ok(())
}

async fn enqueue_sweep(config: Config, args: SweepArgs) -> anyhow::Result<()> {
    if !args.storage && !args.vectors {
        anyhow::bail!("nothing to sweep: pass --storage and/or --vectors");
    }

    let pool = db::connect(&config).await?;
    let websites = WebsiteRepository::new(pool.clone());
    let client = Client::new(TaskQueue::new(pool), websites);

    let task_id = client
        .enqueue_sweep(
            args.website_id,
            args.older_than_days,
            SweepTargets {
                storage: args.storage,
                vectors: args.vectors,
            },
        )
        .await?;

    println!("sweep task {task_id} enqueued");
    Ok(())
}

async fn manage_queues(config: Config, args: QueuesArgs) -> anyhow::Result<()> {
    let pool = db::connect(&config).await?;
    let queue = TaskQueue::new(pool);

    match args.command {
        QueuesCommand::List => {
            let stats = queue.list_queues().await?;
            if stats.is_empty() {
                println!("no queues with tasks");
                return Ok(());
            }
            println!(
                "{:<14} {:>8} {:>8} {:>10} {:>8} {:>9}  paused",
                "queue", "pending", "active", "scheduled", "retry", "archived"
            );
            for stat in stats {
                println!(
                    "{:<14} {:>8} {:>8} {:>10} {:>8} {:>9}  {}",
                    stat.queue,
                    stat.pending,
                    stat.active,
                    stat.scheduled,
                    stat.retry,
                    stat.archived,
                    stat.paused
                );
            }
        }
        QueuesCommand::Pause { queue: name } => {
            queue.pause(&name).await?;
            println!("queue {name} paused");
        }
        QueuesCommand::Resume { queue: name } => {
            queue.resume(&name).await?;
            println!("queue {name} resumed");
        }
        QueuesCommand::Tasks {
            queue: name,
            state,
            limit,
        } => {
            let state = TaskState::parse(&state)
                .with_context(|| format!("unknown state: {state}"))?;
            let tasks = queue.list_tasks(&name, state, limit).await?;
            for task in tasks {
                println!(
                    "{}  {:<14} attempts {}/{} run_at {}  {}",
                    task.id,
                    task.kind,
                    task.attempts,
                    task.max_retry,
                    task.run_at.format("%Y-%m-%d %H:%M:%S"),
                    task.last_error.as_deref().unwrap_or("")
                );
            }
        }
    }

    Ok(())
}

fn storage_config(config: &Config) -> StorageConfig {
    StorageConfig {
        endpoint: config.s3_endpoint.clone(),
        region: config.s3_region.clone(),
        access_key: config.s3_access_key.clone(),
        secret_key: config.s3_secret_key.clone(),
        bucket: config.s3_bucket.clone(),
    }
}

fn build_vectorizer(config: &Config) -> VectorizerService {
    let embedder = Embedder::new(ollama::Client::new(&config.ollama_url), &config.embed_model);
    VectorizerService::new(embedder, chroma::VectorStore::new(&config.chroma_url))
}

fn build_rag(config: &Config) -> RagService {
    RagService::new(
        build_vectorizer(config),
        ollama::Client::new(&config.ollama_url),
        &config.llm_model,
        config.rag.top_k,
        config.rag.context_chunks,
    )
}

async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(_) => {
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}
