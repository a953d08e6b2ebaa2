use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;

use campus_assist::core::config::AppPaths;
use campus_assist::core::logging;
use campus_assist::rag::{load_qna_entries, load_web_documents, Collection, IngestReport};
use campus_assist::server;
use campus_assist::state::AppState;

/// Campus Assist - question answering over a university's web pages and FAQs
#[derive(Parser, Debug)]
#[command(name = "campus-assist")]
#[command(version)]
#[command(about = "Retrieval-augmented question answering for a campus corpus", long_about = None)]
struct Args {
    /// Data directory holding config.yml, secrets.yaml, the store and logs
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP API (default)
    Serve,

    /// Embed and store a corpus file
    Ingest {
        #[command(subcommand)]
        source: IngestSource,
    },

    /// Print record counts per collection
    Stats,
}

#[derive(Subcommand, Debug)]
enum IngestSource {
    /// JSON array of {text, url, title, type}
    Web { file: PathBuf },
    /// JSON array of {question, answer, sheet?}
    Faq { file: PathBuf },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let paths = Arc::new(match args.data_dir {
        Some(data_dir) => {
            let root = std::env::current_dir().context("Failed to read current directory")?;
            AppPaths::with_data_dir(root, data_dir)
        }
        None => AppPaths::new(),
    });

    let command = args.command.unwrap_or(Commands::Serve);
    let log_name = match command {
        Commands::Serve => "server.log",
        _ => "cli.log",
    };
    logging::init(&paths, log_name);

    let state = AppState::initialize(paths).await?;

    let result = match command {
        Commands::Serve => serve(state.clone()).await,
        Commands::Ingest { source } => ingest(&state, source).await,
        Commands::Stats => stats(&state).await,
    };

    state.shutdown().await;
    result
}

async fn serve(state: Arc<AppState>) -> anyhow::Result<()> {
    let bind_addr = format!(
        "{}:{}",
        state.settings.server.host, state.settings.server.port
    );

    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;
    let addr = listener.local_addr()?;
    tracing::info!("Listening on {}", addr);

    let app: Router = server::router::router(state);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

async fn ingest(state: &AppState, source: IngestSource) -> anyhow::Result<()> {
    let pipeline = state.ingest_pipeline();

    let report = match source {
        IngestSource::Web { file } => {
            let docs = load_web_documents(&file)
                .with_context(|| format!("Failed to load {}", file.display()))?;
            pipeline.ingest(&docs).await?
        }
        IngestSource::Faq { file } => {
            let entries = load_qna_entries(&file)
                .with_context(|| format!("Failed to load {}", file.display()))?;
            pipeline.ingest(&entries).await?
        }
    };

    print_report(&report);
    Ok(())
}

fn print_report(report: &IngestReport) {
    println!(
        "Added {} documents to '{}' ({} read, {} invalid, {} repeated, {} zero-vector embeddings)",
        report.added,
        report.collection,
        report.seen,
        report.skipped_invalid,
        report.skipped_duplicates,
        report.degraded_embeddings
    );
}

async fn stats(state: &AppState) -> anyhow::Result<()> {
    for collection in Collection::ALL {
        let total = state.store.count(collection).await?;
        let degraded = state.store.count_degraded(collection).await?;
        println!(
            "{:<4} {:>7} records ({} with zero vectors) [{}]",
            collection.as_str(),
            total,
            degraded,
            collection.label()
        );
    }
    Ok(())
}
