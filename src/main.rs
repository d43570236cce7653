use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use document_approval::config::ServiceConfig;
use document_approval::harness::HarnessRequest;
use document_approval::service::SearchCriteria;
use document_approval::worker::DrainWorker;
use document_approval::{BatchRequest, DocumentService, DocumentStatus};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Document approval workflow
#[derive(Parser)]
#[command(name = "docflow", version, about = "Document approval workflow")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, global = true, default_value = "docflow.toml")]
    config: PathBuf,

    /// Overrides `db_path` from the configuration
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a DRAFT document
    Create {
        #[arg(long)]
        author: String,
        #[arg(long)]
        title: String,
    },
    /// Submit documents (DRAFT -> SUBMITTED)
    Submit {
        #[arg(long)]
        initiator: String,
        #[arg(long)]
        comment: Option<String>,
        #[arg(required = true)]
        ids: Vec<u64>,
    },
    /// Approve documents (SUBMITTED -> APPROVED)
    Approve {
        #[arg(long)]
        initiator: String,
        #[arg(long)]
        comment: Option<String>,
        #[arg(required = true)]
        ids: Vec<u64>,
    },
    /// Show a document with its history
    Show { id: u64 },
    /// Search documents
    Search {
        #[arg(long)]
        status: Option<DocumentStatus>,
        #[arg(long)]
        author: Option<String>,
        /// RFC 3339 lower bound on creation time
        #[arg(long)]
        from: Option<DateTime<Utc>>,
        /// RFC 3339 upper bound on creation time
        #[arg(long)]
        to: Option<DateTime<Utc>>,
        #[arg(long, default_value_t = 0)]
        page: usize,
        #[arg(long, default_value_t = 20)]
        size: usize,
    },
    /// Race concurrent approvals against one document
    Stress {
        id: u64,
        #[arg(long, default_value_t = 5)]
        workers: usize,
        #[arg(long, default_value_t = 10)]
        attempts: usize,
        #[arg(long, default_value = "stress")]
        initiator: String,
    },
    /// Create N draft documents
    Generate {
        count: usize,
        #[arg(long, default_value = "Generator")]
        author: String,
    },
    /// Run the drain worker
    Worker {
        /// Stop after this many seconds instead of running until killed
        #[arg(long)]
        seconds: Option<u64>,
    },
}

fn main() -> anyhow::Result<()> {
    init_logging();

    let cli = Cli::parse();
    let mut config = ServiceConfig::load(&cli.config)?;
    if let Some(db) = cli.db {
        config.db_path = db;
    }

    let db = sled::open(&config.db_path)
        .with_context(|| format!("failed to open {}", config.db_path.display()))?;
    let service = Arc::new(DocumentService::new(Arc::new(db))?);

    match cli.command {
        Commands::Create { author, title } => {
            let id = service.create_draft(&author, &title)?;
            print_json(&service.get_document(id)?)?;
        }
        Commands::Submit {
            initiator,
            comment,
            ids,
        } => {
            let request = BatchRequest {
                initiator,
                ids,
                comment,
            };
            print_json(&service.submit(&request)?)?;
        }
        Commands::Approve {
            initiator,
            comment,
            ids,
        } => {
            let request = BatchRequest {
                initiator,
                ids,
                comment,
            };
            print_json(&service.approve(&request)?)?;
        }
        Commands::Show { id } => print_json(&service.get_document_with_history(id)?)?,
        Commands::Search {
            status,
            author,
            from,
            to,
            page,
            size,
        } => {
            let criteria = SearchCriteria {
                status,
                author,
                from,
                to,
                page,
                size,
            };
            print_json(&service.search(&criteria)?)?;
        }
        Commands::Stress {
            id,
            workers,
            attempts,
            initiator,
        } => {
            let request = HarnessRequest::new(id, workers, attempts, &initiator)
                .with_call_timeout(config.harness.call_timeout());
            print_json(&service.run_concurrency_test(&request)?)?;
        }
        Commands::Generate { count, author } => {
            let start = Instant::now();
            for i in 0..count {
                service.create_draft(&author, &format!("Document #{}", i + 1))?;
                if (i + 1) % 100 == 0 {
                    info!("Progress: {}/{count} created", i + 1);
                }
            }
            info!("Done. Total: {count}, time: {} ms", start.elapsed().as_millis());
        }
        Commands::Worker { seconds } => {
            let handle = DrainWorker::new(Arc::clone(&service), config.worker.clone()).spawn()?;
            if !handle.is_running() {
                info!("drain worker disabled by configuration");
                return Ok(());
            }
            match seconds {
                Some(seconds) => std::thread::sleep(Duration::from_secs(seconds)),
                None => loop {
                    std::thread::park();
                },
            }
            handle.shutdown();
        }
    }

    service.flush()?;
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "document_approval=info,docflow=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
