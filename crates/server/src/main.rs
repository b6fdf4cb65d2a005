//! reelcap entry point.
//!
//! Wires configuration, logging, storage, the progression engine and the
//! upload dispatcher, and serves the line-delimited JSON console on
//! stdin/stdout. Logs go to stderr.

mod console;

use std::sync::Arc;

use reelcap_common::config::LoggingConfig;
use reelcap_common::{AppResult, Config, FileStore, SharedStateStore};
use reelcap_core::{ForwardService, ProgressionEngine, UploadDispatcher};
use reelcap_db::{FallbackStore, RelationalStore};
use sea_orm::DatabaseConnection;
use tokio::io::BufReader;
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use console::{ConsoleOutput, ConsoleSink};

/// Uploads buffered between the console and the dispatcher.
const UPLOAD_QUEUE_CAPACITY: usize = 256;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
///
/// On Unix systems, this listens for both SIGINT (Ctrl+C) and SIGTERM.
/// On Windows, this only listens for Ctrl+C.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received SIGINT, initiating graceful shutdown...");
        },
        () = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "reelcap=debug,sea_orm=info".into());
    let registry = tracing_subscriber::registry().with(filter);

    if logging.json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

async fn connect(config: &Config) -> AppResult<DatabaseConnection> {
    let db = reelcap_db::init(config).await?;
    reelcap_db::migrate(&db).await?;
    Ok(db)
}

/// Open the configured storage.
///
/// Without a database URL the file backend serves alone. With one, the
/// relational backend serves until it becomes unreachable; if it already is
/// at startup, the file backend serves for the whole run.
async fn open_store(config: &Config) -> anyhow::Result<SharedStateStore> {
    let files: SharedStateStore = Arc::new(FileStore::new(config.storage.data_dir.clone()));

    if config.database.url.is_none() {
        info!(data_dir = %config.storage.data_dir.display(), "No database configured, using file storage");
        return Ok(files);
    }

    match connect(config).await {
        Ok(db) => {
            info!("Connected to database");
            let relational: SharedStateStore = Arc::new(RelationalStore::new(Arc::new(db)));
            Ok(Arc::new(FallbackStore::new(relational, files)))
        }
        Err(e) if e.is_unavailable() => {
            warn!(
                error = %e,
                data_dir = %config.storage.data_dir.display(),
                "Database unreachable, using file storage"
            );
            Ok(Arc::new(FallbackStore::degraded(files)))
        }
        Err(e) => Err(e.into()),
    }
}

async fn serve() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::load()?;

    init_tracing(&config.logging);
    info!("Starting reelcap...");

    let store = open_store(&config).await?;
    info!(backend = store.backend_name(), "Storage ready");

    let engine = Arc::new(ProgressionEngine::new(store, config.bot.qualities.clone()));

    let output = ConsoleOutput::new(tokio::io::stdout());
    let sink: ForwardService = Arc::new(ConsoleSink::new(output.clone()));
    let (uploads, events) = mpsc::channel(UPLOAD_QUEUE_CAPACITY);
    let dispatcher = tokio::spawn(UploadDispatcher::new(Arc::clone(&engine), sink).run(events));

    let stdin = BufReader::new(tokio::io::stdin());
    tokio::select! {
        result = console::run(stdin, &engine, uploads, &output) => {
            result?;
            info!("Console input closed");
        },
        () = shutdown_signal() => {},
    }

    // The upload sender is gone, so the dispatcher finishes in-flight uploads and stops.
    dispatcher.await?;

    info!("Shutdown complete");
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let runtime = tokio::runtime::Runtime::new()?;
    let result = runtime.block_on(serve());
    // A stdin read may still be parked on a blocking thread.
    runtime.shutdown_background();
    result
}
