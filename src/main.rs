use anyhow::{Context, Result};
use clap::Parser;
use docpipe::{
    config::{Cli, Command, ServeConfig, StoreConfig},
    db, routes,
    services::{
        dispatcher::spawn_queue_poller,
        launcher::ProcessTaskLauncher,
        notifier::notifier_for,
        scanner::{ClamScanner, VirusScanner},
        storage_service::LocalObjectStore,
        worker::{ConversionWorker, WorkerConfig},
    },
    state::{AppState, local_clients},
};
use std::{fs, io::ErrorKind, path::Path, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let store = StoreConfig::from_env_and_args(&cli.common);

    match cli.command {
        Command::Migrate => {
            let db = open_store(&store).await?;
            db.close().await;
            tracing::info!("Database migration complete.");
            Ok(())
        }
        Command::Convert => convert(store).await,
        Command::Serve(args) => {
            let cfg = ServeConfig::from_env_and_args(&cli.common, &args)?;
            serve(cfg).await
        }
    }
}

/// Ensure the storage directory exists, connect, and apply the schema.
async fn open_store(store: &StoreConfig) -> Result<sqlx::SqlitePool> {
    if !Path::new(&store.storage_dir).exists() {
        fs::create_dir_all(&store.storage_dir)
            .with_context(|| format!("creating storage directory {}", store.storage_dir))?;
        tracing::info!("Created storage directory at {}", store.storage_dir);
    }

    let db = db::connect(&store.database_url).await?;
    db::run_migrations(&db).await.context("running migrations")?;
    Ok(db)
}

async fn serve(cfg: ServeConfig) -> Result<()> {
    tracing::info!("Starting docpipe with config: {:?}", cfg);

    let db = Arc::new(open_store(&cfg.store).await?);

    // --- Service seams ---
    let launcher = Arc::new(ProcessTaskLauncher::new(
        cfg.worker_command.clone(),
        cfg.store.task_environment(),
    ));
    let clients = local_clients(
        db.clone(),
        cfg.store.storage_dir.clone(),
        &cfg.metadata_table,
        launcher,
    )
    .await
    .context("initializing service clients")?;

    let settings = Arc::new(cfg.pipeline.clone());

    // --- Queue poller ---
    match cfg.poll_interval {
        Some(interval) => {
            spawn_queue_poller(
                clients.launcher.clone(),
                clients.queue.clone(),
                Arc::new(settings.dispatch.clone()),
                interval,
                cfg.visibility_timeout,
            );
        }
        None => tracing::info!("Queue poller disabled"),
    }

    // --- Build router ---
    let state = AppState {
        clients,
        settings,
        db,
        storage_dir: cfg.store.storage_dir.clone().into(),
    };
    let app = routes::routes::routes(state);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Run one conversion task. Any failure exits non-zero.
async fn convert(store: StoreConfig) -> Result<()> {
    let worker_cfg = WorkerConfig::from_env()?;
    let db = Arc::new(open_store(&store).await?);

    let objects = Arc::new(LocalObjectStore::new(db.clone(), store.storage_dir.clone()));
    let notifier = notifier_for(worker_cfg.topic.as_deref().unwrap_or_default(), db.clone());
    let scanner = worker_cfg
        .scan_enabled
        .then(|| Arc::new(ClamScanner::default()) as Arc<dyn VirusScanner>);

    let worker = ConversionWorker::new(objects, notifier, scanner);
    let result = worker.run(&worker_cfg).await;
    db.close().await;

    let result = result?;
    tracing::info!(
        input_file = %result.input_file,
        output_file = %result.output_file,
        "conversion complete"
    );
    Ok(())
}
