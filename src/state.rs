//! Process-wide state shared by every request handler.

use sqlx::SqlitePool;
use std::{path::PathBuf, sync::Arc};

use crate::services::{
    clients::{ClientResult, Clients, TaskLauncher},
    dispatcher::DispatchSettings,
    gateway::SqliteKeyGateway,
    key_issuer::IssuerSettings,
    mailer::OutboxMailer,
    metadata_table::SqliteMetadataTable,
    queue::SqliteQueue,
    storage_service::LocalObjectStore,
};

/// Pipeline behaviour fixed at startup.
#[derive(Clone, Debug)]
pub struct PipelineSettings {
    pub dispatch: DispatchSettings,
    pub issuer: IssuerSettings,
    /// Uploads whose key ends with this suffix are queued for conversion.
    pub convert_suffix: String,
    pub require_api_key: bool,
}

#[derive(Clone)]
pub struct AppState {
    pub clients: Clients,
    pub settings: Arc<PipelineSettings>,
    pub db: Arc<SqlitePool>,
    pub storage_dir: PathBuf,
}

/// Local backends for every service seam, sharing one database.
/// Creates the metadata table if it does not exist yet.
pub async fn local_clients(
    db: Arc<SqlitePool>,
    storage_dir: impl Into<PathBuf>,
    metadata_table: &str,
    launcher: Arc<dyn TaskLauncher>,
) -> ClientResult<Clients> {
    let metadata = SqliteMetadataTable::new(db.clone(), metadata_table)?;
    metadata.ensure_table().await?;

    Ok(Clients {
        objects: Arc::new(LocalObjectStore::new(db.clone(), storage_dir)),
        metadata: Arc::new(metadata),
        queue: Arc::new(SqliteQueue::new(db.clone())),
        launcher,
        gateway: Arc::new(SqliteKeyGateway::new(db.clone())),
        mailer: Arc::new(OutboxMailer::new(db)),
    })
}
