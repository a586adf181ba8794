//! Seams to the managed services the pipeline talks to.
//!
//! Each service is a trait object so handlers stay agnostic of the backend.
//! The local backends live next to this module; tests plug in fakes.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use std::{io, path::Path, sync::Arc, time::Duration};
use thiserror::Error;

use crate::models::{
    api_key::CreatedApiKey, event::QueueMessage, metadata::MetadataRecord, object::StoredObject,
};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("object `{key}` not found in bucket `{bucket}`")]
    ObjectNotFound { bucket: String, key: String },
    #[error("bucket `{name}` invalid: {reason}")]
    InvalidBucketName { name: String, reason: String },
    #[error("invalid object key")]
    InvalidObjectKey,
    #[error("invalid table name `{0}`")]
    InvalidTableName(String),
    #[error("receipt handle `{0}` is not valid")]
    ReceiptHandleInvalid(String),
    #[error("api key `{0}` not found")]
    ApiKeyNotFound(String),
    #[error("failed to launch task: {0}")]
    Launch(String),
    #[error("publish to `{target}` rejected with status {status}")]
    PublishRejected { target: String, status: u16 },
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type ClientResult<T> = Result<T, ClientError>;

/// Object payload as a stream of chunks.
pub type ByteStream = BoxStream<'static, io::Result<Bytes>>;

/// Object storage.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        content_type: Option<String>,
        body: Bytes,
    ) -> ClientResult<StoredObject>;

    /// Like `put_object`, without holding the payload in memory.
    async fn put_object_stream(
        &self,
        bucket: &str,
        key: &str,
        content_type: Option<String>,
        body: ByteStream,
    ) -> ClientResult<StoredObject>;

    /// Size and content type without the payload.
    async fn head_object(&self, bucket: &str, key: &str) -> ClientResult<StoredObject>;

    async fn get_object(&self, bucket: &str, key: &str) -> ClientResult<(StoredObject, ByteStream)>;

    /// Copy an object's payload to a local file.
    async fn download_to(&self, bucket: &str, key: &str, dest: &Path) -> ClientResult<()>;

    /// Store a local file as an object.
    async fn upload_from(
        &self,
        src: &Path,
        bucket: &str,
        key: &str,
        content_type: Option<String>,
    ) -> ClientResult<StoredObject>;
}

/// Key-value table holding one [`MetadataRecord`] per file name.
#[async_trait]
pub trait MetadataTable: Send + Sync {
    /// Write a record, replacing any previous one with the same file name.
    async fn put_record(&self, record: &MetadataRecord) -> ClientResult<()>;

    async fn get_record(&self, file_name: &str) -> ClientResult<Option<MetadataRecord>>;
}

/// At-least-once message queue with visibility timeouts.
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Enqueue a body; returns the message id.
    async fn send_message(&self, queue: &str, body: &str) -> ClientResult<String>;

    /// Receive up to `max` visible messages, hiding them for `visibility`.
    async fn receive_messages(
        &self,
        queue: &str,
        max: usize,
        visibility: Duration,
    ) -> ClientResult<Vec<QueueMessage>>;

    async fn delete_message(&self, queue: &str, receipt_handle: &str) -> ClientResult<()>;
}

/// Network placement for a launched task.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NetworkConfig {
    pub subnets: Vec<String>,
    pub security_groups: Vec<String>,
    pub assign_public_ip: bool,
}

/// Per-container overrides applied on top of the task definition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContainerOverride {
    pub name: String,
    pub environment: Vec<(String, String)>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunTaskRequest {
    pub cluster: String,
    pub task_definition: String,
    pub network: NetworkConfig,
    pub container: ContainerOverride,
}

/// A task the launcher accepted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaskHandle {
    pub task_arn: String,
}

/// Container-task launcher.
#[async_trait]
pub trait TaskLauncher: Send + Sync {
    async fn run_task(&self, request: &RunTaskRequest) -> ClientResult<TaskHandle>;
}

/// Notification topic publisher.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Publish a message; returns the message id.
    async fn publish(&self, target: &str, subject: &str, message: &str) -> ClientResult<String>;
}

/// API gateway key management.
#[async_trait]
pub trait KeyGateway: Send + Sync {
    async fn create_api_key(&self, name: &str, enabled: bool) -> ClientResult<CreatedApiKey>;

    async fn create_usage_plan_key(
        &self,
        usage_plan_id: &str,
        key_id: &str,
        key_type: &str,
    ) -> ClientResult<()>;

    /// Whether `value` is an enabled key attached to some usage plan.
    async fn validate_api_key(&self, value: &str) -> ClientResult<bool>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmailMessage {
    pub source: String,
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
}

/// Outbound email.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Send a message; returns the message id.
    async fn send_email(&self, message: &EmailMessage) -> ClientResult<String>;
}

/// Service handles shared for the lifetime of the process.
#[derive(Clone)]
pub struct Clients {
    pub objects: Arc<dyn ObjectStore>,
    pub metadata: Arc<dyn MetadataTable>,
    pub queue: Arc<dyn MessageQueue>,
    pub launcher: Arc<dyn TaskLauncher>,
    pub gateway: Arc<dyn KeyGateway>,
    pub mailer: Arc<dyn Mailer>,
}
