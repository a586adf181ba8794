//! In-memory stand-ins for the service seams, for unit tests.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use futures::{StreamExt, stream};
use std::{
    collections::{HashMap, HashSet},
    path::Path,
    sync::Mutex,
    time::Duration,
};

use crate::{
    models::{
        api_key::CreatedApiKey, event::QueueMessage, metadata::MetadataRecord,
        object::StoredObject,
    },
    services::clients::{
        ByteStream, ClientError, ClientResult, EmailMessage, KeyGateway, Mailer, MessageQueue, MetadataTable,
        Notifier, ObjectStore, RunTaskRequest, TaskHandle, TaskLauncher,
    },
};

fn unavailable(what: &str) -> ClientError {
    ClientError::Io(std::io::Error::other(format!("{what} unavailable")))
}

#[derive(Default)]
pub struct FakeObjectStore {
    pub objects: Mutex<HashMap<(String, String), (Option<String>, Bytes)>>,
}

impl FakeObjectStore {
    pub fn with_object(self, bucket: &str, key: &str, content_type: &str, body: &[u8]) -> Self {
        self.objects.lock().unwrap().insert(
            (bucket.to_string(), key.to_string()),
            (Some(content_type.to_string()), Bytes::copy_from_slice(body)),
        );
        self
    }

    pub fn body(&self, bucket: &str, key: &str) -> Option<Bytes> {
        self.objects
            .lock()
            .unwrap()
            .get(&(bucket.to_string(), key.to_string()))
            .map(|(_, body)| body.clone())
    }

    fn stored(bucket: &str, key: &str, content_type: Option<String>, len: usize) -> StoredObject {
        StoredObject {
            bucket_name: bucket.to_string(),
            key: key.to_string(),
            content_type,
            size_bytes: len as i64,
            etag: None,
            last_modified: Utc::now(),
        }
    }

    fn lookup(&self, bucket: &str, key: &str) -> ClientResult<(Option<String>, Bytes)> {
        self.objects
            .lock()
            .unwrap()
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| ClientError::ObjectNotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })
    }
}

#[async_trait]
impl ObjectStore for FakeObjectStore {
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        content_type: Option<String>,
        body: Bytes,
    ) -> ClientResult<StoredObject> {
        let stored = Self::stored(bucket, key, content_type.clone(), body.len());
        self.objects
            .lock()
            .unwrap()
            .insert((bucket.to_string(), key.to_string()), (content_type, body));
        Ok(stored)
    }

    async fn head_object(&self, bucket: &str, key: &str) -> ClientResult<StoredObject> {
        let (content_type, body) = self.lookup(bucket, key)?;
        Ok(Self::stored(bucket, key, content_type, body.len()))
    }

    async fn put_object_stream(
        &self,
        bucket: &str,
        key: &str,
        content_type: Option<String>,
        mut body: ByteStream,
    ) -> ClientResult<StoredObject> {
        let mut payload = Vec::new();
        while let Some(chunk) = body.next().await {
            payload.extend_from_slice(&chunk?);
        }
        self.put_object(bucket, key, content_type, Bytes::from(payload))
            .await
    }

    async fn get_object(&self, bucket: &str, key: &str) -> ClientResult<(StoredObject, ByteStream)> {
        let (content_type, body) = self.lookup(bucket, key)?;
        let stored = Self::stored(bucket, key, content_type, body.len());
        Ok((stored, stream::once(async move { Ok(body) }).boxed()))
    }

    async fn download_to(&self, bucket: &str, key: &str, dest: &Path) -> ClientResult<()> {
        let (_, body) = self.lookup(bucket, key)?;
        tokio::fs::write(dest, &body).await?;
        Ok(())
    }

    async fn upload_from(
        &self,
        src: &Path,
        bucket: &str,
        key: &str,
        content_type: Option<String>,
    ) -> ClientResult<StoredObject> {
        let body = Bytes::from(tokio::fs::read(src).await?);
        self.put_object(bucket, key, content_type, body).await
    }
}

#[derive(Default)]
pub struct FakeMetadataTable {
    pub records: Mutex<HashMap<String, MetadataRecord>>,
    pub writes: Mutex<usize>,
    pub fail_reads: bool,
}

#[async_trait]
impl MetadataTable for FakeMetadataTable {
    async fn put_record(&self, record: &MetadataRecord) -> ClientResult<()> {
        *self.writes.lock().unwrap() += 1;
        self.records
            .lock()
            .unwrap()
            .insert(record.file_name.clone(), record.clone());
        Ok(())
    }

    async fn get_record(&self, file_name: &str) -> ClientResult<Option<MetadataRecord>> {
        if self.fail_reads {
            return Err(unavailable("table"));
        }
        Ok(self.records.lock().unwrap().get(file_name).cloned())
    }
}

#[derive(Default)]
pub struct FakeQueue {
    pub sent: Mutex<Vec<(String, String)>>,
    pub deleted: Mutex<Vec<String>>,
    pub fail_deletes: bool,
}

#[async_trait]
impl MessageQueue for FakeQueue {
    async fn send_message(&self, queue: &str, body: &str) -> ClientResult<String> {
        let mut sent = self.sent.lock().unwrap();
        sent.push((queue.to_string(), body.to_string()));
        Ok(format!("msg-{}", sent.len()))
    }

    async fn receive_messages(
        &self,
        _queue: &str,
        _max: usize,
        _visibility: Duration,
    ) -> ClientResult<Vec<QueueMessage>> {
        Ok(Vec::new())
    }

    async fn delete_message(&self, _queue: &str, receipt_handle: &str) -> ClientResult<()> {
        if self.fail_deletes {
            return Err(unavailable("queue"));
        }
        self.deleted.lock().unwrap().push(receipt_handle.to_string());
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeLauncher {
    pub launched: Mutex<Vec<RunTaskRequest>>,
    pub fail: bool,
}

#[async_trait]
impl TaskLauncher for FakeLauncher {
    async fn run_task(&self, request: &RunTaskRequest) -> ClientResult<TaskHandle> {
        if self.fail {
            return Err(ClientError::Launch("capacity unavailable".into()));
        }
        let mut launched = self.launched.lock().unwrap();
        launched.push(request.clone());
        Ok(TaskHandle {
            task_arn: format!("task/{}/{}", request.cluster, launched.len()),
        })
    }
}

#[derive(Default)]
pub struct FakeNotifier {
    pub published: Mutex<Vec<(String, String, String)>>,
}

#[async_trait]
impl Notifier for FakeNotifier {
    async fn publish(&self, target: &str, subject: &str, message: &str) -> ClientResult<String> {
        let mut published = self.published.lock().unwrap();
        published.push((target.to_string(), subject.to_string(), message.to_string()));
        Ok(format!("note-{}", published.len()))
    }
}

#[derive(Default)]
pub struct FakeGateway {
    pub created: Mutex<Vec<CreatedApiKey>>,
    pub attached: Mutex<Vec<(String, String)>>,
    pub valid_values: Mutex<HashSet<String>>,
    pub fail_attach: bool,
}

#[async_trait]
impl KeyGateway for FakeGateway {
    async fn create_api_key(&self, name: &str, enabled: bool) -> ClientResult<CreatedApiKey> {
        let mut created = self.created.lock().unwrap();
        let key = CreatedApiKey {
            id: format!("key-{}", created.len() + 1),
            name: name.to_string(),
            value: format!("dpk_value{}", created.len() + 1),
            enabled,
        };
        created.push(key.clone());
        Ok(key)
    }

    async fn create_usage_plan_key(
        &self,
        usage_plan_id: &str,
        key_id: &str,
        _key_type: &str,
    ) -> ClientResult<()> {
        if self.fail_attach {
            return Err(unavailable("usage plan"));
        }
        self.attached
            .lock()
            .unwrap()
            .push((usage_plan_id.to_string(), key_id.to_string()));
        Ok(())
    }

    async fn validate_api_key(&self, value: &str) -> ClientResult<bool> {
        Ok(self.valid_values.lock().unwrap().contains(value))
    }
}

#[derive(Default)]
pub struct FakeMailer {
    pub sent: Mutex<Vec<EmailMessage>>,
}

#[async_trait]
impl Mailer for FakeMailer {
    async fn send_email(&self, message: &EmailMessage) -> ClientResult<String> {
        let mut sent = self.sent.lock().unwrap();
        sent.push(message.clone());
        Ok(format!("mail-{}", sent.len()))
    }
}
