//! src/services/storage_service.rs
//!
//! LocalObjectStore: object storage backed by SQLite for metadata and local
//! disk for payloads sharded beneath `base_path/{bucket}/{shard}/{shard}/{key}`.
//! Buckets come into existence on first write.

use crate::{
    models::object::StoredObject,
    services::clients::{ByteStream, ClientError, ClientResult, ObjectStore},
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use futures::{Stream, StreamExt, pin_mut, stream};
use md5::Context;
use sqlx::SqlitePool;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tokio_util::io::ReaderStream;
use tracing::debug;
use uuid::Uuid;

const MAX_OBJECT_KEY_LEN: usize = 1024;
const BUCKET_NAME_MIN_LEN: usize = 3;
const BUCKET_NAME_MAX_LEN: usize = 63;

/// Disk + SQLite object store.
#[derive(Clone)]
pub struct LocalObjectStore {
    /// Shared SQLite connection pool used for metadata operations.
    pub db: Arc<SqlitePool>,

    /// Base directory on disk where object payloads are stored.
    pub base_path: PathBuf,
}

impl LocalObjectStore {
    pub fn new(db: Arc<SqlitePool>, base_path: impl Into<PathBuf>) -> Self {
        Self {
            db,
            base_path: base_path.into(),
        }
    }

    /// Rejects empty or oversized keys, absolute keys, `..` segments and
    /// control characters.
    fn ensure_key_safe(&self, key: &str) -> ClientResult<()> {
        if key.is_empty() || key.len() > MAX_OBJECT_KEY_LEN {
            return Err(ClientError::InvalidObjectKey);
        }
        if key.starts_with('/') || key.split('/').any(|segment| segment == "..") {
            return Err(ClientError::InvalidObjectKey);
        }
        if key
            .bytes()
            .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0')
        {
            return Err(ClientError::InvalidObjectKey);
        }
        Ok(())
    }

    /// S3-like naming rules: 3–63 characters of lowercase letters, digits,
    /// dots and hyphens, alphanumeric at both ends, no `..`/`-.`/`.-`, and not
    /// shaped like an IPv4 address.
    fn ensure_bucket_name_safe(&self, name: &str) -> ClientResult<()> {
        let invalid = |reason: &str| ClientError::InvalidBucketName {
            name: name.to_string(),
            reason: reason.to_string(),
        };

        let len = name.len();
        if !(BUCKET_NAME_MIN_LEN..=BUCKET_NAME_MAX_LEN).contains(&len) {
            return Err(invalid("must be between 3 and 63 characters"));
        }

        if !name
            .chars()
            .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '.' | '-'))
        {
            return Err(invalid(
                "allowed characters are lowercase letters, digits, dots, and hyphens",
            ));
        }

        if name.starts_with(['.', '-']) || name.ends_with(['.', '-']) {
            return Err(invalid("must start and end with a lowercase letter or digit"));
        }

        if name.contains("..") || name.contains("-.") || name.contains(".-") {
            return Err(invalid(
                "cannot contain consecutive dots or dot-hyphen combinations",
            ));
        }

        if is_ipv4_like(name) {
            return Err(invalid("must not be formatted like an IP address"));
        }

        Ok(())
    }

    fn bucket_root(&self, bucket_name: &str) -> PathBuf {
        self.base_path.join(bucket_name)
    }

    /// First two bytes of MD5(bucket/key) as lowercase hex.
    fn object_shards(bucket_name: &str, key: &str) -> (String, String) {
        let digest = md5::compute(format!("{}/{}", bucket_name, key));
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    fn object_path(&self, bucket_name: &str, key: &str) -> PathBuf {
        let (shard_a, shard_b) = Self::object_shards(bucket_name, key);
        let mut path = self.bucket_root(bucket_name);
        path.push(shard_a);
        path.push(shard_b);
        path.push(key);
        path
    }

    fn validate(&self, bucket: &str, key: &str) -> ClientResult<()> {
        self.ensure_bucket_name_safe(bucket)?;
        self.ensure_key_safe(key)
    }

    async fn fetch_object(&self, bucket: &str, key: &str) -> ClientResult<StoredObject> {
        sqlx::query_as::<_, StoredObject>(
            "SELECT bucket_name, key, content_type, size_bytes, etag, last_modified
             FROM objects
             WHERE bucket_name = ? AND key = ?",
        )
        .bind(bucket)
        .bind(key)
        .fetch_optional(&*self.db)
        .await?
        .ok_or_else(|| ClientError::ObjectNotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        })
    }

    fn missing_payload(bucket: &str, key: &str, err: io::Error) -> ClientError {
        if err.kind() == ErrorKind::NotFound {
            ClientError::ObjectNotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            }
        } else {
            ClientError::Io(err)
        }
    }

    /// Stream a payload to disk and upsert its metadata row.
    ///
    /// Bytes go to a temp file first, MD5 and size are computed on the way,
    /// and the file is fsynced and renamed into place. Overwrites replace the
    /// previous payload and row.
    async fn write_stream<S>(
        &self,
        bucket: &str,
        key: &str,
        content_type: Option<String>,
        stream: S,
    ) -> ClientResult<StoredObject>
    where
        S: Stream<Item = io::Result<Bytes>> + Send,
    {
        self.validate(bucket, key)?;

        let file_path = self.object_path(bucket, key);
        let parent = file_path
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| io::Error::other("object path missing parent directory"))?;
        fs::create_dir_all(&parent).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        let mut file = File::create(&tmp_path).await?;

        let mut size_bytes: i64 = 0;
        let mut digest = Context::new();
        pin_mut!(stream);
        while let Some(chunk_res) = stream.next().await {
            let chunk = match chunk_res {
                Ok(chunk) => chunk,
                Err(err) => {
                    let _ = fs::remove_file(&tmp_path).await;
                    return Err(ClientError::Io(err));
                }
            };
            size_bytes += chunk.len() as i64;
            digest.consume(&chunk);
            if let Err(err) = file.write_all(&chunk).await {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(ClientError::Io(err));
            }
        }
        if let Err(err) = file.flush().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(ClientError::Io(err));
        }
        if let Err(err) = file.sync_all().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(ClientError::Io(err));
        }
        drop(file);

        if let Err(err) = fs::rename(&tmp_path, &file_path).await {
            if err.kind() == ErrorKind::AlreadyExists {
                fs::remove_file(&file_path).await?;
                fs::rename(&tmp_path, &file_path).await?;
            } else {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(ClientError::Io(err));
            }
        }

        let etag = format!("{:x}", digest.compute());
        let insert_result = sqlx::query_as::<_, StoredObject>(
            r#"
            INSERT INTO objects (bucket_name, key, content_type, size_bytes, etag, last_modified)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(bucket_name, key) DO UPDATE SET
                content_type = excluded.content_type,
                size_bytes = excluded.size_bytes,
                etag = excluded.etag,
                last_modified = excluded.last_modified
            RETURNING bucket_name, key, content_type, size_bytes, etag, last_modified
            "#,
        )
        .bind(bucket)
        .bind(key)
        .bind(content_type)
        .bind(size_bytes)
        .bind(&etag)
        .bind(Utc::now())
        .fetch_one(&*self.db)
        .await;

        match insert_result {
            Ok(obj) => {
                debug!("stored {} bytes at {}", obj.size_bytes, file_path.display());
                Ok(obj)
            }
            Err(err) => {
                let _ = fs::remove_file(&file_path).await;
                Err(ClientError::Sqlx(err))
            }
        }
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        content_type: Option<String>,
        body: Bytes,
    ) -> ClientResult<StoredObject> {
        let chunks = stream::once(async move { Ok::<_, io::Error>(body) });
        self.write_stream(bucket, key, content_type, chunks).await
    }

    async fn put_object_stream(
        &self,
        bucket: &str,
        key: &str,
        content_type: Option<String>,
        body: ByteStream,
    ) -> ClientResult<StoredObject> {
        self.write_stream(bucket, key, content_type, body).await
    }

    async fn head_object(&self, bucket: &str, key: &str) -> ClientResult<StoredObject> {
        self.validate(bucket, key)?;
        self.fetch_object(bucket, key).await
    }

    async fn get_object(&self, bucket: &str, key: &str) -> ClientResult<(StoredObject, ByteStream)> {
        self.validate(bucket, key)?;
        let object = self.fetch_object(bucket, key).await?;
        let file = File::open(self.object_path(bucket, key))
            .await
            .map_err(|err| Self::missing_payload(bucket, key, err))?;
        Ok((object, ReaderStream::new(file).boxed()))
    }

    async fn download_to(&self, bucket: &str, key: &str, dest: &Path) -> ClientResult<()> {
        self.validate(bucket, key)?;
        self.fetch_object(bucket, key).await?;
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::copy(self.object_path(bucket, key), dest)
            .await
            .map_err(|err| Self::missing_payload(bucket, key, err))?;
        Ok(())
    }

    async fn upload_from(
        &self,
        src: &Path,
        bucket: &str,
        key: &str,
        content_type: Option<String>,
    ) -> ClientResult<StoredObject> {
        let file = File::open(src).await?;
        self.write_stream(bucket, key, content_type, ReaderStream::new(file))
            .await
    }
}

/// Check if a string matches IPv4-like dotted decimal form.
fn is_ipv4_like(name: &str) -> bool {
    let parts: Vec<&str> = name.split('.').collect();
    parts.len() == 4
        && parts.iter().all(|segment| {
            !segment.is_empty()
                && segment.len() <= 3
                && segment.chars().all(|c| c.is_ascii_digit())
                && segment.parse::<u8>().is_ok()
        })
}
