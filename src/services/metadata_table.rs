//! SQLite-backed key-value table for file metadata records.

use async_trait::async_trait;
use sqlx::SqlitePool;
use std::sync::Arc;

use crate::{
    models::metadata::MetadataRecord,
    services::clients::{ClientError, ClientResult, MetadataTable},
};

/// Default table name for metadata records.
pub const DEFAULT_TABLE: &str = "FileMetadata";

/// One row per file name in a table whose name is configurable.
#[derive(Clone)]
pub struct SqliteMetadataTable {
    db: Arc<SqlitePool>,
    table: String,
}

impl SqliteMetadataTable {
    /// Table names are interpolated into SQL, so only `[A-Za-z0-9_]` is allowed.
    pub fn new(db: Arc<SqlitePool>, table: impl Into<String>) -> ClientResult<Self> {
        let table = table.into();
        let valid = !table.is_empty()
            && !table.starts_with(|c: char| c.is_ascii_digit())
            && table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid {
            return Err(ClientError::InvalidTableName(table));
        }
        Ok(Self { db, table })
    }

    pub async fn ensure_table(&self) -> ClientResult<()> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                file_name   TEXT    PRIMARY KEY,
                bucket_name TEXT    NOT NULL,
                size        INTEGER NOT NULL,
                file_type   TEXT    NOT NULL
            )",
            self.table
        );
        sqlx::query(&sql).execute(&*self.db).await?;
        Ok(())
    }
}

#[async_trait]
impl MetadataTable for SqliteMetadataTable {
    async fn put_record(&self, record: &MetadataRecord) -> ClientResult<()> {
        let sql = format!(
            "INSERT OR REPLACE INTO {} (file_name, bucket_name, size, file_type)
             VALUES (?, ?, ?, ?)",
            self.table
        );
        sqlx::query(&sql)
            .bind(&record.file_name)
            .bind(&record.bucket_name)
            .bind(record.size)
            .bind(&record.file_type)
            .execute(&*self.db)
            .await?;
        Ok(())
    }

    async fn get_record(&self, file_name: &str) -> ClientResult<Option<MetadataRecord>> {
        let sql = format!(
            "SELECT file_name, bucket_name, size, file_type FROM {} WHERE file_name = ?",
            self.table
        );
        let record = sqlx::query_as::<_, MetadataRecord>(&sql)
            .bind(file_name)
            .fetch_optional(&*self.db)
            .await?;
        Ok(record)
    }
}
