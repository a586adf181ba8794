//! API gateway key store: keys, usage-plan attachments and validation.

use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    models::api_key::CreatedApiKey,
    services::clients::{ClientError, ClientResult, KeyGateway},
};

const KEY_PREFIX: &str = "dpk_";
const KEY_SECRET_LEN: usize = 32;
const STORED_PREFIX_LEN: usize = 12;

#[derive(Clone)]
pub struct SqliteKeyGateway {
    db: Arc<SqlitePool>,
}

impl SqliteKeyGateway {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    fn generate_secret(length: usize) -> String {
        const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
        let mut rng = rand::thread_rng();
        (0..length)
            .map(|_| {
                let idx = rng.gen_range(0..CHARSET.len());
                CHARSET[idx] as char
            })
            .collect()
    }

    fn hash_secret(secret: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(secret.as_bytes());
        hex::encode(hasher.finalize())
    }
}

#[async_trait]
impl KeyGateway for SqliteKeyGateway {
    async fn create_api_key(&self, name: &str, enabled: bool) -> ClientResult<CreatedApiKey> {
        let id = Uuid::new_v4().simple().to_string();
        let value = format!("{}{}", KEY_PREFIX, Self::generate_secret(KEY_SECRET_LEN));
        let key_prefix: String = value.chars().take(STORED_PREFIX_LEN).collect();

        sqlx::query(
            "INSERT INTO api_keys (id, name, key_hash, key_prefix, enabled, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(name)
        .bind(Self::hash_secret(&value))
        .bind(&key_prefix)
        .bind(enabled)
        .bind(Utc::now())
        .execute(&*self.db)
        .await?;

        Ok(CreatedApiKey {
            id,
            name: name.to_string(),
            value,
            enabled,
        })
    }

    async fn create_usage_plan_key(
        &self,
        usage_plan_id: &str,
        key_id: &str,
        key_type: &str,
    ) -> ClientResult<()> {
        let exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM api_keys WHERE id = ?")
            .bind(key_id)
            .fetch_optional(&*self.db)
            .await?;
        if exists.is_none() {
            return Err(ClientError::ApiKeyNotFound(key_id.to_string()));
        }

        sqlx::query(
            "INSERT OR IGNORE INTO usage_plan_keys (usage_plan_id, key_id, key_type, created_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(usage_plan_id)
        .bind(key_id)
        .bind(key_type)
        .bind(Utc::now())
        .execute(&*self.db)
        .await?;
        Ok(())
    }

    async fn validate_api_key(&self, value: &str) -> ClientResult<bool> {
        let found: Option<i64> = sqlx::query_scalar(
            "SELECT 1 FROM api_keys k
             JOIN usage_plan_keys u ON u.key_id = k.id
             WHERE k.key_hash = ? AND k.enabled = 1
             LIMIT 1",
        )
        .bind(Self::hash_secret(value))
        .fetch_optional(&*self.db)
        .await?;
        Ok(found.is_some())
    }
}
