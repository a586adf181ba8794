//! Notification publishers.
//!
//! Plain topic names land in the `notifications` table; `http(s)://` targets
//! receive a JSON POST.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;
use uuid::Uuid;

use crate::services::clients::{ClientError, ClientResult, Notifier};

/// Subject used for conversion-complete notifications.
pub const CONVERSION_SUBJECT: &str = "File Conversion Complete";

#[derive(Clone)]
pub struct OutboxNotifier {
    db: Arc<SqlitePool>,
}

impl OutboxNotifier {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Notifier for OutboxNotifier {
    async fn publish(&self, target: &str, subject: &str, message: &str) -> ClientResult<String> {
        let id = Uuid::new_v4().to_string();
        sqlx::query(
            "INSERT INTO notifications (id, topic, subject, message, published_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(target)
        .bind(subject)
        .bind(message)
        .bind(Utc::now())
        .execute(&*self.db)
        .await?;
        Ok(id)
    }
}

/// Body POSTed to webhook targets.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct WebhookPayload {
    pub message_id: String,
    pub topic: String,
    pub subject: String,
    pub message: String,
}

#[derive(Clone, Default)]
pub struct WebhookNotifier {
    http: reqwest::Client,
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn publish(&self, target: &str, subject: &str, message: &str) -> ClientResult<String> {
        let payload = WebhookPayload {
            message_id: Uuid::new_v4().to_string(),
            topic: target.to_string(),
            subject: subject.to_string(),
            message: message.to_string(),
        };

        let response = self.http.post(target).json(&payload).send().await?;
        if !response.status().is_success() {
            return Err(ClientError::PublishRejected {
                target: target.to_string(),
                status: response.status().as_u16(),
            });
        }
        Ok(payload.message_id)
    }
}

fn is_webhook(target: &str) -> bool {
    target.starts_with("http://") || target.starts_with("https://")
}

/// Pick the publisher for a notification target.
pub fn notifier_for(target: &str, db: Arc<SqlitePool>) -> Arc<dyn Notifier> {
    if is_webhook(target) {
        Arc::new(WebhookNotifier::default())
    } else {
        Arc::new(OutboxNotifier::new(db))
    }
}
