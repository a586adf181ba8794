//! Outbound email written to the `outbound_emails` outbox table.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use std::sync::Arc;
use uuid::Uuid;

use crate::services::clients::{ClientResult, EmailMessage, Mailer};

#[derive(Clone)]
pub struct OutboxMailer {
    db: Arc<SqlitePool>,
}

impl OutboxMailer {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Mailer for OutboxMailer {
    async fn send_email(&self, message: &EmailMessage) -> ClientResult<String> {
        let id = Uuid::new_v4().to_string();
        sqlx::query(
            "INSERT INTO outbound_emails (id, source, destination, subject, body, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&message.source)
        .bind(message.to.join(","))
        .bind(&message.subject)
        .bind(&message.body)
        .bind(Utc::now())
        .execute(&*self.db)
        .await?;
        Ok(id)
    }
}
