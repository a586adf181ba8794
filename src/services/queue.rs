//! SQLite-backed message queue with visibility timeouts.
//!
//! Receiving a message hides it and hands out a fresh receipt handle. If the
//! consumer does not delete it before the timeout lapses it becomes visible
//! again, which gives at-least-once delivery.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use std::{sync::Arc, time::Duration};
use uuid::Uuid;

use crate::{
    models::event::QueueMessage,
    services::clients::{ClientError, ClientResult, MessageQueue},
};

#[derive(Clone)]
pub struct SqliteQueue {
    db: Arc<SqlitePool>,
}

impl SqliteQueue {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }
}

/// Queue URLs name the queue in their last path segment.
pub fn queue_name(queue_url: &str) -> &str {
    queue_url
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(queue_url)
}

#[async_trait]
impl MessageQueue for SqliteQueue {
    async fn send_message(&self, queue: &str, body: &str) -> ClientResult<String> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().timestamp_millis();
        sqlx::query(
            "INSERT INTO queue_messages (id, queue_name, body, visible_at, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(queue_name(queue))
        .bind(body)
        .bind(now)
        .bind(now)
        .execute(&*self.db)
        .await?;
        Ok(id)
    }

    async fn receive_messages(
        &self,
        queue: &str,
        max: usize,
        visibility: Duration,
    ) -> ClientResult<Vec<QueueMessage>> {
        let now = Utc::now().timestamp_millis();
        let hidden_until = now + visibility.as_millis() as i64;

        let mut tx = self.db.begin().await?;
        let ids: Vec<String> = sqlx::query_scalar(
            "SELECT id FROM queue_messages
             WHERE queue_name = ? AND visible_at <= ?
             ORDER BY created_at ASC, rowid ASC
             LIMIT ?",
        )
        .bind(queue_name(queue))
        .bind(now)
        .bind(max as i64)
        .fetch_all(&mut *tx)
        .await?;

        let mut messages = Vec::with_capacity(ids.len());
        for id in ids {
            let receipt_handle = Uuid::new_v4().to_string();
            let body: String = sqlx::query_scalar(
                "UPDATE queue_messages
                 SET receipt_handle = ?, visible_at = ?, receive_count = receive_count + 1
                 WHERE id = ?
                 RETURNING body",
            )
            .bind(&receipt_handle)
            .bind(hidden_until)
            .bind(&id)
            .fetch_one(&mut *tx)
            .await?;

            messages.push(QueueMessage {
                message_id: id,
                receipt_handle,
                body,
            });
        }
        tx.commit().await?;

        Ok(messages)
    }

    async fn delete_message(&self, queue: &str, receipt_handle: &str) -> ClientResult<()> {
        let result =
            sqlx::query("DELETE FROM queue_messages WHERE queue_name = ? AND receipt_handle = ?")
                .bind(queue_name(queue))
                .bind(receipt_handle)
                .execute(&*self.db)
                .await?;

        if result.rows_affected() == 0 {
            return Err(ClientError::ReceiptHandleInvalid(receipt_handle.to_string()));
        }
        Ok(())
    }
}
