//! Metadata recorder: turns storage-upload notifications into metadata rows.
//!
//! Items are independent. A failure on one record is logged and reported in
//! the outcome while the rest of the batch carries on.

use serde_json::{Value, json};
use tracing::{error, info};

use crate::{
    models::{
        batch::BatchOutcome,
        event::{StorageEvent, StorageEventRecord, UploadEvent, decode_object_key},
        metadata::MetadataRecord,
        response::HandlerResponse,
    },
    services::clients::{ClientResult, MetadataTable, ObjectStore},
};

/// Failures keep the raw record so malformed input can be reported as delivered.
pub type RecorderOutcome = BatchOutcome<Value, MetadataRecord>;

/// Record metadata for every upload in `event`, one write per fetched object.
pub async fn record_batch(
    objects: &dyn ObjectStore,
    table: &dyn MetadataTable,
    event: &StorageEvent,
) -> RecorderOutcome {
    let mut outcome = RecorderOutcome::default();

    for raw in &event.records {
        let upload = match StorageEventRecord::from_value(raw) {
            Ok(record) => record.upload_event(),
            Err(err) => {
                error!("malformed storage event record: {}", err);
                outcome.push_failure(raw.clone(), format!("malformed record: {err}"));
                continue;
            }
        };
        match record_one(objects, table, &upload).await {
            Ok(stored) => {
                info!(bucket = %upload.bucket, key = %upload.key, size = stored.size, "recorded metadata");
                outcome.push_success(stored);
            }
            Err(err) => {
                error!(bucket = %upload.bucket, key = %upload.key, "failed to record metadata: {}", err);
                outcome.push_failure(raw.clone(), err);
            }
        }
    }

    outcome
}

async fn record_one(
    objects: &dyn ObjectStore,
    table: &dyn MetadataTable,
    upload: &UploadEvent,
) -> ClientResult<MetadataRecord> {
    let head = objects.head_object(&upload.bucket, &upload.key).await?;
    let record = MetadataRecord {
        file_name: upload.key.clone(),
        bucket_name: upload.bucket.clone(),
        size: head.size_bytes,
        file_type: head.content_type_or_default().to_string(),
    };
    table.put_record(&record).await?;
    Ok(record)
}

/// The batch always succeeds as a whole; per-item results go in `details`.
pub fn recorder_response(outcome: &RecorderOutcome) -> HandlerResponse {
    let processed: Vec<&str> = outcome
        .succeeded
        .iter()
        .map(|record| record.file_name.as_str())
        .collect();
    let failed: Vec<_> = outcome
        .failed
        .iter()
        .map(|(raw, error)| {
            let file_name = raw
                .pointer("/s3/object/key")
                .and_then(Value::as_str)
                .map(decode_object_key);
            let bucket_name = raw.pointer("/s3/bucket/name").and_then(Value::as_str);
            json!({
                "file_name": file_name,
                "bucket_name": bucket_name,
                "error": error,
            })
        })
        .collect();

    HandlerResponse::new(
        200,
        json!({
            "message": "File processed successfully!",
            "details": {
                "processed": processed,
                "failed": failed,
            }
        }),
    )
}
