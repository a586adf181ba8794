//! Storage-upload notifications and the queue messages that wrap them.
//!
//! The JSON shapes mirror what an S3-style bucket notification and an
//! SQS-style delivery batch look like on the wire, so the same handlers can be
//! fed by the local pipeline or by a real event source.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;

/// A batch of storage-upload notifications.
///
/// Records stay raw until they are handled so one malformed record cannot
/// reject its siblings.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct StorageEvent {
    #[serde(rename = "Records", default)]
    pub records: Vec<Value>,
}

/// One object notification inside a [`StorageEvent`].
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct StorageEventRecord {
    pub s3: StorageEntity,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct StorageEntity {
    pub bucket: BucketEntity,
    pub object: ObjectEntity,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct BucketEntity {
    pub name: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ObjectEntity {
    /// Object key as delivered; may be URL-encoded (`+` for spaces).
    pub key: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,
}

/// A decoded upload: bucket plus the exact object key as stored.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct UploadEvent {
    pub bucket: String,
    pub key: String,
}

impl StorageEvent {
    /// Build a single-record notification for an object that was just written.
    pub fn single(bucket: &str, key: &str, size: Option<i64>) -> Self {
        let mut object = json!({ "key": encode_object_key(key) });
        if let Some(size) = size {
            object["size"] = json!(size);
        }
        Self {
            records: vec![json!({ "s3": { "bucket": { "name": bucket }, "object": object } })],
        }
    }
}

impl StorageEventRecord {
    /// Decode one raw record of a [`StorageEvent`].
    pub fn from_value(raw: &Value) -> Result<Self, serde_json::Error> {
        Self::deserialize(raw)
    }

    /// The upload this record describes, with the object key decoded.
    pub fn upload_event(&self) -> UploadEvent {
        UploadEvent {
            bucket: self.s3.bucket.name.clone(),
            key: decode_object_key(&self.s3.object.key),
        }
    }
}

/// Encode a key the way storage notifications do: each path segment is
/// percent-encoded, slashes are kept, and spaces become `+`.
pub fn encode_object_key(key: &str) -> String {
    key.split('/')
        .map(|segment| urlencoding::encode(segment).replace("%20", "+"))
        .collect::<Vec<_>>()
        .join("/")
}

/// Decode an event object key the way storage notifications encode it:
/// `+` stands for a space and everything else is percent-encoded.
///
/// Invalid UTF-8 sequences are replaced rather than rejected.
pub fn decode_object_key(raw: &str) -> String {
    let plus_decoded = raw.replace('+', " ");
    let bytes = urlencoding::decode_binary(plus_decoded.as_bytes());
    String::from_utf8_lossy(&bytes).into_owned()
}

/// A batch of messages delivered from the conversion queue.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct QueueEvent {
    #[serde(rename = "Records", default)]
    pub records: Vec<Value>,
}

impl QueueEvent {
    /// Every record as a delivery; fields the record lacks are left empty.
    pub fn deliveries(&self) -> Vec<QueueDelivery> {
        self.records.iter().map(QueueDelivery::from_record).collect()
    }
}

/// A single queue delivery. The receipt handle is what deletion consumes.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct QueueMessage {
    #[serde(rename = "messageId", default)]
    pub message_id: String,

    #[serde(rename = "receiptHandle")]
    pub receipt_handle: String,

    pub body: String,
}

/// A message as handed to the dispatcher. Event-source batches may lack a
/// receipt handle or a body; messages received from the queue never do.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QueueDelivery {
    pub message_id: String,
    pub receipt_handle: Option<String>,
    pub body: Option<String>,
}

impl QueueDelivery {
    fn from_record(record: &Value) -> Self {
        let field = |name: &str| record.get(name).and_then(Value::as_str).map(str::to_string);
        Self {
            message_id: field("messageId").unwrap_or_default(),
            receipt_handle: field("receiptHandle"),
            body: field("body"),
        }
    }
}

impl From<QueueMessage> for QueueDelivery {
    fn from(message: QueueMessage) -> Self {
        Self {
            message_id: message.message_id,
            receipt_handle: Some(message.receipt_handle),
            body: Some(message.body),
        }
    }
}

/// Why a queue message body could not be turned into an [`UploadEvent`].
#[derive(Debug, Error)]
pub enum MessageBodyError {
    #[error("message body is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("message body is not a storage event: {0}")]
    InvalidShape(&'static str),
}

impl MessageBodyError {
    /// Shape mismatches are skipped quietly; everything else is a processing error.
    pub fn is_shape_mismatch(&self) -> bool {
        matches!(self, MessageBodyError::InvalidShape(_))
    }
}

/// Parse the storage event embedded in a queue message body.
///
/// Only the first record of the embedded event is used, one conversion per
/// message.
pub fn upload_from_message_body(body: &str) -> Result<UploadEvent, MessageBodyError> {
    let value: Value = serde_json::from_str(body)?;

    let first = value
        .get("Records")
        .and_then(Value::as_array)
        .and_then(|records| records.first())
        .ok_or(MessageBodyError::InvalidShape("missing `Records`"))?;

    let s3 = first
        .get("s3")
        .ok_or(MessageBodyError::InvalidShape("missing `Records[0].s3`"))?;

    let bucket = s3
        .pointer("/bucket/name")
        .and_then(Value::as_str)
        .ok_or(MessageBodyError::InvalidShape("missing `s3.bucket.name`"))?;
    let key = s3
        .pointer("/object/key")
        .and_then(Value::as_str)
        .ok_or(MessageBodyError::InvalidShape("missing `s3.object.key`"))?;

    Ok(UploadEvent {
        bucket: bucket.to_string(),
        key: decode_object_key(key),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_plus_and_percent_sequences() {
        assert_eq!(decode_object_key("reports/Q1+summary.docx"), "reports/Q1 summary.docx");
        assert_eq!(decode_object_key("a%2Bb%20c.docx"), "a+b c.docx");
        assert_eq!(decode_object_key("plain/key.docx"), "plain/key.docx");
    }

    #[test]
    fn encoding_keeps_slashes_and_uses_plus_for_spaces() {
        assert_eq!(encode_object_key("my docs/q1+q2.docx"), "my+docs/q1%2Bq2.docx");
    }

    #[test]
    fn single_event_round_trips_to_the_original_key() {
        let event = StorageEvent::single("uploads", "my docs/q1+q2.docx", Some(42));
        let upload = StorageEventRecord::from_value(&event.records[0])
            .unwrap()
            .upload_event();
        assert_eq!(upload.key, "my docs/q1+q2.docx");
        assert_eq!(upload.bucket, "uploads");
    }

    #[test]
    fn parses_embedded_storage_event() {
        let body = r#"{"Records":[{"s3":{"bucket":{"name":"in"},"object":{"key":"reports/q1+final.docx"}}}]}"#;
        let upload = upload_from_message_body(body).unwrap();
        assert_eq!(
            upload,
            UploadEvent {
                bucket: "in".into(),
                key: "reports/q1 final.docx".into()
            }
        );
    }

    #[test]
    fn test_event_without_records_is_a_shape_mismatch() {
        // Bucket notification configuration sends this when it is first attached.
        let body = r#"{"Service":"Amazon S3","Event":"s3:TestEvent","Bucket":"in"}"#;
        let err = upload_from_message_body(body).unwrap_err();
        assert!(err.is_shape_mismatch());
    }

    #[test]
    fn record_without_s3_section_is_a_shape_mismatch() {
        let err = upload_from_message_body(r#"{"Records":[{"eventName":"x"}]}"#).unwrap_err();
        assert!(err.is_shape_mismatch());

        let err = upload_from_message_body(r#"{"Records":[]}"#).unwrap_err();
        assert!(err.is_shape_mismatch());
    }

    #[test]
    fn garbage_body_is_a_json_error() {
        let err = upload_from_message_body("not json").unwrap_err();
        assert!(!err.is_shape_mismatch());
    }

    #[test]
    fn queue_batch_uses_wire_field_names() {
        let raw = r#"{"Records":[{"messageId":"m1","receiptHandle":"r1","body":"{}"}]}"#;
        let event: QueueEvent = serde_json::from_str(raw).unwrap();
        let deliveries = event.deliveries();
        assert_eq!(deliveries[0].receipt_handle.as_deref(), Some("r1"));
        assert_eq!(deliveries[0].message_id, "m1");
        assert_eq!(deliveries[0].body.as_deref(), Some("{}"));
    }

    #[test]
    fn incomplete_queue_records_still_become_deliveries() {
        let raw = r#"{"Records":[{"messageId":"m1","body":"{}"},{"receiptHandle":"r2"},"junk"]}"#;
        let event: QueueEvent = serde_json::from_str(raw).unwrap();
        let deliveries = event.deliveries();
        assert_eq!(deliveries.len(), 3);
        assert_eq!(deliveries[0].receipt_handle, None);
        assert_eq!(deliveries[1].body, None);
        assert_eq!(deliveries[2], QueueDelivery::default());
    }

    #[test]
    fn record_without_s3_section_does_not_decode() {
        let raw = json!({ "eventName": "ObjectCreated:Put" });
        assert!(StorageEventRecord::from_value(&raw).is_err());
    }
}
