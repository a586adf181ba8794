//! The per-object metadata record kept in the key-value table.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Metadata captured for one uploaded object.
///
/// Keyed by `file_name`, which is always the decoded object key. A later
/// upload of the same key overwrites the whole record.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq, Eq)]
pub struct MetadataRecord {
    /// Object key exactly as stored (URL-decoded).
    pub file_name: String,

    /// Bucket the object was uploaded to.
    pub bucket_name: String,

    /// Size in bytes as reported by storage.
    pub size: i64,

    /// Content type (MIME type) as reported by storage.
    pub file_type: String,
}
