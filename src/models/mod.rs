//! Core data models for the document-conversion pipeline.
//!
//! Event shapes arrive as JSON from the storage and queue layers; records and
//! requests flow between the handlers. Everything here serializes with `serde`
//! and the persisted types map to SQLite rows via `sqlx::FromRow`.

pub mod api_key;
pub mod batch;
pub mod conversion;
pub mod event;
pub mod metadata;
pub mod object;
pub mod response;
