//! docpipe: document upload, metadata and conversion pipeline.
//!
//! The `docpipe` binary runs the HTTP service (`serve`), a single conversion
//! task (`convert`), or the schema migration (`migrate`).

pub mod config;
pub mod db;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
