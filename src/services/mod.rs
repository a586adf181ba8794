//! Pipeline services: the handlers' business logic, the service seams they
//! call through, and the local backends behind those seams.

pub mod clients;
pub mod convert;
pub mod dispatcher;
pub mod gateway;
pub mod key_issuer;
pub mod launcher;
pub mod mailer;
pub mod metadata_query;
pub mod metadata_table;
pub mod notifier;
pub mod queue;
pub mod recorder;
pub mod scanner;
pub mod storage_service;
pub mod worker;

#[cfg(test)]
pub(crate) mod fakes;
