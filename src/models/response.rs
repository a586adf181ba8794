//! Status/body envelope returned by the request/response handlers.

use axum::{
    Json,
    http::{HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::{Value, json};
use std::collections::BTreeMap;

/// A structured handler result: never a bare failure.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct HandlerResponse {
    #[serde(rename = "statusCode")]
    pub status_code: u16,

    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,

    pub body: Value,
}

impl HandlerResponse {
    pub fn new(status_code: u16, body: Value) -> Self {
        Self {
            status_code,
            headers: BTreeMap::new(),
            body,
        }
    }

    pub fn error(status_code: u16, message: impl Into<String>) -> Self {
        Self::new(status_code, json!({ "error": message.into() }))
    }

    pub fn message(status_code: u16, message: impl Into<String>) -> Self {
        Self::new(status_code, json!({ "message": message.into() }))
    }

    pub fn with_json_content_type(mut self) -> Self {
        self.headers
            .insert("Content-Type".to_string(), "application/json".to_string());
        self
    }
}

impl IntoResponse for HandlerResponse {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut response = (status, Json(self.body)).into_response();
        for (name, value) in &self.headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::try_from(name.as_str()),
                HeaderValue::from_str(value),
            ) {
                response.headers_mut().insert(name, value);
            }
        }
        response
    }
}
