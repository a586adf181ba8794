//! Metadata lookup by file name. Read-only.

use serde_json::json;
use tracing::error;

use crate::{models::response::HandlerResponse, services::clients::MetadataTable};

pub async fn query_metadata(table: &dyn MetadataTable, file_name: Option<&str>) -> HandlerResponse {
    let Some(file_name) = file_name.filter(|name| !name.is_empty()) else {
        return HandlerResponse::error(400, "File name is required").with_json_content_type();
    };

    let response = match table.get_record(file_name).await {
        Ok(Some(record)) => HandlerResponse::new(200, json!(record)),
        Ok(None) => HandlerResponse::error(404, "File not found"),
        Err(err) => {
            error!(file_name, "metadata lookup failed: {}", err);
            HandlerResponse::error(500, format!("Internal server error: {}", err))
        }
    };
    response.with_json_content_type()
}
