//! API key issuer: create a key, attach it to the usage plan, mail it out.
//!
//! Steps are not rolled back. A key whose attachment fails stays created but
//! never validates, since validation requires a usage-plan attachment.

use tracing::{error, info};

use crate::{
    models::{
        api_key::{ApiKeyRecord, ApiKeyRequest, KEY_TYPE_API_KEY},
        response::HandlerResponse,
    },
    services::clients::{ClientResult, EmailMessage, KeyGateway, Mailer},
};

pub const EMAIL_SUBJECT: &str = "Your API Key";
pub const API_KEY_HEADER: &str = "x-api-key";

#[derive(Clone, Debug)]
pub struct IssuerSettings {
    pub usage_plan_id: String,
    pub sender_email: String,
}

/// Handle one key request. `body` is the raw request body.
pub async fn issue_api_key(
    gateway: &dyn KeyGateway,
    mailer: &dyn Mailer,
    settings: &IssuerSettings,
    body: &str,
) -> HandlerResponse {
    let request: ApiKeyRequest = match serde_json::from_str(body) {
        Ok(request) => request,
        Err(err) => {
            error!("unreadable api key request: {}", err);
            return HandlerResponse::error(500, err.to_string());
        }
    };
    let Some(email) = requested_email(request) else {
        return HandlerResponse::error(400, "Email is required");
    };

    match issue(gateway, mailer, settings, &email).await {
        Ok(record) => {
            info!(
                key_id = %record.key_id,
                owner = %record.owner_email,
                usage_plan = record.usage_plan_id.as_deref().unwrap_or("-"),
                "issued api key"
            );
            HandlerResponse::message(200, "API Key sent to email")
        }
        Err(err) => {
            error!(owner = %email, "failed to issue api key: {}", err);
            HandlerResponse::error(500, err.to_string())
        }
    }
}

fn requested_email(request: ApiKeyRequest) -> Option<String> {
    request
        .email
        .map(|email| email.trim().to_string())
        .filter(|email| !email.is_empty())
}

async fn issue(
    gateway: &dyn KeyGateway,
    mailer: &dyn Mailer,
    settings: &IssuerSettings,
    email: &str,
) -> ClientResult<ApiKeyRecord> {
    let key = gateway
        .create_api_key(&format!("UserKey-{}", email), true)
        .await?;
    let mut record = ApiKeyRecord {
        key_id: key.id,
        key_value: key.value,
        owner_email: email.to_string(),
        usage_plan_id: None,
    };

    gateway
        .create_usage_plan_key(&settings.usage_plan_id, &record.key_id, KEY_TYPE_API_KEY)
        .await?;
    record.usage_plan_id = Some(settings.usage_plan_id.clone());

    mailer
        .send_email(&EmailMessage {
            source: settings.sender_email.clone(),
            to: vec![record.owner_email.clone()],
            subject: EMAIL_SUBJECT.to_string(),
            body: format!(
                "Your API key is: {}\n\nSend it in the `{}` header with every request.",
                record.key_value, API_KEY_HEADER
            ),
        })
        .await?;

    Ok(record)
}
