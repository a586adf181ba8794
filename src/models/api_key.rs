//! API keys handed out to users of the conversion service.

use serde::{Deserialize, Serialize};

/// Body accepted by the key issuer.
#[derive(Deserialize, Debug, Default)]
pub struct ApiKeyRequest {
    #[serde(default)]
    pub email: Option<String>,
}

/// A key as the gateway returns it right after creation. The value is only
/// ever visible here; the gateway keeps a digest.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct CreatedApiKey {
    pub id: String,
    pub name: String,
    pub value: String,
    pub enabled: bool,
}

/// Everything the issuer knows about a key it handed out.
#[derive(Serialize, Clone, Debug)]
pub struct ApiKeyRecord {
    pub key_id: String,
    #[serde(skip_serializing)]
    pub key_value: String,
    pub owner_email: String,
    pub usage_plan_id: Option<String>,
}

/// Key type used when attaching to a usage plan.
pub const KEY_TYPE_API_KEY: &str = "API_KEY";
