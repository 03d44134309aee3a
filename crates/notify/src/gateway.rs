//! AlimTalk gateway client.
//!
//! [`AlimTalkClient`] sends exactly one templated message per call as a
//! form-encoded `POST {base_url}/send`. Every outcome, including transport
//! failures, is folded into a [`SendResult`] so the caller can decide
//! between retry and terminal failure from a single value.

use std::time::Duration;

use academy_db::models::queue::TemplateVariables;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::GatewayConfig;

/// HTTP request timeout for a single send.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest error body excerpt kept in `error_message`.
const MAX_ERROR_BODY_CHARS: usize = 200;

pub const API_KEY_ENV: &str = "ALIMTALK_API_KEY";
pub const USER_ID_ENV: &str = "ALIMTALK_USER_ID";

pub const ERROR_TRANSPORT: &str = "TRANSPORT_ERROR";
pub const ERROR_MISSING_CREDENTIALS: &str = "CONFIG_MISSING_CREDENTIALS";
pub const ERROR_INVALID_RESPONSE: &str = "INVALID_RESPONSE";
pub const ERROR_INVALID_REQUEST: &str = "INVALID_REQUEST";
pub const ERROR_INVALID_RECIPIENT: &str = "INVALID_RECIPIENT";

// ---------------------------------------------------------------------------
// Request / result
// ---------------------------------------------------------------------------

/// One message to one recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendRequest {
    pub sender_key: String,
    pub template_code: String,
    /// Digits only.
    pub recipient_phone: String,
    pub variables: TemplateVariables,
}

/// Outcome of one send attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SendResult {
    pub success: bool,
    pub provider_message_id: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    /// Only meaningful when `success` is false.
    pub retryable: bool,
}

impl SendResult {
    pub fn sent(provider_message_id: Option<String>) -> Self {
        Self {
            success: true,
            provider_message_id,
            error_code: None,
            error_message: None,
            retryable: false,
        }
    }

    pub fn failure(code: impl Into<String>, message: impl Into<String>, retryable: bool) -> Self {
        Self {
            success: false,
            provider_message_id: None,
            error_code: Some(code.into()),
            error_message: Some(message.into()),
            retryable,
        }
    }
}

/// Anything that can deliver a [`SendRequest`].
#[async_trait]
pub trait MessageGateway: Send + Sync {
    async fn send(&self, request: &SendRequest) -> SendResult;
}

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub api_key: String,
    pub user_id: String,
}

/// Where the client finds provider credentials.
#[derive(Debug, Clone)]
pub enum CredentialSource {
    /// Read `ALIMTALK_API_KEY` / `ALIMTALK_USER_ID` on every send so a
    /// rotated secret takes effect without a restart.
    Env,
    Fixed(Credentials),
}

impl CredentialSource {
    pub fn resolve(&self) -> Option<Credentials> {
        match self {
            Self::Env => {
                let api_key = non_empty_env(API_KEY_ENV)?;
                let user_id = non_empty_env(USER_ID_ENV)?;
                Some(Credentials { api_key, user_id })
            }
            Self::Fixed(creds) => {
                if creds.api_key.is_empty() || creds.user_id.is_empty() {
                    None
                } else {
                    Some(creds.clone())
                }
            }
        }
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

// ---------------------------------------------------------------------------
// AlimTalkClient
// ---------------------------------------------------------------------------

pub struct AlimTalkClient {
    client: reqwest::Client,
    base_url: String,
    retryable_codes: Vec<i64>,
    credentials: CredentialSource,
}

impl AlimTalkClient {
    /// Build a client reading credentials from the environment.
    pub fn new(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            retryable_codes: config.retryable_codes.clone(),
            credentials: CredentialSource::Env,
        })
    }

    pub fn with_credentials(mut self, credentials: CredentialSource) -> Self {
        self.credentials = credentials;
        self
    }

    fn send_url(&self) -> String {
        format!("{}/send", self.base_url)
    }
}

#[async_trait]
impl MessageGateway for AlimTalkClient {
    async fn send(&self, request: &SendRequest) -> SendResult {
        let Some(creds) = self.credentials.resolve() else {
            tracing::error!("AlimTalk credentials are not configured");
            return SendResult::failure(
                ERROR_MISSING_CREDENTIALS,
                format!("{API_KEY_ENV} and {USER_ID_ENV} must be set"),
                false,
            );
        };

        let variables = match serde_json::to_string(&request.variables) {
            Ok(v) => v,
            Err(e) => return SendResult::failure(ERROR_INVALID_REQUEST, e.to_string(), false),
        };

        let form = [
            ("apikey", creds.api_key.as_str()),
            ("userid", creds.user_id.as_str()),
            ("senderkey", request.sender_key.as_str()),
            ("tpl_code", request.template_code.as_str()),
            ("receiver_1", request.recipient_phone.as_str()),
            ("variables_1", variables.as_str()),
            ("failover", "N"),
        ];

        let response = match self.client.post(self.send_url()).form(&form).send().await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(
                    template_code = %request.template_code,
                    error = %e,
                    "AlimTalk request failed"
                );
                return SendResult::failure(ERROR_TRANSPORT, e.to_string(), true);
            }
        };

        let status = response.status().as_u16();
        let body = match response.text().await {
            Ok(b) => b,
            Err(e) => return SendResult::failure(ERROR_TRANSPORT, e.to_string(), true),
        };

        let result = interpret_response(status, &body, &self.retryable_codes);
        if let Some(code) = &result.error_code {
            tracing::warn!(
                http_status = status,
                error_code = %code,
                retryable = result.retryable,
                "AlimTalk send rejected"
            );
        }
        result
    }
}

// ---------------------------------------------------------------------------
// Response interpretation
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ProviderResponse {
    code: serde_json::Value,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    info: Option<ProviderInfo>,
}

#[derive(Debug, Deserialize)]
struct ProviderInfo {
    #[serde(default)]
    mid: Option<serde_json::Value>,
}

/// Provider codes arrive as numbers or numeric strings.
fn provider_code(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn value_to_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn excerpt(body: &str) -> String {
    body.chars().take(MAX_ERROR_BODY_CHARS).collect()
}

/// Map an HTTP status and body to a [`SendResult`].
///
/// - non-2xx: `HTTP_<status>`, retryable for 408, 429 and 5xx.
/// - 2xx, unparseable: `INVALID_RESPONSE`, retryable.
/// - 2xx, provider code 0: success, `info.mid` as the message id.
/// - 2xx, other code: `PROVIDER_<code>`, retryable only if listed.
pub fn interpret_response(status: u16, body: &str, retryable_codes: &[i64]) -> SendResult {
    if !(200..300).contains(&status) {
        let retryable = status == 408 || status == 429 || status >= 500;
        return SendResult::failure(format!("HTTP_{status}"), excerpt(body), retryable);
    }

    let parsed: ProviderResponse = match serde_json::from_str(body) {
        Ok(p) => p,
        Err(e) => {
            return SendResult::failure(
                ERROR_INVALID_RESPONSE,
                format!("Unparseable provider response: {e}"),
                true,
            )
        }
    };

    let Some(code) = provider_code(&parsed.code) else {
        return SendResult::failure(
            ERROR_INVALID_RESPONSE,
            format!("Provider code is not numeric: {}", parsed.code),
            true,
        );
    };

    if code == 0 {
        let mid = parsed
            .info
            .and_then(|info| info.mid)
            .as_ref()
            .and_then(value_to_string);
        return SendResult::sent(mid);
    }

    SendResult::failure(
        format!("PROVIDER_{code}"),
        parsed.message.unwrap_or_default(),
        retryable_codes.contains(&code),
    )
}
