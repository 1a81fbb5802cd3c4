//! Backend-assisted reconnection.
//!
//! Some deployments issue single-use credentials that cannot be replayed
//! from the persisted record after a reload. This seam lets the caller's
//! backend mint a fresh channel/credential pair: the controller posts the
//! stored channel id and receives new connect parameters.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Fixed path of the reconnect endpoint, relative to the configured HTTP
/// base address.
pub const RECONNECT_PATH: &str = "/api/v1/ai/reconnect";

/// Failures from the assist backend. Callers treat every variant as "report
/// failure, no side effects"; nothing here propagates as a panic or thrown
/// error.
#[derive(Debug, Error)]
pub enum AssistError {
    /// The request could not be sent or the response could not be read.
    #[error("assist request failed: {0}")]
    Http(String),

    /// The backend answered with a non-success status.
    #[error("assist request rejected: status {status}")]
    Status {
        /// HTTP status code.
        status: u16,
    },

    /// The response body was missing a required field.
    #[error("assist response missing `{field}`")]
    MissingField {
        /// Name of the absent field.
        field: &'static str,
    },
}

/// Fresh connect parameters minted by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssistGrant {
    /// Newly issued channel id.
    pub channel_id: String,

    /// Newly issued one-time credential.
    pub credential: String,

    /// Transport address to use, when the backend overrides the default.
    pub transport_address: Option<String>,

    /// Channel name to join, when the backend overrides the default.
    pub channel_name: Option<String>,
}

/// Capability for minting fresh connect parameters.
#[async_trait]
pub trait AssistBackend: Send + Sync {
    /// Ask the backend for a fresh credential for the given channel.
    async fn fresh_credential(&self, channel_id: &str) -> Result<AssistGrant, AssistError>;
}

/// Production assist backend speaking the HTTP wire contract.
///
/// POSTs `{"channel_id": …}` to `<base>/api/v1/ai/reconnect` and expects a
/// JSON body carrying `channel_id`, `ws_token`, and optionally `ws_url` and
/// `channel_name`.
pub struct HttpAssist {
    base_url: String,
    client: reqwest::Client,
}

impl HttpAssist {
    /// Create a backend against the given HTTP base address.
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self { base_url, client: reqwest::Client::new() }
    }
}

#[async_trait]
impl AssistBackend for HttpAssist {
    async fn fresh_credential(&self, channel_id: &str) -> Result<AssistGrant, AssistError> {
        let url = format!("{}{RECONNECT_PATH}", self.base_url);
        let body = serde_json::json!({ "channel_id": channel_id });

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AssistError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AssistError::Status { status: status.as_u16() });
        }

        let payload: Value =
            response.json().await.map_err(|e| AssistError::Http(e.to_string()))?;

        parse_grant(&payload)
    }
}

/// Extract a grant from the reconnect response body.
pub(crate) fn parse_grant(payload: &Value) -> Result<AssistGrant, AssistError> {
    let channel_id = required_str(payload, "channel_id")?;
    let credential = required_str(payload, "ws_token")?;

    Ok(AssistGrant {
        channel_id,
        credential,
        transport_address: optional_str(payload, "ws_url"),
        channel_name: optional_str(payload, "channel_name"),
    })
}

fn required_str(payload: &Value, field: &'static str) -> Result<String, AssistError> {
    payload
        .get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(ToOwned::to_owned)
        .ok_or(AssistError::MissingField { field })
}

fn optional_str(payload: &Value, field: &str) -> Option<String> {
    payload.get(field).and_then(Value::as_str).map(ToOwned::to_owned)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_full_grant() {
        let payload = json!({
            "channel_id": "chan-2",
            "ws_token": "fresh",
            "ws_url": "wss://other",
            "channel_name": "ai:custom",
        });

        let grant = parse_grant(&payload).unwrap();

        assert_eq!(grant.channel_id, "chan-2");
        assert_eq!(grant.credential, "fresh");
        assert_eq!(grant.transport_address.as_deref(), Some("wss://other"));
        assert_eq!(grant.channel_name.as_deref(), Some("ai:custom"));
    }

    #[test]
    fn missing_required_field_is_an_error() {
        let payload = json!({"channel_id": "chan-2"});
        assert!(matches!(
            parse_grant(&payload),
            Err(AssistError::MissingField { field: "ws_token" })
        ));

        let payload = json!({"ws_token": "t"});
        assert!(matches!(
            parse_grant(&payload),
            Err(AssistError::MissingField { field: "channel_id" })
        ));

        let payload = json!({"channel_id": "", "ws_token": "t"});
        assert!(matches!(
            parse_grant(&payload),
            Err(AssistError::MissingField { field: "channel_id" })
        ));
    }

    #[test]
    fn optional_fields_default_to_none() {
        let payload = json!({"channel_id": "c", "ws_token": "t"});
        let grant = parse_grant(&payload).unwrap();

        assert_eq!(grant.transport_address, None);
        assert_eq!(grant.channel_name, None);
    }

    #[test]
    fn base_url_trailing_slashes_are_normalized() {
        let assist = HttpAssist::new("https://api.example.com///");
        assert_eq!(assist.base_url, "https://api.example.com");
    }
}
