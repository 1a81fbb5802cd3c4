//! Session credential inspection.
//!
//! The credential-embedding deployment variant hands the client a compact,
//! dot-delimited, three-part credential whose middle segment is a base64url
//! JSON object carrying routing claims. This module extracts those claims and
//! checks expiry. It never verifies the signature - issuance and verification
//! are server-side concerns.
//!
//! Parsing is the one seam in the workspace that fails by returning an error
//! rather than emitting an event; the session controller catches it and
//! converts to its event-based error contract.

use base64::Engine as _;
use serde::Deserialize;
use thiserror::Error;

/// Ways a credential can fail structural inspection.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CredentialError {
    /// The credential string is empty or whitespace.
    #[error("credential is empty")]
    Empty,

    /// The credential does not have exactly three dot-separated segments.
    #[error("credential must have three dot-separated segments, got {segments}")]
    Segments {
        /// Number of segments actually present.
        segments: usize,
    },

    /// The claims segment is not valid base64url.
    #[error("credential claims are not valid base64url: {0}")]
    Base64(String),

    /// The decoded claims segment is not a valid JSON object.
    #[error("credential claims are not valid JSON: {0}")]
    Claims(String),

    /// A required routing claim is absent.
    #[error("credential is missing required claim `{claim}`")]
    MissingClaim {
        /// Name of the absent claim.
        claim: &'static str,
    },
}

/// Routing claims extracted from a credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialClaims {
    /// Identifier of the project/tenant the session routes through.
    pub routing_id: String,

    /// Logical channel this credential authorizes.
    pub channel_id: String,

    /// Topic to join once the transport is open. Synthesized from the routing
    /// and channel ids when the credential does not carry one.
    pub topic: String,

    /// Expiry as seconds since the Unix epoch. `None` means non-expiring.
    pub expires_at_secs: Option<u64>,
}

#[derive(Deserialize)]
struct RawClaims {
    routing_id: Option<String>,
    channel_id: Option<String>,
    topic: Option<String>,
    exp: Option<u64>,
}

/// Parse a three-part credential and extract its routing claims.
///
/// Only the middle (claims) segment is decoded; the header and signature
/// segments are opaque to the client.
pub fn parse(raw: &str) -> Result<CredentialClaims, CredentialError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(CredentialError::Empty);
    }

    let segments: Vec<&str> = raw.split('.').collect();
    if segments.len() != 3 {
        return Err(CredentialError::Segments { segments: segments.len() });
    }

    // Issuers differ on padding; strip it and decode unpadded.
    let claims_segment = segments[1].trim_end_matches('=');
    let decoded = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(claims_segment)
        .map_err(|e| CredentialError::Base64(e.to_string()))?;

    let claims: RawClaims =
        serde_json::from_slice(&decoded).map_err(|e| CredentialError::Claims(e.to_string()))?;

    let routing_id = non_empty(claims.routing_id)
        .ok_or(CredentialError::MissingClaim { claim: "routing_id" })?;
    let channel_id = non_empty(claims.channel_id)
        .ok_or(CredentialError::MissingClaim { claim: "channel_id" })?;

    let topic = non_empty(claims.topic)
        .unwrap_or_else(|| synthesize_topic(&routing_id, &channel_id));

    Ok(CredentialClaims { routing_id, channel_id, topic, expires_at_secs: claims.exp })
}

/// Whether the credential has expired, evaluated against the given wall
/// clock.
///
/// A credential without an expiry claim never expires. Expiry is carried in
/// seconds; the comparison converts to milliseconds before comparing against
/// the millisecond clock.
pub fn is_expired(claims: &CredentialClaims, now_ms: u64) -> bool {
    match claims.expires_at_secs {
        None => false,
        Some(exp_secs) => now_ms >= exp_secs.saturating_mul(1000),
    }
}

/// Deterministic topic for credentials that do not carry one.
fn synthesize_topic(routing_id: &str, channel_id: &str) -> String {
    format!("ai:{routing_id}:{channel_id}")
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_claims(claims: &serde_json::Value) -> String {
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(claims.to_string())
    }

    fn credential_with(claims: &serde_json::Value) -> String {
        format!("hdr.{}.sig", encode_claims(claims))
    }

    #[test]
    fn parses_full_claims() {
        let raw = credential_with(&serde_json::json!({
            "routing_id": "proj-1",
            "channel_id": "chan-9",
            "topic": "ai:custom",
            "exp": 1_700_000_000u64,
        }));

        let claims = parse(&raw).unwrap();

        assert_eq!(claims.routing_id, "proj-1");
        assert_eq!(claims.channel_id, "chan-9");
        assert_eq!(claims.topic, "ai:custom");
        assert_eq!(claims.expires_at_secs, Some(1_700_000_000));
    }

    #[test]
    fn synthesizes_topic_when_absent() {
        let raw = credential_with(&serde_json::json!({
            "routing_id": "p",
            "channel_id": "c",
        }));

        let claims = parse(&raw).unwrap();

        assert_eq!(claims.topic, "ai:p:c");
        assert_eq!(claims.expires_at_secs, None);
    }

    #[test]
    fn accepts_padded_base64() {
        let padded = base64::engine::general_purpose::URL_SAFE
            .encode(serde_json::json!({"routing_id": "p", "channel_id": "c"}).to_string());
        let raw = format!("hdr.{padded}.sig");

        assert!(parse(&raw).is_ok());
    }

    #[test]
    fn rejects_empty_input() {
        assert_eq!(parse(""), Err(CredentialError::Empty));
        assert_eq!(parse("   "), Err(CredentialError::Empty));
    }

    #[test]
    fn rejects_wrong_segment_count() {
        assert_eq!(parse("only-one"), Err(CredentialError::Segments { segments: 1 }));
        assert_eq!(parse("a.b"), Err(CredentialError::Segments { segments: 2 }));
        assert_eq!(parse("a.b.c.d"), Err(CredentialError::Segments { segments: 4 }));
    }

    #[test]
    fn rejects_invalid_base64() {
        assert!(matches!(parse("a.!!not-base64!!.c"), Err(CredentialError::Base64(_))));
    }

    #[test]
    fn rejects_non_json_claims() {
        let not_json = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode("not json");
        let raw = format!("a.{not_json}.c");

        assert!(matches!(parse(&raw), Err(CredentialError::Claims(_))));
    }

    #[test]
    fn rejects_missing_routing_claims() {
        let raw = credential_with(&serde_json::json!({"channel_id": "c"}));
        assert_eq!(parse(&raw), Err(CredentialError::MissingClaim { claim: "routing_id" }));

        let raw = credential_with(&serde_json::json!({"routing_id": "p"}));
        assert_eq!(parse(&raw), Err(CredentialError::MissingClaim { claim: "channel_id" }));

        let raw = credential_with(&serde_json::json!({"routing_id": "", "channel_id": "c"}));
        assert_eq!(parse(&raw), Err(CredentialError::MissingClaim { claim: "routing_id" }));
    }

    #[test]
    fn absent_expiry_never_expires() {
        let claims = CredentialClaims {
            routing_id: "p".into(),
            channel_id: "c".into(),
            topic: "t".into(),
            expires_at_secs: None,
        };

        assert!(!is_expired(&claims, u64::MAX));
    }

    #[test]
    fn expiry_compares_in_milliseconds() {
        let claims = CredentialClaims {
            routing_id: "p".into(),
            channel_id: "c".into(),
            topic: "t".into(),
            expires_at_secs: Some(100),
        };

        assert!(!is_expired(&claims, 99_999));
        assert!(is_expired(&claims, 100_000));
        assert!(is_expired(&claims, 100_001));
    }
}
