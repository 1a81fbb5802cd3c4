//! Response payload classification.
//!
//! Inbound channel payloads are semi-structured JSON produced by the service.
//! Rather than chaining ad-hoc string comparisons at every use site, the
//! recognized status discriminators are folded into one tagged union the
//! controller can match exhaustively.
//!
//! The service runs two workflow shapes: a synchronous one that resolves in a
//! single payload (`Success`), and an asynchronous one that first emits an
//! intermediate marker (`AiGenerated`) while a server-side callback is still
//! pending, then a terminal `Completed`. Any unrecognized status is a
//! terminal failure.

use serde_json::Value;

/// Classified status of one inbound response payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Terminal success from the synchronous workflow
    /// (`success` / `SUCCESS` / `ok`, or a nested meta status of `success`).
    Success {
        /// Processing duration reported by the service, when present.
        duration_ms: Option<u64>,
    },

    /// Terminal success via the asynchronous callback path (`completed`).
    Completed,

    /// Non-terminal intermediate marker (`ai_generated`): upstream processing
    /// finished but a downstream callback is still pending. The only status
    /// that keeps the session open.
    AiGenerated {
        /// Upstream processing duration, when present.
        duration_ms: Option<u64>,
    },

    /// Terminal failure: any other (or absent) status.
    Failure {
        /// Nested error message, when one could be extracted.
        message: Option<String>,
    },
}

/// Classify a raw response payload.
pub fn classify(payload: &Value) -> Outcome {
    let status = payload.get("status").and_then(Value::as_str);
    let duration_ms = reported_duration(payload);

    match status {
        Some("success" | "SUCCESS" | "ok") => Outcome::Success { duration_ms },
        Some("completed") => Outcome::Completed,
        Some("ai_generated") => Outcome::AiGenerated { duration_ms },
        _ if meta_status_is_success(payload) => Outcome::Success { duration_ms },
        _ => Outcome::Failure { message: failure_message(payload) },
    }
}

fn meta_status_is_success(payload: &Value) -> bool {
    payload
        .get("meta")
        .and_then(|meta| meta.get("status"))
        .and_then(Value::as_str)
        .is_some_and(|s| s == "success")
}

fn reported_duration(payload: &Value) -> Option<u64> {
    payload.get("duration_ms").and_then(Value::as_u64)
}

/// Best-effort extraction of a nested failure message.
///
/// Checks `error.message`, then a bare string `error`, then a top-level
/// `message`.
pub fn failure_message(payload: &Value) -> Option<String> {
    payload
        .get("error")
        .and_then(|e| e.get("message").or(Some(e)))
        .and_then(Value::as_str)
        .or_else(|| payload.get("message").and_then(Value::as_str))
        .map(ToOwned::to_owned)
}
