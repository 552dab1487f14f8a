//! The uniform result envelope returned by the relay gateway.
//!
//! Every relay invocation resolves to a [`RelayResult`]: either a
//! definitive success or a definitive failure with a classified
//! [`ErrorCode`]. The envelope is never partially filled, and callers
//! never have to poke at untyped backend JSON to find out what happened.

use crate::types::CardEvent;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Classified failure causes for a relay invocation.
///
/// The first two are local rejections that never reach the backend. The
/// transport codes (`timeout`, `connect-failed`, `resolve-failed`) and
/// `upstream-server-error` are retryable until the attempt budget runs
/// out; `upstream-client-error` is terminal on first occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCode {
    /// Payload missing or malformed; rejected locally, never dispatched.
    BadRequest,
    /// Operation name outside the policy table; rejected locally.
    UnknownOperation,
    /// The backend did not answer within the policy's timeout.
    Timeout,
    /// TCP connection refused, reset, or otherwise failed.
    ConnectFailed,
    /// Backend hostname could not be resolved.
    ResolveFailed,
    /// Backend answered 4xx; retrying would repeat the same mistake.
    UpstreamClientError,
    /// Backend answered 5xx; transient by assumption.
    UpstreamServerError,
}

impl ErrorCode {
    /// The kebab-case wire name of this code.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::BadRequest => "bad-request",
            ErrorCode::UnknownOperation => "unknown-operation",
            ErrorCode::Timeout => "timeout",
            ErrorCode::ConnectFailed => "connect-failed",
            ErrorCode::ResolveFailed => "resolve-failed",
            ErrorCode::UpstreamClientError => "upstream-client-error",
            ErrorCode::UpstreamServerError => "upstream-server-error",
        }
    }

    /// Returns `true` if a failure with this code may be retried while
    /// attempt budget remains.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorCode::Timeout
                | ErrorCode::ConnectFailed
                | ErrorCode::ResolveFailed
                | ErrorCode::UpstreamServerError
        )
    }

    /// Returns `true` for rejections decided locally, without any
    /// backend contact.
    #[must_use]
    pub fn is_local(&self) -> bool {
        matches!(self, ErrorCode::BadRequest | ErrorCode::UnknownOperation)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of one relay invocation.
///
/// `success` mirrors the backend's own verdict for business-level
/// failures the backend reports with HTTP 200 + `success: false`
/// (for example "card already assigned"); in that case `error_code`
/// stays empty because nothing went wrong in transit. A transport or
/// upstream failure always sets `error_code`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayResult {
    /// Whether the operation succeeded end to end.
    pub success: bool,

    /// HTTP status of the final response, or `None` when no response
    /// was received (transport failure). Local rejections carry the
    /// status the hosting layer should surface (400/404).
    pub http_status: Option<u16>,

    /// Human-readable summary; backend-supplied when available.
    pub message: String,

    /// Backend payload, passed through (and, for status-style
    /// operations, augmented with gateway metadata).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,

    /// Detected card, populated only by a successful `read-card`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub card: Option<CardEvent>,

    /// Dispatch attempts actually made (0 for local rejections).
    pub attempts_used: u32,

    /// Wall time spent inside the relay call, including retry delays.
    pub elapsed_ms: u64,

    /// Classified failure cause; absent on success and on benign
    /// backend-reported outcomes such as "no card recently read".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
}

impl RelayResult {
    /// Local rejection for an operation name outside the policy table.
    ///
    /// No backend call is made; `attempts_used` is zero.
    #[must_use]
    pub fn unknown_operation(name: &str) -> Self {
        RelayResult {
            success: false,
            http_status: Some(404),
            message: format!("Unknown operation: {name}"),
            payload: None,
            card: None,
            attempts_used: 0,
            elapsed_ms: 0,
            error_code: Some(ErrorCode::UnknownOperation),
        }
    }

    /// Local rejection for a missing or malformed payload.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        RelayResult {
            success: false,
            http_status: Some(400),
            message: message.into(),
            payload: None,
            card: None,
            attempts_used: 0,
            elapsed_ms: 0,
            error_code: Some(ErrorCode::BadRequest),
        }
    }

    /// Empty success, used by hosting layers to answer preflight-style
    /// requests without involving the backend.
    #[must_use]
    pub fn empty_success() -> Self {
        RelayResult {
            success: true,
            http_status: Some(204),
            message: String::new(),
            payload: None,
            card: None,
            attempts_used: 0,
            elapsed_ms: 0,
            error_code: None,
        }
    }

    /// Returns `true` when this result is the benign "no card yet"
    /// outcome of a `read-card`: not a success, but not an error either.
    #[must_use]
    pub fn is_no_event(&self) -> bool {
        !self.success && self.error_code.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_wire_names() {
        assert_eq!(ErrorCode::BadRequest.as_str(), "bad-request");
        assert_eq!(ErrorCode::UnknownOperation.as_str(), "unknown-operation");
        assert_eq!(ErrorCode::Timeout.as_str(), "timeout");
        assert_eq!(ErrorCode::ConnectFailed.as_str(), "connect-failed");
        assert_eq!(ErrorCode::ResolveFailed.as_str(), "resolve-failed");
        assert_eq!(
            ErrorCode::UpstreamClientError.as_str(),
            "upstream-client-error"
        );
        assert_eq!(
            ErrorCode::UpstreamServerError.as_str(),
            "upstream-server-error"
        );
    }

    #[test]
    fn test_error_code_serde_matches_display() {
        for code in [
            ErrorCode::BadRequest,
            ErrorCode::UnknownOperation,
            ErrorCode::Timeout,
            ErrorCode::ConnectFailed,
            ErrorCode::ResolveFailed,
            ErrorCode::UpstreamClientError,
            ErrorCode::UpstreamServerError,
        ] {
            let encoded = serde_json::to_string(&code).unwrap();
            assert_eq!(encoded, format!("\"{code}\""));
        }
    }

    #[test]
    fn test_retryable_classification() {
        assert!(ErrorCode::Timeout.is_retryable());
        assert!(ErrorCode::ConnectFailed.is_retryable());
        assert!(ErrorCode::ResolveFailed.is_retryable());
        assert!(ErrorCode::UpstreamServerError.is_retryable());

        assert!(!ErrorCode::UpstreamClientError.is_retryable());
        assert!(!ErrorCode::BadRequest.is_retryable());
        assert!(!ErrorCode::UnknownOperation.is_retryable());
    }

    #[test]
    fn test_local_rejections_never_dispatch() {
        let unknown = RelayResult::unknown_operation("format-disk");
        assert!(!unknown.success);
        assert_eq!(unknown.http_status, Some(404));
        assert_eq!(unknown.attempts_used, 0);
        assert_eq!(unknown.error_code, Some(ErrorCode::UnknownOperation));

        let bad = RelayResult::bad_request("Missing card_id");
        assert!(!bad.success);
        assert_eq!(bad.http_status, Some(400));
        assert_eq!(bad.attempts_used, 0);
        assert_eq!(bad.error_code, Some(ErrorCode::BadRequest));
    }

    #[test]
    fn test_empty_success() {
        let result = RelayResult::empty_success();
        assert!(result.success);
        assert!(result.message.is_empty());
        assert_eq!(result.error_code, None);
    }

    #[test]
    fn test_no_event_is_distinct_from_failure() {
        let no_event = RelayResult {
            success: false,
            http_status: Some(200),
            message: "No card recently read".to_string(),
            payload: None,
            card: None,
            attempts_used: 1,
            elapsed_ms: 12,
            error_code: None,
        };
        assert!(no_event.is_no_event());

        let transport = RelayResult {
            error_code: Some(ErrorCode::Timeout),
            ..no_event.clone()
        };
        assert!(!transport.is_no_event());
    }
}
