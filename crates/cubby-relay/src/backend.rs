//! Backend transport abstraction.
//!
//! The [`Backend`] trait is the seam between the relay gateway and the
//! hardware-control service. Production code talks HTTP through
//! [`HttpBackend`](crate::HttpBackend); tests drive the gateway through
//! [`MockBackend`](crate::mock::MockBackend) without a socket in sight.
//!
//! The trait returns an explicit `impl Future + Send` so generic callers
//! (the polling controller spawns relay calls onto the runtime) can
//! prove their futures are `Send`.

use crate::policy::Method;
use cubby_core::ErrorCode;
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// One request to the backend, borrowed from the policy and payload.
#[derive(Debug, Clone)]
pub struct BackendRequest<'a> {
    /// HTTP method.
    pub method: Method,

    /// Endpoint path relative to the backend root.
    pub path: &'a str,

    /// JSON body for write-style operations.
    pub body: Option<&'a Value>,

    /// Per-attempt timeout the transport must enforce.
    pub timeout: Duration,
}

/// A response that made it back from the backend.
///
/// The body is parsed as JSON when possible; a non-JSON body is kept
/// verbatim as a JSON string, and an empty body becomes `Null`.
#[derive(Debug, Clone)]
pub struct BackendReply {
    /// HTTP status code.
    pub status: u16,

    /// Response body.
    pub body: Value,
}

impl BackendReply {
    /// Returns `true` for 2xx statuses.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Returns `true` for 4xx statuses.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status)
    }

    /// Returns `true` for 5xx statuses.
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.status)
    }
}

/// Transport-level failures: the request never produced an HTTP response.
///
/// All of these are retryable under the operation's policy.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// No response within the policy timeout.
    #[error("Backend timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// Connection refused, reset, or dropped mid-flight.
    #[error("Connection failed: {message}")]
    ConnectFailed { message: String },

    /// The backend hostname did not resolve.
    #[error("Name resolution failed: {message}")]
    ResolveFailed { message: String },
}

impl TransportError {
    /// Create a timeout error from the enforced duration.
    pub fn timeout(timeout: Duration) -> Self {
        TransportError::Timeout {
            timeout_ms: timeout.as_millis() as u64,
        }
    }

    /// Create a connection failure.
    pub fn connect(message: impl Into<String>) -> Self {
        TransportError::ConnectFailed {
            message: message.into(),
        }
    }

    /// Create a name-resolution failure.
    pub fn resolve(message: impl Into<String>) -> Self {
        TransportError::ResolveFailed {
            message: message.into(),
        }
    }

    /// The envelope error code this failure classifies to.
    #[must_use]
    pub fn error_code(&self) -> ErrorCode {
        match self {
            TransportError::Timeout { .. } => ErrorCode::Timeout,
            TransportError::ConnectFailed { .. } => ErrorCode::ConnectFailed,
            TransportError::ResolveFailed { .. } => ErrorCode::ResolveFailed,
        }
    }
}

/// Transport seam between the gateway and the hardware-control service.
///
/// Implementations enforce `request.timeout` themselves and classify
/// their failures into [`TransportError`]; the gateway owns everything
/// above that (retry budget, delay, outcome classification).
pub trait Backend: Send + Sync {
    /// Execute one request against the backend.
    fn execute(
        &self,
        request: BackendRequest<'_>,
    ) -> impl Future<Output = Result<BackendReply, TransportError>> + Send;
}
