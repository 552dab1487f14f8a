//! The relay gateway: policy-driven dispatch with bounded retries.
//!
//! One [`RelayGateway::relay`] call executes one logical operation
//! against the backend under the matching policy and resolves to a
//! definitive [`RelayResult`]. The retry loop is strictly sequential;
//! attempts are never made in parallel, because a duplicated dispatch of
//! an actuating operation could trigger a locker door twice.
//!
//! # Outcome classification
//!
//! - 2xx: success, stop.
//! - Transport failure (timeout, connect, resolve): retryable.
//! - 5xx: retryable.
//! - 4xx: terminal on first occurrence, regardless of remaining budget.
//!
//! Retries use the policy's *fixed* delay. No exponential backoff: the
//! caller is a kiosk with a human in front of it, and a bounded
//! worst-case latency beats backoff growth.

use crate::backend::{Backend, BackendReply, BackendRequest, TransportError};
use crate::policy::{Method, PolicyTable};
use chrono::Utc;
use cubby_core::{CardEvent, CorrelationId, ErrorCode, Operation, RelayResult};
use serde_json::{Value, json};
use tokio::time::Instant;
use tracing::{debug, warn};

/// Executes logical operations against a backend under per-operation
/// policies and normalizes the outcomes.
///
/// The gateway holds no mutable state: the policy table is immutable
/// after construction and every invocation carries its own bookkeeping,
/// so a single gateway can be shared freely across concurrent requests
/// (wrap it in an `Arc`).
#[derive(Debug)]
pub struct RelayGateway<B> {
    backend: B,
    policies: PolicyTable,
}

/// A retryable failure observed on one attempt; remembered so the
/// exhausted-budget result can report the last classified cause.
enum RetryableFailure {
    Upstream(BackendReply),
    Transport(TransportError),
}

impl RetryableFailure {
    fn error_code(&self) -> ErrorCode {
        match self {
            RetryableFailure::Upstream(_) => ErrorCode::UpstreamServerError,
            RetryableFailure::Transport(error) => error.error_code(),
        }
    }

    fn http_status(&self) -> Option<u16> {
        match self {
            RetryableFailure::Upstream(reply) => Some(reply.status),
            RetryableFailure::Transport(_) => None,
        }
    }

    fn describe(&self) -> String {
        match self {
            RetryableFailure::Upstream(reply) => format!("backend status {}", reply.status),
            RetryableFailure::Transport(error) => error.to_string(),
        }
    }
}

impl<B: Backend> RelayGateway<B> {
    /// Create a gateway with the standard policy table.
    pub fn new(backend: B) -> Self {
        Self::with_policies(backend, PolicyTable::standard())
    }

    /// Create a gateway with an explicit policy table (tests shrink
    /// timeouts and budgets this way).
    pub fn with_policies(backend: B, policies: PolicyTable) -> Self {
        Self { backend, policies }
    }

    /// The gateway's policy table.
    #[must_use]
    pub fn policies(&self) -> &PolicyTable {
        &self.policies
    }

    /// Relay an operation given by its wire name.
    ///
    /// A missing name is a local `bad-request`; an unknown name is a
    /// local `unknown-operation`. Neither contacts the backend.
    pub async fn relay_named(&self, name: &str, payload: Option<Value>) -> RelayResult {
        if name.trim().is_empty() {
            warn!("Rejected request without an operation name");
            return RelayResult::bad_request("Missing operation");
        }
        match Operation::from_name(name) {
            Some(operation) => self.relay(operation, payload).await,
            None => {
                warn!(operation = name, "Rejected unknown operation");
                RelayResult::unknown_operation(name)
            }
        }
    }

    /// Execute one logical operation under its policy.
    ///
    /// Always resolves to a definitive [`RelayResult`]; this method
    /// never fails in the `Result` sense, because every failure mode is
    /// part of the envelope contract.
    pub async fn relay(&self, operation: Operation, payload: Option<Value>) -> RelayResult {
        let Some(policy) = self.policies.get(operation) else {
            warn!(%operation, "No policy for operation");
            return RelayResult::unknown_operation(operation.name());
        };

        if let Err(message) = validate_payload(operation, policy.method, payload.as_ref()) {
            warn!(%operation, %message, "Rejected malformed payload");
            return RelayResult::bad_request(message);
        }

        let correlation_id = CorrelationId::new();
        let started = Instant::now();

        for attempt in 1..=policy.max_attempts {
            let attempt_started = Instant::now();
            let outcome = self
                .backend
                .execute(BackendRequest {
                    method: policy.method,
                    path: policy.backend_path,
                    body: payload.as_ref(),
                    timeout: policy.timeout,
                })
                .await;
            let duration_ms = attempt_started.elapsed().as_millis() as u64;

            let failure = match outcome {
                Ok(reply) if reply.is_success() => {
                    debug!(%operation, attempt, outcome = "success", duration_ms, %correlation_id, "Dispatch attempt resolved");
                    return self.finish_success(
                        operation,
                        reply,
                        attempt,
                        started.elapsed().as_millis() as u64,
                        duration_ms,
                        correlation_id,
                    );
                }
                Ok(reply) if reply.is_client_error() => {
                    debug!(%operation, attempt, outcome = "upstream-client-error", duration_ms, %correlation_id, "Dispatch attempt resolved");
                    let message = backend_message(&reply.body).unwrap_or_else(|| {
                        format!("Backend rejected {operation} with status {}", reply.status)
                    });
                    return RelayResult {
                        success: false,
                        http_status: Some(reply.status),
                        message,
                        payload: non_null(reply.body),
                        card: None,
                        attempts_used: attempt,
                        elapsed_ms: started.elapsed().as_millis() as u64,
                        error_code: Some(ErrorCode::UpstreamClientError),
                    };
                }
                Ok(reply) => {
                    // 5xx, plus any residual non-2xx/non-4xx status:
                    // treated as transient upstream trouble.
                    debug!(%operation, attempt, outcome = "upstream-server-error", duration_ms, %correlation_id, "Dispatch attempt resolved");
                    RetryableFailure::Upstream(reply)
                }
                Err(error) => {
                    debug!(%operation, attempt, outcome = error.error_code().as_str(), duration_ms, %correlation_id, "Dispatch attempt resolved");
                    RetryableFailure::Transport(error)
                }
            };

            if attempt == policy.max_attempts {
                if operation.is_actuating() {
                    // The request may have reached the backend before the
                    // failure; locker state is unknown until the next
                    // status poll.
                    warn!(%operation, "Actuating operation failed in transit; physical state uncertain");
                }
                return RelayResult {
                    success: false,
                    http_status: failure.http_status(),
                    message: format!(
                        "Retries exhausted after {} attempts: {}",
                        policy.max_attempts,
                        failure.describe()
                    ),
                    payload: None,
                    card: None,
                    attempts_used: policy.max_attempts,
                    elapsed_ms: started.elapsed().as_millis() as u64,
                    error_code: Some(failure.error_code()),
                };
            }

            tokio::time::sleep(policy.retry_delay).await;
        }

        // The loop always returns: max_attempts >= 1 is enforced by the
        // policy table.
        unreachable!("relay loop exited without a result")
    }

    fn finish_success(
        &self,
        operation: Operation,
        reply: BackendReply,
        attempts_used: u32,
        elapsed_ms: u64,
        round_trip_ms: u64,
        correlation_id: CorrelationId,
    ) -> RelayResult {
        let success_flag = reply.body.get("success").and_then(Value::as_bool);

        match operation {
            Operation::ReadCard => {
                normalize_read_card(reply, success_flag, attempts_used, elapsed_ms)
            }
            Operation::Status | Operation::Health => {
                let message = backend_message(&reply.body).unwrap_or_else(|| "OK".to_string());
                let payload = augment_payload(reply.body, correlation_id, round_trip_ms);
                RelayResult {
                    success: success_flag.unwrap_or(true),
                    http_status: Some(reply.status),
                    message,
                    payload: non_null(payload),
                    card: None,
                    attempts_used,
                    elapsed_ms,
                    error_code: None,
                }
            }
            _ => {
                let success = success_flag.unwrap_or(true);
                let message = backend_message(&reply.body).unwrap_or_else(|| {
                    if success {
                        "OK".to_string()
                    } else {
                        "Backend reported failure".to_string()
                    }
                });
                RelayResult {
                    success,
                    http_status: Some(reply.status),
                    message,
                    payload: non_null(reply.body),
                    card: None,
                    attempts_used,
                    elapsed_ms,
                    error_code: None,
                }
            }
        }
    }
}

/// Normalize a 2xx `read-card` response.
///
/// "No event currently queued" is not an error: the result is
/// unsuccessful but carries no error code, which is what distinguishes
/// it from a transport or upstream failure.
fn normalize_read_card(
    reply: BackendReply,
    success_flag: Option<bool>,
    attempts_used: u32,
    elapsed_ms: u64,
) -> RelayResult {
    let card = reply
        .body
        .get("card")
        .and_then(CardEvent::from_backend_value);

    let (success, card, payload, message) = match (success_flag, card) {
        (Some(false), _) | (None, None) => {
            let message =
                backend_message(&reply.body).unwrap_or_else(|| "No card recently read".to_string());
            (false, None, json!({"detected": false}), message)
        }
        (_, Some(event)) => {
            let message =
                backend_message(&reply.body).unwrap_or_else(|| "Card detected".to_string());
            (true, Some(event), json!({"detected": true}), message)
        }
        (Some(true), None) => {
            warn!("Backend reported a card detection without a usable card id");
            (
                false,
                None,
                json!({"detected": false}),
                "Backend reported a detection without a usable card id".to_string(),
            )
        }
    };

    RelayResult {
        success,
        http_status: Some(reply.status),
        message,
        payload: Some(payload),
        card,
        attempts_used,
        elapsed_ms,
        error_code: None,
    }
}

/// Validate a payload before any backend contact.
///
/// Write-style operations must carry well-formed structured data; a
/// malformed payload is a local `bad-request`, never dispatched.
fn validate_payload(
    operation: Operation,
    method: Method,
    payload: Option<&Value>,
) -> Result<(), String> {
    match method {
        Method::Get => match payload {
            None => Ok(()),
            Some(_) => Err(format!("Operation {operation} accepts no payload")),
        },
        Method::Post => match payload {
            None => match operation {
                Operation::DropOff => Err("Missing required fields".to_string()),
                Operation::PickUp => Err("Missing card_id".to_string()),
                _ => Ok(()),
            },
            Some(Value::Object(fields)) => match operation {
                Operation::DropOff => {
                    if !fields.contains_key("card_id") || !fields.contains_key("wash_type") {
                        Err("Missing required fields".to_string())
                    } else {
                        Ok(())
                    }
                }
                Operation::PickUp => {
                    if !fields.contains_key("card_id") {
                        Err("Missing card_id".to_string())
                    } else {
                        Ok(())
                    }
                }
                _ => Ok(()),
            },
            Some(_) => Err(format!("Payload for {operation} must be a JSON object")),
        },
    }
}

/// Add gateway-observed metadata to an object payload.
///
/// Backend-supplied fields are never altered; if the backend already
/// sent a `gateway` key, or the payload is not an object, the payload
/// passes through untouched.
fn augment_payload(body: Value, correlation_id: CorrelationId, round_trip_ms: u64) -> Value {
    match body {
        Value::Object(mut fields) => {
            if !fields.contains_key("gateway") {
                fields.insert(
                    "gateway".to_string(),
                    json!({
                        "timestamp": Utc::now().to_rfc3339(),
                        "correlation_id": correlation_id.to_string(),
                        "round_trip_ms": round_trip_ms,
                    }),
                );
            }
            Value::Object(fields)
        }
        other => other,
    }
}

fn backend_message(body: &Value) -> Option<String> {
    body.get("message")
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn non_null(value: Value) -> Option<Value> {
    match value {
        Value::Null => None,
        other => Some(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockBackend, MockReply};

    #[test]
    fn test_validate_payload_drop_off() {
        let ok = json!({"card_id": "1", "wash_type": 2});
        assert!(validate_payload(Operation::DropOff, Method::Post, Some(&ok)).is_ok());

        let missing = json!({"card_id": "1"});
        assert!(validate_payload(Operation::DropOff, Method::Post, Some(&missing)).is_err());
        assert!(validate_payload(Operation::DropOff, Method::Post, None).is_err());
    }

    #[test]
    fn test_validate_payload_pick_up() {
        let ok = json!({"card_id": "1"});
        assert!(validate_payload(Operation::PickUp, Method::Post, Some(&ok)).is_ok());
        assert!(validate_payload(Operation::PickUp, Method::Post, None).is_err());

        let not_object = json!(["card_id"]);
        assert!(validate_payload(Operation::PickUp, Method::Post, Some(&not_object)).is_err());
    }

    #[test]
    fn test_validate_payload_get_rejects_body() {
        let payload = json!({"anything": true});
        assert!(validate_payload(Operation::Status, Method::Get, Some(&payload)).is_err());
        assert!(validate_payload(Operation::Status, Method::Get, None).is_ok());
    }

    #[test]
    fn test_validate_payload_bodyless_posts() {
        assert!(validate_payload(Operation::ClearEventQueue, Method::Post, None).is_ok());
        assert!(validate_payload(Operation::ResetReader, Method::Post, None).is_ok());
    }

    #[test]
    fn test_augment_adds_gateway_metadata() {
        let body = json!({"success": true, "active_cards": 3});
        let augmented = augment_payload(body, CorrelationId::new(), 42);

        assert_eq!(augmented["active_cards"], 3);
        assert_eq!(augmented["gateway"]["round_trip_ms"], 42);
        assert!(augmented["gateway"]["correlation_id"].is_string());
        assert!(augmented["gateway"]["timestamp"].is_string());
    }

    #[test]
    fn test_augment_never_overwrites_backend_fields() {
        let body = json!({"gateway": {"vendor": "backend-owned"}});
        let augmented = augment_payload(body, CorrelationId::new(), 42);
        assert_eq!(augmented["gateway"]["vendor"], "backend-owned");
        assert!(augmented["gateway"].get("round_trip_ms").is_none());
    }

    #[test]
    fn test_augment_skips_non_object_payloads() {
        let body = json!([1, 2, 3]);
        let augmented = augment_payload(body.clone(), CorrelationId::new(), 42);
        assert_eq!(augmented, body);

        let text = Value::String("plain text".to_string());
        let augmented = augment_payload(text.clone(), CorrelationId::new(), 42);
        assert_eq!(augmented, text);
    }

    #[tokio::test]
    async fn test_missing_operation_name_is_bad_request() {
        let (backend, handle) = MockBackend::new();
        let gateway = RelayGateway::new(backend);

        let result = gateway.relay_named("  ", None).await;

        assert!(!result.success);
        assert_eq!(result.error_code, Some(ErrorCode::BadRequest));
        assert_eq!(result.http_status, Some(400));
        assert_eq!(handle.call_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_operation_never_dispatches() {
        let (backend, handle) = MockBackend::new();
        let gateway = RelayGateway::new(backend);

        let result = gateway.relay_named("format-disk", None).await;

        assert!(!result.success);
        assert_eq!(result.error_code, Some(ErrorCode::UnknownOperation));
        assert_eq!(result.http_status, Some(404));
        assert_eq!(result.attempts_used, 0);
        assert_eq!(handle.call_count(), 0);
    }

    #[tokio::test]
    async fn test_bad_request_never_dispatches() {
        let (backend, handle) = MockBackend::new();
        let gateway = RelayGateway::new(backend);

        let result = gateway
            .relay(Operation::DropOff, Some(json!({"card_id": "1"})))
            .await;

        assert!(!result.success);
        assert_eq!(result.error_code, Some(ErrorCode::BadRequest));
        assert_eq!(result.http_status, Some(400));
        assert_eq!(handle.call_count(), 0);
    }

    #[tokio::test]
    async fn test_read_card_detection_parses_card() {
        let (backend, handle) = MockBackend::new();
        handle.push_reply(MockReply::card_detected("16909060"));
        let gateway = RelayGateway::new(backend);

        let result = gateway.relay(Operation::ReadCard, None).await;

        assert!(result.success);
        assert_eq!(result.card.unwrap().card_id.as_str(), "16909060");
        assert_eq!(result.payload.unwrap()["detected"], true);
        assert_eq!(result.error_code, None);
    }

    #[tokio::test]
    async fn test_read_card_no_event_is_benign() {
        let (backend, handle) = MockBackend::new();
        handle.push_reply(MockReply::no_event());
        let gateway = RelayGateway::new(backend);

        let result = gateway.relay(Operation::ReadCard, None).await;

        assert!(!result.success);
        assert!(result.is_no_event());
        assert_eq!(result.error_code, None);
        assert!(result.card.is_none());
        assert_eq!(result.payload.unwrap()["detected"], false);
        assert_eq!(result.attempts_used, 1);
    }

    #[tokio::test]
    async fn test_read_card_detection_without_card_id() {
        let (backend, handle) = MockBackend::new();
        handle.push_reply(MockReply::status(
            200,
            json!({"success": true, "card": {"read_count": 1}}),
        ));
        let gateway = RelayGateway::new(backend);

        let result = gateway.relay(Operation::ReadCard, None).await;

        assert!(!result.success);
        assert_eq!(result.error_code, None);
        assert!(result.card.is_none());
    }

    #[tokio::test]
    async fn test_business_failure_passes_through_without_error_code() {
        let (backend, handle) = MockBackend::new();
        handle.push_reply(MockReply::status(
            200,
            json!({
                "success": false,
                "message": "This card already has clothes in locker 2. Please use the pickup process first."
            }),
        ));
        let gateway = RelayGateway::new(backend);

        let result = gateway
            .relay(
                Operation::DropOff,
                Some(json!({"card_id": "1", "wash_type": 2})),
            )
            .await;

        assert!(!result.success);
        assert_eq!(result.error_code, None);
        assert!(result.message.contains("already has clothes"));
        assert_eq!(result.attempts_used, 1);
    }
}
