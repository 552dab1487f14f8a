//! Mock backend implementation for testing and development.
//!
//! This module provides a simulated hardware-control backend that can be
//! scripted programmatically, so gateway and polling behavior can be
//! exercised without a real service. Replies can carry artificial
//! latency; a scripted delay that exceeds the request's timeout is
//! reported as a transport timeout, exactly as a slow real backend
//! would be.

use crate::backend::{Backend, BackendReply, BackendRequest, TransportError};
use crate::policy::Method;
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One scripted reply.
///
/// # Examples
///
/// ```
/// use cubby_relay::mock::MockReply;
/// use serde_json::json;
/// use std::time::Duration;
///
/// // A healthy reply that takes 50ms to arrive.
/// let reply = MockReply::status(200, json!({"success": true, "message": "ok"}))
///     .with_delay(Duration::from_millis(50));
/// ```
#[derive(Debug, Clone)]
pub struct MockReply {
    outcome: Result<(u16, Value), TransportError>,
    delay: Duration,
}

impl MockReply {
    /// Reply with an HTTP status and JSON body.
    #[must_use]
    pub fn status(status: u16, body: Value) -> Self {
        MockReply {
            outcome: Ok((status, body)),
            delay: Duration::ZERO,
        }
    }

    /// Reply with a transport failure.
    #[must_use]
    pub fn transport(error: TransportError) -> Self {
        MockReply {
            outcome: Err(error),
            delay: Duration::ZERO,
        }
    }

    /// The backend's "no card recently read" reply.
    #[must_use]
    pub fn no_event() -> Self {
        MockReply::status(
            200,
            json!({"success": false, "message": "No card recently read"}),
        )
    }

    /// The backend's card-detection reply.
    #[must_use]
    pub fn card_detected(card_id: &str) -> Self {
        MockReply::status(
            200,
            json!({
                "success": true,
                "card": {
                    "card_id": card_id,
                    "timestamp": "2026-08-06T10:15:30.250",
                    "read_count": 1
                }
            }),
        )
    }

    /// Attach artificial latency to this reply.
    ///
    /// A delay at or beyond the request's timeout turns the reply into
    /// a [`TransportError::Timeout`].
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// A request the mock backend received, kept for assertions.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
}

#[derive(Debug, Default)]
struct MockState {
    script: VecDeque<MockReply>,
    fallback: Option<MockReply>,
    calls: Vec<RecordedCall>,
}

/// Mock hardware-control backend.
///
/// Created together with a [`MockBackendHandle`] that scripts replies
/// and inspects received calls, in the same device/handle split used
/// for mock peripherals elsewhere.
///
/// # Examples
///
/// ```
/// use cubby_core::Operation;
/// use cubby_relay::{RelayGateway, mock::{MockBackend, MockReply}};
/// use serde_json::json;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let (backend, handle) = MockBackend::new();
/// handle.push_reply(MockReply::status(200, json!({"success": true, "message": "ok"})));
///
/// let gateway = RelayGateway::new(backend);
/// let result = gateway.relay(Operation::Status, None).await;
/// assert!(result.success);
/// assert_eq!(handle.call_count(), 1);
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
}

impl MockBackend {
    /// Create a new mock backend and its controlling handle.
    #[must_use]
    pub fn new() -> (Self, MockBackendHandle) {
        let state = Arc::new(Mutex::new(MockState::default()));
        (
            MockBackend {
                state: Arc::clone(&state),
            },
            MockBackendHandle { state },
        )
    }
}

impl Backend for MockBackend {
    async fn execute(
        &self,
        request: BackendRequest<'_>,
    ) -> Result<BackendReply, TransportError> {
        let reply = {
            let mut state = self.state.lock().expect("mock state poisoned");
            state.calls.push(RecordedCall {
                method: request.method,
                path: request.path.to_string(),
                body: request.body.cloned(),
            });
            state
                .script
                .pop_front()
                .or_else(|| state.fallback.clone())
                .unwrap_or_else(|| {
                    MockReply::status(200, json!({"success": true, "message": "ok"}))
                })
        };

        if reply.delay >= request.timeout {
            tokio::time::sleep(request.timeout).await;
            return Err(TransportError::timeout(request.timeout));
        }
        if !reply.delay.is_zero() {
            tokio::time::sleep(reply.delay).await;
        }

        match reply.outcome {
            Ok((status, body)) => Ok(BackendReply { status, body }),
            Err(error) => Err(error),
        }
    }
}

/// Handle for scripting a [`MockBackend`].
#[derive(Debug, Clone)]
pub struct MockBackendHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockBackendHandle {
    /// Queue one reply; scripted replies are consumed in order.
    pub fn push_reply(&self, reply: MockReply) {
        self.state
            .lock()
            .expect("mock state poisoned")
            .script
            .push_back(reply);
    }

    /// Set the reply used whenever the script queue is empty.
    pub fn set_fallback(&self, reply: MockReply) {
        self.state.lock().expect("mock state poisoned").fallback = Some(reply);
    }

    /// All calls received so far.
    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state
            .lock()
            .expect("mock state poisoned")
            .calls
            .clone()
    }

    /// Number of calls received so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.state.lock().expect("mock state poisoned").calls.len()
    }

    /// Number of calls received for a given path.
    #[must_use]
    pub fn call_count_for(&self, path: &str) -> usize {
        self.state
            .lock()
            .expect("mock state poisoned")
            .calls
            .iter()
            .filter(|call| call.path == path)
            .count()
    }
}
