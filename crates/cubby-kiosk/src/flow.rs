//! Walk-up kiosk flows: drop-off and pick-up.
//!
//! A flow is: poll for a card tap, then execute the matching actuating
//! operation with the detected card id. Each flow owns exactly one
//! polling session at a time; the controller's busy guard turns a
//! double-start into a report instead of a second session.

use cubby_core::{CardEvent, Operation, RelayResult};
use cubby_poll::{PollController, PollError, PollOptions, PollOutcome};
use cubby_relay::{Backend, RelayGateway};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{info, warn};

/// What the person at the kiosk gets to see.
///
/// Raw error codes never appear here; they stay in the logs. The report
/// distinguishes "nobody tapped a card" from "the locker system is
/// unreachable" and says whether trying again can help.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowReport {
    /// Whether the flow completed.
    pub success: bool,

    /// User-facing message.
    pub message: String,

    /// Whether an immediate retry is worth offering.
    pub can_retry: bool,
}

impl FlowReport {
    fn completed(message: impl Into<String>) -> Self {
        FlowReport {
            success: true,
            message: message.into(),
            can_retry: false,
        }
    }

    fn failed(message: impl Into<String>, can_retry: bool) -> Self {
        FlowReport {
            success: false,
            message: message.into(),
            can_retry,
        }
    }
}

/// Drives the drop-off and pick-up flows over a shared gateway.
pub struct KioskFlows<B> {
    gateway: Arc<RelayGateway<B>>,
    controller: PollController<B>,
    options: PollOptions,
}

impl<B: Backend + 'static> KioskFlows<B> {
    /// Create the flow driver.
    pub fn new(gateway: Arc<RelayGateway<B>>, options: PollOptions) -> Self {
        let controller = PollController::new(Arc::clone(&gateway));
        Self {
            gateway,
            controller,
            options,
        }
    }

    /// Run the drop-off flow: wait for a card, then assign it to a
    /// locker with the chosen wash type.
    ///
    /// `wash_type` is passed to the backend as-is; it accepts an id or
    /// a name.
    pub async fn drop_off(&mut self, wash_type: Value) -> FlowReport {
        let event = match self.wait_for_card().await {
            Ok(event) => event,
            Err(report) => return report,
        };

        let payload = json!({
            "card_id": event.card_id.as_str(),
            "wash_type": wash_type,
        });
        let result = self.gateway.relay(Operation::DropOff, Some(payload)).await;
        action_report(result)
    }

    /// Run the pick-up flow: wait for a card, then complete its
    /// transaction and open the locker.
    pub async fn pick_up(&mut self) -> FlowReport {
        let event = match self.wait_for_card().await {
            Ok(event) => event,
            Err(report) => return report,
        };

        let payload = json!({ "card_id": event.card_id.as_str() });
        let result = self.gateway.relay(Operation::PickUp, Some(payload)).await;
        action_report(result)
    }

    /// Poll until a card is detected or the session ends some other way.
    async fn wait_for_card(&mut self) -> Result<CardEvent, FlowReport> {
        let handle = match self.controller.start(self.options, |event| {
            info!(card_id = %event.card_id, "Card presented");
        }) {
            Ok(handle) => handle,
            Err(PollError::Busy) => {
                return Err(FlowReport::failed(
                    "Another operation is already in progress.",
                    false,
                ));
            }
            Err(PollError::InvalidOptions(message)) => {
                warn!(%message, "Polling misconfigured");
                return Err(FlowReport::failed(
                    "The kiosk is misconfigured. Please call staff.",
                    false,
                ));
            }
        };

        match handle.join().await {
            PollOutcome::Detected(event) => Ok(event),
            PollOutcome::TimedOut {
                attempts,
                transport_failures,
            } => Err(timeout_report(attempts, transport_failures)),
            PollOutcome::Cancelled => Err(FlowReport::failed("Operation cancelled.", true)),
            PollOutcome::Error { message } => {
                warn!(%message, "Polling session aborted");
                Err(FlowReport::failed(
                    "The kiosk is misconfigured. Please call staff.",
                    false,
                ))
            }
        }
    }
}

/// Map a timed-out polling session to a user-facing report.
///
/// When every tick failed in transit, the honest message is a
/// connection problem, not "no card detected".
fn timeout_report(attempts: u32, transport_failures: u32) -> FlowReport {
    if attempts > 0 && transport_failures >= attempts {
        FlowReport::failed(
            "Connection issue: the locker system is not responding. Please try again in a moment.",
            true,
        )
    } else {
        FlowReport::failed(
            "No card detected. Hold your card to the reader and try again.",
            true,
        )
    }
}

/// Map the actuating operation's result to a user-facing report.
fn action_report(result: RelayResult) -> FlowReport {
    if result.success {
        return FlowReport::completed(result.message);
    }

    if result.error_code.is_none() {
        // Business-level refusal from the backend; its message is
        // already written for the person at the kiosk ("This card
        // already has clothes in locker 2...").
        return FlowReport::failed(result.message, false);
    }

    warn!(
        error_code = ?result.error_code,
        attempts_used = result.attempts_used,
        message = %result.message,
        "Actuating operation failed"
    );
    FlowReport::failed(
        "Connection issue: the locker could not be operated. Please try again or call staff.",
        true,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use cubby_relay::TransportError;
    use cubby_relay::mock::{MockBackend, MockBackendHandle, MockReply};
    use std::time::Duration;

    fn flows(options: PollOptions) -> (KioskFlows<MockBackend>, MockBackendHandle) {
        let (backend, handle) = MockBackend::new();
        let gateway = Arc::new(RelayGateway::new(backend));
        (KioskFlows::new(gateway, options), handle)
    }

    fn quick_options(max_attempts: u32) -> PollOptions {
        PollOptions {
            max_attempts,
            interval: Duration::from_millis(100),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn drop_off_happy_path() {
        let (mut flows, backend) = flows(quick_options(5));
        backend.push_reply(MockReply::card_detected("16909060"));
        // The detection acknowledgement and the drop-off race for the
        // next reply; a fallback answers both deterministically.
        backend.set_fallback(MockReply::status(
            200,
            json!({"success": true, "message": "Card assigned to locker 1 with Standard Wash service", "locker_id": "1"}),
        ));

        let report = flows.drop_off(json!(1)).await;

        assert!(report.success);
        assert!(report.message.contains("locker 1"));

        let calls = backend.calls();
        let drop_off = calls
            .iter()
            .find(|call| call.path == "/api/drop-off")
            .unwrap();
        let body = drop_off.body.as_ref().unwrap();
        assert_eq!(body["card_id"], "16909060");
        assert_eq!(body["wash_type"], 1);
    }

    #[tokio::test(start_paused = true)]
    async fn pick_up_happy_path() {
        let (mut flows, backend) = flows(quick_options(5));
        backend.push_reply(MockReply::card_detected("42"));
        backend.set_fallback(MockReply::status(
            200,
            json!({"success": true, "message": "Clothes picked up from locker 2"}),
        ));

        let report = flows.pick_up().await;

        assert!(report.success);
        assert!(report.message.contains("locker 2"));
        assert_eq!(backend.call_count_for("/api/pick-up"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn no_card_timeout_offers_retry() {
        let (mut flows, backend) = flows(quick_options(2));
        backend.set_fallback(MockReply::no_event());

        let report = flows.pick_up().await;

        assert!(!report.success);
        assert!(report.can_retry);
        assert!(report.message.contains("No card detected"));
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_backend_reports_connection_issue() {
        let (mut flows, backend) = flows(quick_options(2));
        backend.set_fallback(MockReply::transport(TransportError::connect(
            "connection refused",
        )));

        let report = flows.pick_up().await;

        assert!(!report.success);
        assert!(report.can_retry);
        assert!(report.message.contains("Connection issue"));
    }

    #[tokio::test(start_paused = true)]
    async fn business_refusal_passes_backend_message_through() {
        let (mut flows, backend) = flows(quick_options(5));
        backend.push_reply(MockReply::card_detected("16909060"));
        backend.set_fallback(MockReply::status(
            200,
            json!({
                "success": false,
                "message": "This card already has clothes in locker 2. Please use the pickup process first."
            }),
        ));

        let report = flows.drop_off(json!("Standard Wash")).await;

        assert!(!report.success);
        assert!(!report.can_retry);
        assert!(report.message.contains("already has clothes"));
    }

    #[tokio::test(start_paused = true)]
    async fn upstream_failure_during_actuation_reports_connection_issue() {
        let (mut flows, backend) = flows(quick_options(5));
        backend.push_reply(MockReply::card_detected("16909060"));
        // read-card ack may race with the pick-up; answer everything
        // after the detection with a 500.
        backend.set_fallback(MockReply::status(500, Value::Null));

        let report = flows.pick_up().await;

        assert!(!report.success);
        assert!(report.can_retry);
        assert!(report.message.contains("Connection issue"));
    }
}
