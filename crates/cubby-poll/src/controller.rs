//! The polling controller: tick scheduling, attempt budget,
//! cancellation, and the exactly-once detection guarantee.
//!
//! The controller spawns one task per session. Ticks fire on a fixed
//! interval and can never overlap: each tick's relay call runs under a
//! deadline strictly shorter than the interval, so the call has always
//! resolved (or been abandoned) before the next tick is due. A slow
//! backend therefore costs attempts, never stacked requests.
//!
//! Cancellation is cooperative. The token is observed when the next
//! tick would be scheduled, and re-checked after an in-flight call
//! resolves: a cancelled session never fires the detection callback
//! and never mutates its state from a late-arriving result.

use crate::session::{PollSession, PollSnapshot, PollState};
use cubby_core::{
    CardEvent, Operation,
    constants::{DEFAULT_POLL_ATTEMPTS, DEFAULT_POLL_INTERVAL},
};
use cubby_relay::{Backend, RelayGateway};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

/// Errors returned when a session cannot be started.
#[derive(Debug, Error)]
pub enum PollError {
    /// A session for this controller is still `Polling`. One flow, one
    /// session: the caller must cancel or wait before starting again.
    #[error("A polling session is already active")]
    Busy,

    /// The requested options are unusable.
    #[error("Invalid polling options: {0}")]
    InvalidOptions(String),
}

/// Options for one polling session.
#[derive(Debug, Clone, Copy)]
pub struct PollOptions {
    /// Tick budget before the session times out.
    pub max_attempts: u32,

    /// Fixed interval between ticks.
    pub interval: Duration,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_POLL_ATTEMPTS,
            interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl PollOptions {
    fn validate(&self) -> Result<(), PollError> {
        if self.max_attempts == 0 {
            return Err(PollError::InvalidOptions(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if self.interval.is_zero() {
            return Err(PollError::InvalidOptions(
                "interval must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Deadline for each tick's relay call: 90% of the interval, so at
    /// most one call is ever outstanding.
    fn tick_deadline(&self) -> Duration {
        self.interval.mul_f64(0.9)
    }
}

/// How a polling session ended.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// A card tap was detected and consumed.
    Detected(CardEvent),

    /// The budget ran out without a detection. `transport_failures`
    /// distinguishes "backend unreachable the whole time" from "nobody
    /// tapped a card" when building the user-facing message.
    TimedOut {
        attempts: u32,
        transport_failures: u32,
    },

    /// The caller cancelled the session.
    Cancelled,

    /// The relay rejected the session's own operations locally;
    /// retrying cannot help, this is a configuration problem.
    Error { message: String },
}

/// Handle to a running polling session.
///
/// Dropping the handle does not cancel the session; call
/// [`PollHandle::cancel`] for that.
#[derive(Debug)]
pub struct PollHandle {
    token: CancellationToken,
    state_rx: watch::Receiver<PollSnapshot>,
    task: JoinHandle<PollOutcome>,
}

impl PollHandle {
    /// Request cooperative cancellation.
    ///
    /// Idempotent. The session stops scheduling ticks immediately; a
    /// tick already in flight is allowed to resolve but its result is
    /// discarded.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Current view of the session.
    #[must_use]
    pub fn snapshot(&self) -> PollSnapshot {
        *self.state_rx.borrow()
    }

    /// A watch receiver for progress feedback; yields a fresh
    /// [`PollSnapshot`] after every attempt and state change.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<PollSnapshot> {
        self.state_rx.clone()
    }

    /// Returns `true` once the session task has finished.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the session to end and return its outcome.
    pub async fn join(self) -> PollOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Polling task failed: {e}");
                PollOutcome::Error {
                    message: format!("Polling task failed: {e}"),
                }
            }
        }
    }
}

/// Runs bounded card-detection polling sessions through a relay gateway.
///
/// The controller owns the busy guard: at most one session per
/// controller may be `Polling` at a time, and a second `start` while one
/// is active is a caller error, not a queueing request.
pub struct PollController<B> {
    gateway: Arc<RelayGateway<B>>,
    current: Option<watch::Receiver<PollSnapshot>>,
}

impl<B: Backend + 'static> PollController<B> {
    /// Create a controller over a shared gateway.
    pub fn new(gateway: Arc<RelayGateway<B>>) -> Self {
        Self {
            gateway,
            current: None,
        }
    }

    /// Start a polling session.
    ///
    /// `on_detected` fires exactly once if and when a card is detected,
    /// before the consume-acknowledgement is issued.
    ///
    /// # Errors
    ///
    /// - [`PollError::Busy`] if a session is still `Polling`.
    /// - [`PollError::InvalidOptions`] for a zero budget or interval.
    pub fn start(
        &mut self,
        options: PollOptions,
        on_detected: impl FnOnce(CardEvent) + Send + 'static,
    ) -> Result<PollHandle, PollError> {
        options.validate()?;

        if let Some(state_rx) = &self.current
            && !state_rx.borrow().state.is_terminal()
        {
            return Err(PollError::Busy);
        }

        let mut session = PollSession::new(options.max_attempts, options.interval);
        // Infallible from Idle; makes the busy guard observable before
        // the task gets a chance to run.
        session
            .begin()
            .map_err(|e| PollError::InvalidOptions(e.to_string()))?;

        let (state_tx, state_rx) = watch::channel(session.snapshot());
        let token = CancellationToken::new();

        info!(
            max_attempts = options.max_attempts,
            interval_ms = options.interval.as_millis() as u64,
            "Starting polling session"
        );

        let task = tokio::spawn(run_session(
            Arc::clone(&self.gateway),
            session,
            options,
            state_tx,
            token.clone(),
            Some(Box::new(on_detected) as Box<dyn FnOnce(CardEvent) + Send>),
        ));

        self.current = Some(state_rx.clone());

        Ok(PollHandle {
            token,
            state_rx,
            task,
        })
    }

    /// Snapshot of the most recent session, if any.
    #[must_use]
    pub fn last_snapshot(&self) -> Option<PollSnapshot> {
        self.current.as_ref().map(|rx| *rx.borrow())
    }
}

async fn run_session<B: Backend + 'static>(
    gateway: Arc<RelayGateway<B>>,
    mut session: PollSession,
    options: PollOptions,
    state_tx: watch::Sender<PollSnapshot>,
    token: CancellationToken,
    mut on_detected: Option<Box<dyn FnOnce(CardEvent) + Send>>,
) -> PollOutcome {
    let mut ticker = tokio::time::interval(options.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let tick_deadline = options.tick_deadline();
    let mut transport_failures: u32 = 0;

    loop {
        // The cancellation branch comes first so a pending cancel always
        // wins over a due tick.
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                return finish(&mut session, &state_tx, PollState::Cancelled, || {
                    info!("Polling session cancelled");
                    PollOutcome::Cancelled
                });
            }
            _ = ticker.tick() => {}
        }

        let attempt = session.record_attempt();
        let _ = state_tx.send(session.snapshot());
        trace!(
            attempt,
            max_attempts = session.max_attempts(),
            "Polling for card"
        );

        let result = tokio::time::timeout(
            tick_deadline,
            gateway.relay(Operation::ReadCard, None),
        )
        .await;

        // Re-check before applying anything: a cancel issued while the
        // call was in flight must discard its result, detection included.
        if token.is_cancelled() {
            return finish(&mut session, &state_tx, PollState::Cancelled, || {
                info!("Polling session cancelled while a tick was in flight");
                PollOutcome::Cancelled
            });
        }

        match result {
            Ok(relay_result) => {
                if relay_result.success
                    && let Some(event) = relay_result.card
                {
                    return detect(&mut session, &state_tx, &gateway, &mut on_detected, event);
                } else if relay_result
                    .error_code
                    .is_some_and(|code| code.is_local())
                {
                    // unknown-operation / bad-request from our own relay:
                    // no amount of ticking will fix a misconfiguration.
                    error!(message = %relay_result.message, "Relay rejected read-card locally");
                    let message = relay_result.message.clone();
                    return finish(&mut session, &state_tx, PollState::Error, || {
                        PollOutcome::Error { message }
                    });
                } else if relay_result.error_code.is_some() {
                    // Transport/upstream trouble counts against the
                    // budget like any other fruitless tick.
                    transport_failures += 1;
                    debug!(
                        attempt,
                        error_code = ?relay_result.error_code,
                        "Tick failed to reach the backend"
                    );
                } else {
                    trace!(attempt, "No card event queued");
                }
            }
            Err(_) => {
                // The relay call outlived the tick deadline. Abandon it;
                // the next tick starts clean.
                transport_failures += 1;
                debug!(attempt, "Tick deadline elapsed before the relay resolved");
            }
        }

        if session.budget_exhausted() {
            let attempts = session.attempts();
            return finish(&mut session, &state_tx, PollState::TimedOut, || {
                info!(attempts, transport_failures, "Polling session timed out");
                PollOutcome::TimedOut {
                    attempts,
                    transport_failures,
                }
            });
        }
    }
}

/// Apply a detection: terminal state, one-shot callback, best-effort
/// acknowledgement.
fn detect<B: Backend + 'static>(
    session: &mut PollSession,
    state_tx: &watch::Sender<PollSnapshot>,
    gateway: &Arc<RelayGateway<B>>,
    on_detected: &mut Option<Box<dyn FnOnce(CardEvent) + Send>>,
    event: CardEvent,
) -> PollOutcome {
    info!(card_id = %event.card_id, "Card detected");

    // A session only reaches a detection while Polling.
    if let Err(e) = session.transition_to(PollState::Detected) {
        error!("Detection transition failed: {e}");
    }
    let _ = state_tx.send(session.snapshot());

    // FnOnce taken out of the Option: structurally impossible to fire
    // twice.
    if let Some(callback) = on_detected.take() {
        callback(event.clone());
    }

    // Best-effort, non-blocking acknowledgement of the consumed event.
    // If this fails the backend may redeliver the tap to a *future*
    // session; this session is already terminal and cannot observe it.
    let ack_gateway = Arc::clone(gateway);
    tokio::spawn(async move {
        let ack = ack_gateway.relay(Operation::ClearEventQueue, None).await;
        if ack.success {
            debug!("Event queue acknowledged");
        } else {
            warn!(message = %ack.message, "Event queue acknowledgement failed");
        }
    });

    PollOutcome::Detected(event)
}

fn finish(
    session: &mut PollSession,
    state_tx: &watch::Sender<PollSnapshot>,
    state: PollState,
    outcome: impl FnOnce() -> PollOutcome,
) -> PollOutcome {
    if let Err(e) = session.transition_to(state) {
        error!("Session transition failed: {e}");
    }
    let _ = state_tx.send(session.snapshot());
    outcome()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_validation() {
        assert!(PollOptions::default().validate().is_ok());

        let zero_budget = PollOptions {
            max_attempts: 0,
            interval: Duration::from_secs(1),
        };
        assert!(matches!(
            zero_budget.validate(),
            Err(PollError::InvalidOptions(_))
        ));

        let zero_interval = PollOptions {
            max_attempts: 3,
            interval: Duration::ZERO,
        };
        assert!(matches!(
            zero_interval.validate(),
            Err(PollError::InvalidOptions(_))
        ));
    }

    #[test]
    fn test_tick_deadline_is_strictly_shorter_than_interval() {
        let options = PollOptions {
            max_attempts: 5,
            interval: Duration::from_secs(1),
        };
        assert!(options.tick_deadline() < options.interval);
        assert_eq!(options.tick_deadline(), Duration::from_millis(900));
    }
}
