//! Poll session state machine.
//!
//! One session is one bounded run of periodic card-detection checks for
//! a single kiosk flow. The session is an explicit value with a state
//! field and validated transitions; there are no free-floating timer
//! handles or shared mutable "in progress" booleans anywhere.
//!
//! # States
//!
//! - `Idle`: created, not yet ticking
//! - `Polling`: ticking against the backend
//! - `Detected`: a card tap was consumed (terminal)
//! - `TimedOut`: attempt budget spent without detection (terminal)
//! - `Cancelled`: caller cancelled the session (terminal)
//! - `Error`: the relay rejected the session's operations locally,
//!   which means misconfiguration, not a flaky backend (terminal)
//!
//! # Valid transitions
//!
//! - Idle → Polling | Cancelled
//! - Polling → Detected | TimedOut | Cancelled | Error
//!
//! Terminal states have no exits: resuming after a timeout requires a
//! caller-initiated restart with a fresh session, never an automatic
//! one.

use cubby_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// State of a polling session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollState {
    /// Created, not yet ticking.
    Idle,

    /// Ticking against the backend's event queue.
    Polling,

    /// A card tap was detected and consumed.
    Detected,

    /// Attempt budget spent without a detection.
    TimedOut,

    /// Cancelled by the caller.
    Cancelled,

    /// Local relay rejection ended the session.
    Error,
}

impl PollState {
    /// Check if a transition to `target` is valid from this state.
    ///
    /// # Examples
    ///
    /// ```
    /// use cubby_poll::PollState;
    ///
    /// assert!(PollState::Idle.can_transition_to(PollState::Polling));
    /// assert!(PollState::Polling.can_transition_to(PollState::Detected));
    /// assert!(!PollState::Detected.can_transition_to(PollState::Polling));
    /// ```
    #[must_use]
    pub fn can_transition_to(&self, target: PollState) -> bool {
        matches!(
            (self, target),
            (PollState::Idle, PollState::Polling | PollState::Cancelled)
                | (
                    PollState::Polling,
                    PollState::Detected
                        | PollState::TimedOut
                        | PollState::Cancelled
                        | PollState::Error
                )
        )
    }

    /// Returns `true` once the session can make no further progress.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PollState::Detected | PollState::TimedOut | PollState::Cancelled | PollState::Error
        )
    }
}

impl fmt::Display for PollState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            PollState::Idle => "Idle",
            PollState::Polling => "Polling",
            PollState::Detected => "Detected",
            PollState::TimedOut => "TimedOut",
            PollState::Cancelled => "Cancelled",
            PollState::Error => "Error",
        };
        write!(f, "{s}")
    }
}

/// One bounded run of periodic card-detection checks.
///
/// Owned by the controller task that drives it; observers see it only
/// through [`PollSnapshot`] values published on a watch channel.
#[derive(Debug)]
pub struct PollSession {
    attempts: u32,
    max_attempts: u32,
    interval: Duration,
    state: PollState,
}

impl PollSession {
    /// Create a session in the `Idle` state.
    #[must_use]
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            attempts: 0,
            max_attempts,
            interval,
            state: PollState::Idle,
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> PollState {
        self.state
    }

    /// Ticks consumed so far.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Total tick budget.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Interval between ticks.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Move from `Idle` to `Polling`.
    ///
    /// # Errors
    /// Returns `Error::InvalidStateTransition` if the session already
    /// left `Idle`.
    pub fn begin(&mut self) -> Result<()> {
        self.transition_to(PollState::Polling)
    }

    /// Record one tick against the budget and return the new count.
    ///
    /// Attempts only accumulate while `Polling`; the count, and the
    /// progress derived from it, never decreases.
    pub fn record_attempt(&mut self) -> u32 {
        debug_assert_eq!(self.state, PollState::Polling);
        self.attempts = self.attempts.saturating_add(1);
        self.attempts
    }

    /// Returns `true` once every budgeted tick has been used.
    #[must_use]
    pub fn budget_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }

    /// Fraction of the budget consumed, in `0.0..=1.0`.
    ///
    /// Monotonically non-decreasing; exposed for progress feedback.
    #[must_use]
    pub fn progress(&self) -> f32 {
        if self.max_attempts == 0 {
            return 1.0;
        }
        (self.attempts as f32 / self.max_attempts as f32).min(1.0)
    }

    /// Transition to a new state, validating the transition.
    ///
    /// # Errors
    /// Returns `Error::InvalidStateTransition` if the transition is not
    /// allowed from the current state.
    pub fn transition_to(&mut self, new_state: PollState) -> Result<()> {
        if !self.state.can_transition_to(new_state) {
            return Err(Error::InvalidStateTransition {
                from: self.state.to_string(),
                to: new_state.to_string(),
            });
        }
        self.state = new_state;
        Ok(())
    }

    /// Immutable view of the session for observers.
    #[must_use]
    pub fn snapshot(&self) -> PollSnapshot {
        PollSnapshot {
            state: self.state,
            attempts: self.attempts,
            max_attempts: self.max_attempts,
        }
    }
}

/// Observable view of a [`PollSession`], published after every change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollSnapshot {
    /// Session state at the time of the snapshot.
    pub state: PollState,

    /// Ticks consumed.
    pub attempts: u32,

    /// Total tick budget.
    pub max_attempts: u32,
}

impl PollSnapshot {
    /// Fraction of the budget consumed, in `0.0..=1.0`.
    #[must_use]
    pub fn progress(&self) -> f32 {
        if self.max_attempts == 0 {
            return 1.0;
        }
        (self.attempts as f32 / self.max_attempts as f32).min(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_is_idle() {
        let session = PollSession::new(30, Duration::from_secs(1));
        assert_eq!(session.state(), PollState::Idle);
        assert_eq!(session.attempts(), 0);
        assert!(!session.budget_exhausted());
    }

    #[test]
    fn test_begin_moves_to_polling() {
        let mut session = PollSession::new(30, Duration::from_secs(1));
        session.begin().unwrap();
        assert_eq!(session.state(), PollState::Polling);

        // A second begin is invalid.
        assert!(session.begin().is_err());
    }

    #[test]
    fn test_polling_can_reach_every_terminal_state() {
        for terminal in [
            PollState::Detected,
            PollState::TimedOut,
            PollState::Cancelled,
            PollState::Error,
        ] {
            let mut session = PollSession::new(5, Duration::from_millis(100));
            session.begin().unwrap();
            session.transition_to(terminal).unwrap();
            assert!(session.state().is_terminal());
        }
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        let mut session = PollSession::new(5, Duration::from_millis(100));
        session.begin().unwrap();
        session.transition_to(PollState::Detected).unwrap();

        for target in [
            PollState::Idle,
            PollState::Polling,
            PollState::TimedOut,
            PollState::Cancelled,
            PollState::Error,
        ] {
            assert!(session.transition_to(target).is_err());
        }
    }

    #[test]
    fn test_idle_can_be_cancelled() {
        let mut session = PollSession::new(5, Duration::from_millis(100));
        session.transition_to(PollState::Cancelled).unwrap();
        assert_eq!(session.state(), PollState::Cancelled);
    }

    #[test]
    fn test_idle_cannot_jump_to_detected() {
        let mut session = PollSession::new(5, Duration::from_millis(100));
        assert!(session.transition_to(PollState::Detected).is_err());
    }

    #[test]
    fn test_progress_is_monotone_and_clamped() {
        let mut session = PollSession::new(4, Duration::from_millis(100));
        session.begin().unwrap();

        let mut last = session.progress();
        for _ in 0..6 {
            session.record_attempt();
            let current = session.progress();
            assert!(current >= last);
            last = current;
        }
        assert_eq!(session.progress(), 1.0);
        assert!(session.budget_exhausted());
    }

    #[test]
    fn test_budget_exhausted_at_exact_count() {
        let mut session = PollSession::new(3, Duration::from_millis(100));
        session.begin().unwrap();
        session.record_attempt();
        session.record_attempt();
        assert!(!session.budget_exhausted());
        session.record_attempt();
        assert!(session.budget_exhausted());
    }

    #[test]
    fn test_snapshot_reflects_session() {
        let mut session = PollSession::new(10, Duration::from_millis(250));
        session.begin().unwrap();
        session.record_attempt();

        let snapshot = session.snapshot();
        assert_eq!(snapshot.state, PollState::Polling);
        assert_eq!(snapshot.attempts, 1);
        assert_eq!(snapshot.max_attempts, 10);
        assert!((snapshot.progress() - 0.1).abs() < f32::EPSILON);
    }
}
