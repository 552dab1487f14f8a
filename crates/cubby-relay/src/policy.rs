//! Per-operation dispatch policies.
//!
//! Each logical operation carries its own timeout, attempt budget, and
//! fixed retry delay, tuned to the physical realities behind it: card
//! reads are cheap and flaky (short timeout, fast retry), actuator
//! operations are slow and must not be retried eagerly (long timeout,
//! standard delay). The table is built once at startup and never mutated.

use cubby_core::{
    Error, Operation, Result,
    constants::{
        ACTUATION_TIMEOUT, DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY, DEFAULT_TIMEOUT,
        READ_CARD_RETRY_DELAY, READ_CARD_TIMEOUT, RESET_READER_TIMEOUT, SHORT_TIMEOUT,
    },
};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

/// HTTP method used to reach a backend endpoint.
///
/// Kept as a local enum so policy definitions stay independent of the
/// transport crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Method::Get => write!(f, "GET"),
            Method::Post => write!(f, "POST"),
        }
    }
}

/// Dispatch policy for one logical operation.
#[derive(Debug, Clone)]
pub struct OperationPolicy {
    /// The operation this policy governs.
    pub operation: Operation,

    /// Backend endpoint path, relative to the backend root.
    pub backend_path: &'static str,

    /// HTTP method for the endpoint.
    pub method: Method,

    /// Per-attempt timeout.
    pub timeout: Duration,

    /// Total attempt budget, always at least 1.
    pub max_attempts: u32,

    /// Fixed delay between retryable attempts. Deliberately not
    /// exponential: a person is waiting at the kiosk.
    pub retry_delay: Duration,
}

/// Immutable operation → policy mapping.
///
/// [`PolicyTable::standard`] covers the full closed operation set;
/// [`PolicyTable::custom`] exists so tests can shrink timeouts and
/// budgets without touching production values.
///
/// # Examples
///
/// ```
/// use cubby_core::Operation;
/// use cubby_relay::PolicyTable;
///
/// let table = PolicyTable::standard();
/// let policy = table.get(Operation::ReadCard).unwrap();
/// assert_eq!(policy.backend_path, "/api/read-card");
/// assert_eq!(policy.max_attempts, 3);
/// ```
#[derive(Debug, Clone)]
pub struct PolicyTable {
    policies: HashMap<Operation, OperationPolicy>,
}

impl PolicyTable {
    /// The standard production policy table.
    ///
    /// Paths follow the hardware-control service's API. Note the two
    /// legacy path names: the `clear-event-queue` operation maps to
    /// `/api/clear-card-queue` and `reset-reader` to
    /// `/api/reset-rfid-reader`.
    #[must_use]
    pub fn standard() -> Self {
        let policies = [
            OperationPolicy {
                operation: Operation::Status,
                backend_path: "/api/status",
                method: Method::Get,
                timeout: DEFAULT_TIMEOUT,
                max_attempts: DEFAULT_MAX_ATTEMPTS,
                retry_delay: DEFAULT_RETRY_DELAY,
            },
            OperationPolicy {
                operation: Operation::WashTypes,
                backend_path: "/api/wash-types",
                method: Method::Get,
                timeout: DEFAULT_TIMEOUT,
                max_attempts: DEFAULT_MAX_ATTEMPTS,
                retry_delay: DEFAULT_RETRY_DELAY,
            },
            OperationPolicy {
                operation: Operation::ReadCard,
                backend_path: "/api/read-card",
                method: Method::Get,
                timeout: READ_CARD_TIMEOUT,
                max_attempts: DEFAULT_MAX_ATTEMPTS,
                retry_delay: READ_CARD_RETRY_DELAY,
            },
            OperationPolicy {
                operation: Operation::ClearEventQueue,
                backend_path: "/api/clear-card-queue",
                method: Method::Post,
                timeout: SHORT_TIMEOUT,
                max_attempts: DEFAULT_MAX_ATTEMPTS,
                retry_delay: DEFAULT_RETRY_DELAY,
            },
            OperationPolicy {
                operation: Operation::DropOff,
                backend_path: "/api/drop-off",
                method: Method::Post,
                timeout: ACTUATION_TIMEOUT,
                max_attempts: DEFAULT_MAX_ATTEMPTS,
                retry_delay: DEFAULT_RETRY_DELAY,
            },
            OperationPolicy {
                operation: Operation::PickUp,
                backend_path: "/api/pick-up",
                method: Method::Post,
                timeout: ACTUATION_TIMEOUT,
                max_attempts: DEFAULT_MAX_ATTEMPTS,
                retry_delay: DEFAULT_RETRY_DELAY,
            },
            OperationPolicy {
                operation: Operation::Health,
                backend_path: "/api/health",
                method: Method::Get,
                timeout: SHORT_TIMEOUT,
                max_attempts: DEFAULT_MAX_ATTEMPTS,
                retry_delay: DEFAULT_RETRY_DELAY,
            },
            OperationPolicy {
                operation: Operation::ResetReader,
                backend_path: "/api/reset-rfid-reader",
                method: Method::Post,
                timeout: RESET_READER_TIMEOUT,
                max_attempts: DEFAULT_MAX_ATTEMPTS,
                retry_delay: DEFAULT_RETRY_DELAY,
            },
            OperationPolicy {
                operation: Operation::DeviceInfo,
                backend_path: "/api/device-info",
                method: Method::Get,
                timeout: DEFAULT_TIMEOUT,
                max_attempts: DEFAULT_MAX_ATTEMPTS,
                retry_delay: DEFAULT_RETRY_DELAY,
            },
        ]
        .into_iter()
        .map(|policy| (policy.operation, policy))
        .collect();

        PolicyTable { policies }
    }

    /// Build a table from explicit policies.
    ///
    /// # Errors
    /// Returns `Error::Config` if any policy has a zero attempt budget
    /// or if two policies name the same operation.
    pub fn custom(policies: impl IntoIterator<Item = OperationPolicy>) -> Result<Self> {
        let mut map = HashMap::new();
        for policy in policies {
            if policy.max_attempts == 0 {
                return Err(Error::Config(format!(
                    "Policy for {} must allow at least one attempt",
                    policy.operation
                )));
            }
            if map.insert(policy.operation, policy.clone()).is_some() {
                return Err(Error::Config(format!(
                    "Duplicate policy for {}",
                    policy.operation
                )));
            }
        }
        Ok(PolicyTable { policies: map })
    }

    /// Look up the policy for an operation.
    ///
    /// With the standard table this always succeeds; custom tables may
    /// be partial, and a miss is treated by the gateway as a local
    /// `unknown-operation` rejection.
    #[must_use]
    pub fn get(&self, operation: Operation) -> Option<&OperationPolicy> {
        self.policies.get(&operation)
    }

    /// Number of operations covered by this table.
    #[must_use]
    pub fn len(&self) -> usize {
        self.policies.len()
    }

    /// Returns `true` if the table contains no policies.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

impl Default for PolicyTable {
    fn default() -> Self {
        Self::standard()
    }
}
