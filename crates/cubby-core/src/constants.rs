//! Timing and validation constants shared across the Cubby crates.
//!
//! The retry policy values mirror the operating realities of the
//! hardware-control backend: RFID reads are flaky and are retried on a
//! short fuse, while actuator operations (drop-off, pick-up, reader
//! reset) are slow and must never be retried eagerly.
//!
//! Retry delays are deliberately *fixed*, not exponential: a person is
//! standing in front of the kiosk, so bounded worst-case latency matters
//! more than backoff growth.

use std::time::Duration;

// ============================================================================
// Relay policy defaults
// ============================================================================

/// Default per-attempt timeout for catalog/status style operations.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

/// Default number of dispatch attempts for every operation.
///
/// Retries are always bounded; a policy with fewer attempts may exist,
/// but never one with zero.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default fixed delay between retryable attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Per-attempt timeout for card reads.
///
/// Card reads poll the backend's event queue and must resolve quickly so
/// the polling controller can keep its tick cadence.
pub const READ_CARD_TIMEOUT: Duration = Duration::from_secs(2);

/// Retry delay for card reads. Shorter than [`DEFAULT_RETRY_DELAY`]
/// because a failed read should be repeated while the card is still on
/// the reader.
pub const READ_CARD_RETRY_DELAY: Duration = Duration::from_millis(200);

/// Per-attempt timeout for event-queue acknowledgement and health checks.
pub const SHORT_TIMEOUT: Duration = Duration::from_secs(2);

/// Per-attempt timeout for locker actuation (drop-off / pick-up).
///
/// The backend holds the request open while the relay physically
/// unlocks, waits, and relocks; 10s covers the full actuation cycle.
pub const ACTUATION_TIMEOUT: Duration = Duration::from_secs(10);

/// Per-attempt timeout for a reader reset, the slowest backend operation.
pub const RESET_READER_TIMEOUT: Duration = Duration::from_secs(15);

// ============================================================================
// Polling defaults
// ============================================================================

/// Default number of polling ticks before a session times out.
pub const DEFAULT_POLL_ATTEMPTS: u32 = 30;

/// Default interval between polling ticks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

// ============================================================================
// Card id validation
// ============================================================================

/// Minimum accepted card id length.
pub const MIN_CARD_ID_LENGTH: usize = 1;

/// Maximum accepted card id length.
///
/// MFRC522-style readers report decimal serials of up to 21 digits;
/// 64 leaves headroom for other reader families without admitting
/// unbounded input.
pub const MAX_CARD_ID_LENGTH: usize = 64;
