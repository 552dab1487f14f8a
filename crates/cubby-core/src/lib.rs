//! Core types for the Cubby kiosk client.
//!
//! This crate defines the shared vocabulary used by the relay gateway and
//! the polling controller: logical operation names, the uniform result
//! envelope, the error-code taxonomy, and card identifiers. It carries no
//! I/O of its own.

pub mod constants;
pub mod envelope;
pub mod error;
pub mod types;

pub use envelope::{ErrorCode, RelayResult};
pub use error::{Error, Result};
pub use types::{CardEvent, CardId, CorrelationId, Operation};
