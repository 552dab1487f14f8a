//! Bounded, cancellable card-detection polling for the Cubby kiosk.
//!
//! A [`PollController`] runs one [`PollSession`] at a time: it ticks on a
//! fixed interval, issues `read-card` through the relay gateway on each
//! tick, tracks the attempt budget, and on detection fires the caller's
//! callback exactly once before acknowledging the consumed event.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use cubby_poll::{PollController, PollOptions};
//! use cubby_relay::{HttpBackend, HttpBackendConfig, RelayGateway};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let backend = HttpBackend::new(HttpBackendConfig::default())?;
//! let gateway = Arc::new(RelayGateway::new(backend));
//!
//! let mut controller = PollController::new(gateway);
//! let handle = controller.start(PollOptions::default(), |event| {
//!     println!("card tapped: {}", event.card_id);
//! })?;
//!
//! let outcome = handle.join().await;
//! println!("session ended: {outcome:?}");
//! # Ok(())
//! # }
//! ```

mod controller;
mod session;

pub use controller::{PollController, PollError, PollHandle, PollOptions, PollOutcome};
pub use session::{PollSession, PollSnapshot, PollState};
