//! Kiosk-side flows for the Cubby locker client.
//!
//! Ties the relay gateway and the polling controller together into the
//! two walk-up flows (drop-off and pick-up) and maps their outcomes to
//! user-facing messages. Raw error codes never reach the person at the
//! kiosk; they see "no card detected" or "connection issue" with a
//! retry affordance, while the codes stay in the logs.

pub mod config;
pub mod flow;

pub use config::KioskConfig;
pub use flow::{FlowReport, KioskFlows};
