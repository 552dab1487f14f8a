//! Relay gateway for the Cubby kiosk client.
//!
//! This crate forwards logical operations to the hardware-control backend
//! under per-operation timeout and retry policies, and normalizes every
//! outcome into the uniform [`RelayResult`](cubby_core::RelayResult)
//! envelope.
//!
//! # Components
//!
//! - **PolicyTable**: immutable operation → policy mapping, built once
//! - **Backend**: transport abstraction with HTTP and mock implementations
//! - **RelayGateway**: the retry/classification/normalization engine
//!
//! # Example
//!
//! ```no_run
//! use cubby_core::Operation;
//! use cubby_relay::{HttpBackend, HttpBackendConfig, RelayGateway};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let backend = HttpBackend::new(HttpBackendConfig {
//!     base_url: "http://192.168.0.40:5000".to_string(),
//!     ..Default::default()
//! })?;
//!
//! let gateway = RelayGateway::new(backend);
//! let result = gateway.relay(Operation::Status, None).await;
//! println!("backend status: {}", result.message);
//! # Ok(())
//! # }
//! ```

mod backend;
mod gateway;
mod http;
pub mod mock;
mod policy;

pub use backend::{Backend, BackendReply, BackendRequest, TransportError};
pub use gateway::RelayGateway;
pub use http::{HttpBackend, HttpBackendConfig};
pub use policy::{Method, OperationPolicy, PolicyTable};
