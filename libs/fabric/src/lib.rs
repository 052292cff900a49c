//! IBKR Relay Fabric - Queue transport and correlated dispatch
//!
//! Recovers request/response semantics on top of an asynchronous,
//! at-least-once, unordered message queue: envelopes are encoded by a
//! [`codec::Codec`], carried by a [`transport::Queue`], and matched back
//! to their caller by correlation id in the [`Dispatcher`].
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use ibkr_relay_fabric::{Dispatcher, transport::MemoryQueue};
//! use serde_json::Map;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let queue = Arc::new(MemoryQueue::new());
//! let dispatcher = Dispatcher::new(
//!     queue,
//!     "memory://requests".into(),
//!     "memory://responses".into(),
//! );
//!
//! // Resolves once a remote executor answers on the response channel
//! let health = dispatcher
//!     .call("tws_health", Map::new(), Duration::from_secs(30))
//!     .await?;
//! println!("{health}");
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod classify;
pub mod codec;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod poll;
pub mod transport;

// Re-exports for convenience
pub use channel::Channel;
pub use config::RelayConfig;
pub use dispatcher::{Dispatcher, CORRELATION_ATTRIBUTE, EXECUTION_ATTRIBUTE};
pub use error::{ConfigError, DecodeError, Result, TransportError};
pub use poll::PollPolicy;
