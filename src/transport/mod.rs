//! Transport layer for the AMQP publish
//!
//! This module provides the transport abstraction the publisher drives and
//! the AMQP 1.0 implementation behind it.

use crate::config::ConfigError;
use crate::protocol::{MessageEnvelope, PublishEvent};
use url::Url;

pub mod amqp;

pub use amqp::connection::ConnectionState;

/// Transport trait for a one-shot publish
///
/// This trait provides an abstraction over the wire client so the publish
/// state machine can be driven by the real AMQP client or by a scripted
/// broker in tests.
#[async_trait::async_trait]
pub trait AmqpTransport: Send {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Open a connection to a single broker URL
    async fn open(&mut self, url: &Url) -> Result<(), Self::Error>;

    /// Attach the outbound link; credit arrives later as an event
    async fn attach_sender(&mut self, source: &str, address: &str) -> Result<(), Self::Error>;

    /// Hand one message to the link; its disposition arrives later as an event
    async fn send(&mut self, envelope: &MessageEnvelope) -> Result<(), Self::Error>;

    /// Wait for the next protocol event; `None` once no more can arrive
    async fn next_event(&mut self) -> Option<PublishEvent>;

    /// Close the connection; closing an already closed connection is a no-op
    async fn close(&mut self) -> Result<(), Self::Error>;

    /// Get current connection state
    fn connection_state(&self) -> ConnectionState;
}

/// Check once, before any network activity, that an AMQP client is built in
pub fn probe_amqp_support() -> Result<(), ConfigError> {
    if cfg!(feature = "amqp") {
        Ok(())
    } else {
        Err(ConfigError::LibraryUnavailable(
            "built without the `amqp` feature".to_string(),
        ))
    }
}

/// Type alias for the AMQP 1.0 transport
#[cfg(feature = "amqp")]
pub type DefaultTransport = amqp::AmqpClient;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_matches_build_features() {
        assert_eq!(probe_amqp_support().is_ok(), cfg!(feature = "amqp"));
    }
}
