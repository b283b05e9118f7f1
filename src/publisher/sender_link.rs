//! Outbound link bookkeeping
//!
//! The link may be told it is sendable any number of times (flow frames are
//! repeated, credit is topped up). Only the first notification with credit
//! produces a message.

use crate::protocol::MessageEnvelope;
use tracing::debug;

/// Credit and delivery flags for the single outbound link
///
/// `credit` is whatever the transport reported. The fe2o3-amqp client waits
/// for the broker's flow frame inside its own send and always reports a
/// grant of 1 after attach, so there the field does not mirror the broker's
/// actual link credit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SenderState {
    /// Transfers the broker currently allows
    pub credit: u32,
    /// The message has been handed to the transport
    pub sent: bool,
    /// The broker accepted the message
    pub confirmed: bool,
}

/// One sender link carrying exactly one message
#[derive(Debug, Clone)]
pub struct SenderLink {
    source: String,
    envelope: MessageEnvelope,
    state: SenderState,
}

impl SenderLink {
    pub fn new(source: impl Into<String>, address: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            source: source.into(),
            envelope: MessageEnvelope::new(address, body),
            state: SenderState::default(),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn address(&self) -> &str {
        &self.envelope.address
    }

    pub fn state(&self) -> SenderState {
        self.state
    }

    /// Record granted credit; returns the message the first time a send is
    /// permitted and `None` on every later call
    pub fn on_credit(&mut self, credit: u32) -> Option<MessageEnvelope> {
        self.state.credit = credit;
        if self.state.sent {
            debug!(credit, "Credit after send ignored");
            return None;
        }
        if credit == 0 {
            return None;
        }

        self.state.credit -= 1;
        self.state.sent = true;
        Some(self.envelope.clone())
    }

    /// Record an accepted disposition; only meaningful after the send
    pub fn on_accepted(&mut self) -> bool {
        if self.state.sent {
            self.state.confirmed = true;
        }
        self.state.confirmed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn link() -> SenderLink {
        SenderLink::new("ci", "/topic/builds", json!({"build": "os-release-4243"}))
    }

    #[test]
    fn test_first_credit_sends() {
        let mut link = link();

        let envelope = link.on_credit(10).unwrap();

        assert_eq!(envelope.address, "/topic/builds");
        assert_eq!(envelope.body, json!({"build": "os-release-4243"}));
        assert_eq!(
            link.state(),
            SenderState {
                credit: 9,
                sent: true,
                confirmed: false
            }
        );
    }

    #[test]
    fn test_repeated_credit_never_resends() {
        let mut link = link();

        assert!(link.on_credit(1).is_some());
        assert!(link.on_credit(1).is_none());
        assert!(link.on_credit(100).is_none());
        assert!(link.state().sent);
    }

    #[test]
    fn test_zero_credit_does_not_send() {
        let mut link = link();

        assert!(link.on_credit(0).is_none());
        assert!(!link.state().sent);
        assert!(link.on_credit(1).is_some());
    }

    #[test]
    fn test_accept_before_send_is_not_confirmation() {
        let mut link = link();

        assert!(!link.on_accepted());
        assert!(!link.state().confirmed);

        link.on_credit(1);
        assert!(link.on_accepted());
        assert!(link.state().confirmed);
    }
}
