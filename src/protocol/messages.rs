//! Message envelope and terminal outcome of a publish

use crate::error::PublishError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// The single message transmitted on the sender link
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEnvelope {
    /// Target address, carried in the `to` property
    pub address: String,
    /// Payload, carried as an AMQP value section
    pub body: serde_json::Value,
}

impl MessageEnvelope {
    pub fn new(address: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            address: address.into(),
            body,
        }
    }
}

/// Why a publish failed without a broker disposition
#[derive(Debug, Clone, PartialEq)]
pub enum FailureReason {
    /// No candidate URL produced an open connection
    Connection(String),
    /// Link or connection failed before the message was sent
    Transport(String),
    /// Connection ended after the send but before a disposition
    Unconfirmed(String),
    /// The deadline passed first
    Timeout(Duration),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Connection(reason) => write!(f, "connection error: {reason}"),
            FailureReason::Transport(reason) => write!(f, "transport error: {reason}"),
            FailureReason::Unconfirmed(reason) => {
                write!(f, "delivery not confirmed: {reason}")
            }
            FailureReason::Timeout(timeout) => {
                write!(f, "no acknowledgment within {}s", timeout.as_secs_f64())
            }
        }
    }
}

/// Terminal result of one publish attempt
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Broker accepted the message
    Confirmed,
    /// Broker rejected, released or modified the message
    Rejected { reason: String },
    /// Anything else; never counts as delivered
    Failed(FailureReason),
}

impl Outcome {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, Outcome::Confirmed)
    }

    /// Map the outcome onto the publish error taxonomy
    pub fn into_result(self) -> Result<(), PublishError> {
        match self {
            Outcome::Confirmed => Ok(()),
            Outcome::Rejected { reason } => Err(PublishError::Rejected { reason }),
            Outcome::Failed(FailureReason::Connection(message)) => {
                Err(PublishError::Connection { message })
            }
            Outcome::Failed(FailureReason::Transport(message))
            | Outcome::Failed(FailureReason::Unconfirmed(message)) => {
                Err(PublishError::Unconfirmed { message })
            }
            Outcome::Failed(FailureReason::Timeout(timeout)) => {
                Err(PublishError::Timeout { timeout })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_serialization() {
        let envelope = MessageEnvelope::new("/topic/builds", json!({"build": 42}));
        let value = serde_json::to_value(&envelope).unwrap();

        assert_eq!(value["address"], "/topic/builds");
        assert_eq!(value["body"]["build"], 42);
    }

    #[test]
    fn test_only_confirmed_is_success() {
        assert!(Outcome::Confirmed.into_result().is_ok());
        assert!(Outcome::Rejected {
            reason: "amqp:not-allowed".to_string()
        }
        .into_result()
        .is_err());
        assert!(
            Outcome::Failed(FailureReason::Unconfirmed("closed".to_string()))
                .into_result()
                .is_err()
        );
    }

    #[test]
    fn test_rejection_maps_distinctly_from_connection_error() {
        let rejected = Outcome::Rejected {
            reason: "queue full".to_string(),
        }
        .into_result()
        .unwrap_err();
        let unreachable = Outcome::Failed(FailureReason::Connection("refused".to_string()))
            .into_result()
            .unwrap_err();

        assert!(matches!(rejected, PublishError::Rejected { .. }));
        assert!(matches!(unreachable, PublishError::Connection { .. }));
    }

    #[test]
    fn test_failure_reason_display() {
        assert_eq!(
            FailureReason::Timeout(Duration::from_secs(30)).to_string(),
            "no acknowledgment within 30s"
        );
        assert_eq!(
            FailureReason::Connection("refused".to_string()).to_string(),
            "connection error: refused"
        );
    }
}
