//! Mock implementations for testing
//!
//! [`MockTransport`] plays the broker side of a publish from a script: which
//! URLs refuse or never answer connections, how many times credit is granted,
//! and how the broker settles the transfer.

use crate::protocol::{MessageEnvelope, PublishEvent};
use crate::transport::amqp::connection::{AmqpError, ConnectionState};
use crate::transport::AmqpTransport;
use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;
use url::Url;

/// How the mock broker reacts to the transfer
#[derive(Debug, Clone, PartialEq)]
pub enum BrokerBehavior {
    /// Settle with the accepted outcome
    Accept,
    /// Settle with the rejected outcome
    Reject(String),
    /// Settle with the released outcome
    Release,
    /// Never settle and never close
    Silent,
    /// Drop the connection after receiving the transfer
    DropConnection,
    /// Stop producing events once the queue is drained
    EndStream,
    /// Refuse the link attach
    RefuseAttach,
}

/// Observable broker-side record of what the client did
#[derive(Debug, Default)]
pub struct MockBrokerState {
    pub open_attempts: Vec<String>,
    pub connected_url: Option<String>,
    pub attached_links: Vec<(String, String)>,
    pub sent_messages: Vec<MessageEnvelope>,
    pub close_calls: u32,
    pub events: VecDeque<PublishEvent>,
    open: bool,
}

/// Mock transport for testing
#[derive(Debug, Clone)]
pub struct MockTransport {
    pub broker: Arc<Mutex<MockBrokerState>>,
    unreachable: HashSet<String>,
    hanging: HashSet<String>,
    behavior: BrokerBehavior,
    credit_grants: u32,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self {
            broker: Arc::new(Mutex::new(MockBrokerState::default())),
            unreachable: HashSet::new(),
            hanging: HashSet::new(),
            behavior: BrokerBehavior::Accept,
            credit_grants: 1,
        }
    }
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse connections to this URL
    pub fn with_unreachable(mut self, url: &str) -> Self {
        self.unreachable.insert(url.to_string());
        self
    }

    /// Never answer connections to this URL, like a host dropping packets
    pub fn with_hanging(mut self, url: &str) -> Self {
        self.hanging.insert(url.to_string());
        self
    }

    pub fn with_behavior(mut self, behavior: BrokerBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    /// Number of separate credit grants delivered after the attach
    pub fn with_credit_grants(mut self, grants: u32) -> Self {
        self.credit_grants = grants;
        self
    }

    pub async fn get_open_attempts(&self) -> Vec<String> {
        self.broker.lock().await.open_attempts.clone()
    }

    pub async fn get_connected_url(&self) -> Option<String> {
        self.broker.lock().await.connected_url.clone()
    }

    pub async fn get_attached_links(&self) -> Vec<(String, String)> {
        self.broker.lock().await.attached_links.clone()
    }

    pub async fn get_sent_messages(&self) -> Vec<MessageEnvelope> {
        self.broker.lock().await.sent_messages.clone()
    }

    pub async fn close_calls(&self) -> u32 {
        self.broker.lock().await.close_calls
    }

    /// Connections the broker still considers open
    pub async fn open_connections(&self) -> usize {
        usize::from(self.broker.lock().await.open)
    }
}

#[async_trait]
impl AmqpTransport for MockTransport {
    type Error = AmqpError;

    async fn open(&mut self, url: &Url) -> Result<(), Self::Error> {
        let mut broker = self.broker.lock().await;
        broker.open_attempts.push(url.as_str().to_string());

        if self.hanging.contains(url.as_str()) {
            drop(broker);
            std::future::pending::<()>().await;
            return Err(AmqpError::ConnectionFailed("Mock host never answered".into()));
        }

        if self.unreachable.contains(url.as_str()) {
            return Err(AmqpError::ConnectionFailed(
                "Mock connection refused".into(),
            ));
        }

        broker.open = true;
        broker.connected_url = Some(url.as_str().to_string());
        Ok(())
    }

    async fn attach_sender(&mut self, source: &str, address: &str) -> Result<(), Self::Error> {
        let mut broker = self.broker.lock().await;
        if !broker.open {
            return Err(AmqpError::NotConnected {
                state: ConnectionState::Idle,
            });
        }
        if self.behavior == BrokerBehavior::RefuseAttach {
            return Err(AmqpError::AttachFailed("Mock link refused".into()));
        }

        broker
            .attached_links
            .push((source.to_string(), address.to_string()));
        for _ in 0..self.credit_grants {
            broker
                .events
                .push_back(PublishEvent::CreditGranted { credit: 1 });
        }
        Ok(())
    }

    async fn send(&mut self, envelope: &MessageEnvelope) -> Result<(), Self::Error> {
        let mut broker = self.broker.lock().await;
        if !broker.open {
            return Err(AmqpError::SendFailed("Mock connection closed".into()));
        }
        broker.sent_messages.push(envelope.clone());

        match &self.behavior {
            BrokerBehavior::Accept => broker.events.push_back(PublishEvent::MessageAccepted),
            BrokerBehavior::Reject(reason) => {
                broker.events.push_back(PublishEvent::MessageRejected {
                    reason: reason.clone(),
                })
            }
            BrokerBehavior::Release => broker.events.push_back(PublishEvent::MessageReleased),
            BrokerBehavior::DropConnection => {
                broker.open = false;
                broker.events.push_back(PublishEvent::ConnectionClosed);
            }
            BrokerBehavior::Silent | BrokerBehavior::EndStream | BrokerBehavior::RefuseAttach => {}
        }
        Ok(())
    }

    async fn next_event(&mut self) -> Option<PublishEvent> {
        let event = self.broker.lock().await.events.pop_front();
        match event {
            Some(event) => Some(event),
            None if self.behavior == BrokerBehavior::Silent => {
                std::future::pending::<()>().await;
                None
            }
            None => None,
        }
    }

    async fn close(&mut self) -> Result<(), Self::Error> {
        let mut broker = self.broker.lock().await;
        broker.close_calls += 1;
        broker.open = false;
        Ok(())
    }

    fn connection_state(&self) -> ConnectionState {
        match self.broker.try_lock() {
            Ok(broker) if broker.open => {
                ConnectionState::Open(broker.connected_url.clone().unwrap_or_default())
            }
            Ok(broker) if broker.close_calls > 0 => ConnectionState::Closed,
            Ok(_) => ConnectionState::Idle,
            Err(_) => ConnectionState::Closing,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_unreachable_url_refuses() {
        let mut transport = MockTransport::new().with_unreachable("amqp://down:5672");

        let result = transport.open(&Url::parse("amqp://down:5672").unwrap()).await;

        assert!(result.is_err());
        assert_eq!(transport.open_connections().await, 0);
    }

    #[tokio::test]
    async fn test_credit_grants_queued_after_attach() {
        let mut transport = MockTransport::new().with_credit_grants(3);
        transport
            .open(&Url::parse("amqp://up:5672").unwrap())
            .await
            .unwrap();
        transport.attach_sender("ci", "q").await.unwrap();

        for _ in 0..3 {
            assert_eq!(
                transport.next_event().await,
                Some(PublishEvent::CreditGranted { credit: 1 })
            );
        }
        assert_eq!(transport.next_event().await, None);
    }

    #[tokio::test]
    async fn test_send_records_message_and_settles() {
        let mut transport = MockTransport::new()
            .with_behavior(BrokerBehavior::Reject("amqp:not-allowed".to_string()))
            .with_credit_grants(0);
        transport
            .open(&Url::parse("amqp://up:5672").unwrap())
            .await
            .unwrap();
        transport
            .send(&MessageEnvelope::new("q", json!({"a": 1})))
            .await
            .unwrap();

        assert_eq!(transport.get_sent_messages().await.len(), 1);
        assert_eq!(
            transport.next_event().await,
            Some(PublishEvent::MessageRejected {
                reason: "amqp:not-allowed".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_silent_broker_never_yields() {
        let mut transport = MockTransport::new().with_behavior(BrokerBehavior::Silent);

        let mut next = tokio_test::task::spawn(transport.next_event());

        tokio_test::assert_pending!(next.poll());
        tokio_test::assert_pending!(next.poll());
    }

    #[tokio::test]
    async fn test_close_marks_connection_closed() {
        let mut transport = MockTransport::new();
        transport
            .open(&Url::parse("amqp://up:5672").unwrap())
            .await
            .unwrap();
        assert!(transport.connection_state().is_open());

        transport.close().await.unwrap();

        assert_eq!(transport.connection_state(), ConnectionState::Closed);
        assert_eq!(transport.open_connections().await, 0);
    }
}
