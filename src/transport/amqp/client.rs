//! Impure I/O operations for the AMQP client
//!
//! This module owns the `fe2o3-amqp` connection, session and sender link and
//! translates their results into [`PublishEvent`]s for the publisher loop.

use super::connection::{display_endpoint, AmqpError, ConnectionState};
use super::tls::TlsConfig;
use crate::config::ConfigError;
use crate::protocol::{MessageEnvelope, PublishEvent};
use crate::transport::AmqpTransport;
use async_trait::async_trait;
use fe2o3_amqp::connection::ConnectionHandle;
use fe2o3_amqp::session::SessionHandle;
use fe2o3_amqp::types::messaging::{
    AmqpValue, Message, Outcome as Disposition, Properties, Source, Target,
};
use fe2o3_amqp::{Connection, Sender, Session};
use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use tracing::{debug, info, warn};
use url::Url;

/// AMQP 1.0 transport client for a single publish
pub struct AmqpClient {
    container_id: String,
    tls_connector: Option<TlsConnector>,
    connection: Option<ConnectionHandle<()>>,
    session: Option<SessionHandle<()>>,
    sender: Option<Sender>,
    send_task: Option<JoinHandle<()>>,
    state: ConnectionState,
    events_tx: mpsc::UnboundedSender<PublishEvent>,
    events_rx: mpsc::UnboundedReceiver<PublishEvent>,
}

impl AmqpClient {
    /// Create a client; reads the TLS material up front so bad files fail
    /// before any connection attempt
    pub fn new(tls: Option<&TlsConfig>) -> Result<Self, ConfigError> {
        let tls_connector = tls.map(TlsConfig::connector).transpose()?;
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        Ok(Self {
            container_id: format!("amqp-publisher-{}", uuid::Uuid::new_v4()),
            tls_connector,
            connection: None,
            session: None,
            sender: None,
            send_task: None,
            state: ConnectionState::Idle,
            events_tx,
            events_rx,
        })
    }

    pub fn container_id(&self) -> &str {
        &self.container_id
    }

    fn emit(&self, event: PublishEvent) {
        // The receiver lives in `self`, so this only fails during teardown
        let _ = self.events_tx.send(event);
    }

    fn build_message(envelope: &MessageEnvelope) -> Message<AmqpValue<serde_json::Value>> {
        Message::builder()
            .properties(Properties::builder().to(envelope.address.clone()).build())
            .value(envelope.body.clone())
            .build()
    }

    /// Classify the broker's terminal judgment on the transfer
    fn classify_disposition(disposition: Disposition) -> PublishEvent {
        match disposition {
            Disposition::Accepted(_) => PublishEvent::MessageAccepted,
            Disposition::Rejected(rejected) => {
                let reason = rejected
                    .error
                    .map(|e| {
                        e.description
                            .unwrap_or_else(|| format!("{:?}", e.condition))
                    })
                    .unwrap_or_else(|| "rejected by broker".to_string());
                PublishEvent::MessageRejected { reason }
            }
            Disposition::Released(_) => PublishEvent::MessageReleased,
            Disposition::Modified(_) => PublishEvent::MessageRejected {
                reason: "modified by broker".to_string(),
            },
            #[allow(unreachable_patterns)]
            other => PublishEvent::MessageRejected {
                reason: format!("unexpected outcome {other:?}"),
            },
        }
    }
}

/// How long `close` lets the send task finish its detach
const DETACH_GRACE: Duration = Duration::from_secs(1);

/// Hand the disposition to the publisher, then detach the link
///
/// The event goes out first so a confirmed transfer never waits on the
/// broker answering the detach.
async fn settle_transfer<D>(
    event: PublishEvent,
    events_tx: &mpsc::UnboundedSender<PublishEvent>,
    detach: D,
) where
    D: Future<Output = ()>,
{
    if let Err(e) = events_tx.send(event) {
        debug!(
            event = e.0.name(),
            "Publisher stopped listening before the disposition"
        );
    }
    detach.await;
}

#[async_trait]
impl AmqpTransport for AmqpClient {
    type Error = AmqpError;

    async fn open(&mut self, url: &Url) -> Result<(), Self::Error> {
        if self.state.is_open() {
            return Err(AmqpError::ConnectionFailed(
                "a connection is already open".into(),
            ));
        }

        let endpoint = display_endpoint(url);
        debug!(broker = %endpoint, container_id = %self.container_id, "Opening AMQP connection");

        let builder = Connection::builder().container_id(self.container_id.clone());
        let opened = match &self.tls_connector {
            Some(connector) => {
                builder
                    .rustls_connector(connector.clone())
                    .open(url.as_str())
                    .await
            }
            None => builder.open(url.as_str()).await,
        };
        let mut connection = opened.map_err(|e| AmqpError::ConnectionFailed(Box::new(e)))?;

        let session = match Session::begin(&mut connection).await {
            Ok(session) => session,
            Err(e) => {
                if let Err(close_err) = connection.close().await {
                    debug!("Closing connection after failed session begin: {close_err}");
                }
                return Err(AmqpError::ConnectionFailed(Box::new(e)));
            }
        };

        self.connection = Some(connection);
        self.session = Some(session);
        self.state = ConnectionState::Open(endpoint);
        Ok(())
    }

    async fn attach_sender(&mut self, source: &str, address: &str) -> Result<(), Self::Error> {
        let session = self.session.as_mut().ok_or_else(|| AmqpError::NotConnected {
            state: self.state.clone(),
        })?;

        let sender = Sender::builder()
            .name(source)
            .source(Source::builder().address(source.to_string()).build())
            .target(Target::builder().address(address.to_string()).build())
            .attach(session)
            .await
            .map_err(|e| AmqpError::AttachFailed(Box::new(e)))?;

        info!(source = %source, address = %address, "Sender link attached");
        self.sender = Some(sender);

        // fe2o3-amqp parks a transfer until the peer's flow frame grants
        // credit, so an attached sender is sendable from our side.
        self.emit(PublishEvent::CreditGranted { credit: 1 });
        Ok(())
    }

    async fn send(&mut self, envelope: &MessageEnvelope) -> Result<(), Self::Error> {
        let mut sender = self.sender.take().ok_or(AmqpError::AlreadySent)?;
        let message = Self::build_message(envelope);
        let events_tx = self.events_tx.clone();

        debug!(address = %envelope.address, "Transferring message");
        self.send_task = Some(tokio::spawn(async move {
            let event = match sender.send(message).await {
                Ok(disposition) => Self::classify_disposition(disposition),
                Err(e) => PublishEvent::TransportError(format!("transfer failed: {e}")),
            };
            settle_transfer(event, &events_tx, async move {
                if let Err(e) = sender.close().await {
                    debug!("Detaching sender link: {e}");
                }
            })
            .await;
        }));
        Ok(())
    }

    async fn next_event(&mut self) -> Option<PublishEvent> {
        self.events_rx.recv().await
    }

    async fn close(&mut self) -> Result<(), Self::Error> {
        if matches!(self.state, ConnectionState::Closed) {
            return Ok(());
        }
        self.state = ConnectionState::Closing;

        if let Some(mut task) = self.send_task.take() {
            if timeout(DETACH_GRACE, &mut task).await.is_err() {
                warn!("Abandoning unfinished transfer or detach");
                task.abort();
            }
        }
        if let Some(sender) = self.sender.take() {
            if let Err(e) = sender.close().await {
                debug!("Detaching unused sender link: {e}");
            }
        }
        if let Some(mut session) = self.session.take() {
            if let Err(e) = session.end().await {
                debug!("Ending session: {e}");
            }
        }

        let result = match self.connection.take() {
            Some(mut connection) => connection
                .close()
                .await
                .map_err(|e| AmqpError::CloseFailed(Box::new(e))),
            None => Ok(()),
        };

        self.state = ConnectionState::Closed;
        info!("AMQP connection closed");
        result
    }

    fn connection_state(&self) -> ConnectionState {
        self.state.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fe2o3_amqp::types::messaging::Rejected;
    use serde_json::json;

    #[test]
    fn test_new_client_is_idle() {
        let client = AmqpClient::new(None).unwrap();
        assert_eq!(client.connection_state(), ConnectionState::Idle);
        assert!(client.container_id().starts_with("amqp-publisher-"));
    }

    #[test]
    fn test_unreadable_tls_material_fails_construction() {
        let tls = TlsConfig {
            trusted_ca: "/nonexistent/ca.pem".into(),
            client_cert: "/nonexistent/client.pem".into(),
            client_key: "/nonexistent/client.key".into(),
            verify_peer: true,
        };
        assert!(matches!(
            AmqpClient::new(Some(&tls)),
            Err(ConfigError::TlsMaterial { .. })
        ));
    }

    #[test]
    fn test_message_carries_address_and_body() {
        let envelope = MessageEnvelope::new("/topic/builds", json!({"arch": "x86_64"}));
        let message = AmqpClient::build_message(&envelope);

        let to = message.properties.as_ref().and_then(|p| p.to.clone());
        assert_eq!(to.as_deref(), Some("/topic/builds"));
        assert_eq!(message.body.0, json!({"arch": "x86_64"}));
    }

    #[test]
    fn test_rejection_without_error_gets_default_reason() {
        assert_eq!(
            AmqpClient::classify_disposition(Disposition::Rejected(Rejected { error: None })),
            PublishEvent::MessageRejected {
                reason: "rejected by broker".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_disposition_reported_before_detach_completes() {
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();

        let settling = tokio::spawn(async move {
            settle_transfer(
                PublishEvent::MessageAccepted,
                &events_tx,
                std::future::pending::<()>(),
            )
            .await;
        });

        let event = tokio::time::timeout(Duration::from_millis(500), events_rx.recv())
            .await
            .expect("disposition should not wait for the detach");
        assert_eq!(event, Some(PublishEvent::MessageAccepted));
        assert!(!settling.is_finished());
        settling.abort();
    }

    #[tokio::test]
    async fn test_settle_survives_closed_receiver() {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        drop(events_rx);

        settle_transfer(PublishEvent::MessageAccepted, &events_tx, async {}).await;
    }

    #[tokio::test]
    async fn test_close_without_open_is_noop() {
        let mut client = AmqpClient::new(None).unwrap();
        client.close().await.unwrap();
        client.close().await.unwrap();
        assert_eq!(client.connection_state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_attach_requires_connection() {
        let mut client = AmqpClient::new(None).unwrap();
        let result = client.attach_sender("ci", "/topic/builds").await;
        assert!(matches!(result, Err(AmqpError::NotConnected { .. })));
    }
}
