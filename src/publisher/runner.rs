//! Event loop driving one publish
//!
//! A single task alternates between performing the machine's actions and
//! waiting for the next transport event. Every await on the broker is bounded
//! by the publish deadline, and the connection is closed on every exit path.

use super::sender_link::SenderLink;
use super::state_machine::{Action, PublishStateMachine};
use crate::config::PublishRequest;
use crate::error::PublishError;
use crate::protocol::{FailureReason, Outcome, PublishEvent};
use crate::transport::amqp::connection::{display_endpoint, ConnectionNegotiator};
use crate::transport::AmqpTransport;
use std::future::Future;
use std::time::Duration;
use tokio::time::{error::Elapsed, timeout, timeout_at, Instant};
use tracing::{debug, info, warn, Instrument};

/// Upper bound on the close handshake, applied even after the deadline
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Drives a [`PublishStateMachine`] against an [`AmqpTransport`]
pub struct Publisher<T: AmqpTransport> {
    transport: T,
    negotiator: ConnectionNegotiator,
    machine: PublishStateMachine,
    ack_timeout: Option<Duration>,
    deadline: Option<Instant>,
}

impl<T: AmqpTransport> Publisher<T> {
    pub fn new(transport: T, request: &PublishRequest) -> Self {
        let link = SenderLink::new(
            request.source.clone(),
            request.address.clone(),
            request.body.clone(),
        );
        Self {
            transport,
            negotiator: ConnectionNegotiator::new(&request.urls, request.tls.is_some())
                .with_connect_timeout(request.connect_timeout),
            machine: PublishStateMachine::new(link, request.ack_timeout),
            ack_timeout: request.ack_timeout,
            deadline: None,
        }
    }

    /// Run the publish to its terminal outcome
    pub async fn run(self) -> Outcome {
        let span = crate::publish_span!(
            candidates = self.negotiator.candidates().len(),
            timeout_secs = self.ack_timeout.map(|t| t.as_secs())
        );
        self.run_inner().instrument(span).await
    }

    async fn run_inner(mut self) -> Outcome {
        let started = Instant::now();
        self.deadline = self.ack_timeout.map(|t| started + t);

        let mut pending = self.machine.start();
        loop {
            let event = match pending.take() {
                Some(action) => match self.perform(action).await {
                    Some(event) => event,
                    None => continue,
                },
                None if self.machine.is_closed() => break,
                None => self.wait_for_event().await,
            };
            pending = self.machine.handle(event);
        }

        self.ensure_closed().await;

        let outcome = self.machine.into_outcome().unwrap_or_else(|| {
            Outcome::Failed(FailureReason::Unconfirmed(
                "event loop ended without an outcome".to_string(),
            ))
        });
        info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            confirmed = outcome.is_confirmed(),
            "Publish finished"
        );
        outcome
    }

    /// Carry out one action; returns the event it produced synchronously
    async fn perform(&mut self, action: Action) -> Option<PublishEvent> {
        let deadline = self.deadline;
        match action {
            // Bounded per candidate inside the negotiator, so an exhausted
            // list is a connection failure rather than a timeout
            Action::Connect => {
                match self.negotiator.establish(&mut self.transport, deadline).await {
                    Ok(url) => Some(PublishEvent::ConnectionOpened {
                        url: display_endpoint(&url),
                    }),
                    Err(PublishError::Connection { message }) => {
                        Some(PublishEvent::TransportError(message))
                    }
                    Err(e) => Some(PublishEvent::TransportError(e.to_string())),
                }
            }
            Action::AttachSender { source, address } => {
                match with_deadline(deadline, self.transport.attach_sender(&source, &address))
                    .await
                {
                    Ok(Ok(())) => None,
                    Ok(Err(e)) => Some(PublishEvent::TransportError(e.to_string())),
                    Err(_) => Some(PublishEvent::DeadlineExpired),
                }
            }
            Action::Send(envelope) => {
                match with_deadline(deadline, self.transport.send(&envelope)).await {
                    Ok(Ok(())) => {
                        debug!(address = %envelope.address, "Message handed to sender link");
                        None
                    }
                    Ok(Err(e)) => Some(PublishEvent::TransportError(e.to_string())),
                    Err(_) => Some(PublishEvent::DeadlineExpired),
                }
            }
            Action::CloseConnection => {
                self.close_transport().await;
                Some(PublishEvent::ConnectionClosed)
            }
        }
    }

    async fn wait_for_event(&mut self) -> PublishEvent {
        match with_deadline(self.deadline, self.transport.next_event()).await {
            Ok(Some(event)) => event,
            Ok(None) => PublishEvent::ConnectionClosed,
            Err(_) => PublishEvent::DeadlineExpired,
        }
    }

    async fn close_transport(&mut self) {
        match timeout(CLOSE_TIMEOUT, self.transport.close()).await {
            Ok(Ok(())) => debug!("Connection closed cleanly"),
            Ok(Err(e)) => warn!(error = %e, "Error while closing connection"),
            Err(_) => warn!("Timed out closing connection"),
        }
    }

    async fn ensure_closed(&mut self) {
        if self.transport.connection_state().is_open() {
            warn!("Connection still open after publish finished, closing");
            self.close_transport().await;
        }
    }
}

async fn with_deadline<F: Future>(deadline: Option<Instant>, fut: F) -> Result<F::Output, Elapsed> {
    match deadline {
        Some(deadline) => timeout_at(deadline, fut).await,
        None => Ok(fut.await),
    }
}
