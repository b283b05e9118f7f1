//! Pure publish state machine
//!
//! `Idle → Connecting → Attached → Sent → {Confirmed | Rejected} → Closed`,
//! with `Failed` reachable from any non-terminal state. The machine performs
//! no I/O: it consumes [`PublishEvent`]s and answers with the [`Action`] the
//! event loop must carry out next.
//!
//! The outcome is fixed at the first terminal transition. Whatever arrives
//! afterwards (late credit, a second disposition, errors while closing) can
//! move the machine to `Closed` but never rewrites the outcome.

use super::sender_link::{SenderLink, SenderState};
use crate::protocol::{FailureReason, MessageEnvelope, Outcome, PublishEvent};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Publish lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishState {
    Idle,
    Connecting,
    Attached,
    Sent,
    Confirmed,
    Rejected,
    Failed,
    Closed,
}

impl PublishState {
    /// Outcome already decided
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PublishState::Confirmed
                | PublishState::Rejected
                | PublishState::Failed
                | PublishState::Closed
        )
    }
}

/// Work the event loop must perform for the machine
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Open a connection to one of the candidate brokers
    Connect,
    /// Attach the single sender link
    AttachSender { source: String, address: String },
    /// Transmit the message
    Send(MessageEnvelope),
    /// Close the connection
    CloseConnection,
}

/// Event-driven coordinator for a single publish
#[derive(Debug)]
pub struct PublishStateMachine {
    state: PublishState,
    link: SenderLink,
    outcome: Option<Outcome>,
    connection_open: bool,
    ack_timeout: Option<Duration>,
}

impl PublishStateMachine {
    pub fn new(link: SenderLink, ack_timeout: Option<Duration>) -> Self {
        Self {
            state: PublishState::Idle,
            link,
            outcome: None,
            connection_open: false,
            ack_timeout,
        }
    }

    pub fn state(&self) -> PublishState {
        self.state
    }

    pub fn sender_state(&self) -> SenderState {
        self.link.state()
    }

    pub fn outcome(&self) -> Option<&Outcome> {
        self.outcome.as_ref()
    }

    pub fn into_outcome(self) -> Option<Outcome> {
        self.outcome
    }

    /// Nothing is left to do: outcome decided and connection gone
    pub fn is_closed(&self) -> bool {
        self.state == PublishState::Closed
    }

    /// Begin the publish
    pub fn start(&mut self) -> Option<Action> {
        if self.state != PublishState::Idle {
            warn!(state = ?self.state, "Publish already started");
            return None;
        }
        self.transition(PublishState::Connecting);
        Some(Action::Connect)
    }

    /// Apply one event and return the follow-up action, if any
    pub fn handle(&mut self, event: PublishEvent) -> Option<Action> {
        use PublishEvent as E;
        use PublishState as S;

        debug!(state = ?self.state, event = event.name(), "Publish event");

        match (self.state, event) {
            (S::Connecting, E::ConnectionOpened { url }) => {
                info!(broker = %url, "Connected, attaching sender link");
                self.connection_open = true;
                self.transition(S::Attached);
                Some(Action::AttachSender {
                    source: self.link.source().to_string(),
                    address: self.link.address().to_string(),
                })
            }

            (S::Attached, E::CreditGranted { credit }) => {
                let envelope = self.link.on_credit(credit)?;
                self.transition(S::Sent);
                Some(Action::Send(envelope))
            }
            (_, E::CreditGranted { credit }) => {
                debug!(credit, state = ?self.state, "Credit ignored");
                None
            }

            (S::Sent, E::MessageAccepted) => {
                self.link.on_accepted();
                self.finish(S::Confirmed, Outcome::Confirmed)
            }
            (S::Sent, E::MessageRejected { reason }) => {
                self.finish(S::Rejected, Outcome::Rejected { reason })
            }
            (S::Sent, E::MessageReleased) => self.finish(
                S::Rejected,
                Outcome::Rejected {
                    reason: "released by broker".to_string(),
                },
            ),

            (S::Connecting, E::TransportError(reason)) => {
                self.fail(FailureReason::Connection(reason))
            }
            (S::Attached, E::TransportError(reason)) => {
                self.fail(FailureReason::Transport(reason))
            }
            (S::Sent, E::TransportError(reason)) => {
                self.fail(FailureReason::Unconfirmed(reason))
            }

            (S::Attached, E::ConnectionClosed) => {
                self.connection_open = false;
                self.fail(FailureReason::Transport(
                    "connection closed before the message was sent".to_string(),
                ))
            }
            (S::Sent, E::ConnectionClosed) => {
                self.connection_open = false;
                self.fail(FailureReason::Unconfirmed(
                    "connection closed before acknowledgment".to_string(),
                ))
            }
            (S::Confirmed | S::Rejected | S::Failed, E::ConnectionClosed) => {
                self.connection_open = false;
                self.transition(S::Closed);
                None
            }

            (S::Connecting | S::Attached | S::Sent, E::DeadlineExpired) => {
                let timeout = self.ack_timeout.unwrap_or_default();
                self.fail(FailureReason::Timeout(timeout))
            }

            (state, event) => {
                if state.is_terminal() {
                    debug!(state = ?state, event = event.name(), "Event after outcome ignored");
                } else {
                    warn!(state = ?state, event = event.name(), "Unexpected event ignored");
                }
                None
            }
        }
    }

    fn fail(&mut self, reason: FailureReason) -> Option<Action> {
        warn!(reason = %reason, "Publish failed");
        self.finish(PublishState::Failed, Outcome::Failed(reason))
    }

    fn finish(&mut self, state: PublishState, outcome: Outcome) -> Option<Action> {
        if self.outcome.is_none() {
            self.outcome = Some(outcome);
        }
        self.transition(state);

        if self.connection_open {
            Some(Action::CloseConnection)
        } else {
            self.transition(PublishState::Closed);
            None
        }
    }

    fn transition(&mut self, to: PublishState) {
        if self.state != to {
            debug!(from = ?self.state, to = ?to, "Publish state transition");
            self.state = to;
        }
    }
}
