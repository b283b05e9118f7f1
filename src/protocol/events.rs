//! Events surfaced by the transport while a publish is in flight

/// Protocol events, delivered in the order the transport observed them
#[derive(Debug, Clone, PartialEq)]
pub enum PublishEvent {
    /// Transport connection is open against `url`
    ConnectionOpened { url: String },
    /// Broker granted link credit (permission to send `credit` transfers)
    CreditGranted { credit: u32 },
    /// Broker settled the transfer with the accepted outcome
    MessageAccepted,
    /// Broker settled the transfer with the rejected (or modified) outcome
    MessageRejected { reason: String },
    /// Broker released the transfer without processing it
    MessageReleased,
    /// Connection is gone, whether we closed it or the peer did
    ConnectionClosed,
    /// Connection, session or link failure
    TransportError(String),
    /// The publish deadline passed before a terminal event
    DeadlineExpired,
}

impl PublishEvent {
    /// Short label used in logs
    pub fn name(&self) -> &'static str {
        match self {
            PublishEvent::ConnectionOpened { .. } => "connection_opened",
            PublishEvent::CreditGranted { .. } => "credit_granted",
            PublishEvent::MessageAccepted => "message_accepted",
            PublishEvent::MessageRejected { .. } => "message_rejected",
            PublishEvent::MessageReleased => "message_released",
            PublishEvent::ConnectionClosed => "connection_closed",
            PublishEvent::TransportError(_) => "transport_error",
            PublishEvent::DeadlineExpired => "deadline_expired",
        }
    }
}
