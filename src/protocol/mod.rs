//! Message, event and outcome types for a single AMQP publish
//!
//! - [`messages`] - the message envelope and the terminal outcome
//! - [`events`] - the closed set of events driving the publish state machine

pub mod events;
pub mod messages;

pub use events::PublishEvent;
pub use messages::{FailureReason, MessageEnvelope, Outcome};
