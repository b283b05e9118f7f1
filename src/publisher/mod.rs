//! One-shot AMQP publish
//!
//! - [`sender_link`] - credit and at-most-once send bookkeeping
//! - [`state_machine`] - pure state machine over [`PublishEvent`](crate::protocol::PublishEvent)s
//! - [`runner`] - the event loop performing the machine's actions

pub mod runner;
pub mod sender_link;
pub mod state_machine;

pub use runner::Publisher;
pub use sender_link::{SenderLink, SenderState};
pub use state_machine::{Action, PublishState, PublishStateMachine};

use crate::config::PublishRequest;
use crate::error::PublishResult;
use crate::transport::{probe_amqp_support, AmqpTransport};

/// Publish over a caller-supplied transport
pub async fn publish_with<T: AmqpTransport>(transport: T, request: &PublishRequest) -> PublishResult<()> {
    Publisher::new(transport, request).run().await.into_result()
}

/// Publish over the AMQP 1.0 client
#[cfg(feature = "amqp")]
pub async fn publish(request: &PublishRequest) -> PublishResult<()> {
    probe_amqp_support()?;
    let transport = crate::transport::DefaultTransport::new(request.tls.as_ref())?;
    publish_with(transport, request).await
}

/// Publish over the AMQP 1.0 client
#[cfg(not(feature = "amqp"))]
pub async fn publish(_request: &PublishRequest) -> PublishResult<()> {
    probe_amqp_support()?;
    Err(crate::config::ConfigError::LibraryUnavailable(
        "no AMQP transport compiled in".to_string(),
    )
    .into())
}
