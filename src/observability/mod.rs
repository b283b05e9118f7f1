//! Observability for the publisher
//!
//! Structured logging to stderr with span macros for the publish and its
//! AMQP operations.

pub mod logging;

pub use logging::{init_default_logging, init_logging, LogFormat};

pub use logging::{amqp_span, publish_span};
