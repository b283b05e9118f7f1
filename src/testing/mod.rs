//! Testing utilities and mock implementations
//!
//! This module provides a scripted broker for exercising the publish state
//! machine without a running AMQP broker.

pub mod mocks;

pub use mocks::*;
