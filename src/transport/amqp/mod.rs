//! AMQP 1.0 client implementation for a single publish
//!
//! # Architecture
//!
//! - [`tls`] - TLS domain construction from CA/cert/key parameters
//! - [`connection`] - connection state, wire errors and candidate URL negotiation
//! - [`client`] - impure I/O on top of `fe2o3-amqp` (behind the `amqp` feature)

#[cfg(feature = "amqp")]
pub mod client;
pub mod connection;
pub mod tls;

#[cfg(feature = "amqp")]
pub use client::AmqpClient;
pub use connection::{AmqpError, ConnectionNegotiator, ConnectionState};
pub use tls::{TlsConfig, TlsDomainBuilder};
