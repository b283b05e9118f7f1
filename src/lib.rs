//! AMQP Publisher
//!
//! Publishes exactly one message to an AMQP 1.0 broker and reports whether
//! the broker confirmed it.
//!
//! # Overview
//!
//! - Parameter loading and validation, including client TLS material
//! - Ordered fallback across candidate broker URLs
//! - A pure publish state machine driven by transport events
//! - An AMQP 1.0 transport over `fe2o3-amqp` with rustls
//! - A JSON outcome report for the invoking automation tool
//!
//! # Quick Start
//!
//! ```rust
//! use amqp_publisher::config::{PublishParams, PublishRequest};
//! use serde_json::json;
//!
//! let params = PublishParams {
//!     urls: vec!["amqp://broker01.example.com:5672".to_string()],
//!     source: Some("ci".to_string()),
//!     address: Some("/topic/builds".to_string()),
//!     body: Some(json!({"build": "os-release-4243", "status": "passed"})),
//!     ..Default::default()
//! };
//!
//! let request = PublishRequest::from_params(params).unwrap();
//! assert_eq!(request.urls.len(), 1);
//! assert!(request.tls.is_none());
//! ```

pub mod config;
pub mod error;
pub mod observability;
pub mod protocol;
pub mod publisher;
pub mod report;
pub mod testing;
pub mod transport;

pub use config::{ConfigError, PublishParams, PublishRequest};
pub use error::{PublishError, PublishResult};
pub use protocol::*;
pub use publisher::{publish, publish_with, Publisher};
pub use report::PublishReport;
pub use transport::AmqpTransport;
