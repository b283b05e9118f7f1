//! Test helpers and utilities for integration tests

use amqp_publisher::config::{PublishParams, PublishRequest};
use serde_json::json;
use std::time::Duration;
use url::Url;

/// Create a plain-text publish request for integration tests
#[allow(dead_code)]
pub fn test_request(urls: &[&str]) -> PublishRequest {
    PublishRequest {
        urls: urls.iter().map(|u| Url::parse(u).unwrap()).collect(),
        tls: None,
        source: "ci".to_string(),
        address: "/topic/builds".to_string(),
        body: json!({
            "build": "os-release-4243",
            "status": "passed",
            "artifacts": ["image.qcow2", "image.iso"],
        }),
        ack_timeout: Some(Duration::from_secs(5)),
        connect_timeout: Duration::from_secs(2),
    }
}

/// Create a complete parameter bundle without TLS
#[allow(dead_code)]
pub fn test_params() -> PublishParams {
    PublishParams {
        urls: vec!["amqp://broker01.example.com:5672".to_string()],
        source: Some("ci".to_string()),
        address: Some("/topic/builds".to_string()),
        body: Some(json!({"build": "os-release-4243"})),
        ..Default::default()
    }
}
