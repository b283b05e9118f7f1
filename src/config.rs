//! Publish parameter loading and validation
//!
//! The invoking tool hands over one parameter bundle per publish. It can come
//! from a TOML parameter file, from command line flags, or both (flags win).
//! [`PublishRequest::from_params`] is the single validation gate: nothing
//! touches the network until it has succeeded.

use crate::transport::amqp::tls::{TlsConfig, TlsDomainBuilder};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Raw parameter bundle as supplied by the caller
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PublishParams {
    /// Candidate broker endpoints, tried in order
    #[serde(default)]
    pub urls: Vec<String>,
    /// Link source name
    pub source: Option<String>,
    /// Target address (queue or topic)
    pub address: Option<String>,
    /// Seconds to wait for the broker before giving up (0 = wait forever)
    pub ack_timeout_secs: Option<u64>,
    /// Seconds a single broker may take to complete the open handshake
    pub connect_timeout_secs: Option<u64>,
    /// Optional TLS material
    #[serde(default)]
    pub tls: TlsSection,
    /// Message payload
    pub body: Option<serde_json::Value>,
}

/// TLS section of the parameter bundle
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TlsSection {
    /// Trusted certificate authority bundle (PEM)
    pub ca: Option<PathBuf>,
    /// Client certificate chain (PEM)
    pub cert: Option<PathBuf>,
    /// Client private key (PEM)
    pub key: Option<PathBuf>,
}

/// Default bound on the whole publish exchange
pub const DEFAULT_ACK_TIMEOUT_SECS: u64 = 30;

/// Default bound on one connection attempt
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Configuration errors, all detected before any connection attempt
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read parameter file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),
    #[error("Invalid broker URL: {0}")]
    InvalidUrl(String),
    #[error("cert and key are required for ssl")]
    IncompleteTls,
    #[error("Invalid TLS material in {path}: {reason}")]
    TlsMaterial { path: PathBuf, reason: String },
    #[error("AMQP library is unavailable: {0}")]
    LibraryUnavailable(String),
}

impl PublishParams {
    /// Load parameters from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let params: PublishParams = toml::from_str(&content)?;
        Ok(params)
    }

    /// Overlay values from `other` onto `self`; set fields in `other` win
    pub fn merge(mut self, other: PublishParams) -> Self {
        if !other.urls.is_empty() {
            self.urls = other.urls;
        }
        if other.source.is_some() {
            self.source = other.source;
        }
        if other.address.is_some() {
            self.address = other.address;
        }
        if other.ack_timeout_secs.is_some() {
            self.ack_timeout_secs = other.ack_timeout_secs;
        }
        if other.connect_timeout_secs.is_some() {
            self.connect_timeout_secs = other.connect_timeout_secs;
        }
        if other.tls.ca.is_some() {
            self.tls.ca = other.tls.ca;
        }
        if other.tls.cert.is_some() {
            self.tls.cert = other.tls.cert;
        }
        if other.tls.key.is_some() {
            self.tls.key = other.tls.key;
        }
        if other.body.is_some() {
            self.body = other.body;
        }
        self
    }
}

/// A validated, immutable request for one publish
#[derive(Debug, Clone, PartialEq)]
pub struct PublishRequest {
    pub urls: Vec<Url>,
    pub tls: Option<TlsConfig>,
    pub source: String,
    pub address: String,
    pub body: serde_json::Value,
    /// Upper bound on the whole exchange; `None` waits forever
    pub ack_timeout: Option<Duration>,
    /// Upper bound on each candidate's open handshake
    pub connect_timeout: Duration,
}

impl PublishRequest {
    /// Validate a parameter bundle into a request
    pub fn from_params(params: PublishParams) -> Result<Self, ConfigError> {
        if params.urls.is_empty() {
            return Err(ConfigError::InvalidParams(
                "at least one broker url is required".to_string(),
            ));
        }
        let urls = params
            .urls
            .iter()
            .map(|raw| parse_broker_url(raw))
            .collect::<Result<Vec<_>, _>>()?;

        let source = required_field(params.source, "source")?;
        let address = required_field(params.address, "address")?;
        let body = params
            .body
            .ok_or_else(|| ConfigError::InvalidParams("body is required".to_string()))?;

        let tls = TlsDomainBuilder::new()
            .trusted_ca(params.tls.ca)
            .client_cert(params.tls.cert)
            .client_key(params.tls.key)
            .build()?;

        let ack_timeout = match params.ack_timeout_secs.unwrap_or(DEFAULT_ACK_TIMEOUT_SECS) {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        let connect_timeout = match params
            .connect_timeout_secs
            .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS)
        {
            0 => {
                return Err(ConfigError::InvalidParams(
                    "connect_timeout_secs must be greater than zero".to_string(),
                ))
            }
            secs => Duration::from_secs(secs),
        };

        Ok(Self {
            urls,
            tls,
            source,
            address,
            body,
            ack_timeout,
            connect_timeout,
        })
    }
}

fn required_field(value: Option<String>, name: &str) -> Result<String, ConfigError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ConfigError::InvalidParams(format!("{name} is required"))),
    }
}

/// Parse a broker URL, accepting only the AMQP schemes
pub fn parse_broker_url(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|_| ConfigError::InvalidUrl(raw.to_string()))?;
    match url.scheme() {
        "amqp" | "amqps" if url.host_str().is_some() => Ok(url),
        _ => Err(ConfigError::InvalidUrl(raw.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid_params() -> PublishParams {
        PublishParams {
            urls: vec!["amqp://localhost:5672".to_string()],
            source: Some("ci".to_string()),
            address: Some("/topic/VirtualTopic.qe.ci.zuul".to_string()),
            ack_timeout_secs: None,
            connect_timeout_secs: None,
            tls: TlsSection::default(),
            body: Some(json!({"build": "os-release-4243", "arch": "x86_64"})),
        }
    }

    #[test]
    fn test_valid_params_build_request() {
        let request = PublishRequest::from_params(valid_params()).unwrap();

        assert_eq!(request.urls.len(), 1);
        assert_eq!(request.urls[0].host_str(), Some("localhost"));
        assert_eq!(request.source, "ci");
        assert_eq!(request.address, "/topic/VirtualTopic.qe.ci.zuul");
        assert!(request.tls.is_none());
        assert_eq!(request.ack_timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_zero_timeout_waits_forever() {
        let mut params = valid_params();
        params.ack_timeout_secs = Some(0);

        let request = PublishRequest::from_params(params).unwrap();
        assert_eq!(request.ack_timeout, None);
    }

    #[test]
    fn test_connect_timeout_defaults_and_rejects_zero() {
        let request = PublishRequest::from_params(valid_params()).unwrap();
        assert_eq!(
            request.connect_timeout,
            Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS)
        );

        let mut params = valid_params();
        params.connect_timeout_secs = Some(0);
        assert!(matches!(
            PublishRequest::from_params(params),
            Err(ConfigError::InvalidParams(_))
        ));
    }

    #[test]
    fn test_empty_url_list_rejected() {
        let mut params = valid_params();
        params.urls.clear();

        let result = PublishRequest::from_params(params);
        assert!(matches!(result, Err(ConfigError::InvalidParams(_))));
    }

    #[test]
    fn test_non_amqp_scheme_rejected() {
        assert!(matches!(
            parse_broker_url("mqtt://localhost:1883"),
            Err(ConfigError::InvalidUrl(_))
        ));
        assert!(matches!(
            parse_broker_url("not a url"),
            Err(ConfigError::InvalidUrl(_))
        ));
        assert!(parse_broker_url("amqps://broker01.example.com").is_ok());
    }

    #[test]
    fn test_missing_required_fields() {
        let mut params = valid_params();
        params.address = Some("  ".to_string());
        let err = PublishRequest::from_params(params).unwrap_err();
        assert_eq!(err.to_string(), "Invalid parameters: address is required");

        let mut params = valid_params();
        params.source = None;
        let err = PublishRequest::from_params(params).unwrap_err();
        assert_eq!(err.to_string(), "Invalid parameters: source is required");

        let mut params = valid_params();
        params.body = None;
        let err = PublishRequest::from_params(params).unwrap_err();
        assert_eq!(err.to_string(), "Invalid parameters: body is required");
    }

    #[test]
    fn test_ca_without_key_is_config_error() {
        let mut params = valid_params();
        params.tls.ca = Some(PathBuf::from("/etc/pki/ca.pem"));
        params.tls.cert = Some(PathBuf::from("/etc/pki/client.pem"));

        let result = PublishRequest::from_params(params);
        assert!(matches!(result, Err(ConfigError::IncompleteTls)));
    }

    #[test]
    fn test_merge_prefers_overrides() {
        let base = valid_params();
        let overrides = PublishParams {
            address: Some("queue.other".to_string()),
            ack_timeout_secs: Some(5),
            ..Default::default()
        };

        let merged = base.merge(overrides);
        assert_eq!(merged.address.as_deref(), Some("queue.other"));
        assert_eq!(merged.source.as_deref(), Some("ci"));
        assert_eq!(merged.urls, vec!["amqp://localhost:5672".to_string()]);
        assert_eq!(merged.ack_timeout_secs, Some(5));
    }
}
