//! Error taxonomy for a publish invocation
//!
//! Every failure surfaces exactly once as a [`PublishError`]. The variants keep
//! configuration problems, unreachable brokers and broker rejections apart so
//! the caller can tell "never got there" from "got there and was refused".

use crate::config::ConfigError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::time::Duration;
use thiserror::Error;

/// Main error type for publish operations
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Connection failed: {message}")]
    Connection { message: String },

    #[error("Message rejected by broker: {reason}")]
    Rejected { reason: String },

    #[error("Failed to publish the message: {message}")]
    Unconfirmed { message: String },

    #[error("Failed to publish the message: no acknowledgment within {}s", .timeout.as_secs_f64())]
    Timeout { timeout: Duration },
}

impl PublishError {
    /// Stable category label for machine consumers
    pub fn kind(&self) -> &'static str {
        match self {
            PublishError::Config(ConfigError::LibraryUnavailable(_)) => "unavailable",
            PublishError::Config(_) => "config",
            PublishError::Connection { .. } => "connection",
            PublishError::Rejected { .. } => "rejected",
            PublishError::Unconfirmed { .. } => "unconfirmed",
            PublishError::Timeout { .. } => "timeout",
        }
    }

    /// Human-readable reason with secrets and credential paths redacted
    pub fn report_message(&self) -> String {
        sanitize_error_message(&self.to_string())
    }

    /// Create connection error
    pub fn connection<S: Into<String>>(message: S) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Create rejection error
    pub fn rejected<S: Into<String>>(reason: S) -> Self {
        Self::Rejected {
            reason: reason.into(),
        }
    }

    /// Create unconfirmed-termination error
    pub fn unconfirmed<S: Into<String>>(message: S) -> Self {
        Self::Unconfirmed {
            message: message.into(),
        }
    }
}

static SECRET_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(password|passwd|token|secret|api[_-]?key)[=:]\s*\S+")
        .expect("valid secret pattern")
});

static CREDENTIAL_PATH_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"/[a-zA-Z0-9._/-]+/(secrets?|private|\.ssh|\.aws|\.config)/[a-zA-Z0-9._/-]+")
        .expect("valid path pattern")
});

static URL_USERINFO_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(amqps?://)[^/@\s]+@").expect("valid userinfo pattern"));

/// Sanitize error messages before they leave the process
fn sanitize_error_message(message: &str) -> String {
    let mut sanitized = SECRET_PATTERN
        .replace_all(message, "${1}=***")
        .to_string();

    sanitized = CREDENTIAL_PATH_PATTERN
        .replace_all(&sanitized, "/***REDACTED***/")
        .to_string();

    sanitized = URL_USERINFO_PATTERN
        .replace_all(&sanitized, "${1}***@")
        .to_string();

    // Truncate very long messages - ensure total length is <= 500
    if sanitized.len() > 500 {
        let truncate_suffix = "...[truncated]";
        let mut cut = 500 - truncate_suffix.len();
        while !sanitized.is_char_boundary(cut) {
            cut -= 1;
        }
        sanitized = format!("{}{}", &sanitized[..cut], truncate_suffix);
    }

    sanitized
}

/// Result type for publish operations
pub type PublishResult<T> = Result<T, PublishError>;
