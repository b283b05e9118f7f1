//! Outcome reporting for the invoking automation tool
//!
//! The tool reads one JSON object from stdout and the exit code. Success is
//! only ever reported for a broker-confirmed publish.

use crate::error::PublishError;
use serde::{Deserialize, Serialize};

/// Single result line printed at the end of an invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishReport {
    pub changed: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub failed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
}

impl PublishReport {
    pub fn from_result(result: &Result<(), PublishError>) -> Self {
        match result {
            Ok(()) => Self {
                changed: true,
                failed: false,
                kind: None,
                msg: None,
            },
            Err(e) => Self {
                changed: false,
                failed: true,
                kind: Some(e.kind().to_string()),
                msg: Some(e.report_message()),
            },
        }
    }

    /// Process exit code for this report
    pub fn exit_code(&self) -> i32 {
        if self.failed {
            1
        } else {
            0
        }
    }

    pub fn to_json(&self) -> String {
        // Only strings and booleans, serialization cannot fail
        serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"changed":false,"failed":true,"msg":"failed to encode result"}"#.to_string()
        })
    }
}
