use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::common::types::now_ms;

/// Typed error kinds from spec §7.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("no provider available for item")]
    NoProvider,

    #[error("failed to spawn helper process: {0}")]
    HelperSpawnFailed(String),

    #[error("helper process exited early: {0}")]
    HelperExitedEarly(String),

    #[error("endpoint unreachable: {0}")]
    EndpointUnreachable(String),

    #[error("cancelled")]
    Cancelled,

    #[error("DACP protocol error: {0}")]
    ProtocolError(String),

    #[error("operation timed out")]
    Timeout,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Severity classification, used to decide log level for a given error.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Severity {
    Common,
    Suspicious,
    Fault,
}

impl StreamError {
    pub fn severity(&self) -> Severity {
        match self {
            StreamError::NotFound(_) | StreamError::Cancelled => Severity::Common,
            StreamError::NoProvider | StreamError::ProtocolError(_) | StreamError::Timeout => {
                Severity::Suspicious
            }
            StreamError::HelperSpawnFailed(_)
            | StreamError::HelperExitedEarly(_)
            | StreamError::EndpointUnreachable(_)
            | StreamError::Io(_) => Severity::Fault,
        }
    }
}

/// JSON error envelope returned by the HTTP stream endpoint.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    pub timestamp: u64,
    pub status: u16,
    pub error: String,
    pub message: String,
    pub path: String,
}

impl ApiError {
    pub fn new(
        status: u16,
        error: &str,
        message: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: now_ms(),
            status,
            error: error.to_string(),
            message: message.into(),
            path: path.into(),
        }
    }

    pub fn not_found(message: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(404, "Not Found", message, path)
    }

    pub fn internal(message: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(500, "Internal Server Error", message, path)
    }
}
