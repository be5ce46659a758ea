//! Backend upload layer.
//!
//! The HTTP client itself lives outside this crate. Hosts plug it in by
//! implementing [`SleepApi`], which posts a JSON body to a relative endpoint
//! and returns the raw response body.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

pub mod dispatcher;

#[cfg(test)]
pub(crate) mod testing;

pub use dispatcher::{UploadDispatcher, UploadResult};

/// Failure reported by a [`SleepApi`] implementation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct TransportError {
    /// HTTP status, if a response was received.
    pub status: Option<u16>,
    /// Description of the failure.
    pub message: String,
}

impl TransportError {
    /// Failure before any response was received.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
        }
    }

    /// Failure with an HTTP status.
    pub fn with_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
        }
    }
}

/// HTTP collaborator used for every upload.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SleepApi: Send + Sync {
    /// POST `body` as JSON to `endpoint` and return the response body.
    async fn post(&self, endpoint: &str, body: Value) -> Result<String, TransportError>;
}
