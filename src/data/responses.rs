//! Backend response envelopes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::UploadError;
use crate::protocol::tags::ProtocolId;

/// Result code the backend uses for success.
pub const SUCCESS_CODE: &str = "0000";

/// Response to a protocol upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SleepCommResponse {
    /// Backend result code.
    pub ret_cd: String,
    /// Human-readable result message.
    #[serde(default)]
    pub ret_msg: Option<String>,
    /// Optional protocol-specific payload.
    #[serde(default)]
    pub data: Option<Value>,
}

impl SleepCommResponse {
    /// Parse a response body.
    pub fn parse(protocol: ProtocolId, body: &str) -> Result<Self, UploadError> {
        parse_envelope(protocol, body)
    }

    /// Whether the backend reported success.
    pub fn is_success(&self) -> bool {
        self.ret_cd == SUCCESS_CODE
    }
}

/// Response to the sleep-end call, carrying the session's sleep result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SleepResultResponse {
    /// Backend result code.
    pub ret_cd: String,
    /// Human-readable result message.
    #[serde(default)]
    pub ret_msg: Option<String>,
    /// Sleep analysis computed by the backend.
    #[serde(default)]
    pub data: Option<Value>,
}

impl SleepResultResponse {
    /// Parse a response body.
    pub fn parse(body: &str) -> Result<Self, UploadError> {
        parse_envelope(ProtocolId::SleepEnd, body)
    }

    /// Whether the backend reported success.
    pub fn is_success(&self) -> bool {
        self.ret_cd == SUCCESS_CODE
    }
}

fn parse_envelope<T: serde::de::DeserializeOwned>(
    protocol: ProtocolId,
    body: &str,
) -> Result<T, UploadError> {
    serde_json::from_str(body).map_err(|e| UploadError::DecodeFailure {
        protocol,
        reason: format!("invalid response body: {}", e),
    })
}
